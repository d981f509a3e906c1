//! Session preamble: the `key: value` block sent before the first command

use crate::{channel::ChannelInfo, constants::*};
use indexmap::IndexMap;

/// Ordered preamble fields, keys stored with their `gi_` prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    fields: IndexMap<String, String>,
}

fn or_unknown(value: &Option<String>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.clone(),
        _ => PREAMBLE_UNKNOWN.to_string(),
    }
}

impl Preamble {
    /// Describe `info` for a session started with `request` and `args`.
    ///
    /// `enhanced` reports whether an audio side channel was set up.
    pub fn new(request: &str, info: &ChannelInfo, enhanced: bool, args: &[String]) -> Self {
        let caller = &info.caller;
        let values = [
            request.to_string(),
            info.name
                .clone(),
            info.language
                .clone(),
            info.tech
                .clone(),
            info.unique_id
                .clone(),
            or_unknown(&caller.number),
            or_unknown(&caller.name),
            caller
                .presentation
                .to_string(),
            caller
                .ani2
                .to_string(),
            caller
                .ton
                .to_string(),
            caller
                .tns
                .to_string(),
            or_unknown(&caller.dnid),
            or_unknown(&caller.rdnis),
            info.context
                .clone(),
            info.extension
                .clone(),
            info.priority
                .to_string(),
            if enhanced { "1.0" } else { "0.0" }.to_string(),
            or_unknown(&info.account_code),
        ];

        let mut fields = IndexMap::with_capacity(PREAMBLE_KEYS.len() + args.len());
        for (key, value) in PREAMBLE_KEYS
            .iter()
            .zip(values)
        {
            fields.insert(format!("{}{}", PREAMBLE_KEY_PREFIX, key), value);
        }
        for (n, arg) in args
            .iter()
            .enumerate()
        {
            fields.insert(
                format!("{}arg_{}", PREAMBLE_KEY_PREFIX, n + 1),
                arg.clone(),
            );
        }

        Self { fields }
    }

    /// Look up a field by its bare or prefixed key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .or_else(|| {
                self.fields
                    .get(&format!("{}{}", PREAMBLE_KEY_PREFIX, key))
            })
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields
            .is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render the block including the terminating blank line.
    ///
    /// Line breaks inside values are flattened to spaces.
    pub fn to_wire_format(&self) -> String {
        let mut block = String::with_capacity(self.fields.len() * 32);
        for (key, value) in &self.fields {
            block.push_str(key);
            block.push_str(": ");
            for c in value.chars() {
                block.push(if c == '\n' || c == '\r' { ' ' } else { c });
            }
            block.push_str(LINE_TERMINATOR);
        }
        block.push_str(LINE_TERMINATOR);
        block
    }
}
