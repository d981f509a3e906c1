//! Reply framing and handler results

use crate::constants::*;
use std::fmt;

/// A `200 result=...` reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Value of the `result=` field
    result: String,
    /// `key=value` fields following the result
    extras: Vec<(String, String)>,
    /// Parenthesized payload at the end of the line
    payload: Option<String>,
}

impl Reply {
    /// Reply carrying a numeric result
    pub fn new(result: i64) -> Self {
        Self::text(result.to_string())
    }

    /// Reply carrying a non-numeric result such as a digit string
    pub fn text(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            extras: Vec::new(),
            payload: None,
        }
    }

    /// Reply whose result is the character code of a digit, or 0 for none
    pub fn digit(digit: Option<char>) -> Self {
        Self::new(digit.map_or(0, |d| d as i64))
    }

    /// Add a `key=value` field
    pub fn extra(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.extras
            .push((key.to_string(), value.to_string()));
        self
    }

    /// Add the `endpos=` field
    pub fn endpos(self, position: u64) -> Self {
        self.extra("endpos", position)
    }

    /// Set the parenthesized payload
    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn payload_text(&self) -> Option<&str> {
        self.payload
            .as_deref()
    }

    /// Build the reply line including its terminator
    pub fn to_wire_format(&self) -> String {
        let mut line = format!("{} result={}", REPLY_OK, self.result);
        for (key, value) in &self.extras {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        if let Some(payload) = &self.payload {
            line.push_str(" (");
            line.push_str(payload);
            line.push(')');
        }
        line.push_str(LINE_TERMINATOR);
        line
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(
            self.to_wire_format()
                .trim_end(),
        )
    }
}

/// Outcome of one command handler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResult {
    /// Write the reply, keep the session running
    Success(Reply),
    /// Channel gone or unrecoverable channel I/O; the reply, if any, is
    /// sent best effort before the session terminates
    Failure(Option<Reply>),
    /// Argument count or shape invalid; write the usage block
    ShowUsage,
    /// End the session normally, caller enters keep-alive continuation
    KeepAlive,
}

impl HandlerResult {
    /// `Success` with a bare numeric result
    pub fn ok(result: i64) -> Self {
        HandlerResult::Success(Reply::new(result))
    }

    /// `Failure` announcing `result=-1`
    pub fn failed() -> Self {
        HandlerResult::Failure(Some(Reply::new(-1)))
    }
}

/// Usage block sent for [`HandlerResult::ShowUsage`]
pub fn usage_block(usage: &str) -> String {
    let mut block = String::with_capacity(USAGE_HEADER.len() + usage.len() + USAGE_TRAILER.len() + 1);
    block.push_str(USAGE_HEADER);
    block.push_str(usage);
    if !usage.ends_with(LINE_TERMINATOR) {
        block.push_str(LINE_TERMINATOR);
    }
    block.push_str(USAGE_TRAILER);
    block
}
