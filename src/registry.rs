//! Verb dispatch registry.
//!
//! Descriptors are kept in registration order behind an `RwLock` holding an
//! immutable snapshot (`Arc<Vec<..>>`). Mutations build a new vector and
//! swap it in under the write lock; lookups clone the snapshot under a
//! short read lock and scan it without holding any lock, so a lookup never
//! observes a half-written descriptor.

use crate::{
    constants::MAX_VERB_WORDS,
    error::{GiError, GiResult},
    handlers::{builtin_descriptors, CommandHandler},
};
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// How input words are matched against descriptor words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Descriptor words are a prefix of the input, the rest are arguments
    Loose,
    /// Input has exactly the descriptor's words
    Exact,
}

/// One registered verb
pub struct CommandDescriptor {
    words: Vec<String>,
    handler: Arc<dyn CommandHandler>,
    summary: String,
    usage: String,
    min_args: usize,
    max_args: Option<usize>,
}

impl CommandDescriptor {
    /// Create a descriptor accepting any number of arguments
    pub fn new(words: &[&str], handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            words: words
                .iter()
                .map(|w| w.to_ascii_uppercase())
                .collect(),
            handler,
            summary: String::new(),
            usage: String::new(),
            min_args: 0,
            max_args: None,
        }
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// Argument count bounds (after the verb words); `max` of `None` is unbounded
    pub fn args(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_args = min;
        self.max_args = max;
        self
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Verb words joined by spaces
    pub fn name(&self) -> String {
        self.words
            .join(" ")
    }

    pub fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }

    pub fn summary_text(&self) -> &str {
        &self.summary
    }

    pub fn usage_text(&self) -> &str {
        &self.usage
    }

    pub fn min_args(&self) -> usize {
        self.min_args
    }

    pub fn max_args(&self) -> Option<usize> {
        self.max_args
    }

    /// `true` if `count` arguments satisfy the bounds
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args
            && self
                .max_args
                .map_or(true, |max| count <= max)
    }

    fn matches<S: AsRef<str>>(&self, input: &[S], mode: MatchMode) -> bool {
        let k = self
            .words
            .len();
        let length_ok = match mode {
            MatchMode::Loose => input.len() >= k,
            MatchMode::Exact => input.len() == k,
        };
        length_ok
            && self
                .words
                .iter()
                .zip(input)
                .all(|(word, given)| word.eq_ignore_ascii_case(given.as_ref()))
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("words", &self.words)
            .field("summary", &self.summary)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish_non_exhaustive()
    }
}

type Snapshot = Arc<Vec<Arc<CommandDescriptor>>>;

/// Ordered set of command descriptors; first prefix match wins
#[derive(Debug, Default)]
pub struct Registry {
    commands: RwLock<Snapshot>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in verb catalogue
    pub fn with_builtins() -> Self {
        let commands = builtin_descriptors()
            .into_iter()
            .map(Arc::new)
            .collect::<Vec<_>>();
        debug!("Registry seeded with {} built-in commands", commands.len());
        Self {
            commands: RwLock::new(Arc::new(commands)),
        }
    }

    /// Process-wide registry, seeded with the built-ins on first use
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::with_builtins)
    }

    fn snapshot(&self) -> Snapshot {
        self.commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Add a command.
    ///
    /// Rejected if any registered command shares the new one's first word,
    /// even when the remaining words differ. This is coarser than a true
    /// collision check: `GET FOO` is refused because `GET DATA` exists.
    pub fn register(&self, descriptor: CommandDescriptor) -> GiResult<()> {
        let count = descriptor
            .words
            .len();
        if count == 0 || count > MAX_VERB_WORDS {
            return Err(GiError::InvalidDescriptor { count });
        }

        let mut guard = self
            .commands
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let first = &descriptor.words[0];
        if guard
            .iter()
            .any(|existing| existing.words[0].eq_ignore_ascii_case(first))
        {
            warn!(
                "Command '{}' already registered (first word '{}' in use)",
                descriptor.name(),
                first
            );
            return Err(GiError::DuplicateCommand {
                words: descriptor.name(),
            });
        }

        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(
            guard
                .iter()
                .cloned(),
        );
        info!("Registered GI command '{}'", descriptor.name());
        next.push(Arc::new(descriptor));
        *guard = Arc::new(next);
        Ok(())
    }

    /// Remove the command with exactly these words. Returns `false` if absent.
    pub fn unregister(&self, words: &[&str]) -> bool {
        let mut guard = self
            .commands
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = guard
            .iter()
            .position(|d| d.matches(words, MatchMode::Exact))
        else {
            return false;
        };

        let mut next = guard
            .as_ref()
            .clone();
        let removed = next.remove(pos);
        *guard = Arc::new(next);
        info!("Unregistered GI command '{}'", removed.name());
        true
    }

    /// Find the first descriptor matching `words` in `mode`
    pub fn find<S: AsRef<str>>(
        &self,
        words: &[S],
        mode: MatchMode,
    ) -> Option<Arc<CommandDescriptor>> {
        self.snapshot()
            .iter()
            .find(|d| d.matches(words, mode))
            .cloned()
    }

    /// Usage text of the command named exactly by `words`
    pub fn usage<S: AsRef<str>>(&self, words: &[S]) -> Option<String> {
        self.find(words, MatchMode::Exact)
            .map(|d| d.usage.clone())
    }

    /// All commands in registration order
    pub fn commands(&self) -> Vec<Arc<CommandDescriptor>> {
        self.snapshot()
            .as_ref()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot()
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
