//! Console rendering of channel operations for gi_run

use colored::*;

/// What kind of operation is being shown, used to pick a color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Answer, hangup, state changes
    Call,
    /// Playback, recording, speech
    Media,
    /// Variables, dialplan position, caller id
    Dialplan,
    /// Input the program is waiting for
    Prompt,
    Error,
}

/// Prints channel operations to stdout, colored unless disabled
#[derive(Debug, Clone)]
pub struct OpDisplay {
    channel: String,
    no_color: bool,
}

impl OpDisplay {
    pub fn new(channel: impl Into<String>, no_color: bool) -> Self {
        Self {
            channel: channel.into(),
            no_color,
        }
    }

    pub fn show(&self, kind: OpKind, message: &str) {
        if self.no_color {
            println!("[{}] {}", self.channel, message);
        } else {
            println!(
                "{} {}",
                format!("[{}]", self.channel).dimmed(),
                Self::colorize(message, kind)
            );
        }
    }

    fn colorize(message: &str, kind: OpKind) -> ColoredString {
        match kind {
            OpKind::Call => message.green().bold(),
            OpKind::Media => message.cyan(),
            OpKind::Dialplan => message.normal(),
            OpKind::Prompt => message.yellow(),
            OpKind::Error => message.red().bold(),
        }
    }
}
