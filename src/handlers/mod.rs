//! Command handlers for the built-in verb catalogue.
//!
//! Handlers validate argument shape and frame replies; every channel
//! effect goes through the [`Channel`] and [`Services`] collaborators.
//! Argument counts are checked against the descriptor bounds before a
//! handler runs, so handlers index their `args` within those bounds.

mod channel;
mod database;
mod dialplan;
mod media;

use crate::{
    channel::{Channel, ChannelError},
    registry::CommandDescriptor,
    reply::{HandlerResult, Reply},
    services::Services,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Per-session facts handlers may consult
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// Wire logging raised to info
    pub debug: bool,
    /// An audio side channel exists
    pub has_audio: bool,
    /// Local program process id, `None` for network gateways
    pub process_id: Option<u32>,
}

/// Everything a handler may touch while running one command
pub struct CommandContext<'a> {
    pub channel: &'a mut dyn Channel,
    pub services: &'a Services,
    pub session: &'a SessionInfo,
}

/// A verb implementation
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the verb with the words following the verb words
    async fn handle(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult;
}

/// Built-in verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Answer,
    ChannelStatus,
    ControlStreamFile,
    DatabaseDel,
    DatabaseDeltree,
    DatabaseGet,
    DatabasePut,
    Exec,
    GetData,
    GetFullVariable,
    GetOption,
    GetVariable,
    Hangup,
    Noop,
    ReceiveChar,
    ReceiveText,
    RecordFile,
    SayAlpha,
    SayDate,
    SayDatetime,
    SayDigits,
    SayNumber,
    SayPhonetic,
    SayTime,
    SendImage,
    SendText,
    SetAutohangup,
    SetCallerid,
    SetContext,
    SetExtension,
    SetMusic,
    SetPriority,
    SetVariable,
    StreamFile,
    TddMode,
    Verbose,
}

#[async_trait]
impl CommandHandler for Builtin {
    async fn handle(&self, ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
        match self {
            Builtin::Answer => channel::answer(ctx).await,
            Builtin::ChannelStatus => channel::channel_status(ctx, args).await,
            Builtin::ControlStreamFile => media::control_stream_file(ctx, args).await,
            Builtin::DatabaseDel => database::del(ctx, args),
            Builtin::DatabaseDeltree => database::deltree(ctx, args),
            Builtin::DatabaseGet => database::get(ctx, args),
            Builtin::DatabasePut => database::put(ctx, args),
            Builtin::Exec => dialplan::exec(ctx, args).await,
            Builtin::GetData => media::get_data(ctx, args).await,
            Builtin::GetFullVariable => dialplan::get_full_variable(ctx, args).await,
            Builtin::GetOption => media::get_option(ctx, args).await,
            Builtin::GetVariable => dialplan::get_variable(ctx, args),
            Builtin::Hangup => channel::hangup(ctx, args).await,
            Builtin::Noop => HandlerResult::ok(0),
            Builtin::ReceiveChar => channel::receive_char(ctx, args).await,
            Builtin::ReceiveText => channel::receive_text(ctx, args).await,
            Builtin::RecordFile => media::record_file(ctx, args).await,
            Builtin::SayAlpha => media::say_alpha(ctx, args).await,
            Builtin::SayDate => media::say_date(ctx, args).await,
            Builtin::SayDatetime => media::say_datetime(ctx, args).await,
            Builtin::SayDigits => media::say_digits(ctx, args).await,
            Builtin::SayNumber => media::say_number(ctx, args).await,
            Builtin::SayPhonetic => media::say_phonetic(ctx, args).await,
            Builtin::SayTime => media::say_time(ctx, args).await,
            Builtin::SendImage => channel::send_image(ctx, args).await,
            Builtin::SendText => channel::send_text(ctx, args).await,
            Builtin::SetAutohangup => channel::set_autohangup(ctx, args),
            Builtin::SetCallerid => channel::set_callerid(ctx, args),
            Builtin::SetContext => dialplan::set_context(ctx, args),
            Builtin::SetExtension => dialplan::set_extension(ctx, args),
            Builtin::SetMusic => channel::set_music(ctx, args).await,
            Builtin::SetPriority => dialplan::set_priority(ctx, args),
            Builtin::SetVariable => dialplan::set_variable(ctx, args),
            Builtin::StreamFile => media::stream_file(ctx, args).await,
            Builtin::TddMode => channel::tdd_mode(ctx, args).await,
            Builtin::Verbose => channel::verbose(ctx, args),
        }
    }
}

fn builtin(
    words: &[&str],
    verb: Builtin,
    min: usize,
    max: Option<usize>,
    summary: &str,
    usage: &str,
) -> CommandDescriptor {
    CommandDescriptor::new(words, Arc::new(verb))
        .args(min, max)
        .summary(summary)
        .usage(usage)
}

/// The built-in verb catalogue in dispatch order
#[rustfmt::skip]
pub(crate) fn builtin_descriptors() -> Vec<CommandDescriptor> {
    use Builtin::*;

    vec![
        builtin(&["answer"], Answer, 0, Some(0), "Answer channel",
            " Usage: ANSWER\n\tAnswers the channel unless it is already up.\n Returns 0 on success, -1 on channel failure.\n"),
        builtin(&["channel", "status"], ChannelStatus, 0, Some(1), "Report channel state",
            " Usage: CHANNEL STATUS [<channelname>]\n\tReturns the state of the named channel, or of this channel.\n  0 down, 1 reserved, 2 off hook, 3 dialing, 4 ringing,\n  5 remote ringing, 6 up, 7 busy, 8 dialing off hook, 9 pre-ring,\n -1 no such channel.\n"),
        builtin(&["database", "del"], DatabaseDel, 2, Some(2), "Delete a database key",
            " Usage: DATABASE DEL <family> <key>\n\tRemoves <key> from <family>. Returns 1 if it existed, 0 otherwise.\n"),
        builtin(&["database", "deltree"], DatabaseDeltree, 1, Some(2), "Delete a database family or key tree",
            " Usage: DATABASE DELTREE <family> [keytree]\n\tRemoves every key of <family>, or only those under <keytree>.\n Returns 1 if anything was removed, 0 otherwise.\n"),
        builtin(&["database", "get"], DatabaseGet, 2, Some(2), "Read a database value",
            " Usage: DATABASE GET <family> <key>\n\tReturns 1 and the value in parentheses, or 0 if <key> is not set.\n Example: 200 result=1 (on)\n"),
        builtin(&["database", "put"], DatabasePut, 3, Some(3), "Write a database value",
            " Usage: DATABASE PUT <family> <key> <value>\n\tStores <value>. Returns 1 on success, 0 otherwise.\n"),
        builtin(&["exec"], Exec, 1, Some(2), "Run a dialplan application",
            " Usage: EXEC <application> [options]\n\tRuns <application> on this channel with [options].\n Returns the application's result, or -2 if it does not exist.\n"),
        builtin(&["get", "data"], GetData, 1, Some(3), "Play a prompt and collect digits",
            " Usage: GET DATA <file> [timeout] [max digits]\n\tPlays <file> and collects DTMF digits. Timeout is in milliseconds.\n Returns the digits, with (timeout) appended if input timed out.\n"),
        builtin(&["get", "full", "variable"], GetFullVariable, 1, Some(2), "Evaluate a channel expression",
            " Usage: GET FULL VARIABLE <expression> [<channelname>]\n\tExpands <expression> against this or the named channel.\n Returns 1 and the expansion in parentheses, or 0 if the channel is unknown.\n"),
        builtin(&["get", "option"], GetOption, 2, Some(3), "Play a file and wait for a digit",
            " Usage: GET OPTION <file> <escape digits> [timeout]\n\tLike STREAM FILE, then waits up to [timeout] milliseconds for a digit.\n"),
        builtin(&["get", "variable"], GetVariable, 1, Some(1), "Read a channel variable",
            " Usage: GET VARIABLE <name>\n\tReturns 1 and the value in parentheses, or 0 if <name> is not set.\n"),
        builtin(&["hangup"], Hangup, 0, Some(1), "Hang up a channel",
            " Usage: HANGUP [<channelname>]\n\tHangs up the named channel, or this channel.\n Returns 1 on success, -1 if no such channel exists.\n"),
        builtin(&["noop"], Noop, 0, Some(0), "Do nothing",
            " Usage: NOOP\n\tReturns 0.\n"),
        builtin(&["receive", "char"], ReceiveChar, 1, Some(1), "Receive one text character",
            " Usage: RECEIVE CHAR <timeout>\n\tWaits up to <timeout> milliseconds (0 for ever) for a character.\n Returns its code, 0 on timeout or when the channel has no text\n support, -1 on hangup.\n"),
        builtin(&["receive", "text"], ReceiveText, 1, Some(1), "Receive a text message",
            " Usage: RECEIVE TEXT <timeout>\n\tWaits up to <timeout> milliseconds (0 for ever) for a message.\n Returns 1 and the text in parentheses, or -1 if nothing arrived.\n"),
        builtin(&["record", "file"], RecordFile, 4, None, "Record to a file",
            " Usage: RECORD FILE <file> <format> <escape digits> <timeout> [offset] [BEEP] [s=<silence>]\n\tRecords until an escape digit, <timeout> milliseconds (-1 for none)\n or <silence> seconds of silence. [offset] resumes at that sample.\n Returns the digit code, 0 on timeout, -1 on hangup, with endpos.\n"),
        builtin(&["say", "alpha"], SayAlpha, 2, Some(2), "Spell out a string",
            " Usage: SAY ALPHA <text> <escape digits>\n\tReturns 0, the escape digit's code, or -1 on hangup.\n"),
        builtin(&["say", "date"], SayDate, 2, Some(2), "Say a date",
            " Usage: SAY DATE <epoch seconds> <escape digits>\n\tReturns 0, the escape digit's code, or -1 on hangup.\n"),
        builtin(&["say", "datetime"], SayDatetime, 2, Some(4), "Say a date and time in a format",
            " Usage: SAY DATETIME <epoch seconds> <escape digits> [format] [timezone]\n\tReturns 0, the escape digit's code, or -1 on hangup.\n"),
        builtin(&["say", "digits"], SayDigits, 2, Some(2), "Say a digit string",
            " Usage: SAY DIGITS <digits> <escape digits>\n\tReturns 0, the escape digit's code, or -1 on hangup.\n"),
        builtin(&["say", "number"], SayNumber, 2, Some(2), "Say a number",
            " Usage: SAY NUMBER <number> <escape digits>\n\tReturns 0, the escape digit's code, or -1 on hangup.\n"),
        builtin(&["say", "phonetic"], SayPhonetic, 2, Some(2), "Spell out a string phonetically",
            " Usage: SAY PHONETIC <text> <escape digits>\n\tReturns 0, the escape digit's code, or -1 on hangup.\n"),
        builtin(&["say", "time"], SayTime, 2, Some(2), "Say a time",
            " Usage: SAY TIME <epoch seconds> <escape digits>\n\tReturns 0, the escape digit's code, or -1 on hangup.\n"),
        builtin(&["send", "image"], SendImage, 1, Some(1), "Send an image",
            " Usage: SEND IMAGE <name>\n\tReturns 0, also when the channel cannot carry images; -1 on hangup.\n"),
        builtin(&["send", "text"], SendText, 1, Some(1), "Send a text message",
            " Usage: SEND TEXT \"<text>\"\n\tQuote text with spaces. Returns 0, also when the channel cannot\n carry text; -1 on hangup.\n"),
        builtin(&["set", "autohangup"], SetAutohangup, 1, Some(1), "Hang up after a delay",
            " Usage: SET AUTOHANGUP <seconds>\n\tHangs the channel up <seconds> from now; 0 cancels.\n"),
        builtin(&["set", "callerid"], SetCallerid, 1, Some(1), "Set caller id",
            " Usage: SET CALLERID <number>\n\tAccepts \"Name <number>\" as well. Returns 1.\n"),
        builtin(&["set", "context"], SetContext, 1, Some(1), "Set dialplan context",
            " Usage: SET CONTEXT <context>\n\tContext to continue in after the session.\n"),
        builtin(&["set", "extension"], SetExtension, 1, Some(1), "Set dialplan extension",
            " Usage: SET EXTENSION <extension>\n\tExtension to continue at after the session.\n"),
        builtin(&["set", "music"], SetMusic, 1, Some(2), "Start or stop music on hold",
            " Usage: SET MUSIC <on|off> [class]\n\tReturns 0.\n"),
        builtin(&["set", "priority"], SetPriority, 1, Some(1), "Set dialplan priority",
            " Usage: SET PRIORITY <priority|label>\n\tPriority to continue at after the session.\n Returns -1 if the label does not exist.\n"),
        builtin(&["set", "variable"], SetVariable, 2, Some(2), "Set a channel variable",
            " Usage: SET VARIABLE <name> <value>\n\tReturns 1.\n"),
        builtin(&["stream", "file"], StreamFile, 2, Some(3), "Play a file",
            " Usage: STREAM FILE <file> <escape digits> [offset]\n\tPlays <file> (no extension) from sample [offset]. Use \"\" for no\n escape digits. Returns 0, the escape digit's code, or -1, with endpos.\n"),
        builtin(&["control", "stream", "file"], ControlStreamFile, 2, Some(6), "Play a file with listener controls",
            " Usage: CONTROL STREAM FILE <file> <escape digits> [skipms] [ffchar] [rewchar] [pausechar]\n\tLike STREAM FILE with fast forward (default #), rewind (default *)\n and pause digits. [skipms] defaults to 3000.\n"),
        builtin(&["tdd", "mode"], TddMode, 1, Some(1), "Switch TDD mode",
            " Usage: TDD MODE <on|off|mate>\n\tReturns 1, or 0 if the channel is not TDD capable.\n"),
        builtin(&["verbose"], Verbose, 1, Some(2), "Write to the verbose log",
            " Usage: VERBOSE <message> [level]\n\t[level] is 1 to 4. Returns 1.\n"),
    ]
}

/// Parse a millisecond timeout; zero or negative means "no limit"
pub(crate) fn parse_timeout_ms(text: &str) -> Option<Option<Duration>> {
    let ms: i64 = text
        .trim()
        .parse()
        .ok()?;
    if ms <= 0 {
        Some(None)
    } else {
        Some(Some(Duration::from_millis(ms as u64)))
    }
}

/// Reply for a channel operation that failed.
///
/// Hangup and I/O failures end the session with `result=-1`.
pub(crate) fn channel_failure(err: &ChannelError) -> HandlerResult {
    tracing::debug!("Channel operation failed: {}", err);
    HandlerResult::failed()
}

/// `Success` with the pressed digit's code, or 0
pub(crate) fn digit_reply(digit: Option<char>) -> HandlerResult {
    HandlerResult::Success(Reply::digit(digit))
}
