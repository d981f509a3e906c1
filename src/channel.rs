//! Channel collaborator interface.
//!
//! A [`Channel`] is one live call leg. The GI engine never touches media or
//! signaling itself: handlers validate arguments and call these methods,
//! the session loop pulls [`Frame`]s from [`Channel::read_frame`].

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel operation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel hung up
    #[error("channel hung up")]
    Hangup,

    /// A file, label or peer the operation needs does not exist
    #[error("{what} not found")]
    NotFound { what: String },

    /// The channel technology does not support the operation
    #[error("operation '{operation}' not supported by channel")]
    Unsupported { operation: &'static str },

    /// Media or signaling I/O failure
    #[error("channel I/O error: {message}")]
    Io { message: String },
}

impl ChannelError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

/// One unit of media or signaling read from a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw voice samples
    Voice(Bytes),
    /// A DTMF digit
    Dtmf(char),
    /// Text message
    Text(String),
    /// Signaling/control indication
    Control(u32),
    /// Keepalive/empty frame
    Null,
}

/// Call leg state, numbered as CHANNEL STATUS reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Channel is down and available
    Down,
    /// Channel is down, but reserved
    Reserved,
    /// Channel is off hook
    OffHook,
    /// Digits (or equivalent) have been dialed
    Dialing,
    /// Line is ringing
    Ring,
    /// Remote end is ringing
    Ringing,
    /// Line is up
    Up,
    /// Line is busy
    Busy,
    /// Digits dialed while off hook
    DialingOffhook,
    /// Channel detected an incoming call before ringing
    PreRing,
}

impl ChannelState {
    /// Numeric code returned in `200 result=<code>`
    pub fn code(self) -> i64 {
        match self {
            ChannelState::Down => 0,
            ChannelState::Reserved => 1,
            ChannelState::OffHook => 2,
            ChannelState::Dialing => 3,
            ChannelState::Ring => 4,
            ChannelState::Ringing => 5,
            ChannelState::Up => 6,
            ChannelState::Busy => 7,
            ChannelState::DialingOffhook => 8,
            ChannelState::PreRing => 9,
        }
    }
}

/// Caller identification attached to a channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerId {
    pub number: Option<String>,
    pub name: Option<String>,
    /// Presentation indicator
    pub presentation: i32,
    /// ANI2 information digits
    pub ani2: i32,
    /// Type of number
    pub ton: i32,
    /// Transit network select
    pub tns: i32,
    /// Dialed number identifier
    pub dnid: Option<String>,
    /// Redirecting number
    pub rdnis: Option<String>,
}

/// Snapshot of the channel attributes the preamble reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub language: String,
    /// Channel technology, e.g. `SIP`
    pub tech: String,
    pub unique_id: String,
    pub caller: CallerId,
    pub context: String,
    pub extension: String,
    pub priority: i32,
    pub account_code: Option<String>,
}

/// STREAM FILE / GET OPTION request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playback<'a> {
    pub file: &'a str,
    /// Digits that interrupt playback
    pub escape_digits: &'a str,
    /// Starting sample offset
    pub offset: u64,
}

/// CONTROL STREAM FILE request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPlayback<'a> {
    pub file: &'a str,
    pub escape_digits: &'a str,
    /// Skip distance for fast forward and rewind
    pub skip: Duration,
    pub forward_digit: Option<char>,
    pub rewind_digit: Option<char>,
    pub pause_digit: Option<char>,
}

/// How a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackOutcome {
    /// Escape digit that interrupted playback, if any
    pub digit: Option<char>,
    /// Sample offset where playback stopped
    pub end_position: u64,
}

/// GET DATA result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitsOutcome {
    pub digits: String,
    pub timed_out: bool,
}

/// RECORD FILE request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording<'a> {
    pub file: &'a str,
    pub format: &'a str,
    pub escape_digits: &'a str,
    /// Maximum length, `None` for no limit
    pub max_duration: Option<Duration>,
    /// Sample offset to resume writing at
    pub offset: u64,
    pub beep: bool,
    /// Stop after this much silence
    pub silence: Option<Duration>,
}

/// Why a recording stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordEnd {
    Dtmf(char),
    Timeout,
    Silence,
}

/// How a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    pub end: RecordEnd,
    pub end_position: u64,
}

/// What a SAY verb speaks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SayRequest<'a> {
    Alpha(&'a str),
    Digits(&'a str),
    Number(i64),
    Phonetic(&'a str),
    Date(i64),
    Time(i64),
    DateTime {
        timestamp: i64,
        format: Option<&'a str>,
        zone: Option<&'a str>,
    },
}

/// Telecommunications device for the deaf mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TddMode {
    On,
    Off,
    Mate,
}

/// A live call leg.
///
/// Timeouts passed as `None` mean "no limit" except where a method says
/// the channel default applies.
#[async_trait]
pub trait Channel: Send {
    /// Channel name, unique among live channels
    fn name(&self) -> &str;

    /// Attribute snapshot for the preamble
    fn info(&self) -> ChannelInfo;

    fn state(&self) -> ChannelState;

    /// Wait for the next frame; `None` once the channel is gone.
    ///
    /// Must be cancel safe: the session loop races it against the command
    /// stream and drops the future when a command line wins.
    async fn read_frame(&mut self) -> Option<Frame>;

    async fn answer(&mut self) -> ChannelResult<()>;

    async fn hangup(&mut self) -> ChannelResult<()>;

    /// Play a file, stopping early on an escape digit
    async fn stream_file(&mut self, playback: &Playback<'_>) -> ChannelResult<PlaybackOutcome>;

    /// Play a file with fast forward, rewind and pause digits
    async fn control_stream_file(
        &mut self,
        playback: &ControlPlayback<'_>,
    ) -> ChannelResult<PlaybackOutcome>;

    /// Wait for one DTMF digit, `Ok(None)` on timeout
    async fn wait_for_digit(&mut self, timeout: Option<Duration>) -> ChannelResult<Option<char>>;

    /// Play a prompt and collect up to `max` digits.
    ///
    /// `None` timeout means the channel's default inter-digit timeout.
    async fn read_digits(
        &mut self,
        prompt: &str,
        timeout: Option<Duration>,
        max: usize,
    ) -> ChannelResult<DigitsOutcome>;

    fn supports_text(&self) -> bool;

    fn supports_images(&self) -> bool;

    /// Receive one character of text, `Ok(None)` on timeout
    async fn receive_char(&mut self, timeout: Option<Duration>) -> ChannelResult<Option<char>>;

    /// Receive a text message, `Ok(None)` on timeout
    async fn receive_text(&mut self, timeout: Option<Duration>) -> ChannelResult<Option<String>>;

    async fn send_text(&mut self, text: &str) -> ChannelResult<()>;

    async fn send_image(&mut self, name: &str) -> ChannelResult<()>;

    async fn record_file(&mut self, recording: &Recording<'_>) -> ChannelResult<RecordOutcome>;

    /// Speak something, returning the escape digit pressed if any
    async fn say(
        &mut self,
        request: &SayRequest<'_>,
        escape_digits: &str,
    ) -> ChannelResult<Option<char>>;

    /// Hang up automatically after `after`; `None` cancels
    fn set_autohangup(&mut self, after: Option<Duration>);

    fn set_caller_id(&mut self, number: &str, name: Option<&str>);

    fn set_context(&mut self, context: &str);

    fn set_extension(&mut self, extension: &str);

    fn set_priority(&mut self, priority: i32);

    /// Resolve a priority label in the current context and extension
    fn find_label(&self, label: &str) -> Option<i32>;

    async fn set_music_on_hold(&mut self, on: bool, class: Option<&str>) -> ChannelResult<()>;

    async fn set_tdd_mode(&mut self, mode: TddMode) -> ChannelResult<()>;

    fn get_variable(&self, name: &str) -> Option<String>;

    fn set_variable(&mut self, name: &str, value: &str);

    /// Expand `${...}` expressions against this channel
    fn substitute(&self, expression: &str) -> String;
}
