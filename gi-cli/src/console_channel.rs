//! A call leg backed by the terminal.
//!
//! Operations are printed instead of played. Digits typed on stdin act as
//! DTMF; typing `hangup`, closing stdin or pressing Ctrl-C hangs the call up.

use crate::display::{OpDisplay, OpKind};
use async_trait::async_trait;
use bytes::Bytes;
use pbx_gi_tokio::{
    CallerId, Channel, ChannelError, ChannelInfo, ChannelResult, ChannelState, ControlPlayback,
    DigitsOutcome, Frame, Playback, PlaybackOutcome, RecordEnd, RecordOutcome, Recording,
    SayRequest, TddMode,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::debug;

/// 20ms of 8kHz mu-law silence
const SILENCE_FRAME: &[u8] = &[0xff; 160];
const FRAME_INTERVAL: Duration = Duration::from_millis(20);
/// Inter-digit timeout used when the program leaves it to the channel
const DEFAULT_DIGIT_TIMEOUT: Duration = Duration::from_secs(5);
/// Pretend every played file runs this many samples
const PLAYBACK_SAMPLES: u64 = 8000;

pub struct ConsoleChannel {
    name: String,
    state: ChannelState,
    caller: CallerId,
    context: String,
    extension: String,
    priority: i32,
    variables: HashMap<String, String>,
    autohangup: Option<Duration>,
    digits: mpsc::UnboundedReceiver<char>,
    hangup: watch::Receiver<bool>,
    silence: Option<Interval>,
    display: OpDisplay,
}

impl ConsoleChannel {
    /// Create the channel and start reading stdin.
    ///
    /// With `audio` set, `read_frame` yields a silence frame every 20ms so
    /// the program's audio side channel sees a steady stream.
    pub fn new(name: &str, audio: bool, no_color: bool) -> Self {
        let (digit_tx, digits) = mpsc::unbounded_channel();
        let (hangup_tx, hangup) = watch::channel(false);
        tokio::spawn(read_stdin(digit_tx, hangup_tx));

        let silence = audio.then(|| {
            let mut ticks = interval(FRAME_INTERVAL);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticks
        });

        Self {
            name: name.to_string(),
            state: ChannelState::Ring,
            caller: CallerId {
                number: Some("1000".to_string()),
                name: Some("Console".to_string()),
                ..Default::default()
            },
            context: "default".to_string(),
            extension: "s".to_string(),
            priority: 1,
            variables: HashMap::new(),
            autohangup: None,
            digits,
            hangup,
            silence,
            display: OpDisplay::new(name, no_color),
        }
    }

    pub fn with_context(mut self, context: &str, extension: &str) -> Self {
        self.context = context.to_string();
        self.extension = extension.to_string();
        self
    }

    fn is_hung_up(&self) -> bool {
        *self
            .hangup
            .borrow()
    }

    fn check_up(&self) -> ChannelResult<()> {
        if self.is_hung_up() {
            Err(ChannelError::Hangup)
        } else {
            Ok(())
        }
    }

    /// Next typed digit, `Ok(None)` on timeout
    async fn next_digit(&mut self, timeout: Option<Duration>) -> ChannelResult<Option<char>> {
        self.check_up()?;
        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.digits.recv()).await {
                Ok(digit) => digit,
                Err(_) => return Ok(None),
            },
            None => {
                self.digits
                    .recv()
                    .await
            }
        };
        match received {
            Some(digit) => Ok(Some(digit)),
            None => Err(ChannelError::Hangup),
        }
    }

    /// A digit already typed that is one of `escape_digits`
    fn pending_escape(&mut self, escape_digits: &str) -> Option<char> {
        while let Ok(digit) = self
            .digits
            .try_recv()
        {
            if escape_digits.contains(digit) {
                return Some(digit);
            }
            debug!("Ignoring digit '{}' during playback", digit);
        }
        None
    }
}

/// Forward DTMF digits from stdin until EOF or `hangup`
async fn read_stdin(digits: mpsc::UnboundedSender<char>, hangup: watch::Sender<bool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines
            .next_line()
            .await
        {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.eq_ignore_ascii_case("hangup") {
                    break;
                }
                for digit in line
                    .chars()
                    .filter(is_dtmf)
                {
                    if digits
                        .send(digit)
                        .is_err()
                    {
                        return;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("stdin read failed: {}", e);
                break;
            }
        }
    }
    let _ = hangup.send(true);
}

fn is_dtmf(c: &char) -> bool {
    matches!(c, '0'..='9' | '*' | '#' | 'A'..='D')
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> ChannelInfo {
        ChannelInfo {
            name: self
                .name
                .clone(),
            language: "en".to_string(),
            tech: self
                .name
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string(),
            unique_id: format!("console-{}", std::process::id()),
            caller: self
                .caller
                .clone(),
            context: self
                .context
                .clone(),
            extension: self
                .extension
                .clone(),
            priority: self.priority,
            account_code: None,
        }
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    async fn read_frame(&mut self) -> Option<Frame> {
        if self.is_hung_up() {
            return None;
        }
        let ticks = self
            .silence
            .as_mut();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                self.display.show(OpKind::Call, "Ctrl-C, hanging up");
                None
            }
            _ = self.hangup.changed() => None,
            _ = async {
                match ticks {
                    Some(ticks) => ticks.tick().await,
                    None => std::future::pending().await,
                }
            } => Some(Frame::Voice(Bytes::from_static(SILENCE_FRAME))),
        }
    }

    async fn answer(&mut self) -> ChannelResult<()> {
        self.check_up()?;
        self.state = ChannelState::Up;
        self.display.show(OpKind::Call, "answered");
        Ok(())
    }

    async fn hangup(&mut self) -> ChannelResult<()> {
        self.state = ChannelState::Down;
        self.display.show(OpKind::Call, "hung up by program");
        Ok(())
    }

    async fn stream_file(&mut self, playback: &Playback<'_>) -> ChannelResult<PlaybackOutcome> {
        self.check_up()?;
        self.display.show(
            OpKind::Media,
            &format!(
                "play {} (escape '{}', offset {})",
                playback.file, playback.escape_digits, playback.offset
            ),
        );
        Ok(PlaybackOutcome {
            digit: self.pending_escape(playback.escape_digits),
            end_position: playback.offset + PLAYBACK_SAMPLES,
        })
    }

    async fn control_stream_file(
        &mut self,
        playback: &ControlPlayback<'_>,
    ) -> ChannelResult<PlaybackOutcome> {
        self.check_up()?;
        self.display.show(
            OpKind::Media,
            &format!(
                "play {} (escape '{}', skip {}ms)",
                playback.file,
                playback.escape_digits,
                playback
                    .skip
                    .as_millis()
            ),
        );
        Ok(PlaybackOutcome {
            digit: self.pending_escape(playback.escape_digits),
            end_position: PLAYBACK_SAMPLES,
        })
    }

    async fn wait_for_digit(&mut self, timeout: Option<Duration>) -> ChannelResult<Option<char>> {
        self.display.show(OpKind::Prompt, "waiting for a digit");
        self.next_digit(timeout)
            .await
    }

    async fn read_digits(
        &mut self,
        prompt: &str,
        timeout: Option<Duration>,
        max: usize,
    ) -> ChannelResult<DigitsOutcome> {
        self.check_up()?;
        self.display.show(
            OpKind::Prompt,
            &format!("play {} and collect up to {} digits", prompt, max),
        );
        let timeout = timeout.unwrap_or(DEFAULT_DIGIT_TIMEOUT);
        let mut digits = String::new();
        while digits.len() < max {
            match self
                .next_digit(Some(timeout))
                .await?
            {
                Some('#') => break,
                Some(digit) => digits.push(digit),
                None => {
                    return Ok(DigitsOutcome {
                        digits,
                        timed_out: true,
                    })
                }
            }
        }
        Ok(DigitsOutcome {
            digits,
            timed_out: false,
        })
    }

    fn supports_text(&self) -> bool {
        true
    }

    fn supports_images(&self) -> bool {
        false
    }

    async fn receive_char(&mut self, timeout: Option<Duration>) -> ChannelResult<Option<char>> {
        self.display.show(OpKind::Prompt, "waiting for a character");
        self.next_digit(timeout)
            .await
    }

    async fn receive_text(&mut self, timeout: Option<Duration>) -> ChannelResult<Option<String>> {
        self.display.show(OpKind::Prompt, "waiting for text");
        Ok(self
            .next_digit(timeout)
            .await?
            .map(String::from))
    }

    async fn send_text(&mut self, text: &str) -> ChannelResult<()> {
        self.check_up()?;
        self.display.show(OpKind::Media, &format!("text: {}", text));
        Ok(())
    }

    async fn send_image(&mut self, _name: &str) -> ChannelResult<()> {
        Err(ChannelError::Unsupported {
            operation: "send_image",
        })
    }

    async fn record_file(&mut self, recording: &Recording<'_>) -> ChannelResult<RecordOutcome> {
        self.check_up()?;
        self.display.show(
            OpKind::Media,
            &format!(
                "record {}.{}{} (escape '{}')",
                recording.file,
                recording.format,
                if recording.beep { " after beep" } else { "" },
                recording.escape_digits
            ),
        );
        let end = match self
            .next_digit(recording.max_duration)
            .await?
        {
            Some(digit) if recording
                .escape_digits
                .contains(digit) =>
            {
                RecordEnd::Dtmf(digit)
            }
            _ => RecordEnd::Timeout,
        };
        Ok(RecordOutcome {
            end,
            end_position: recording.offset + PLAYBACK_SAMPLES,
        })
    }

    async fn say(
        &mut self,
        request: &SayRequest<'_>,
        escape_digits: &str,
    ) -> ChannelResult<Option<char>> {
        self.check_up()?;
        self.display.show(OpKind::Media, &format!("say {:?}", request));
        Ok(self.pending_escape(escape_digits))
    }

    fn set_autohangup(&mut self, after: Option<Duration>) {
        self.autohangup = after;
        let message = match after {
            Some(after) => format!("autohangup in {:.1}s", after.as_secs_f64()),
            None => "autohangup cancelled".to_string(),
        };
        self.display.show(OpKind::Call, &message);
    }

    fn set_caller_id(&mut self, number: &str, name: Option<&str>) {
        self.caller.number = Some(number.to_string());
        self.caller.name = name.map(str::to_string);
        self.display.show(
            OpKind::Dialplan,
            &format!("caller id {} <{}>", name.unwrap_or(""), number),
        );
    }

    fn set_context(&mut self, context: &str) {
        self.context = context.to_string();
        self.display.show(OpKind::Dialplan, &format!("context {}", context));
    }

    fn set_extension(&mut self, extension: &str) {
        self.extension = extension.to_string();
        self.display.show(OpKind::Dialplan, &format!("extension {}", extension));
    }

    fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
        self.display.show(OpKind::Dialplan, &format!("priority {}", priority));
    }

    fn find_label(&self, _label: &str) -> Option<i32> {
        None
    }

    async fn set_music_on_hold(&mut self, on: bool, class: Option<&str>) -> ChannelResult<()> {
        self.check_up()?;
        let message = if on {
            format!("music on hold ({})", class.unwrap_or("default"))
        } else {
            "music on hold stopped".to_string()
        };
        self.display.show(OpKind::Media, &message);
        Ok(())
    }

    async fn set_tdd_mode(&mut self, _mode: TddMode) -> ChannelResult<()> {
        Err(ChannelError::Unsupported {
            operation: "set_tdd_mode",
        })
    }

    fn get_variable(&self, name: &str) -> Option<String> {
        self.variables
            .get(name)
            .cloned()
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        self.variables
            .insert(name.to_string(), value.to_string());
        self.display.show(OpKind::Dialplan, &format!("{}={}", name, value));
    }

    fn substitute(&self, expression: &str) -> String {
        let mut out = String::new();
        let mut rest = expression;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    if let Some(value) = self.get_variable(&after[..end]) {
                        out.push_str(&value);
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}
