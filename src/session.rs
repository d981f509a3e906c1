//! The per-call GI session loop.
//!
//! A session races two sources, channel frames and command lines, and
//! services whichever is ready first. Commands run one at a time to
//! completion; voice frames are relayed to the audio side channel when one
//! exists. Teardown closes the transport exactly once on every exit path.

use crate::{
    channel::{Channel, Frame},
    config::GiConfig,
    constants::*,
    error::{GiError, GiResult},
    handlers::{CommandContext, SessionInfo},
    parser::parse_command,
    preamble::Preamble,
    registry::{MatchMode, Registry},
    reply::{usage_block, HandlerResult, Reply},
    services::Services,
    transport::{GiRequest, Transport},
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, trace, warn};

static DEBUG: AtomicBool = AtomicBool::new(false);

/// Turn protocol tracing on or off for every session in the process
pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::Relaxed);
    info!("GI debugging {}", if enabled { "enabled" } else { "disabled" });
}

pub fn debug_enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Program finished or closed its stream
    Success,
    /// A command failed on the channel or the command stream broke
    Failure,
    /// The channel went away while the loop was waiting
    Hangup,
    /// EXEC asked for keep-alive continuation of the call leg
    KeepAlive,
}

impl SessionStatus {
    /// Status handed back to the dialplan; negative means failure or hangup
    pub fn code(self) -> i32 {
        match self {
            SessionStatus::Success => 0,
            SessionStatus::Failure | SessionStatus::Hangup => -1,
            SessionStatus::KeepAlive => KEEPALIVE_STATUS,
        }
    }

    pub fn is_failure(self) -> bool {
        self.code() < 0
    }

    /// Value stored in the `GISTATUS` channel variable
    pub fn variable_value(self) -> &'static str {
        match self {
            SessionStatus::Success | SessionStatus::KeepAlive => "SUCCESS",
            SessionStatus::Failure => "FAILURE",
            SessionStatus::Hangup => "HANGUP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Running,
    Terminating,
    Closed,
}

enum Event {
    Frame(Option<Frame>),
    Line(GiResult<Option<String>>),
}

/// One GI conversation bound to one channel
pub struct GiSession<'a> {
    channel: &'a mut dyn Channel,
    transport: Transport,
    services: &'a Services,
    registry: &'a Registry,
    request: GiRequest,
    info: SessionInfo,
    state: SessionState,
}

impl<'a> GiSession<'a> {
    pub fn new(
        channel: &'a mut dyn Channel,
        transport: Transport,
        request: &GiRequest,
        services: &'a Services,
        registry: &'a Registry,
    ) -> Self {
        let info = SessionInfo {
            debug: false,
            has_audio: transport.has_audio(),
            process_id: transport.process_id(),
        };
        Self {
            channel,
            transport,
            services,
            registry,
            request: request.clone(),
            info,
            state: SessionState::Init,
        }
    }

    /// Log protocol traffic at info level for this session only
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.info.debug = debug;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        trace!(
            "[SESSION] {} {:?} -> {:?}",
            self.channel
                .name(),
            self.state,
            next
        );
        self.state = next;
    }

    fn log_wire(&self, direction: &str, text: &str) {
        if self
            .info
            .debug
            || debug_enabled()
        {
            info!(target: "pbx_gi::wire", "{} {} {}", self.channel.name(), direction, text);
        } else {
            trace!(target: "pbx_gi::wire", "{} {} {}", self.channel.name(), direction, text);
        }
    }

    /// Write to the client; failures are logged and the session goes on
    /// until the command stream reports EOF.
    async fn send(&mut self, text: &str) {
        self.log_wire(
            "->",
            text.trim_end(),
        );
        if let Err(e) = self
            .transport
            .write_str(text)
            .await
        {
            warn!(
                "[SESSION] {} reply write failed: {}",
                self.channel
                    .name(),
                e
            );
        }
    }

    /// Send the preamble block; moves the session from Init to Running
    pub async fn send_preamble(&mut self) {
        if self.state != SessionState::Init {
            return;
        }
        let preamble = Preamble::new(
            &self
                .request
                .program,
            &self
                .channel
                .info(),
            self.info
                .has_audio,
            &self
                .request
                .args,
        );
        self.send(&preamble.to_wire_format())
            .await;
        self.transition(SessionState::Running);
    }

    /// Relay a voice frame with one best-effort write; other frames are dropped
    fn relay(&mut self, frame: Frame) {
        let Frame::Voice(data) = frame else {
            return;
        };
        let Some(audio) = self
            .transport
            .audio
            .as_mut()
        else {
            return;
        };
        match audio.offer(&data) {
            Ok(written) if written < data.len() => {
                trace!("[SESSION] Short audio write {}/{}", written, data.len())
            }
            Ok(_) => {}
            Err(e) => trace!("[SESSION] Audio write failed: {}", e),
        }
    }

    /// Run one command line; `Some` ends the session with that status
    async fn dispatch(&mut self, line: &str) -> Option<SessionStatus> {
        self.log_wire("<-", line);
        let words = parse_command(line);

        let Some(descriptor) = self
            .registry
            .find(&words, MatchMode::Loose)
        else {
            debug!("[SESSION] Unknown command: {}", line);
            self.send(REPLY_UNKNOWN_COMMAND)
                .await;
            return None;
        };

        let args = &words[descriptor
            .words()
            .len()..];
        let result = if descriptor.accepts(args.len()) {
            let mut ctx = CommandContext {
                channel: &mut *self.channel,
                services: self.services,
                session: &self.info,
            };
            descriptor
                .handler()
                .handle(&mut ctx, args)
                .await
        } else {
            HandlerResult::ShowUsage
        };

        match result {
            HandlerResult::Success(reply) => {
                self.send(&reply.to_wire_format())
                    .await;
                None
            }
            HandlerResult::ShowUsage => {
                self.send(&usage_block(descriptor.usage_text()))
                    .await;
                None
            }
            HandlerResult::Failure(reply) => {
                if let Some(reply) = reply {
                    self.send(&reply.to_wire_format())
                        .await;
                }
                debug!("[SESSION] {} failed, ending session", descriptor.name());
                Some(SessionStatus::Failure)
            }
            HandlerResult::KeepAlive => {
                self.send(
                    &Reply::new(0).to_wire_format(),
                )
                .await;
                Some(SessionStatus::KeepAlive)
            }
        }
    }

    /// Drive the session to completion and release its transport
    pub async fn run(mut self) -> SessionStatus {
        self.send_preamble()
            .await;
        info!(
            "[SESSION] GI session started on {} (pid {:?})",
            self.channel
                .name(),
            self.info
                .process_id
        );

        let status = loop {
            let event = tokio::select! {
                frame = self.channel.read_frame() => Event::Frame(frame),
                line = self.transport.reader.next_line() => Event::Line(line),
            };

            match event {
                Event::Frame(None) => {
                    debug!("[SESSION] Channel gone");
                    break SessionStatus::Hangup;
                }
                Event::Frame(Some(frame)) => self.relay(frame),
                Event::Line(Ok(Some(line))) => {
                    if let Some(status) = self
                        .dispatch(&line)
                        .await
                    {
                        break status;
                    }
                }
                Event::Line(Ok(None)) => {
                    debug!("[SESSION] Command stream closed by program");
                    break SessionStatus::Success;
                }
                Event::Line(Err(GiError::LineTooLong { size, limit })) => {
                    warn!(
                        "[SESSION] Dropped {} byte command line (limit {})",
                        size, limit
                    );
                    self.send(REPLY_UNKNOWN_COMMAND)
                        .await;
                }
                Event::Line(Err(e)) => {
                    error!("[SESSION] Command stream error: {}", e);
                    break SessionStatus::Failure;
                }
            }
        };

        self.transition(SessionState::Terminating);
        let name = self
            .channel
            .name()
            .to_string();
        self.transport
            .close()
            .await;
        self.transition(SessionState::Closed);
        info!(
            "[TEARDOWN] GI session on {} ended: {:?} ({})",
            name,
            status,
            status.code()
        );
        status
    }
}

/// Launch `request`, run the session and record the outcome in `GISTATUS`.
///
/// A launch failure is returned as an error after `GISTATUS` is set to
/// `NOTFOUND` or `FAILURE`; the call may continue without GI.
pub async fn launch_and_run(
    channel: &mut dyn Channel,
    request: &GiRequest,
    config: &GiConfig,
    services: &Services,
    registry: &Registry,
) -> GiResult<SessionStatus> {
    let transport = match Transport::launch(request, config).await {
        Ok(transport) => transport,
        Err(e) => {
            warn!("[LAUNCH] Failed to start {}: {}", request.program, e);
            let value = match e {
                GiError::ProgramNotFound { .. } => "NOTFOUND",
                _ => "FAILURE",
            };
            channel.set_variable(STATUS_VARIABLE, value);
            return Err(e);
        }
    };

    let status = GiSession::new(&mut *channel, transport, request, services, registry)
        .with_debug(config.debug)
        .run()
        .await;
    channel.set_variable(STATUS_VARIABLE, status.variable_value());
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(SessionStatus::Success.code(), 0);
        assert_eq!(SessionStatus::Failure.code(), -1);
        assert_eq!(SessionStatus::Hangup.code(), -1);
        assert_eq!(SessionStatus::KeepAlive.code(), KEEPALIVE_STATUS);
        assert!(SessionStatus::Hangup.is_failure());
        assert!(!SessionStatus::KeepAlive.is_failure());
    }

    #[test]
    fn test_status_variable_values() {
        assert_eq!(SessionStatus::Success.variable_value(), "SUCCESS");
        assert_eq!(SessionStatus::KeepAlive.variable_value(), "SUCCESS");
        assert_eq!(SessionStatus::Failure.variable_value(), "FAILURE");
        assert_eq!(SessionStatus::Hangup.variable_value(), "HANGUP");
    }

    #[test]
    fn test_debug_flag() {
        set_debug(true);
        assert!(debug_enabled());
        set_debug(false);
        assert!(!debug_enabled());
    }
}
