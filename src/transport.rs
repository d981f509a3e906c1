//! GI transports: local subprocess pipes or a network gateway socket.
//!
//! A [`Transport`] bundles the command-read stream, the reply-write stream,
//! the optional audio side channel and the owned subprocess handle. It is
//! released through [`Transport::close`]; later calls do nothing.

use crate::{
    buffer::LineBuffer,
    config::GiConfig,
    constants::*,
    error::{GiError, GiResult},
};
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{dup2, pipe2, Pid};
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::net::{lookup_host, TcpStream};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Where a GI program lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramSpec {
    /// Executable path, relative ones resolved against the script directory
    Local(String),
    /// `gi://host[:port][/script]`
    Network {
        host: String,
        port: u16,
        script: Option<String>,
    },
}

impl ProgramSpec {
    /// Classify `program`, parsing network URLs
    pub fn parse(program: &str, default_port: u16) -> GiResult<Self> {
        let Some(rest) = strip_scheme(program) else {
            return Ok(ProgramSpec::Local(program.to_string()));
        };

        let (authority, script) = match rest.split_once('/') {
            Some((authority, script)) => (authority, Some(script)),
            None => (rest, None),
        };
        let script = script
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| GiError::invalid_url(program))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port, program)?,
                None if tail.is_empty() => default_port,
                None => return Err(GiError::invalid_url(program)),
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, parse_port(port, program)?),
                None => (authority, default_port),
            }
        };

        if host.is_empty() {
            return Err(GiError::invalid_url(program));
        }
        Ok(ProgramSpec::Network {
            host: host.to_string(),
            port,
            script,
        })
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ProgramSpec::Network { .. })
    }
}

fn strip_scheme(program: &str) -> Option<&str> {
    let scheme_len = NETWORK_SCHEME.len();
    match program.get(..scheme_len) {
        Some(scheme) if scheme.eq_ignore_ascii_case(NETWORK_SCHEME) => program.get(scheme_len..),
        _ => None,
    }
}

fn parse_port(text: &str, url: &str) -> GiResult<u16> {
    match text.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(GiError::invalid_url(url)),
    }
}

/// A GI invocation: program, its arguments and the audio flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiRequest {
    pub program: String,
    pub args: Vec<String>,
    pub enable_audio: bool,
}

impl GiRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            enable_audio: false,
        }
    }

    /// Parse dialplan application data, `program,arg1,arg2,...`
    pub fn from_app_data(data: &str) -> GiResult<Self> {
        let mut parts = data.split(',');
        let program = parts
            .next()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| GiError::generic("GI requires a program argument"))?;
        Ok(Self {
            program: program.to_string(),
            args: parts
                .map(str::to_string)
                .collect(),
            enable_audio: false,
        })
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args
            .into_iter()
            .map(Into::into)
            .collect();
        self
    }

    /// Request the audio side channel (local programs only)
    pub fn with_audio(mut self) -> Self {
        self.enable_audio = true;
        self
    }
}

/// Buffered, cancel-safe line reader over the command stream
pub struct CommandReader {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    buffer: LineBuffer,
    interrupts: u32,
    eof: bool,
}

impl CommandReader {
    pub fn new<R>(reader: R, max_line: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            buffer: LineBuffer::new(max_line),
            interrupts: 0,
            eof: false,
        }
    }

    /// Next complete line without its terminator, `Ok(None)` at EOF.
    ///
    /// Cancel safe: partially read data stays buffered in `self`.
    pub async fn next_line(&mut self) -> GiResult<Option<String>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self
                .buffer
                .next_line()?
            {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }

            match self
                .reader
                .read(&mut chunk)
                .await
            {
                Ok(0) => {
                    self.eof = true;
                    if !self
                        .buffer
                        .is_empty()
                    {
                        debug!(
                            "Discarding {} bytes of unterminated input at EOF",
                            self.buffer
                                .len()
                        );
                    }
                    return Ok(None);
                }
                Ok(n) => {
                    self.interrupts = 0;
                    self.buffer
                        .extend_from_slice(&chunk[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    self.interrupts += 1;
                    if self.interrupts > MAX_INTERRUPT_RETRIES {
                        return Err(GiError::Interrupted {
                            attempts: self.interrupts,
                        });
                    }
                    debug!(
                        "Command read interrupted ({}/{})",
                        self.interrupts, MAX_INTERRUPT_RETRIES
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Destination of relayed voice frames.
///
/// `offer` makes exactly one non-blocking write attempt; a short count or an
/// error only degrades audio.
pub trait AudioSink: Send {
    fn offer(&mut self, data: &[u8]) -> io::Result<usize>;
}

impl AudioSink for pipe::Sender {
    fn offer(&mut self, data: &[u8]) -> io::Result<usize> {
        self.try_write(data)
    }
}

/// Owned handle on a local GI subprocess
#[derive(Debug, Default)]
pub struct ProcessHandle {
    child: Option<Child>,
}

impl ProcessHandle {
    /// Handle for network sessions: nothing to signal
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    pub fn id(&self) -> Option<u32> {
        self.child
            .as_ref()
            .and_then(Child::id)
    }

    pub fn is_local(&self) -> bool {
        self.child
            .is_some()
    }

    /// Ask the subprocess to stop with SIGHUP.
    ///
    /// Sends at most one signal over the handle's lifetime and never kills
    /// forcibly. Returns `true` if a signal was delivered.
    pub fn request_stop(&mut self) -> bool {
        let Some(mut child) = self
            .child
            .take()
        else {
            return false;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("[TEARDOWN] GI program already exited: {}", status);
                return false;
            }
            Ok(None) => {}
            Err(e) => warn!("[TEARDOWN] Could not poll GI program: {}", e),
        }

        let Some(pid) = child.id() else {
            return false;
        };
        match kill(Pid::from_raw(pid as i32), Signal::SIGHUP) {
            Ok(()) => {
                debug!("[TEARDOWN] Sent SIGHUP to GI program pid {}", pid);
                true
            }
            Err(e) => {
                warn!("[TEARDOWN] Failed to signal GI program pid {}: {}", pid, e);
                false
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self
            .child
            .is_some()
        {
            warn!("[TEARDOWN] Process handle dropped without close, stopping program");
            self.request_stop();
        }
    }
}

/// Streams of one GI session
pub struct Transport {
    pub(crate) reader: CommandReader,
    pub(crate) writer: Box<dyn AsyncWrite + Send + Unpin>,
    pub(crate) audio: Option<Box<dyn AudioSink>>,
    pub(crate) process: ProcessHandle,
    closed: bool,
}

impl Transport {
    /// Wrap already connected streams; no subprocess, no audio
    pub fn from_streams<R, W>(reader: R, writer: W, max_line: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: CommandReader::new(reader, max_line),
            writer: Box::new(writer),
            audio: None,
            process: ProcessHandle::none(),
            closed: false,
        }
    }

    pub fn with_audio(mut self, sink: impl AudioSink + 'static) -> Self {
        self.audio = Some(Box::new(sink));
        self
    }

    pub fn with_process(mut self, process: ProcessHandle) -> Self {
        self.process = process;
        self
    }

    pub fn has_audio(&self) -> bool {
        self.audio
            .is_some()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.process
            .id()
    }

    /// Start `request`: connect to a network gateway or spawn a program.
    ///
    /// Every resource created before a failure is released before the
    /// error is returned.
    pub async fn launch(request: &GiRequest, config: &GiConfig) -> GiResult<Self> {
        match ProgramSpec::parse(&request.program, config.default_port)? {
            ProgramSpec::Network { host, port, script } => {
                if request.enable_audio {
                    warn!("[LAUNCH] Audio side channel is not available for network gateways");
                }
                connect(&host, port, script.as_deref(), config).await
            }
            ProgramSpec::Local(program) => spawn(&program, request, config),
        }
    }

    /// Write raw text to the reply stream and flush
    pub async fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.writer
            .write_all(text.as_bytes())
            .await?;
        self.writer
            .flush()
            .await
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop the subprocess and close the reply and audio streams.
    ///
    /// Only the first call has any effect. The command stream is released
    /// when the transport is dropped.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let stopped = self
            .process
            .request_stop();
        if let Err(e) = self
            .writer
            .shutdown()
            .await
        {
            debug!("[TEARDOWN] Reply stream shutdown: {}", e);
        }
        let audio = self
            .audio
            .take();
        debug!(
            "[TEARDOWN] Transport closed (signalled program: {}, audio: {})",
            stopped,
            audio.is_some()
        );
    }
}

async fn connect(
    host: &str,
    port: u16,
    script: Option<&str>,
    config: &GiConfig,
) -> GiResult<Transport> {
    info!("[LAUNCH] Connecting to GI gateway {}:{}", host, port);

    let addrs: Vec<_> = match lookup_host((host, port)).await {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            warn!("[LAUNCH] Resolving {} failed: {}", host, e);
            Vec::new()
        }
    };
    if addrs.is_empty() {
        return Err(GiError::Resolve {
            host: host.to_string(),
        });
    }

    debug!(
        "[LAUNCH] Starting TCP connect with {}ms timeout",
        config.connect_timeout_ms
    );
    let stream = match timeout(config.connect_timeout(), TcpStream::connect(&addrs[..])).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!("[LAUNCH] Connect to {}:{} failed: {}", host, port, e);
            return Err(e.into());
        }
        Err(_) => {
            warn!(
                "[LAUNCH] Connect to {}:{} timed out after {}ms",
                host, port, config.connect_timeout_ms
            );
            return Err(GiError::Timeout {
                timeout_ms: config.connect_timeout_ms,
            });
        }
    };
    stream.set_nodelay(true)?;

    let mut handshake = format!("{}network: yes{}", PREAMBLE_KEY_PREFIX, LINE_TERMINATOR);
    if let Some(script) = script {
        handshake.push_str(&format!(
            "{}network_script: {}{}",
            PREAMBLE_KEY_PREFIX, script, LINE_TERMINATOR
        ));
    }

    let (read_half, write_half) = stream.into_split();
    let mut transport = Transport::from_streams(read_half, write_half, config.max_line_length);
    transport
        .write_str(&handshake)
        .await?;
    debug!("[LAUNCH] Handshake sent to {}:{}", host, port);
    Ok(transport)
}

fn check_executable(path: &Path) -> GiResult<()> {
    let metadata = std::fs::metadata(path).map_err(|_| GiError::ProgramNotFound {
        path: path.to_path_buf(),
    })?;
    if !metadata.is_file()
        || metadata
            .permissions()
            .mode()
            & 0o111
            == 0
    {
        return Err(GiError::NotExecutable {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Install `fd` as the child's audio descriptor; runs between fork and exec
fn attach_audio_fd(fd: RawFd) -> io::Result<()> {
    if fd == AUDIO_FD {
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))?;
    } else {
        dup2(fd, AUDIO_FD)?;
    }
    Ok(())
}

fn spawn(program: &str, request: &GiRequest, config: &GiConfig) -> GiResult<Transport> {
    let path = config.resolve_program(program);
    check_executable(&path)?;
    info!("[LAUNCH] Starting GI program {}", path.display());

    let mut command = Command::new(&path);
    command
        .args(&request.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(false);

    let audio_pipe: Option<(OwnedFd, OwnedFd)> = if request.enable_audio {
        Some(pipe2(OFlag::O_CLOEXEC)?)
    } else {
        None
    };
    if let Some((child_end, _)) = &audio_pipe {
        let fd = child_end.as_raw_fd();
        // SAFETY: the hook only calls async-signal-safe fcntl/dup2.
        unsafe {
            command.pre_exec(move || attach_audio_fd(fd));
        }
    }

    let mut child = command
        .spawn()
        .map_err(|source| GiError::Spawn {
            program: path.clone(),
            source,
        })?;
    let (stdin, stdout) = (
        child
            .stdin
            .take(),
        child
            .stdout
            .take(),
    );
    let mut process = ProcessHandle::new(child);

    let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
        process.request_stop();
        return Err(GiError::generic("GI program started without stdio pipes"));
    };

    let audio = match audio_pipe {
        Some((child_end, parent_end)) => {
            drop(child_end);
            match pipe::Sender::from_owned_fd(parent_end) {
                Ok(sender) => Some(sender),
                Err(e) => {
                    process.request_stop();
                    return Err(e.into());
                }
            }
        }
        None => None,
    };

    debug!(
        "[LAUNCH] GI program running as pid {:?} (audio: {})",
        process.id(),
        audio.is_some()
    );
    let mut transport =
        Transport::from_streams(stdout, stdin, config.max_line_length).with_process(process);
    if let Some(sender) = audio {
        transport = transport.with_audio(sender);
    }
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_local_program() {
        assert_eq!(
            ProgramSpec::parse("ivr.sh", 4573).unwrap(),
            ProgramSpec::Local("ivr.sh".to_string())
        );
    }

    #[test]
    fn test_network_url() {
        assert_eq!(
            ProgramSpec::parse("gi://gw.example.com/menu", 4573).unwrap(),
            ProgramSpec::Network {
                host: "gw.example.com".to_string(),
                port: 4573,
                script: Some("menu".to_string()),
            }
        );
        assert_eq!(
            ProgramSpec::parse("GI://10.0.0.5:9000", 4573).unwrap(),
            ProgramSpec::Network {
                host: "10.0.0.5".to_string(),
                port: 9000,
                script: None,
            }
        );
        assert_eq!(
            ProgramSpec::parse("gi://[::1]:4600/a/b", 4573).unwrap(),
            ProgramSpec::Network {
                host: "::1".to_string(),
                port: 4600,
                script: Some("a/b".to_string()),
            }
        );
    }

    #[test]
    fn test_invalid_urls() {
        for url in ["gi://", "gi://:4573", "gi://host:abc", "gi://host:0", "gi://[::1"] {
            let err = ProgramSpec::parse(url, 4573).unwrap_err();
            assert!(
                matches!(err, GiError::InvalidUrl { .. }),
                "{} gave {:?}",
                url,
                err
            );
        }
    }

    #[test]
    fn test_request_from_app_data() {
        let request = GiRequest::from_app_data("ivr.sh,welcome,,fr").unwrap();
        assert_eq!(request.program, "ivr.sh");
        assert_eq!(request.args, vec!["welcome", "", "fr"]);
        assert!(!request.enable_audio);
        assert!(
            GiRequest::from_app_data("ivr.sh")
                .unwrap()
                .with_audio()
                .enable_audio
        );
        assert!(GiRequest::from_app_data(" ,x").is_err());
    }

    #[tokio::test]
    async fn test_reader_joins_partial_reads() {
        let mock = Builder::new()
            .read(b"ANSWER\nSTREAM FI")
            .read(b"LE beep \"\"\r\n")
            .build();
        let mut reader = CommandReader::new(mock, 64);
        assert_eq!(
            reader
                .next_line()
                .await
                .unwrap()
                .as_deref(),
            Some("ANSWER")
        );
        assert_eq!(
            reader
                .next_line()
                .await
                .unwrap()
                .as_deref(),
            Some("STREAM FILE beep \"\"")
        );
        assert_eq!(
            reader
                .next_line()
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_reader_retries_interrupts() {
        let interrupted = || io::Error::new(io::ErrorKind::Interrupted, "signal");
        let mock = Builder::new()
            .read_error(interrupted())
            .read_error(interrupted())
            .read(b"NOOP\n")
            .build();
        let mut reader = CommandReader::new(mock, 64);
        assert_eq!(
            reader
                .next_line()
                .await
                .unwrap()
                .as_deref(),
            Some("NOOP")
        );
    }

    #[tokio::test]
    async fn test_reader_gives_up_after_bounded_interrupts() {
        let mut builder = Builder::new();
        for _ in 0..=MAX_INTERRUPT_RETRIES {
            builder.read_error(io::Error::new(io::ErrorKind::Interrupted, "signal"));
        }
        let mock = builder.build();
        drop(builder);
        let mut reader = CommandReader::new(mock, 64);
        let err = reader
            .next_line()
            .await
            .unwrap_err();
        assert!(matches!(err, GiError::Interrupted { attempts } if attempts == MAX_INTERRUPT_RETRIES + 1));
    }

    #[tokio::test]
    async fn test_reader_rejects_overlong_line() {
        let mock = Builder::new()
            .read(&[b'x'; 100])
            .read(b"xxxx\nNOOP\n")
            .build();
        let mut reader = CommandReader::new(mock, 16);
        let err = reader
            .next_line()
            .await
            .unwrap_err();
        assert!(matches!(err, GiError::LineTooLong { limit: 16, .. }));
        assert_eq!(
            reader
                .next_line()
                .await
                .unwrap()
                .as_deref(),
            Some("NOOP")
        );
    }

    #[tokio::test]
    async fn test_close_runs_once() {
        let (ours, theirs) = tokio::io::duplex(64);
        let (read_half, write_half) = tokio::io::split(ours);
        let mut transport = Transport::from_streams(read_half, write_half, 64);
        assert!(!transport.is_closed());

        transport
            .close()
            .await;
        transport
            .close()
            .await;
        assert!(transport.is_closed());

        let mut peer = theirs;
        let mut rest = Vec::new();
        peer.read_to_end(&mut rest)
            .await
            .unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn test_stop_without_process_is_noop() {
        let mut process = ProcessHandle::none();
        assert!(!process.is_local());
        assert!(!process.request_stop());
        assert!(!process.request_stop());
    }
}
