//! Launching real GI programs and network gateways


use bytes::Bytes;
use mock_channel::MockChannel;
use pbx_gi_tokio::{
    launch_and_run, Frame, GiConfig, GiError, GiRequest, Registry, Services, SessionStatus,
    STATUS_VARIABLE,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Skip the preamble, then run the rest of the script
const READ_PREAMBLE: &str = "while read -r line && [ -n \"$line\" ]; do :; done\n";

fn write_script(dir: &TempDir, name: &str, body: &str, mode: u32) -> PathBuf {
    let path = dir
        .path()
        .join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
    path
}

fn config_for(dir: &TempDir) -> GiConfig {
    GiConfig::new().with_script_dir(dir.path())
}

async fn wait_for_file(path: &Path) -> String {
    for _ in 0..100 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if !text.is_empty() {
                return text;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{} never written", path.display());
}

fn status_variable(channel: &MockChannel) -> Option<&str> {
    channel
        .variables
        .get(STATUS_VARIABLE)
        .map(String::as_str)
}

#[tokio::test]
async fn test_program_exiting_immediately_is_success() {
    let dir = tempfile::tempdir().unwrap();
    write_script(&dir, "quit.sh", "exit 0\n", 0o755);
    let (mut channel, _frames) = MockChannel::new("SIP/alice-1");

    let status = launch_and_run(
        &mut channel,
        &GiRequest::new("quit.sh"),
        &config_for(&dir),
        &Services::default(),
        &Registry::with_builtins(),
    )
    .await
    .unwrap();

    assert_eq!(status, SessionStatus::Success);
    assert!(status.code() >= 0);
    assert_eq!(status_variable(&channel), Some("SUCCESS"));
}

#[tokio::test]
async fn test_program_drives_channel() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir
        .path()
        .join("reply.txt");
    write_script(
        &dir,
        "answer.sh",
        &format!(
            "{}echo ANSWER\nread -r reply\necho \"$1 $reply\" > \"$2\"\n",
            READ_PREAMBLE
        ),
        0o755,
    );
    let (mut channel, _frames) = MockChannel::new("SIP/alice-1");
    let request = GiRequest::new("answer.sh").with_args(["greeting", out.to_str().unwrap()]);

    let status = launch_and_run(
        &mut channel,
        &request,
        &config_for(&dir),
        &Services::default(),
        &Registry::with_builtins(),
    )
    .await
    .unwrap();

    assert_eq!(status, SessionStatus::Success);
    assert_eq!(
        wait_for_file(&out)
            .await
            .trim_end(),
        "greeting 200 result=0"
    );
    assert_eq!(channel.ops, vec!["answer"]);
}

#[tokio::test]
async fn test_hangup_mid_command_signals_program_once() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir
        .path()
        .join("hup.txt");
    write_script(
        &dir,
        "hup.sh",
        &format!(
            "trap 'echo hup >> \"$1\"; exit 0' HUP\n{}echo 'STREAM FILE demo-congrats \"\"'\nread -r reply\nwhile true; do sleep 0.1; done\n",
            READ_PREAMBLE
        ),
        0o755,
    );
    let (mut channel, _frames) = MockChannel::new("SIP/alice-1");
    channel.hung_up = true;
    let request = GiRequest::new("hup.sh").with_args([marker.to_str().unwrap()]);

    let status = launch_and_run(
        &mut channel,
        &request,
        &config_for(&dir),
        &Services::default(),
        &Registry::with_builtins(),
    )
    .await
    .unwrap();

    assert_eq!(status, SessionStatus::Failure);
    assert!(status.code() < 0);
    assert_eq!(status_variable(&channel), Some("FAILURE"));
    assert_eq!(wait_for_file(&marker).await, "hup\n");
}

#[tokio::test]
async fn test_audio_side_channel() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir
        .path()
        .join("audio.raw");
    write_script(
        &dir,
        "listen.sh",
        &format!(
            "{}head -c 320 <&3 > \"$1.part\"\nmv \"$1.part\" \"$1\"\n",
            READ_PREAMBLE
        ),
        0o755,
    );
    let (mut channel, frames) = MockChannel::new("SIP/alice-1");
    frames
        .send(Frame::Voice(Bytes::from_static(&[0x55; 160])))
        .unwrap();
    frames
        .send(Frame::Dtmf('1'))
        .unwrap();
    frames
        .send(Frame::Voice(Bytes::from_static(&[0x55; 160])))
        .unwrap();
    let request = GiRequest::new("listen.sh")
        .with_args([out.to_str().unwrap()])
        .with_audio();

    let status = launch_and_run(
        &mut channel,
        &request,
        &config_for(&dir),
        &Services::default(),
        &Registry::with_builtins(),
    )
    .await
    .unwrap();

    assert_eq!(status, SessionStatus::Success);
    let audio = std::fs::read(&out).unwrap();
    assert_eq!(audio.len(), 320);
    assert!(audio
        .iter()
        .all(|&b| b == 0x55));
}

#[tokio::test]
async fn test_missing_program() {
    let dir = tempfile::tempdir().unwrap();
    let (mut channel, _frames) = MockChannel::new("SIP/alice-1");

    let err = launch_and_run(
        &mut channel,
        &GiRequest::new("missing.sh"),
        &config_for(&dir),
        &Services::default(),
        &Registry::with_builtins(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, GiError::ProgramNotFound { .. }));
    assert!(err.is_transport_error());
    assert_eq!(status_variable(&channel), Some("NOTFOUND"));
}

#[tokio::test]
async fn test_program_not_executable() {
    let dir = tempfile::tempdir().unwrap();
    write_script(&dir, "plain.sh", "exit 0\n", 0o644);
    let (mut channel, _frames) = MockChannel::new("SIP/alice-1");

    let err = launch_and_run(
        &mut channel,
        &GiRequest::new("plain.sh"),
        &config_for(&dir),
        &Services::default(),
        &Registry::with_builtins(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, GiError::NotExecutable { .. }));
    assert_eq!(status_variable(&channel), Some("FAILURE"));
}

#[tokio::test]
async fn test_network_gateway() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener
        .local_addr()
        .unwrap()
        .port();

    let gateway = tokio::spawn(async move {
        let (stream, _) = listener
            .accept()
            .await
            .unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut header = Vec::new();
        loop {
            let mut line = String::new();
            reader
                .read_line(&mut line)
                .await
                .unwrap();
            if line == "\n" || line.is_empty() {
                break;
            }
            header.push(
                line.trim_end()
                    .to_string(),
            );
        }

        write_half
            .write_all(b"GET VARIABLE lang\n")
            .await
            .unwrap();
        let mut reply = String::new();
        reader
            .read_line(&mut reply)
            .await
            .unwrap();
        (header, reply)
    });

    let (mut channel, _frames) = MockChannel::new("SIP/alice-1");
    channel
        .variables
        .insert("lang".to_string(), "fr".to_string());
    let request = GiRequest::new(format!("gi://127.0.0.1:{}/menu", port));

    let status = launch_and_run(
        &mut channel,
        &request,
        &GiConfig::default(),
        &Services::default(),
        &Registry::with_builtins(),
    )
    .await
    .unwrap();

    let (header, reply) = gateway
        .await
        .unwrap();
    assert_eq!(status, SessionStatus::Success);
    assert_eq!(header[0], "gi_network: yes");
    assert_eq!(header[1], "gi_network_script: menu");
    assert_eq!(header[2], format!("gi_request: gi://127.0.0.1:{}/menu", port));
    assert_eq!(reply, "200 result=1 (fr)\n");
}

#[tokio::test]
async fn test_network_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener
        .local_addr()
        .unwrap()
        .port();
    drop(listener);

    let (mut channel, _frames) = MockChannel::new("SIP/alice-1");
    let err = launch_and_run(
        &mut channel,
        &GiRequest::new(format!("gi://127.0.0.1:{}", port)),
        &GiConfig::default().with_connect_timeout_ms(500),
        &Services::default(),
        &Registry::with_builtins(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, GiError::Io(_) | GiError::Timeout { .. }));
    assert_eq!(status_variable(&channel), Some("FAILURE"));
}
