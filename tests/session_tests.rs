//! Session loop behaviour over an in-memory transport


use bytes::Bytes;
use mock_channel::{run_script, transport_pair, CountingSink, GiClient, MockChannel, ScriptedApps};
use pbx_gi_tokio::{
    AppOutcome, Frame, GiRequest, GiSession, Registry, Services, SessionStatus, KEEPALIVE_STATUS,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn test_preamble_then_commands() {
    let (mut channel, _frames) = MockChannel::new("SIP/alice-00000001");
    let registry = Registry::with_builtins();
    let services = Services::default();
    let (transport, client) = transport_pair(8192);
    let request = GiRequest::new("ivr.sh").with_args(["welcome", "fr"]);
    let session = GiSession::new(&mut channel, transport, &request, &services, &registry);

    let script = async move {
        let mut client = GiClient::new(client);
        let preamble = client
            .read_preamble()
            .await;
        let answer = client
            .command("ANSWER")
            .await;
        let noop = client
            .command("noop")
            .await;
        client
            .close()
            .await;
        (preamble, answer, noop)
    };

    let (status, (preamble, answer, noop)) = tokio::join!(session.run(), script);

    assert_eq!(status, SessionStatus::Success);
    assert_eq!(preamble[0], "gi_request: ivr.sh");
    assert_eq!(preamble[1], "gi_channel: SIP/alice-00000001");
    assert_eq!(preamble[5], "gi_callerid: 5551234");
    assert_eq!(preamble[6], "gi_calleridname: Alice");
    assert_eq!(preamble[16], "gi_enhanced: 0.0");
    assert_eq!(preamble[17], "gi_accountcode: unknown");
    assert_eq!(preamble[18], "gi_arg_1: welcome");
    assert_eq!(preamble[19], "gi_arg_2: fr");
    assert_eq!(preamble.len(), 20);
    assert_eq!(answer, "200 result=0");
    assert_eq!(noop, "200 result=0");
    assert_eq!(channel.ops, vec!["answer"]);
}

#[tokio::test]
async fn test_unknown_command_keeps_session_open() {
    let (mut channel, _frames) = MockChannel::new("SIP/bob-1");
    let services = Services::default();
    let (replies, status) = run_script(&mut channel, &services, &["BOGUS 1 2", "", "NOOP"]).await;

    assert_eq!(
        replies,
        vec![
            "510 Invalid or unknown command",
            "510 Invalid or unknown command",
            "200 result=0",
        ]
    );
    assert_eq!(status, SessionStatus::Success);
}

#[tokio::test]
async fn test_usage_block_keeps_session_open() {
    let (mut channel, _frames) = MockChannel::new("SIP/bob-1");
    let services = Services::default();
    let (replies, status) = run_script(&mut channel, &services, &["ANSWER now", "NOOP"]).await;

    assert_eq!(
        replies
            .first()
            .map(String::as_str),
        Some("520-Invalid command syntax.  Proper usage follows:")
    );
    assert!(replies.contains(&" Usage: ANSWER".to_string()));
    assert_eq!(replies[replies.len() - 2], "520 End of proper usage.");
    assert_eq!(replies[replies.len() - 1], "200 result=0");
    assert_eq!(status, SessionStatus::Success);
    assert!(channel
        .ops
        .is_empty());
}

#[tokio::test]
async fn test_channel_failure_ends_session() {
    let (mut channel, _frames) = MockChannel::new("SIP/bob-1");
    channel.hung_up = true;
    let services = Services::default();
    let (replies, status) = run_script(
        &mut channel,
        &services,
        &["STREAM FILE demo-congrats \"\"", "NOOP"],
    )
    .await;

    assert_eq!(replies, vec!["200 result=-1 endpos=0"]);
    assert_eq!(status, SessionStatus::Failure);
    assert!(status.code() < 0);
}

#[tokio::test]
async fn test_channel_gone_is_hangup() {
    let (mut channel, frames) = MockChannel::new("SIP/bob-1");
    drop(frames);
    let registry = Registry::with_builtins();
    let services = Services::default();
    let (transport, client) = transport_pair(8192);
    let request = GiRequest::new("ivr.sh");
    let session = GiSession::new(&mut channel, transport, &request, &services, &registry);

    let script = async move {
        let mut client = GiClient::new(client);
        client
            .read_preamble()
            .await;
        client
            .read_to_end()
            .await
    };

    let (status, rest) = tokio::join!(session.run(), script);
    assert_eq!(status, SessionStatus::Hangup);
    assert_eq!(status.code(), -1);
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_exec_keepalive() {
    let (mut channel, _frames) = MockChannel::new("SIP/bob-1");
    let services = Services::default().with_applications(Arc::new(
        ScriptedApps::default()
            .with("Dial", AppOutcome::KeepAlive)
            .with("Playback", AppOutcome::Completed(0)),
    ));
    let (replies, status) = run_script(
        &mut channel,
        &services,
        &["EXEC Playback tt-monkeys", "EXEC Dial SIP/carol", "NOOP"],
    )
    .await;

    assert_eq!(replies, vec!["200 result=0", "200 result=0"]);
    assert_eq!(status, SessionStatus::KeepAlive);
    assert_eq!(status.code(), KEEPALIVE_STATUS);
    assert_eq!(
        channel
            .variables
            .get("LAST_APP")
            .map(String::as_str),
        Some("Dial(SIP/carol)")
    );
}

#[tokio::test]
async fn test_voice_frames_relayed_once_each() {
    let (mut channel, frames) = MockChannel::new("SIP/bob-1");
    let registry = Registry::with_builtins();
    let services = Services::default();
    let sink = CountingSink::default();
    let attempts = sink
        .attempts
        .clone();
    let (transport, client) = transport_pair(8192);
    let transport = transport.with_audio(sink);
    let request = GiRequest::new("ivr.sh");
    let session = GiSession::new(&mut channel, transport, &request, &services, &registry);

    for _ in 0..3 {
        frames
            .send(Frame::Voice(Bytes::from_static(&[0x7f; 160])))
            .unwrap();
    }
    frames
        .send(Frame::Dtmf('5'))
        .unwrap();
    frames
        .send(Frame::Voice(Bytes::from_static(&[0x7f; 160])))
        .unwrap();

    let script = async move {
        let mut client = GiClient::new(client);
        let preamble = client
            .read_preamble()
            .await;
        while attempts.load(Ordering::SeqCst) < 4 {
            tokio::task::yield_now().await;
        }
        let reply = client
            .command("NOOP")
            .await;
        client
            .close()
            .await;
        (preamble, reply, attempts)
    };

    let (status, (preamble, reply, attempts)) = tokio::join!(session.run(), script);
    assert_eq!(status, SessionStatus::Success);
    assert_eq!(reply, "200 result=0");
    assert!(preamble.contains(&"gi_enhanced: 1.0".to_string()));
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_overlong_line_is_rejected_and_session_continues() {
    let (mut channel, _frames) = MockChannel::new("SIP/bob-1");
    let registry = Registry::with_builtins();
    let services = Services::default();
    let (transport, client) = transport_pair(32);
    let request = GiRequest::new("ivr.sh");
    let session = GiSession::new(&mut channel, transport, &request, &services, &registry);

    let script = async move {
        let mut client = GiClient::new(client);
        client
            .read_preamble()
            .await;
        client
            .send(&format!("VERBOSE {}", "x".repeat(64)))
            .await;
        let rejected = client
            .read_line()
            .await;
        let noop = client
            .command("NOOP")
            .await;
        client
            .close()
            .await;
        (rejected, noop)
    };

    let (status, (rejected, noop)) = tokio::join!(session.run(), script);
    assert_eq!(rejected.as_deref(), Some("510 Invalid or unknown command"));
    assert_eq!(noop, "200 result=0");
    assert_eq!(status, SessionStatus::Success);
}

#[tokio::test]
async fn test_quoted_arguments_reach_handler() {
    let (mut channel, _frames) = MockChannel::new("SIP/bob-1");
    let services = Services::default();
    let (replies, _) = run_script(
        &mut channel,
        &services,
        &[
            "SET VARIABLE \"foo bar\" baz",
            "SET VARIABLE quote a\\\"b",
            "GET VARIABLE \"foo bar\"",
        ],
    )
    .await;

    assert_eq!(
        replies,
        vec!["200 result=1", "200 result=1", "200 result=1 (baz)"]
    );
    assert_eq!(
        channel
            .variables
            .get("quote")
            .map(String::as_str),
        Some("a\"b")
    );
}
