//! Call-leg verbs: answer, hangup, status, text, TDD, caller id, music.

use super::{channel_failure, parse_timeout_ms, CommandContext};
use crate::{
    channel::{ChannelError, ChannelState, TddMode},
    reply::{HandlerResult, Reply},
};
use std::time::Duration;
use tracing::{debug, info};

pub(super) async fn answer(ctx: &mut CommandContext<'_>) -> HandlerResult {
    if ctx
        .channel
        .state()
        == ChannelState::Up
    {
        return HandlerResult::ok(0);
    }
    match ctx
        .channel
        .answer()
        .await
    {
        Ok(()) => HandlerResult::ok(0),
        Err(e) => channel_failure(&e),
    }
}

/// `result=-1` for an unknown channel is a domain value here, not a failure.
pub(super) async fn channel_status(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let Some(name) = args.first() else {
        return HandlerResult::ok(
            ctx.channel
                .state()
                .code(),
        );
    };

    if name.eq_ignore_ascii_case(
        ctx.channel
            .name(),
    ) {
        return HandlerResult::ok(
            ctx.channel
                .state()
                .code(),
        );
    }

    match ctx
        .services
        .channels
        .lock_by_name(name)
        .await
    {
        Some(other) => HandlerResult::ok(
            other
                .state()
                .code(),
        ),
        None => HandlerResult::ok(-1),
    }
}

/// Hanging up another channel that is unknown answers `result=-1` and the
/// session continues.
pub(super) async fn hangup(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let own = match args.first() {
        None => true,
        Some(name) => name.eq_ignore_ascii_case(
            ctx.channel
                .name(),
        ),
    };

    if own {
        return match ctx
            .channel
            .hangup()
            .await
        {
            Ok(()) | Err(ChannelError::Hangup) => HandlerResult::ok(1),
            Err(e) => channel_failure(&e),
        };
    }

    let name = &args[0];
    let Some(mut other) = ctx
        .services
        .channels
        .lock_by_name(name)
        .await
    else {
        debug!("HANGUP: no channel named {}", name);
        return HandlerResult::ok(-1);
    };

    match other
        .hangup()
        .await
    {
        Ok(()) | Err(ChannelError::Hangup) => HandlerResult::ok(1),
        Err(e) => {
            debug!("HANGUP of {} failed: {}", name, e);
            HandlerResult::ok(-1)
        }
    }
}

pub(super) async fn receive_char(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let Some(timeout) = parse_timeout_ms(&args[0]) else {
        return HandlerResult::ShowUsage;
    };
    if !ctx
        .channel
        .supports_text()
    {
        return HandlerResult::ok(0);
    }

    match ctx
        .channel
        .receive_char(timeout)
        .await
    {
        Ok(Some(c)) => HandlerResult::ok(c as i64),
        Ok(None) => HandlerResult::Success(Reply::new(0).payload("timeout")),
        Err(ChannelError::Unsupported { .. }) => HandlerResult::ok(0),
        Err(e) => {
            debug!("RECEIVE CHAR failed: {}", e);
            HandlerResult::Failure(Some(Reply::new(-1).payload("hangup")))
        }
    }
}

/// `result=-1` also reports "nothing received", which the client cannot
/// tell apart from a failure by the result alone.
pub(super) async fn receive_text(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let Some(timeout) = parse_timeout_ms(&args[0]) else {
        return HandlerResult::ShowUsage;
    };

    match ctx
        .channel
        .receive_text(timeout)
        .await
    {
        Ok(Some(text)) => HandlerResult::Success(Reply::new(1).payload(text)),
        Ok(None) | Err(ChannelError::Unsupported { .. }) => HandlerResult::ok(-1),
        Err(e) => channel_failure(&e),
    }
}

pub(super) async fn send_text(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let result = ctx
        .channel
        .send_text(&args[0])
        .await;
    sent(result)
}

pub(super) async fn send_image(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    if !ctx
        .channel
        .supports_images()
    {
        return HandlerResult::ok(0);
    }
    let result = ctx
        .channel
        .send_image(&args[0])
        .await;
    sent(result)
}

fn sent(result: Result<(), ChannelError>) -> HandlerResult {
    match result {
        Ok(()) | Err(ChannelError::Unsupported { .. }) | Err(ChannelError::NotFound { .. }) => {
            HandlerResult::ok(0)
        }
        Err(e) => channel_failure(&e),
    }
}

pub(super) fn set_autohangup(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let Ok(seconds) = args[0]
        .trim()
        .parse::<f64>()
    else {
        return HandlerResult::ShowUsage;
    };
    if seconds.is_nan() {
        return HandlerResult::ShowUsage;
    }
    let after = if seconds > 0.0 {
        match Duration::try_from_secs_f64(seconds) {
            Ok(after) => Some(after),
            Err(_) => return HandlerResult::ShowUsage,
        }
    } else {
        None
    };
    ctx.channel
        .set_autohangup(after);
    HandlerResult::ok(0)
}

/// Split `"Name" <number>` into number and optional name
fn split_caller_id(text: &str) -> (String, Option<String>) {
    match (text.find('<'), text.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let number = text[open + 1..close]
                .trim()
                .to_string();
            let name = text[..open]
                .trim()
                .trim_matches('"')
                .trim();
            let name = (!name.is_empty()).then(|| name.to_string());
            (number, name)
        }
        _ => (
            text.trim()
                .to_string(),
            None,
        ),
    }
}

pub(super) fn set_callerid(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let (number, name) = split_caller_id(&args[0]);
    ctx.channel
        .set_caller_id(&number, name.as_deref());
    HandlerResult::ok(1)
}

pub(super) async fn set_music(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let on = match args[0]
        .to_ascii_lowercase()
        .as_str()
    {
        "on" => true,
        "off" => false,
        _ => return HandlerResult::ShowUsage,
    };
    let class = args
        .get(1)
        .map(String::as_str);

    match ctx
        .channel
        .set_music_on_hold(on, class)
        .await
    {
        Ok(()) => {}
        Err(ChannelError::Hangup) => return channel_failure(&ChannelError::Hangup),
        Err(e) => debug!("SET MUSIC {} failed: {}", args[0], e),
    }
    HandlerResult::ok(0)
}

pub(super) async fn tdd_mode(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let mode = match args[0]
        .to_ascii_lowercase()
        .as_str()
    {
        "on" | "tdd" => TddMode::On,
        "off" => TddMode::Off,
        "mate" => TddMode::Mate,
        _ => return HandlerResult::ShowUsage,
    };

    match ctx
        .channel
        .set_tdd_mode(mode)
        .await
    {
        Ok(()) => HandlerResult::ok(1),
        Err(ChannelError::Hangup) => channel_failure(&ChannelError::Hangup),
        Err(e) => {
            debug!("TDD MODE {:?} failed: {}", mode, e);
            HandlerResult::ok(0)
        }
    }
}

pub(super) fn verbose(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let level = args
        .get(1)
        .and_then(|l| {
            l.trim()
                .parse::<u8>()
                .ok()
        })
        .map(|l| l.clamp(1, 4))
        .unwrap_or(1);

    info!(
        target: "pbx_gi::verbose",
        level,
        channel = ctx.channel.name(),
        "{}",
        args[0]
    );
    HandlerResult::ok(1)
}
