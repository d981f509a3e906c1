//! Playback, prompt, recording and SAY verbs.
//!
//! Missing media files are reported as `result=-1` with the session kept
//! open; only a hangup or channel I/O failure ends it.

use super::{channel_failure, digit_reply, parse_timeout_ms, CommandContext};
use crate::{
    channel::{
        ChannelError, ChannelResult, ControlPlayback, Playback, PlaybackOutcome, RecordEnd,
        Recording, SayRequest,
    },
    reply::{HandlerResult, Reply},
};
use std::time::Duration;
use tracing::debug;

const DEFAULT_OPTION_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_SKIP_MS: u64 = 3000;
const DEFAULT_MAX_DIGITS: usize = 1024;

/// Reply for a playback that ran, was interrupted, or never started
fn playback_reply(result: ChannelResult<PlaybackOutcome>, file: &str) -> HandlerResult {
    match result {
        Ok(outcome) => HandlerResult::Success(
            Reply::digit(outcome.digit).endpos(outcome.end_position),
        ),
        Err(ChannelError::NotFound { .. }) | Err(ChannelError::Unsupported { .. }) => {
            debug!("Playback of {} failed to start", file);
            HandlerResult::Success(
                Reply::new(-1).endpos(0),
            )
        }
        Err(e) => {
            debug!("Playback of {} aborted: {}", file, e);
            HandlerResult::Failure(Some(
                Reply::new(-1).endpos(0),
            ))
        }
    }
}

fn parse_offset(arg: Option<&String>) -> Option<u64> {
    match arg {
        None => Some(0),
        Some(text) => text
            .trim()
            .parse()
            .ok(),
    }
}

pub(super) async fn stream_file(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let Some(offset) = parse_offset(args.get(2)) else {
        return HandlerResult::ShowUsage;
    };
    let playback = Playback {
        file: &args[0],
        escape_digits: &args[1],
        offset,
    };
    let result = ctx
        .channel
        .stream_file(&playback)
        .await;
    playback_reply(result, playback.file)
}

/// First character of an optional control-digit argument
fn control_digit(arg: Option<&String>, default: Option<char>) -> Option<char> {
    arg.and_then(|a| {
        a.chars()
            .next()
    })
    .or(default)
}

pub(super) async fn control_stream_file(
    ctx: &mut CommandContext<'_>,
    args: &[String],
) -> HandlerResult {
    let skip_ms = match args.get(2) {
        None => DEFAULT_SKIP_MS,
        Some(text) => match text
            .trim()
            .parse::<i64>()
        {
            Ok(ms) if ms > 0 => ms as u64,
            Ok(_) => DEFAULT_SKIP_MS,
            Err(_) => return HandlerResult::ShowUsage,
        },
    };

    let playback = ControlPlayback {
        file: &args[0],
        escape_digits: &args[1],
        skip: Duration::from_millis(skip_ms),
        forward_digit: control_digit(args.get(3), Some('#')),
        rewind_digit: control_digit(args.get(4), Some('*')),
        pause_digit: control_digit(args.get(5), None),
    };
    let result = ctx
        .channel
        .control_stream_file(&playback)
        .await;
    playback_reply(result, playback.file)
}

/// STREAM FILE, then a bounded wait for one digit if none was pressed.
///
/// Missing or non-positive timeouts use the five second default.
pub(super) async fn get_option(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let timeout = match args.get(2) {
        None => DEFAULT_OPTION_TIMEOUT,
        Some(text) => match parse_timeout_ms(text) {
            Some(Some(timeout)) => timeout,
            Some(None) => DEFAULT_OPTION_TIMEOUT,
            None => return HandlerResult::ShowUsage,
        },
    };

    let playback = Playback {
        file: &args[0],
        escape_digits: &args[1],
        offset: 0,
    };
    let outcome = match ctx
        .channel
        .stream_file(&playback)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return playback_reply(Err(e), playback.file),
    };
    if outcome
        .digit
        .is_some()
    {
        return HandlerResult::Success(
            Reply::digit(outcome.digit).endpos(outcome.end_position),
        );
    }

    match ctx
        .channel
        .wait_for_digit(Some(timeout))
        .await
    {
        Ok(digit) => HandlerResult::Success(
            Reply::digit(digit).endpos(outcome.end_position),
        ),
        Err(e) => {
            debug!("GET OPTION wait failed: {}", e);
            HandlerResult::Failure(Some(
                Reply::new(-1).endpos(outcome.end_position),
            ))
        }
    }
}

pub(super) async fn get_data(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let timeout = match args.get(1) {
        None => None,
        Some(text) => match parse_timeout_ms(text) {
            Some(timeout) => timeout,
            None => return HandlerResult::ShowUsage,
        },
    };
    let max = match args.get(2) {
        None => DEFAULT_MAX_DIGITS,
        Some(text) => match text
            .trim()
            .parse::<usize>()
        {
            Ok(0) => DEFAULT_MAX_DIGITS,
            Ok(max) => max.min(DEFAULT_MAX_DIGITS),
            Err(_) => return HandlerResult::ShowUsage,
        },
    };

    match ctx
        .channel
        .read_digits(&args[0], timeout, max)
        .await
    {
        Ok(outcome) => {
            let mut reply = Reply::text(outcome.digits);
            if outcome.timed_out {
                reply = reply.payload("timeout");
            }
            HandlerResult::Success(reply)
        }
        Err(ChannelError::NotFound { what }) => {
            debug!("GET DATA prompt {} not found", what);
            HandlerResult::ok(-1)
        }
        Err(e) => channel_failure(&e),
    }
}

pub(super) async fn record_file(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let max_duration = match parse_timeout_ms(&args[3]) {
        Some(limit) => limit,
        None => return HandlerResult::ShowUsage,
    };

    let mut offset = 0;
    let mut beep = false;
    let mut silence = None;
    for option in &args[4..] {
        if option.eq_ignore_ascii_case("beep") {
            beep = true;
        } else if let Some(seconds) = option.strip_prefix("s=") {
            match seconds
                .trim()
                .parse::<u64>()
            {
                Ok(0) => silence = None,
                Ok(s) => silence = Some(Duration::from_secs(s)),
                Err(_) => return HandlerResult::ShowUsage,
            }
        } else if let Ok(samples) = option
            .trim()
            .parse::<u64>()
        {
            offset = samples;
        } else {
            return HandlerResult::ShowUsage;
        }
    }

    let recording = Recording {
        file: &args[0],
        format: &args[1],
        escape_digits: &args[2],
        max_duration,
        offset,
        beep,
        silence,
    };

    match ctx
        .channel
        .record_file(&recording)
        .await
    {
        Ok(outcome) => {
            let reply = match outcome.end {
                RecordEnd::Dtmf(digit) => Reply::digit(Some(digit)).payload("dtmf"),
                RecordEnd::Timeout | RecordEnd::Silence => Reply::new(0).payload("timeout"),
            };
            HandlerResult::Success(reply.endpos(outcome.end_position))
        }
        Err(ChannelError::Hangup) => HandlerResult::Failure(Some(
            Reply::new(-1)
                .endpos(0)
                .payload("hangup"),
        )),
        Err(e) => {
            debug!("RECORD FILE {}.{} failed: {}", recording.file, recording.format, e);
            HandlerResult::Success(Reply::new(-1).payload("writefile"))
        }
    }
}

async fn say(ctx: &mut CommandContext<'_>, request: SayRequest<'_>, escape: &str) -> HandlerResult {
    match ctx
        .channel
        .say(&request, escape)
        .await
    {
        Ok(digit) => digit_reply(digit),
        Err(e) => channel_failure(&e),
    }
}

fn parse_number(text: &str) -> Option<i64> {
    text.trim()
        .parse()
        .ok()
}

pub(super) async fn say_alpha(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    say(ctx, SayRequest::Alpha(&args[0]), &args[1]).await
}

pub(super) async fn say_phonetic(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    say(ctx, SayRequest::Phonetic(&args[0]), &args[1]).await
}

pub(super) async fn say_digits(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let digits = &args[0];
    if digits.is_empty()
        || !digits
            .chars()
            .all(|c| c.is_ascii_digit())
    {
        return HandlerResult::ShowUsage;
    }
    say(ctx, SayRequest::Digits(digits), &args[1]).await
}

pub(super) async fn say_number(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let Some(number) = parse_number(&args[0]) else {
        return HandlerResult::ShowUsage;
    };
    say(ctx, SayRequest::Number(number), &args[1]).await
}

pub(super) async fn say_date(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let Some(timestamp) = parse_number(&args[0]) else {
        return HandlerResult::ShowUsage;
    };
    say(ctx, SayRequest::Date(timestamp), &args[1]).await
}

pub(super) async fn say_time(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let Some(timestamp) = parse_number(&args[0]) else {
        return HandlerResult::ShowUsage;
    };
    say(ctx, SayRequest::Time(timestamp), &args[1]).await
}

pub(super) async fn say_datetime(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let Some(timestamp) = parse_number(&args[0]) else {
        return HandlerResult::ShowUsage;
    };
    let request = SayRequest::DateTime {
        timestamp,
        format: args
            .get(2)
            .map(String::as_str)
            .filter(|f| !f.is_empty()),
        zone: args
            .get(3)
            .map(String::as_str)
            .filter(|z| !z.is_empty()),
    };
    say(ctx, request, &args[1]).await
}
