//! Dialplan position, channel variables and application execution.

use super::CommandContext;
use crate::{
    reply::{HandlerResult, Reply},
    services::AppOutcome,
};
use tracing::{debug, warn};

pub(super) fn set_context(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    ctx.channel
        .set_context(&args[0]);
    HandlerResult::ok(0)
}

pub(super) fn set_extension(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    ctx.channel
        .set_extension(&args[0]);
    HandlerResult::ok(0)
}

/// Accepts a numeric priority or a label in the current extension
pub(super) fn set_priority(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let target = args[0].trim();
    let priority = match target.parse::<i32>() {
        Ok(priority) => priority,
        Err(_) => match ctx
            .channel
            .find_label(target)
        {
            Some(priority) => priority,
            None => {
                debug!("SET PRIORITY: no label {}", target);
                return HandlerResult::ok(-1);
            }
        },
    };
    ctx.channel
        .set_priority(priority);
    HandlerResult::ok(0)
}

pub(super) fn get_variable(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    match ctx
        .channel
        .get_variable(&args[0])
    {
        Some(value) => HandlerResult::Success(Reply::new(1).payload(value)),
        None => HandlerResult::ok(0),
    }
}

pub(super) fn set_variable(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    ctx.channel
        .set_variable(&args[0], &args[1]);
    HandlerResult::ok(1)
}

pub(super) async fn get_full_variable(
    ctx: &mut CommandContext<'_>,
    args: &[String],
) -> HandlerResult {
    let expression = &args[0];
    let other = args
        .get(1)
        .filter(|name| {
            !name.eq_ignore_ascii_case(
                ctx.channel
                    .name(),
            )
        });

    let value = match other {
        None => ctx
            .channel
            .substitute(expression),
        Some(name) => match ctx
            .services
            .channels
            .lock_by_name(name)
            .await
        {
            Some(guard) => guard.substitute(expression),
            None => return HandlerResult::ok(0),
        },
    };
    HandlerResult::Success(Reply::new(1).payload(value))
}

/// A negative application result means the channel is gone.
pub(super) async fn exec(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let application = &args[0];
    let options = args
        .get(1)
        .map(String::as_str)
        .unwrap_or("");

    debug!("EXEC {}({})", application, options);
    let outcome = ctx
        .services
        .applications
        .execute(&mut *ctx.channel, application, options)
        .await;

    match outcome {
        None => {
            warn!("EXEC: could not find application {}", application);
            HandlerResult::ok(-2)
        }
        Some(AppOutcome::KeepAlive) => HandlerResult::KeepAlive,
        Some(AppOutcome::Completed(res)) if res < 0 => {
            HandlerResult::Failure(Some(Reply::new(i64::from(res))))
        }
        Some(AppOutcome::Completed(res)) => HandlerResult::ok(i64::from(res)),
    }
}
