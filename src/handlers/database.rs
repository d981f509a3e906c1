//! DATABASE verbs over the key-value store collaborator.

use super::CommandContext;
use crate::reply::{HandlerResult, Reply};
use tracing::warn;

pub(super) fn get(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    match ctx
        .services
        .store
        .get(&args[0], &args[1])
    {
        Ok(Some(value)) => HandlerResult::Success(Reply::new(1).payload(value)),
        Ok(None) => HandlerResult::ok(0),
        Err(e) => {
            warn!("DATABASE GET /{}/{} failed: {}", args[0], args[1], e);
            HandlerResult::ok(0)
        }
    }
}

pub(super) fn put(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    match ctx
        .services
        .store
        .put(&args[0], &args[1], &args[2])
    {
        Ok(()) => HandlerResult::ok(1),
        Err(e) => {
            warn!("DATABASE PUT /{}/{} failed: {}", args[0], args[1], e);
            HandlerResult::ok(0)
        }
    }
}

pub(super) fn del(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    match ctx
        .services
        .store
        .del(&args[0], &args[1])
    {
        Ok(true) => HandlerResult::ok(1),
        Ok(false) => HandlerResult::ok(0),
        Err(e) => {
            warn!("DATABASE DEL /{}/{} failed: {}", args[0], args[1], e);
            HandlerResult::ok(0)
        }
    }
}

pub(super) fn deltree(ctx: &mut CommandContext<'_>, args: &[String]) -> HandlerResult {
    let keytree = args
        .get(1)
        .map(String::as_str)
        .filter(|t| !t.is_empty());
    match ctx
        .services
        .store
        .deltree(&args[0], keytree)
    {
        Ok(0) => HandlerResult::ok(0),
        Ok(_) => HandlerResult::ok(1),
        Err(e) => {
            warn!("DATABASE DELTREE /{} failed: {}", args[0], e);
            HandlerResult::ok(0)
        }
    }
}
