mod assess;
mod config;
mod curated;
mod navigation;
mod render;
mod sector;
mod startups;

use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::{AssertUnwindSafe, Location};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::error::ScoutError;
use crate::state::Context;
use crate::workflow::Controller;

const GENERIC_FAILURE: &str = "Something went wrong on our side. Please try again in a moment.";

/// DeepScout - deeptech deal-flow wizard
#[poise::command(
    slash_command,
    subcommands(
        "sector::sector",
        "sector::subsector",
        "sector::questions",
        "startups::advance",
        "startups::discover",
        "startups::confirm",
        "assess::assess",
        "assess::insights",
        "assess::deepdive",
        "navigation::back",
        "navigation::rewind",
        "navigation::reset",
        "navigation::status",
        "curated::curated",
        "config::config"
    )
)]
pub async fn scout(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// Run a wizard action against the invoking user's session.
///
/// The session stays locked for the whole action. Errors and panics are logged and
/// answered here; a panic also resets the session.
pub(crate) async fn with_session<F>(
    ctx: Context<'_>,
    action: &'static str,
    f: F,
) -> Result<(), anyhow::Error>
where
    F: for<'c> FnOnce(&'c mut Controller) -> BoxFuture<'c, Result<String, ScoutError>> + Send,
{
    ctx.defer().await?;
    let controller = ctx.data().sessions.get(ctx.author().id.get()).await;
    let mut session = controller.lock().await;

    let reply = match AssertUnwindSafe(f(&mut *session)).catch_unwind().await {
        Ok(result) => describe(action, result),
        Err(panic) => {
            error!(action, panic = %panic_message(panic.as_ref()), "Command panicked, resetting session");
            session.reset();
            GENERIC_FAILURE.to_string()
        }
    };
    drop(session);

    send_chunked(&ctx, &reply).await
}

/// Same boundary for actions that do not touch the user's session.
pub(crate) async fn guarded<Fut>(
    ctx: Context<'_>,
    action: &'static str,
    work: Fut,
) -> Result<(), anyhow::Error>
where
    Fut: Future<Output = Result<String, ScoutError>> + Send,
{
    ctx.defer().await?;
    let reply = match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => describe(action, result),
        Err(panic) => {
            error!(action, panic = %panic_message(panic.as_ref()), "Command panicked");
            GENERIC_FAILURE.to_string()
        }
    };
    send_chunked(&ctx, &reply).await
}

/// Turn an action result into the user-facing reply, logging failures.
fn describe(action: &str, result: Result<String, ScoutError>) -> String {
    let err = match result {
        Ok(text) => return text,
        Err(e) => e,
    };
    match &err {
        ScoutError::PreconditionNotMet { .. } | ScoutError::InvalidSelection(_) => {
            info!(action, reason = %err, "Action rejected");
            capitalize(&err.to_string())
        }
        ScoutError::NoCandidatesFound => {
            warn!(action, "Discovery found no usable startups");
            "No usable startups came back. Try again, or pick a different sub-sector.".to_string()
        }
        _ if err.is_retryable() => {
            error!(action, error = %err, "Action failed");
            "The model's answer could not be used this time. Please try the same command again."
                .to_string()
        }
        _ => {
            error!(action, error = %err, "Action failed");
            GENERIC_FAILURE.to_string()
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Log every panic with its location and a stack trace. The command boundary only
/// sees the payload once unwinding reaches it.
pub(crate) fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        error!("Panic: {}", panic_report(info.location(), info.payload(), &backtrace));
    }));
}

fn panic_report(
    location: Option<&Location<'_>>,
    payload: &(dyn Any + Send),
    backtrace: &Backtrace,
) -> String {
    let at = location
        .map(|l| format!("{}:{}", l.file(), l.line()))
        .unwrap_or_else(|| "unknown location".to_string());
    format!("{} at {}\n{}", panic_message(payload), at, backtrace)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Send a message in Discord-safe chunks (max 1990 chars).
/// Uses ctx.say() for all chunks so follow-ups go through the interaction webhook.
pub(crate) async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    let mut remaining = text;
    while !remaining.is_empty() {
        let mut chunk_len = remaining.len().min(1990);
        while !remaining.is_char_boundary(chunk_len) {
            chunk_len -= 1;
        }
        let split_at = if chunk_len < remaining.len() {
            remaining[..chunk_len]
                .rfind('\n')
                .or_else(|| remaining[..chunk_len].rfind(' '))
                .map(|i| i + 1)
                .unwrap_or(chunk_len)
        } else {
            chunk_len
        };
        let chunk = &remaining[..split_at];
        remaining = &remaining[split_at..];

        ctx.say(chunk).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompletionError, ParseError};
    use crate::workflow::Stage;

    #[test]
    fn test_describe_user_errors_are_shown() {
        let reply = describe(
            "advance",
            Err(ScoutError::precondition(Stage::SectorSelection, "choose a sector first")),
        );
        assert_eq!(
            reply,
            "Cannot do that in the Sector Selection stage: choose a sector first"
        );
    }

    #[test]
    fn test_describe_hides_internal_failures() {
        let fatal = describe("sector", Err(CompletionError::Fatal("401 bad key".into()).into()));
        assert_eq!(fatal, GENERIC_FAILURE);
        assert!(!fatal.contains("401"));

        let parse = describe("advance", Err(ParseError::MalformedShape("x".into()).into()));
        assert!(parse.contains("try the same command again"));
        assert_eq!(describe("status", Ok("fine".into())), "fine");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }

    #[test]
    fn test_panic_report_includes_location_and_trace() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let backtrace = Backtrace::force_capture();
        let report = panic_report(Some(Location::caller()), payload.as_ref(), &backtrace);
        assert!(report.starts_with("boom at "));
        assert!(report.contains("mod.rs:"));
        assert!(report.contains(&backtrace.to_string()));

        let report = panic_report(None, payload.as_ref(), &Backtrace::disabled());
        assert!(report.starts_with("boom at unknown location\n"));
    }
}
