use tracing::info;

use super::{guarded, render, with_session};
use crate::error::ScoutError;
use crate::state::Context;
use crate::workflow::Stage;

/// Go back one stage
#[poise::command(slash_command, guild_only)]
pub async fn back(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    with_session(ctx, "back", |c| {
        Box::pin(async move {
            c.go_back()?;
            Ok(render::status(&c.view()))
        })
    })
    .await
}

/// Return to an earlier stage, discarding later work
#[poise::command(slash_command, guild_only)]
pub async fn rewind(
    ctx: Context<'_>,
    #[description = "sector | discovery | risk | summary"] stage: String,
) -> Result<(), anyhow::Error> {
    with_session(ctx, "rewind", |c| {
        Box::pin(async move {
            let target: Stage = stage.parse().map_err(ScoutError::InvalidSelection)?;
            c.rewind_to(target)?;
            Ok(render::status(&c.view()))
        })
    })
    .await
}

/// Start over from sector selection
#[poise::command(slash_command, guild_only)]
pub async fn reset(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let data = ctx.data();
    let user_id = ctx.author().id.get();
    guarded(ctx, "reset", async move {
        data.sessions.remove(user_id).await;
        info!(user_id, "Session reset");
        Ok("Session cleared. Start with `/scout sector <name>`.".to_string())
    })
    .await
}

/// Show the current stage and everything gathered so far
#[poise::command(slash_command, guild_only)]
pub async fn status(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    with_session(ctx, "status", |c| {
        Box::pin(async move { Ok(render::status(&c.view())) })
    })
    .await
}
