use tracing::info;

use super::{render, with_session};
use crate::state::Context;
use crate::workflow::StageOutcome;

/// Move to the next stage
#[poise::command(slash_command, guild_only)]
pub async fn advance(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    info!(user = ctx.author().name, "Advance requested");
    with_session(ctx, "advance", |c| {
        Box::pin(async move {
            let outcome = c.advance_stage().await?;
            let mut reply = render::outcome(&c.view(), &outcome);
            if let StageOutcome::Discovered { .. } = outcome {
                reply.push_str(&render::tracked(&c.tracked_startups().await));
            }
            Ok(reply)
        })
    })
    .await
}

/// Search for startups again in the current sub-sector
#[poise::command(slash_command, guild_only)]
pub async fn discover(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    with_session(ctx, "discover", |c| {
        Box::pin(async move {
            c.discover().await?;
            let mut reply = render::candidates(&c.view());
            reply.push_str(&render::tracked(&c.tracked_startups().await));
            Ok(reply)
        })
    })
    .await
}

/// Confirm the startups to assess
#[poise::command(slash_command, guild_only)]
pub async fn confirm(
    ctx: Context<'_>,
    #[description = "Startup names, comma separated"] names: String,
) -> Result<(), anyhow::Error> {
    let names: Vec<String> = names.split(',').map(|n| n.trim().to_string()).collect();
    with_session(ctx, "confirm", |c| {
        Box::pin(async move {
            let confirmed = c.confirm_candidates(&names)?;
            Ok(format!(
                "Shortlist: **{}**. Run `/scout advance` to assess technology risk.",
                confirmed.join("**, **")
            ))
        })
    })
    .await
}
