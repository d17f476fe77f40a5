use tracing::info;

use super::{render, with_session};
use crate::state::Context;

/// Choose a sector and get its briefing
#[poise::command(slash_command, guild_only)]
pub async fn sector(
    ctx: Context<'_>,
    #[description = "Sector to explore"]
    #[autocomplete = "autocomplete_sector"]
    name: String,
) -> Result<(), anyhow::Error> {
    info!(user = ctx.author().name, sector = %name, "Sector requested");
    with_session(ctx, "sector", |c| {
        Box::pin(async move {
            let sector = c.select_sector(&name).await?;
            Ok(render::sector_briefing(sector))
        })
    })
    .await
}

/// Choose a sub-sector of the current sector
#[poise::command(slash_command, guild_only)]
pub async fn subsector(
    ctx: Context<'_>,
    #[description = "Sub-sector from the briefing"]
    #[autocomplete = "autocomplete_sub_sector"]
    name: String,
) -> Result<(), anyhow::Error> {
    with_session(ctx, "subsector", |c| {
        Box::pin(async move {
            let sub_sector = c.select_sub_sector(&name)?;
            Ok(format!(
                "Sub-sector set to **{}**. Run `/scout advance` to discover startups.",
                sub_sector
            ))
        })
    })
    .await
}

/// Questions to help pick a promising sector
#[poise::command(slash_command, guild_only)]
pub async fn questions(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    with_session(ctx, "questions", |c| {
        Box::pin(async move {
            let questions = c.sector_questions().await?;
            Ok(format!("**Questions to consider**\n{}", questions))
        })
    })
    .await
}

/// Autocomplete for sector names from the configured list.
async fn autocomplete_sector(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let config = ctx.data().scout_config.read().await;
    let partial = partial.to_lowercase();
    config
        .sectors
        .iter()
        .filter(|s| s.to_lowercase().contains(&partial))
        .take(25)
        .cloned()
        .collect()
}

/// Autocomplete for sub-sectors of the user's current briefing.
async fn autocomplete_sub_sector(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let controller = ctx.data().sessions.get(ctx.author().id.get()).await;
    // Skip while a long action holds the session.
    let Ok(guard) = controller.try_lock() else {
        return Vec::new();
    };
    let partial = partial.to_lowercase();
    let names = guard
        .session()
        .sector
        .iter()
        .flat_map(|s| s.sub_sectors.iter())
        .filter(|s| s.name.to_lowercase().contains(&partial))
        .take(25)
        .map(|s| s.name.clone())
        .collect();
    names
}
