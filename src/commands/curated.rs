use super::{guarded, render};
use crate::error::ScoutError;
use crate::state::Context;

/// List persisted startups by risk score
#[poise::command(slash_command, guild_only)]
pub async fn curated(
    ctx: Context<'_>,
    #[description = "Max startups to show"] limit: Option<u32>,
) -> Result<(), anyhow::Error> {
    let data = ctx.data();
    guarded(ctx, "curated", async move {
        let limit = match limit {
            Some(limit) => limit,
            None => data.scout_config.read().await.curated_limit,
        };
        let list = data
            .store
            .curated(limit as usize)
            .await
            .map_err(ScoutError::from)?;

        if list.is_empty() {
            return Ok(
                "No startups have been assessed yet. Run a scouting session with `/scout sector`."
                    .to_string(),
            );
        }
        Ok(render::curated(&list))
    })
    .await
}
