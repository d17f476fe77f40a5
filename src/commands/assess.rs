use super::{render, with_session};
use crate::state::Context;

/// Assess shortlisted startups that still lack a scorecard
#[poise::command(slash_command, guild_only)]
pub async fn assess(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    with_session(ctx, "assess", |c| {
        Box::pin(async move {
            let report = c.assess().await?;
            Ok(render::assessment_report(&c.view(), &report))
        })
    })
    .await
}

/// Regenerate the portfolio insights
#[poise::command(slash_command, guild_only)]
pub async fn insights(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    with_session(ctx, "insights", |c| {
        Box::pin(async move {
            let text = c.regenerate_insights().await?;
            Ok(format!("**Insights**\n{}", text))
        })
    })
    .await
}

/// Ask a follow-up question about one assessed startup
#[poise::command(slash_command, guild_only)]
pub async fn deepdive(
    ctx: Context<'_>,
    #[description = "Startup name"] startup: String,
    #[description = "Your question"] question: String,
) -> Result<(), anyhow::Error> {
    let user_mention = format!("<@{}>", ctx.author().id);
    with_session(ctx, "deepdive", |c| {
        Box::pin(async move {
            let answer = c.deep_dive(&startup, &question).await?;
            Ok(format!(
                "{} deep dive on **{}**\n**Q:** {}\n\n**A:** {}",
                user_mention, startup, question, answer
            ))
        })
    })
    .await
}
