use crate::state::Context;

const PARAMS: &str =
    "`num_startups`, `max_parallel_assessments`, `curated_limit`, `max_tokens`, `discovery_max_tokens`";

/// Configure scouting parameters (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "num_startups | max_parallel_assessments | curated_limit | max_tokens | discovery_max_tokens"]
    param: Option<String>,
    #[description = "New value"] value: Option<u32>,
) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    if !ctx.data().is_admin(user_id) {
        ctx.say("This command is admin-only.").await?;
        return Ok(());
    }

    match (param.as_deref(), value) {
        // Show current config
        (None, _) => {
            let config = ctx.data().scout_config.read().await;
            let text = format!(
                "**Scout Configuration:**\n\
                 `num_startups`: {}\n\
                 `max_parallel_assessments`: {}\n\
                 `curated_limit`: {}\n\
                 `max_tokens`: {}\n\
                 `discovery_max_tokens`: {}\n\
                 Sectors: {}",
                config.num_startups,
                config.max_parallel_assessments,
                config.curated_limit,
                config.max_tokens,
                config.discovery_max_tokens,
                config.sectors.join(", ")
            );
            drop(config);
            ctx.say(text).await?;
        }
        (Some(_), Some(0)) => {
            ctx.say("Values must be at least 1.").await?;
        }
        // Set a parameter
        (Some(key), Some(val)) => {
            let mut config = ctx.data().scout_config.write().await;
            let slot = match key {
                "num_startups" => Some(&mut config.num_startups),
                "max_parallel_assessments" => Some(&mut config.max_parallel_assessments),
                "curated_limit" => Some(&mut config.curated_limit),
                "max_tokens" => Some(&mut config.max_tokens),
                "discovery_max_tokens" => Some(&mut config.discovery_max_tokens),
                _ => None,
            };
            let reply = match slot {
                Some(slot) => {
                    *slot = val;
                    format!("`{}` set to {}", key, val)
                }
                None => format!("Unknown param `{}`. Valid: {}", key, PARAMS),
            };
            drop(config);
            ctx.say(reply).await?;
        }
        (Some(_), None) => {
            ctx.say("Provide both `param` and `value`. Example: `/scout config num_startups 8`")
                .await?;
        }
    }

    Ok(())
}
