mod commands;
mod contracts;
mod discovery;
mod error;
mod llm;
mod model;
mod risk;
mod state;
mod store;
mod workflow;

use std::collections::HashSet;
use std::sync::Arc;

use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkError, FrameworkOptions};
use tokio::sync::RwLock;
use tracing::{error, info, warn, Level};

use llm::http::{LlmClient, GENERAL_DEFAULTS, SEARCH_DEFAULTS};
use llm::retry::RetryPolicy;
use llm::CompletionClient;
use state::{AppState, Context, ScoutConfig, SessionRegistry};
use store::DealStore;
use workflow::Services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();
    commands::install_panic_hook();

    // Load env
    let _ = dotenv::dotenv();
    let token = dotenv::var("DISCORD_TOKEN")
        .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN required"))?;
    let guild_id: Option<serenity::GuildId> = dotenv::var("DISCORD_GUILD_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    // Init storage
    let data_dir = std::path::PathBuf::from(
        dotenv::var("SCOUT_DATA_DIR").unwrap_or_else(|_| "./data/scout".to_string()),
    );
    let store = Arc::new(DealStore::open(&data_dir, &RetryPolicy::default()).await?);
    store.seed().await?;
    let sectors: Vec<String> = store.sectors().await?.into_iter().map(|s| s.name).collect();
    info!(sectors = sectors.len(), "Deal store initialized at {:?}", data_dir);

    // Init LLM clients
    let general = LlmClient::from_env("LLM", &GENERAL_DEFAULTS)?;
    let search = LlmClient::from_env("SEARCH_LLM", &SEARCH_DEFAULTS)?
        .with_api_key(dotenv::var("PERPLEXITY_API_KEY").ok());
    for client in [&general, &search] {
        if !client.has_api_key() {
            warn!(model = client.model(), "No API key configured for completion provider");
        }
    }
    info!(
        general = general.model(),
        search = search.model(),
        "LLM clients initialized"
    );

    // Parse admin user IDs from env
    let admin_ids: HashSet<u64> = dotenv::var("ADMIN_USER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect();
    if !admin_ids.is_empty() {
        info!(count = admin_ids.len(), "Admin users configured");
    }

    let mut config = ScoutConfig::default();
    if !sectors.is_empty() {
        config.sectors = sectors;
    }
    let scout_config = Arc::new(RwLock::new(config));

    let services = Services {
        general: CompletionClient::new(Arc::new(general)),
        search: CompletionClient::new(Arc::new(search)),
        config: scout_config.clone(),
        store: Some(store.clone()),
    };

    let app_state = AppState {
        store,
        sessions: SessionRegistry::new(services),
        admin_ids,
        scout_config,
    };

    let intents =
        serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_MESSAGES;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::scout()],
            on_error: |err| Box::pin(on_error(err)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                info!("Registering {} top-level command(s):", commands.len());
                for cmd in commands {
                    info!("  /{} ({} subcommands)", cmd.name, cmd.subcommands.len());
                    for sub in &cmd.subcommands {
                        info!("    /{} {}", cmd.name, sub.name);
                    }
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        gid,
                    )
                    .await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    )
                    .await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting DeepScout Discord bot...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}

/// Last-resort handler for errors that escape a command.
async fn on_error(err: FrameworkError<'_, AppState, anyhow::Error>) {
    match err {
        FrameworkError::Command { error, ctx, .. } => {
            error!(command = %ctx.command().qualified_name, "Command error: {:#}", error);
            reply_generic(ctx).await;
        }
        FrameworkError::CommandPanic { payload, ctx, .. } => {
            error!(
                command = %ctx.command().qualified_name,
                payload = payload.as_deref().unwrap_or("unknown"),
                "Command panicked"
            );
            reply_generic(ctx).await;
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling framework error: {}", e);
            }
        }
    }
}

async fn reply_generic(ctx: Context<'_>) {
    if let Err(e) = ctx
        .say("Something went wrong on our side. Please try again in a moment.")
        .await
    {
        error!("Failed to send error reply: {}", e);
    }
}
