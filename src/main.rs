use anyhow::Context as _;
use dotenvy::dotenv;
use poise::serenity_prelude as serenity;
use serenity::{Client, model::gateway::GatewayIntents};
use songbird::SerenityInit;
use std::{sync::Arc, time::Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod command;
mod config;
mod error;
mod fetch;
mod library;
mod player;
mod voice;

use config::Config;
use fetch::YtDlpFetcher;
use library::LibraryStore;
use player::{CoordinatorRegistry, DiscordNotifier, TrackAcquirer};
use voice::SongbirdTransport;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

pub struct Data {
    pub coordinators: CoordinatorRegistry,
    pub acquirer: TrackAcquirer,
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => panic!("Failed to start bot: {:?}", error),
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command `{}`: {:?}", ctx.command().name, error);
            let _ = ctx.say("Something went wrong while running that command.").await;
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e)
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.library_dir).with_context(|| {
        format!("Failed to create library directory {}", config.library_dir.display())
    })?;
    info!("Library at {}", config.library_dir.display());

    let options = poise::FrameworkOptions {
        commands: command::commands(),
        prefix_options: poise::PrefixFrameworkOptions {
            prefix: Some("/".into()),
            edit_tracker: Some(Arc::new(poise::EditTracker::for_timespan(
                Duration::from_secs(3600),
            ))),
            ..Default::default()
        },
        on_error: |error| Box::pin(on_error(error)),
        pre_command: |ctx| {
            Box::pin(async move {
                info!(
                    "Executing command {} for {}",
                    ctx.command().qualified_name,
                    ctx.author().name
                );
            })
        },
        post_command: |ctx| {
            Box::pin(async move {
                info!("Executed command {}", ctx.command().qualified_name);
            })
        },
        ..Default::default()
    };

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_VOICE_STATES;

    let token = config.discord_token.clone();

    let framework = poise::Framework::builder()
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                if let Some(guild_id) = config.guild_id {
                    let guild_id = serenity::GuildId::new(guild_id);
                    poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id)
                        .await?;
                    info!("Registered commands for guild {}", guild_id);
                }

                let manager = songbird::get(ctx)
                    .await
                    .ok_or("Songbird voice client not initialized")?
                    .clone();

                let library = LibraryStore::new(&config.library_dir);
                let fetcher = YtDlpFetcher::new(&config.ytdlp_path, config.audio_bitrate.as_str());

                Ok(Data {
                    coordinators: CoordinatorRegistry::new(
                        library.clone(),
                        Arc::new(SongbirdTransport::new(manager)),
                        Arc::new(DiscordNotifier::new(ctx.http.clone())),
                    ),
                    acquirer: TrackAcquirer::new(
                        library,
                        Arc::new(fetcher),
                        config.fetch_timeout,
                        config.max_concurrent_fetches,
                    ),
                })
            })
        })
        .options(options)
        .build();

    let mut client = Client::builder(token, intents)
        .framework(framework)
        .register_songbird()
        .await?;

    client.start().await?;
    Ok(())
}
