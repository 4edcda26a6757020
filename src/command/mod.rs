mod dispatch;
mod help;
mod library;
mod playback;
mod request;
mod sync;
mod voice;

pub use help::help;
pub use library::{add, playlists, songlist};
pub use playback::{nowplaying, play, playlist, stop};
pub use sync::sync;
pub use voice::{join, leave};

pub use dispatch::execute;
pub use request::MusicRequest;

use crate::Context;
use crate::Data;
use crate::Error;
use crate::error::MusicResult;
use crate::player::Requester;
use poise::serenity_prelude as serenity;
use tracing::warn;

/// Every command the bot registers.
pub fn commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        join(),
        leave(),
        play(),
        playlist(),
        stop(),
        nowplaying(),
        add(),
        songlist(),
        playlists(),
        help(),
        sync(),
    ]
}

/// The author's current voice channel, from the cache.
fn requester(ctx: Context<'_>, guild_id: serenity::GuildId) -> Requester {
    let cache = &ctx.serenity_context().cache;
    let voice_channel = cache.guild(guild_id).and_then(|guild| {
        guild
            .voice_states
            .get(&ctx.author().id)
            .and_then(|vs| vs.channel_id)
            .map(|id| id.get())
    });

    Requester {
        voice_channel,
        text_channel: Some(ctx.channel_id().get()),
    }
}

/// Runs a validated request and sends exactly one reply.
async fn respond(ctx: Context<'_>, request: MusicResult<MusicRequest>) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command must be used in a guild")?;

    let text = match request {
        Ok(request) => {
            if request.is_slow() {
                ctx.defer().await?;
            }
            let requester = requester(ctx, guild_id);
            match execute(ctx.data(), guild_id.get(), requester, request).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Command `{}` in guild {} failed: {}", ctx.command().name, guild_id, e);
                    e.to_string()
                }
            }
        }
        Err(e) => e.to_string(),
    };

    ctx.say(text).await?;
    Ok(())
}
