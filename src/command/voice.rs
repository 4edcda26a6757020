use super::{MusicRequest, respond};
use crate::Context;
use crate::Error;

/// Join the voice channel you are in
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn join(ctx: Context<'_>) -> Result<(), Error> {
    respond(ctx, Ok(MusicRequest::Join)).await
}

/// Stop playback and leave the voice channel
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn leave(ctx: Context<'_>) -> Result<(), Error> {
    respond(ctx, Ok(MusicRequest::Leave)).await
}
