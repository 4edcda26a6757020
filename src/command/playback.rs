use super::{MusicRequest, respond};
use crate::Context;
use crate::Error;

/// Play one song from the library or from a playlist
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn play(
    ctx: Context<'_>,
    #[description = "Song name, as shown by /songlist"] song: String,
    #[description = "Playlist the song is in (leave empty for the main library)"] playlist: Option<
        String,
    >,
) -> Result<(), Error> {
    respond(ctx, MusicRequest::play(&song, playlist.as_deref())).await
}

/// Play every song in a playlist, in order
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn playlist(
    ctx: Context<'_>,
    #[description = "Playlist name, as shown by /playlists"] name: String,
) -> Result<(), Error> {
    respond(ctx, MusicRequest::play_playlist(&name)).await
}

/// Stop the music and clear the playlist queue
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn stop(ctx: Context<'_>) -> Result<(), Error> {
    respond(ctx, Ok(MusicRequest::Stop)).await
}

/// Show what is playing and what comes next
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn nowplaying(ctx: Context<'_>) -> Result<(), Error> {
    respond(ctx, Ok(MusicRequest::NowPlaying)).await
}
