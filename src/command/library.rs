use super::{MusicRequest, respond};
use crate::Context;
use crate::Error;

/// Download a song into the library or a playlist
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Video URL or search terms"] url: String,
    #[description = "Name to save the song under (leave empty to use the video title)"]
    title: Option<String>,
    #[description = "Playlist to add the song to"] playlist: Option<String>,
) -> Result<(), Error> {
    respond(
        ctx,
        MusicRequest::add(&url, title.as_deref(), playlist.as_deref()),
    )
    .await
}

/// List the songs in the library or in a playlist
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn songlist(
    ctx: Context<'_>,
    #[description = "Playlist to list (leave empty for the main library)"] playlist: Option<String>,
) -> Result<(), Error> {
    respond(ctx, MusicRequest::list_songs(playlist.as_deref())).await
}

/// List this server's playlists
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn playlists(ctx: Context<'_>) -> Result<(), Error> {
    respond(ctx, Ok(MusicRequest::ListPlaylists)).await
}
