use crate::Context;
use crate::Error;

const HELP_TEXT: &str = "**Music commands**\n\
    `/join` - Join your voice channel\n\
    `/leave` - Stop and leave the voice channel\n\
    `/play <song> [playlist]` - Play one song\n\
    `/playlist <name>` - Play a whole playlist in order\n\
    `/stop` - Stop the music and clear the queue\n\
    `/nowplaying` - Show the current song and what comes next\n\
    \n\
    **Library commands**\n\
    `/add <url> [title] [playlist]` - Download a song (URL or search terms)\n\
    `/songlist [playlist]` - List songs\n\
    `/playlists` - List playlists";

/// Show the available commands
#[poise::command(prefix_command, slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(HELP_TEXT).await?;
    Ok(())
}
