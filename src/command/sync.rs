use crate::Context;
use crate::Error;

/// Register or unregister the slash commands, here or globally
#[poise::command(prefix_command, owners_only, hide_in_help)]
pub async fn sync(ctx: Context<'_>) -> Result<(), Error> {
    poise::builtins::register_application_commands_buttons(ctx).await?;
    Ok(())
}
