use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Something that happened without a command waiting for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    NowPlaying { track: String, remaining: usize },
    StreamFailed { track: String, reason: String },
    QueueFinished { playlist: String },
    Disconnected { reason: Option<String> },
}

impl fmt::Display for PlaybackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackEvent::NowPlaying { track, remaining: 0 } => {
                write!(f, "Now playing {} (last in queue)", track)
            }
            PlaybackEvent::NowPlaying { track, remaining } => {
                write!(f, "Now playing {} ({} more queued)", track, remaining)
            }
            PlaybackEvent::StreamFailed { track, reason } => {
                write!(f, "Could not play {}: {}", track, reason)
            }
            PlaybackEvent::QueueFinished { playlist } => {
                write!(f, "Finished playlist {}", playlist)
            }
            PlaybackEvent::Disconnected { reason: None } => {
                write!(f, "Lost the voice connection, playback stopped")
            }
            PlaybackEvent::Disconnected { reason: Some(reason) } => {
                write!(f, "Lost the voice connection ({}), playback stopped", reason)
            }
        }
    }
}

/// Out-of-band channel for playback events.
///
/// The command that started playback has already sent its one reply, so
/// these go out as fresh messages.
#[async_trait]
pub trait PlaybackNotifier: Send + Sync {
    async fn notify(&self, guild: u64, text_channel: Option<u64>, event: PlaybackEvent);
}

/// Posts events to the text channel the play command came from.
pub struct DiscordNotifier {
    http: Arc<serenity::Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PlaybackNotifier for DiscordNotifier {
    async fn notify(&self, guild: u64, text_channel: Option<u64>, event: PlaybackEvent) {
        let Some(channel) = text_channel else {
            info!("Guild {}: {}", guild, event);
            return;
        };

        let channel = serenity::ChannelId::new(channel);
        if let Err(e) = channel.say(&self.http, event.to_string()).await {
            error!("Failed to send notification to {}: {:?}", channel, e);
        }
    }
}
