use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use songbird::{
    Call, CoreEvent, Event, Songbird, TrackEvent,
    input::File,
    tracks::{PlayMode, TrackHandle},
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use super::events::{completion_slot, ConnectionLostReceiver, TrackEndReceiver};
use super::transport::{CompletionCallback, DisconnectCallback, VoiceConnection, VoiceTransport};
use crate::error::{MusicError, MusicResult};

/// [`VoiceTransport`] backed by the songbird manager registered on the client.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild: u64,
        channel: u64,
        on_disconnect: DisconnectCallback,
    ) -> MusicResult<Box<dyn VoiceConnection>> {
        let guild_id = serenity::GuildId::new(guild);
        let channel_id = serenity::ChannelId::new(channel);

        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Failed to join voice channel: {:?}", e);
            MusicError::ConnectFailed(e.to_string())
        })?;

        {
            let mut handler = call.lock().await;
            // The call outlives a kick, so drop handlers left by an earlier join.
            handler.remove_all_global_events();
            handler.add_global_event(
                CoreEvent::DriverDisconnect.into(),
                ConnectionLostReceiver::new(on_disconnect),
            );
        }

        info!("Joined voice channel {} in guild {}", channel, guild);

        Ok(Box::new(SongbirdConnection {
            manager: Arc::clone(&self.manager),
            call,
            guild,
            current: None,
        }))
    }
}

pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    guild: u64,
    current: Option<TrackHandle>,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn channel(&self) -> Option<u64> {
        let call = self.call.lock().await;
        call.current_channel().map(|id| id.0.get())
    }

    async fn play(&mut self, path: &Path, on_complete: CompletionCallback) -> MusicResult<()> {
        let input = File::new(path.to_path_buf());
        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input.into())
        };

        let slot = completion_slot(on_complete);
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(
                Event::Track(event),
                TrackEndReceiver::new(Arc::clone(&slot)),
            ) {
                let _ = handle.stop();
                return Err(MusicError::StreamError(e.to_string()));
            }
        }

        self.current = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(handle) = self.current.take() {
            if let Err(e) = handle.stop() {
                // Already finished; the end event has fired or is about to.
                info!("Stopping finished track in guild {}: {:?}", self.guild, e);
            }
        }
    }

    async fn is_playing(&self) -> bool {
        let Some(handle) = &self.current else {
            return false;
        };
        match handle.get_info().await {
            Ok(state) => matches!(state.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }

    async fn disconnect(mut self: Box<Self>) {
        self.stop().await;
        if let Err(e) = self.manager.remove(serenity::GuildId::new(self.guild)).await {
            error!("Failed to leave voice channel: {:?}", e);
        }
        info!("Left voice channel in guild {}", self.guild);
    }
}
