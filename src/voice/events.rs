use songbird::{Event, EventContext, EventHandler, tracks::PlayMode};
use std::sync::{Arc, Mutex};
use tracing::warn;

use super::transport::{CompletionCallback, DisconnectCallback};

/// Shared between the end and error handlers of one track so the
/// completion callback runs once, whichever event arrives first.
pub type CompletionSlot = Arc<Mutex<Option<CompletionCallback>>>;

pub fn completion_slot(callback: CompletionCallback) -> CompletionSlot {
    Arc::new(Mutex::new(Some(callback)))
}

fn error_reason(mode: &PlayMode) -> Option<String> {
    match mode {
        PlayMode::Errored(e) => Some(format!("{:?}", e)),
        _ => None,
    }
}

/// Forwards songbird track events to the coordinator's completion callback.
pub struct TrackEndReceiver {
    slot: CompletionSlot,
}

impl TrackEndReceiver {
    pub fn new(slot: CompletionSlot) -> Self {
        Self { slot }
    }

    fn complete(&self, error: Option<String>) {
        let callback = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(callback) = callback {
            callback(error);
        }
    }
}

#[async_trait::async_trait]
impl EventHandler for TrackEndReceiver {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            let error = tracks
                .iter()
                .find_map(|(state, _)| error_reason(&state.playing));
            if let Some(ref e) = error {
                warn!("Track errored: {}", e);
            }
            self.complete(error);
        }

        // Track events are one-shot; remove the handler once it fired.
        Some(Event::Cancel)
    }
}

/// Tells the coordinator when the driver loses its voice connection, for
/// example after the bot is kicked from the channel.
pub struct ConnectionLostReceiver {
    on_disconnect: DisconnectCallback,
}

impl ConnectionLostReceiver {
    pub fn new(on_disconnect: DisconnectCallback) -> Self {
        Self { on_disconnect }
    }
}

#[async_trait::async_trait]
impl EventHandler for ConnectionLostReceiver {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            let reason = data.reason.as_ref().map(|r| format!("{:?}", r));
            warn!(
                "Voice connection in guild {:?} dropped ({:?}): {:?}",
                data.guild_id, data.kind, reason
            );
            (self.on_disconnect)(reason);
        }

        // Global event; stays registered for the life of the call.
        None
    }
}
