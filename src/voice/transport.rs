use async_trait::async_trait;
use std::path::Path;

use crate::error::MusicResult;

/// Called exactly once when a track stops, with the stream error if any.
pub type CompletionCallback = Box<dyn FnOnce(Option<String>) + Send + 'static>;

/// Called when the connection drops without being asked to, with the reason
/// if the driver gave one. May fire more than once.
pub type DisconnectCallback = Box<dyn Fn(Option<String>) + Send + Sync + 'static>;

/// Opens voice connections.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild: u64,
        channel: u64,
        on_disconnect: DisconnectCallback,
    ) -> MusicResult<Box<dyn VoiceConnection>>;
}

/// One live voice connection for one guild.
///
/// Implementations may assume a single `play` is active at a time; the
/// coordinator guarantees it.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// The channel the bot is in right now, which changes if it gets moved.
    /// `None` once the connection has dropped.
    async fn channel(&self) -> Option<u64>;

    /// Starts streaming `path` and returns immediately.
    ///
    /// `on_complete` fires after the stream ends, errors or is stopped.
    async fn play(&mut self, path: &Path, on_complete: CompletionCallback) -> MusicResult<()>;

    async fn stop(&mut self);

    async fn is_playing(&self) -> bool;

    async fn disconnect(self: Box<Self>);
}
