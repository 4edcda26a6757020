use thiserror::Error;

use crate::library::StoreError;

/// Every failure a music command can report back to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MusicError {
    #[error("You need to be in a voice channel to use this command.")]
    NoVoiceChannel,
    #[error("I'm already connected to another voice channel in this server.")]
    AlreadyConnectedElsewhere,
    #[error("Already playing audio. Use `/stop` first.")]
    AlreadyPlaying,
    #[error("No music is currently playing.")]
    NothingPlaying,
    #[error("I'm not connected to a voice channel.")]
    NotConnected,
    #[error("Song not found: {0}")]
    TrackNotFound(String),
    #[error("Playlist not found or empty: {0}")]
    PlaylistNotFound(String),
    #[error("A song named {0} already exists.")]
    AlreadyExists(String),
    #[error("Invalid name: {0:?}")]
    InvalidName(String),
    #[error("Error downloading the audio: {0}")]
    FetchFailed(String),
    #[error("Storage error: {0}")]
    StoreIOError(String),
    #[error("Playback error: {0}")]
    StreamError(String),
    #[error("Failed to join voice channel: {0}")]
    ConnectFailed(String),
    #[error("The player for this server has shut down.")]
    CoordinatorGone,
}

impl From<StoreError> for MusicError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(id) => MusicError::AlreadyExists(id),
            StoreError::Io(e) => MusicError::StoreIOError(e.to_string()),
        }
    }
}

pub type MusicResult<T> = Result<T, MusicError>;
