use crate::error::{MusicError, MusicResult};
use crate::library::sanitize;

/// A validated music command, ready for the coordinator or the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MusicRequest {
    Join,
    Leave,
    Stop,
    NowPlaying,
    Play {
        track: String,
        playlist: Option<String>,
    },
    PlayPlaylist {
        playlist: String,
    },
    Add {
        source: String,
        title: Option<String>,
        playlist: Option<String>,
    },
    ListSongs {
        playlist: Option<String>,
    },
    ListPlaylists,
}

impl MusicRequest {
    pub fn play(track: &str, playlist: Option<&str>) -> MusicResult<Self> {
        Ok(MusicRequest::Play {
            track: name(track)?,
            playlist: optional_name(playlist)?,
        })
    }

    pub fn play_playlist(playlist: &str) -> MusicResult<Self> {
        Ok(MusicRequest::PlayPlaylist {
            playlist: name(playlist)?,
        })
    }

    pub fn add(source: &str, title: Option<&str>, playlist: Option<&str>) -> MusicResult<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(MusicError::InvalidName(source.to_string()));
        }
        Ok(MusicRequest::Add {
            source: source.to_string(),
            title: optional_name(title)?,
            playlist: optional_name(playlist)?,
        })
    }

    pub fn list_songs(playlist: Option<&str>) -> MusicResult<Self> {
        Ok(MusicRequest::ListSongs {
            playlist: optional_name(playlist)?,
        })
    }

    /// Downloads can outlast the interaction deadline, so the reply is deferred.
    pub fn is_slow(&self) -> bool {
        matches!(self, MusicRequest::Add { .. })
    }
}

/// Validates a required name but keeps the user's spelling.
fn name(raw: &str) -> MusicResult<String> {
    sanitize(raw)?;
    Ok(raw.trim().to_string())
}

/// Blank optional arguments count as absent.
fn optional_name(raw: Option<&str>) -> MusicResult<Option<String>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => name(raw).map(Some),
        None => Ok(None),
    }
}
