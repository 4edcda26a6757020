use chrono::Utc;
use dashmap::DashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{info, warn};

use crate::error::{MusicError, MusicResult};
use crate::fetch::{FetchedMedia, MediaFetcher};
use crate::library::{sanitize, LibraryStore, StoreError, TrackMeta};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    /// URL or search terms
    pub source: String,
    pub guild: u64,
    pub playlist: Option<String>,
    /// Preferred over the fetched title when naming the track
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedTrack {
    pub id: String,
    pub title: String,
    pub playlist: Option<String>,
    pub path: PathBuf,
}

/// Downloads tracks into the library.
///
/// Fetches run outside the guild coordinators, bounded by a semaphore and a
/// timeout. A track is never fetched twice: a supplied title is checked
/// before downloading, and an identifier that is currently downloading is
/// rejected.
pub struct TrackAcquirer {
    library: LibraryStore,
    fetcher: Arc<dyn MediaFetcher>,
    permits: Semaphore,
    fetch_timeout: Duration,
    in_flight: DashSet<PathBuf>,
    staging_seq: AtomicU64,
}

/// Marks a destination as being downloaded until dropped.
struct InFlight<'a> {
    set: &'a DashSet<PathBuf>,
    key: PathBuf,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

impl TrackAcquirer {
    pub fn new(
        library: LibraryStore,
        fetcher: Arc<dyn MediaFetcher>,
        fetch_timeout: Duration,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            library,
            fetcher,
            permits: Semaphore::new(max_concurrent_fetches.max(1)),
            fetch_timeout,
            in_flight: DashSet::new(),
            staging_seq: AtomicU64::new(0),
        }
    }

    pub fn library(&self) -> &LibraryStore {
        &self.library
    }

    fn claim(&self, guild: u64, playlist: Option<&str>, id: &str) -> MusicResult<InFlight<'_>> {
        let key = self.library.track_path(guild, playlist, id);
        if !self.in_flight.insert(key.clone()) {
            info!("{} is already being downloaded", id);
            return Err(MusicError::AlreadyExists(id.to_string()));
        }
        Ok(InFlight {
            set: &self.in_flight,
            key,
        })
    }

    pub async fn add_track(&self, request: AddRequest) -> MusicResult<AddedTrack> {
        let AddRequest {
            source,
            guild,
            playlist,
            title,
        } = request;

        let playlist = playlist.as_deref().map(sanitize).transpose()?;
        let playlist = playlist.as_deref();
        let wanted = title.as_deref().map(sanitize).transpose()?;

        let mut claims = Vec::with_capacity(1);
        match &wanted {
            Some(id) => {
                if self.library.exists(guild, playlist, id) {
                    return Err(MusicError::AlreadyExists(id.clone()));
                }
                claims.push(self.claim(guild, playlist, id)?);
            }
            None => {
                if let Some(existing) = self.library.find_by_source(guild, playlist, &source) {
                    return Err(MusicError::AlreadyExists(existing));
                }
            }
        }

        let media = self.fetch(guild, &source).await?;

        let id = match wanted {
            Some(id) => id,
            None => {
                let claimed = sanitize(&media.title).and_then(|id| {
                    if self.library.exists(guild, playlist, &id) {
                        return Err(MusicError::AlreadyExists(id));
                    }
                    let claim = self.claim(guild, playlist, &id)?;
                    Ok((id, claim))
                });
                match claimed {
                    Ok((id, claim)) => {
                        claims.push(claim);
                        id
                    }
                    Err(e) => {
                        discard(&media.path).await;
                        return Err(e);
                    }
                }
            }
        };

        let meta = TrackMeta {
            title: media.title.clone(),
            source,
            added_at: Utc::now(),
        };
        let library = self.library.clone();
        let store_playlist = playlist.map(str::to_string);
        let store_id = id.clone();
        let staged = media.path.clone();

        let stored = tokio::task::spawn_blocking(move || {
            library.store(guild, store_playlist.as_deref(), &store_id, &staged, Some(&meta))
        })
        .await;
        let path = settle_store(&media.path, stored).await?;
        drop(claims);

        info!("Added {} to guild {} ({:?})", id, guild, playlist);
        Ok(AddedTrack {
            id,
            title: media.title,
            playlist: playlist.map(str::to_string),
            path,
        })
    }

    async fn fetch(&self, guild: u64, source: &str) -> MusicResult<FetchedMedia> {
        let staging = self.library.staging_dir();
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| MusicError::StoreIOError(e.to_string()))?;

        let stem = staging.join(format!(
            "{}-{}-{}",
            guild,
            Utc::now().format("%Y%m%d%H%M%S"),
            self.staging_seq.fetch_add(1, Ordering::Relaxed)
        ));

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| MusicError::FetchFailed("downloads are shut down".to_string()))?;

        match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(source, &stem)).await {
            Ok(Ok(media)) => Ok(media),
            Ok(Err(e)) => {
                warn!("Fetching {} failed: {}", source, e);
                discard_partial(&stem).await;
                Err(MusicError::FetchFailed(e.to_string()))
            }
            Err(_) => {
                warn!("Fetching {} timed out", source);
                discard_partial(&stem).await;
                Err(MusicError::FetchFailed(format!(
                    "timed out after {}s",
                    self.fetch_timeout.as_secs()
                )))
            }
        }
    }
}

/// Unwraps the blocking store, removing the download whenever it did not
/// end up in the library.
async fn settle_store(
    staged: &Path,
    stored: Result<Result<PathBuf, StoreError>, JoinError>,
) -> MusicResult<PathBuf> {
    let error = match stored {
        Ok(Ok(path)) => return Ok(path),
        Ok(Err(e)) => MusicError::from(e),
        Err(e) => MusicError::StoreIOError(e.to_string()),
    };
    if tokio::fs::try_exists(staged).await.unwrap_or(false) {
        discard(staged).await;
    }
    Err(error)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove staged file {:?}: {}", path, e);
    }
}

/// Removes whatever an interrupted download left behind for `stem`.
async fn discard_partial(stem: &Path) {
    let (Some(dir), Some(name)) = (stem.parent(), stem.file_name().and_then(|n| n.to_str()))
    else {
        return;
    };
    let prefix = format!("{}.", name);

    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(&prefix));
        if matches {
            discard(&entry.path()).await;
        }
    }
}
