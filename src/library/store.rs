use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Extension of every playable file in the library.
pub const AUDIO_EXT: &str = "mp3";
const META_EXT: &str = "json";
const STAGING_DIR: &str = ".staging";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Destination already exists: {0}")]
    Conflict(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A playable file in a guild library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub path: PathBuf,
}

/// Sidecar stored next to each track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    /// Canonical title reported by the fetcher
    pub title: String,
    /// URL or search query the track was fetched from
    pub source: String,
    pub added_at: DateTime<Utc>,
}

/// On-disk layout: `<root>/<guild>/[<playlist>/]<id>.mp3`.
#[derive(Debug, Clone)]
pub struct LibraryStore {
    root: PathBuf,
}

impl LibraryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch directory for downloads that have not been stored yet.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn guild_dir(&self, guild: u64) -> PathBuf {
        self.root.join(guild.to_string())
    }

    pub fn collection_dir(&self, guild: u64, playlist: Option<&str>) -> PathBuf {
        match playlist {
            Some(name) => self.guild_dir(guild).join(name),
            None => self.guild_dir(guild),
        }
    }

    pub fn track_path(&self, guild: u64, playlist: Option<&str>, id: &str) -> PathBuf {
        self.collection_dir(guild, playlist)
            .join(format!("{}.{}", id, AUDIO_EXT))
    }

    fn meta_path(&self, guild: u64, playlist: Option<&str>, id: &str) -> PathBuf {
        self.collection_dir(guild, playlist)
            .join(format!("{}.{}", id, META_EXT))
    }

    /// A missing guild or playlist directory simply means "no".
    pub fn exists(&self, guild: u64, playlist: Option<&str>, id: &str) -> bool {
        self.track_path(guild, playlist, id).is_file()
    }

    pub fn resolve(&self, guild: u64, playlist: Option<&str>, id: &str) -> Option<Track> {
        let path = self.track_path(guild, playlist, id);
        path.is_file().then(|| Track {
            id: id.to_string(),
            path,
        })
    }

    /// Moves a freshly fetched file into the library.
    ///
    /// The audio is first moved to a hidden `.part` file next to the
    /// destination, then published under its real name with a hard link.
    /// Linking fails if the name is taken, so two stores racing for the same
    /// identifier cannot both succeed, and the real name never points at a
    /// half-written or empty file. On conflict `source_file` is left in place.
    pub fn store(
        &self,
        guild: u64,
        playlist: Option<&str>,
        id: &str,
        source_file: &Path,
        meta: Option<&TrackMeta>,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.collection_dir(guild, playlist);
        fs::create_dir_all(&dir)?;

        let dest = self.track_path(guild, playlist, id);
        if dest.exists() {
            return Err(StoreError::Conflict(id.to_string()));
        }

        let staged_name = source_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pending = dir.join(format!(".{}.{}.part", id, staged_name));
        move_file(source_file, &pending)?;

        if let Err(e) = publish(&pending, &dest) {
            if let Err(restore) = move_file(&pending, source_file) {
                warn!("Failed to restore {:?}: {}", source_file, restore);
                let _ = fs::remove_file(&pending);
            }
            return Err(match e.kind() {
                io::ErrorKind::AlreadyExists => StoreError::Conflict(id.to_string()),
                _ => e.into(),
            });
        }

        if let Some(meta) = meta {
            if let Err(e) = self.write_meta(guild, playlist, id, meta) {
                warn!("Failed to write metadata for {}: {}", id, e);
            }
        }

        info!("Stored {:?}", dest);
        Ok(dest)
    }

    fn write_meta(
        &self,
        guild: u64,
        playlist: Option<&str>,
        id: &str,
        meta: &TrackMeta,
    ) -> io::Result<()> {
        let file = File::create(self.meta_path(guild, playlist, id))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, meta)?;
        Ok(())
    }

    pub fn metadata(&self, guild: u64, playlist: Option<&str>, id: &str) -> Option<TrackMeta> {
        let raw = fs::read_to_string(self.meta_path(guild, playlist, id)).ok()?;
        match serde_json::from_str(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!("Ignoring corrupt metadata for {}: {}", id, e);
                None
            }
        }
    }

    /// Identifier of a track already fetched from `source`, if any.
    pub fn find_by_source(
        &self,
        guild: u64,
        playlist: Option<&str>,
        source: &str,
    ) -> Option<String> {
        let ids = self.list(guild, playlist).ok()?;
        ids.into_iter().find(|id| {
            self.metadata(guild, playlist, id)
                .is_some_and(|meta| meta.source == source)
        })
    }

    /// Track identifiers in directory listing order.
    ///
    /// The order is whatever the filesystem returns; it is not the order
    /// the tracks were added in.
    pub fn list(&self, guild: u64, playlist: Option<&str>) -> Result<Vec<String>, StoreError> {
        let dir = self.collection_dir(guild, playlist);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || is_hidden(&path) {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(AUDIO_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        Ok(ids)
    }

    pub fn list_tracks(
        &self,
        guild: u64,
        playlist: Option<&str>,
    ) -> Result<Vec<Track>, StoreError> {
        Ok(self
            .list(guild, playlist)?
            .into_iter()
            .map(|id| {
                let path = self.track_path(guild, playlist, &id);
                Track { id, path }
            })
            .collect())
    }

    pub fn list_playlists(&self, guild: u64) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(self.guild_dir(guild)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() && !is_hidden(&path) {
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Gives `pending` its final name, failing with `AlreadyExists` if taken.
fn publish(pending: &Path, dest: &Path) -> io::Result<()> {
    match fs::hard_link(pending, dest) {
        Ok(()) => fs::remove_file(pending),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(e) => {
            // No hard links on this filesystem: reserve the name, then rename
            // over the reservation. The name is empty only for that instant.
            warn!("Hard link into {:?} failed ({}), renaming instead", dest, e);
            OpenOptions::new().write(true).create_new(true).open(dest)?;
            fs::rename(pending, dest).inspect_err(|_| {
                let _ = fs::remove_file(dest);
            })
        }
    }
}

/// Rename, falling back to copy + remove when the staging directory sits
/// on another filesystem.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn staged(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn exists_tolerates_missing_directories() {
        let root = tempdir().unwrap();
        let store = LibraryStore::new(root.path().join("nowhere"));
        assert!(!store.exists(1, None, "song"));
        assert!(!store.exists(1, Some("mix"), "song"));
        assert!(store.list(1, None).unwrap().is_empty());
        assert!(store.list_playlists(1).unwrap().is_empty());
    }

    #[test]
    fn store_moves_file_into_place() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let store = LibraryStore::new(root.path());

        let src = staged(scratch.path(), "dl.mp3", b"audio");
        let dest = store.store(42, None, "Song_A", &src, None).unwrap();

        assert_eq!(dest, root.path().join("42").join("Song_A.mp3"));
        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"audio");
        assert!(store.exists(42, None, "Song_A"));
        assert_eq!(store.list(42, None).unwrap(), vec!["Song_A".to_string()]);
    }

    #[test]
    fn store_refuses_to_overwrite() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let store = LibraryStore::new(root.path());

        let first = staged(scratch.path(), "a.mp3", b"first");
        store.store(7, Some("mix"), "tune", &first, None).unwrap();

        let second = staged(scratch.path(), "b.mp3", b"second");
        let err = store.store(7, Some("mix"), "tune", &second, None).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(id) if id == "tune"));

        let kept = fs::read(store.track_path(7, Some("mix"), "tune")).unwrap();
        assert_eq!(kept, b"first");
        assert!(second.exists());
    }

    #[test]
    fn store_leaves_no_partial_files_behind() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let store = LibraryStore::new(root.path());

        let first = staged(scratch.path(), "a.mp3", b"first");
        store.store(3, None, "tune", &first, None).unwrap();
        let second = staged(scratch.path(), "b.mp3", b"second");
        assert!(store.store(3, None, "tune", &second, None).is_err());

        let mut names: Vec<String> = fs::read_dir(store.guild_dir(3))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["tune.mp3".to_string()]);
        assert_eq!(fs::read(store.track_path(3, None, "tune")).unwrap(), b"first");
    }

    #[test]
    fn interrupted_store_does_not_claim_the_name() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let store = LibraryStore::new(root.path());

        // What a crash between moving and publishing leaves on disk.
        fs::create_dir_all(store.guild_dir(3)).unwrap();
        fs::write(store.guild_dir(3).join(".tune.dl.mp3.part"), b"half").unwrap();

        assert!(!store.exists(3, None, "tune"));
        assert!(store.resolve(3, None, "tune").is_none());
        assert!(store.list(3, None).unwrap().is_empty());

        let src = staged(scratch.path(), "dl.mp3", b"whole");
        store.store(3, None, "tune", &src, None).unwrap();
        assert_eq!(fs::read(store.track_path(3, None, "tune")).unwrap(), b"whole");
    }

    #[test]
    fn failed_move_releases_the_reservation() {
        let root = tempdir().unwrap();
        let store = LibraryStore::new(root.path());

        let missing = root.path().join("never-downloaded.mp3");
        let err = store.store(7, None, "ghost", &missing, None).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(!store.exists(7, None, "ghost"));
    }

    #[test]
    fn list_ignores_sidecars_and_other_files() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let store = LibraryStore::new(root.path());

        let meta = TrackMeta {
            title: "Song A".to_string(),
            source: "https://example/a".to_string(),
            added_at: Utc::now(),
        };
        let src = staged(scratch.path(), "a.mp3", b"a");
        store.store(1, None, "Song_A", &src, Some(&meta)).unwrap();
        fs::write(store.guild_dir(1).join("notes.txt"), b"x").unwrap();
        fs::write(store.guild_dir(1).join(".hidden.mp3"), b"x").unwrap();
        fs::create_dir_all(store.collection_dir(1, Some("chill"))).unwrap();

        assert_eq!(store.list(1, None).unwrap(), vec!["Song_A".to_string()]);
        assert_eq!(store.list_playlists(1).unwrap(), vec!["chill".to_string()]);
        assert_eq!(store.metadata(1, None, "Song_A"), Some(meta));
        assert_eq!(
            store.find_by_source(1, None, "https://example/a"),
            Some("Song_A".to_string())
        );
        assert_eq!(store.find_by_source(1, None, "https://example/b"), None);
        assert_eq!(store.find_by_source(1, Some("chill"), "https://example/a"), None);
    }

    #[test]
    fn corrupt_sidecar_does_not_hide_track() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let store = LibraryStore::new(root.path());

        let src = staged(scratch.path(), "a.mp3", b"a");
        store.store(1, None, "tune", &src, None).unwrap();
        fs::write(store.guild_dir(1).join("tune.json"), b"{not json").unwrap();

        assert!(store.metadata(1, None, "tune").is_none());
        assert!(store.resolve(1, None, "tune").is_some());
    }

    #[test]
    fn playlists_are_isolated_from_default_collection() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let store = LibraryStore::new(root.path());

        let src = staged(scratch.path(), "a.mp3", b"a");
        store.store(1, Some("party"), "tune", &src, None).unwrap();

        assert!(store.exists(1, Some("party"), "tune"));
        assert!(!store.exists(1, None, "tune"));
        assert!(!store.exists(2, Some("party"), "tune"));

        let tracks = store.list_tracks(1, Some("party")).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].path, root.path().join("1").join("party").join("tune.mp3"));
    }
}
