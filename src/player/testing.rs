//! In-memory stand-ins for the fetcher, the voice transport and the notifier.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use super::notifier::{PlaybackEvent, PlaybackNotifier};
use crate::error::{MusicError, MusicResult};
use crate::fetch::{FetchError, FetchedMedia, MediaFetcher};
use crate::library::LibraryStore;
use crate::voice::{CompletionCallback, DisconnectCallback, VoiceConnection, VoiceTransport};

pub struct MockFetcher {
    calls: AtomicUsize,
    title: String,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl MockFetcher {
    pub fn titled(title: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            title: title.to_string(),
            delay: None,
            failure: None,
        }
    }

    pub fn slow(title: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::titled(title)
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::titled("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(&self, query: &str, output_stem: &Path) -> Result<FetchedMedia, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(FetchError::Output(reason.clone()));
        }

        let path = PathBuf::from(format!("{}.mp3", output_stem.display()));
        tokio::fs::write(&path, query.as_bytes()).await?;
        Ok(FetchedMedia {
            path,
            title: self.title.clone(),
        })
    }
}

#[derive(Default)]
struct TransportLog {
    connects: Vec<(u64, u64)>,
    plays: Vec<(u64, PathBuf)>,
    stops: usize,
    disconnects: usize,
    /// Completion callbacks of streams that have not ended yet
    pending: Vec<(u64, CompletionCallback)>,
    /// Channel each guild's connection is in; `None` once it dropped
    channels: HashMap<u64, Option<u64>>,
    on_disconnect: HashMap<u64, DisconnectCallback>,
}

impl TransportLog {
    /// Like songbird, a stream that is cut off still fires its end event.
    fn take_streams(&mut self, guild: u64) -> Vec<CompletionCallback> {
        let (mine, others): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(g, _)| *g == guild);
        self.pending = others;
        mine.into_iter().map(|(_, cb)| cb).collect()
    }
}

fn end_streams(log: &Mutex<TransportLog>, guild: u64) {
    let callbacks = log.lock().unwrap().take_streams(guild);
    for callback in callbacks {
        callback(None);
    }
}

/// Records every call; tests end streams by hand through [`TransportRemote`].
pub struct MockTransport {
    log: Arc<Mutex<TransportLog>>,
    hanging_guilds: HashSet<u64>,
}

#[derive(Clone)]
pub struct TransportRemote {
    log: Arc<Mutex<TransportLog>>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, TransportRemote) {
        Self::with_hanging_guilds(&[])
    }

    /// `connect` never returns for these guilds.
    pub fn with_hanging_guilds(guilds: &[u64]) -> (Arc<Self>, TransportRemote) {
        let log = Arc::new(Mutex::new(TransportLog::default()));
        let transport = Arc::new(Self {
            log: Arc::clone(&log),
            hanging_guilds: guilds.iter().copied().collect(),
        });
        (transport, TransportRemote { log })
    }
}

#[async_trait]
impl VoiceTransport for MockTransport {
    async fn connect(
        &self,
        guild: u64,
        channel: u64,
        on_disconnect: DisconnectCallback,
    ) -> MusicResult<Box<dyn VoiceConnection>> {
        if self.hanging_guilds.contains(&guild) {
            std::future::pending::<()>().await;
        }
        if channel == 0 {
            return Err(MusicError::ConnectFailed("channel 0 refused".to_string()));
        }
        {
            let mut log = self.log.lock().unwrap();
            log.connects.push((guild, channel));
            log.channels.insert(guild, Some(channel));
            log.on_disconnect.insert(guild, on_disconnect);
        }
        Ok(Box::new(MockConnection {
            guild,
            log: Arc::clone(&self.log),
        }))
    }
}

struct MockConnection {
    guild: u64,
    log: Arc<Mutex<TransportLog>>,
}

#[async_trait]
impl VoiceConnection for MockConnection {
    async fn channel(&self) -> Option<u64> {
        let log = self.log.lock().unwrap();
        log.channels.get(&self.guild).copied().flatten()
    }

    async fn play(&mut self, path: &Path, on_complete: CompletionCallback) -> MusicResult<()> {
        let mut log = self.log.lock().unwrap();
        log.plays.push((self.guild, path.to_path_buf()));
        log.pending.push((self.guild, on_complete));
        Ok(())
    }

    async fn stop(&mut self) {
        self.log.lock().unwrap().stops += 1;
        end_streams(&self.log, self.guild);
    }

    async fn is_playing(&self) -> bool {
        let log = self.log.lock().unwrap();
        log.pending.iter().any(|(guild, _)| *guild == self.guild)
    }

    async fn disconnect(self: Box<Self>) {
        end_streams(&self.log, self.guild);
        let mut log = self.log.lock().unwrap();
        log.disconnects += 1;
        log.channels.remove(&self.guild);
        // The driver reports a requested leave too.
        if let Some(on_disconnect) = log.on_disconnect.remove(&self.guild) {
            on_disconnect(None);
        }
    }
}

impl TransportRemote {
    pub fn connects(&self) -> Vec<(u64, u64)> {
        self.log.lock().unwrap().connects.clone()
    }

    pub fn plays(&self) -> Vec<PathBuf> {
        self.log
            .lock()
            .unwrap()
            .plays
            .iter()
            .map(|(_, path)| path.clone())
            .collect()
    }

    pub fn stops(&self) -> usize {
        self.log.lock().unwrap().stops
    }

    pub fn disconnects(&self) -> usize {
        self.log.lock().unwrap().disconnects
    }

    /// Ends the oldest running stream of `guild`, as the driver would.
    pub fn finish(&self, guild: u64, error: Option<&str>) {
        let callback = {
            let mut log = self.log.lock().unwrap();
            let index = log
                .pending
                .iter()
                .position(|(g, _)| *g == guild)
                .expect("no stream running for guild");
            log.pending.remove(index).1
        };
        callback(error.map(str::to_string));
    }

    /// The bot gets kicked: the driver drops, reports it, then ends the stream.
    pub fn kick(&self, guild: u64, reason: &str) {
        {
            let mut log = self.log.lock().unwrap();
            log.channels.insert(guild, None);
            if let Some(on_disconnect) = log.on_disconnect.get(&guild) {
                on_disconnect(Some(reason.to_string()));
            }
        }
        end_streams(&self.log, guild);
    }

    /// The connection is gone but no event arrived.
    pub fn drop_quietly(&self, guild: u64) {
        self.log.lock().unwrap().channels.insert(guild, None);
    }

    /// Someone dragged the bot into another channel.
    pub fn move_to(&self, guild: u64, channel: u64) {
        self.log.lock().unwrap().channels.insert(guild, Some(channel));
    }

    /// Hands out the oldest running stream's callback without firing it.
    pub fn take_pending(&self, guild: u64) -> Option<CompletionCallback> {
        let mut log = self.log.lock().unwrap();
        let index = log.pending.iter().position(|(g, _)| *g == guild)?;
        Some(log.pending.remove(index).1)
    }
}

/// Forwards every notification to a channel the test can await.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(u64, Option<u64>, PlaybackEvent)>,
}

impl ChannelNotifier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(u64, Option<u64>, PlaybackEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl PlaybackNotifier for ChannelNotifier {
    async fn notify(&self, guild: u64, text_channel: Option<u64>, event: PlaybackEvent) {
        let _ = self.tx.send((guild, text_channel, event));
    }
}

/// Writes placeholder audio files so the store can resolve them.
pub fn seed(store: &LibraryStore, guild: u64, playlist: Option<&str>, ids: &[&str]) {
    std::fs::create_dir_all(store.collection_dir(guild, playlist)).unwrap();
    for id in ids {
        std::fs::write(store.track_path(guild, playlist, id), id.as_bytes()).unwrap();
    }
}
