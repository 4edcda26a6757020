//! Per-guild playback coordinator.
//!
//! Each guild gets one task that owns the voice connection and processes
//! requests one at a time from an unbounded channel. Playback completion
//! comes back through the same channel as a `Finished` message, so the
//! transition from one track to the next happens on the coordinator task
//! and never inside a command handler.
//!
//! ```text
//! Disconnected --join/play--> Idle --play--> Playing --finished/stop--> Idle
//!       ^                                                 |
//!       +-------------------------leave-------------------+
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::notifier::{PlaybackEvent, PlaybackNotifier};
use crate::error::{MusicError, MusicResult};
use crate::library::{sanitize, LibraryStore, Track};
use crate::voice::{CompletionCallback, DisconnectCallback, VoiceConnection, VoiceTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Disconnected,
    Idle,
    Playing,
}

/// Who asked for playback and where to post follow-up messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requester {
    /// Voice channel the requesting user is in
    pub voice_channel: Option<u64>,
    /// Text channel for out-of-band notifications
    pub text_channel: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(u64),
    AlreadyHere(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistStarted {
    pub playlist: String,
    pub first: String,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: PlaybackState,
    pub channel: Option<u64>,
    pub now_playing: Option<String>,
    pub playlist: Option<String>,
    pub queue: Vec<String>,
}

enum Command {
    Join {
        channel: Option<u64>,
        reply: oneshot::Sender<MusicResult<JoinOutcome>>,
    },
    PlaySingle {
        playlist: Option<String>,
        track: String,
        requester: Requester,
        reply: oneshot::Sender<MusicResult<String>>,
    },
    PlayPlaylist {
        playlist: String,
        requester: Requester,
        reply: oneshot::Sender<MusicResult<PlaylistStarted>>,
    },
    Stop {
        reply: oneshot::Sender<MusicResult<String>>,
    },
    Leave {
        reply: oneshot::Sender<MusicResult<()>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    Finished {
        token: u64,
        error: Option<String>,
    },
    /// The voice connection opened as `epoch` dropped on its own.
    Disconnected {
        epoch: u64,
        reason: Option<String>,
    },
}

/// Cheap handle for talking to one guild's coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    guild: u64,
    tx: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// Starts the coordinator task for `guild`.
    pub fn spawn(
        guild: u64,
        library: LibraryStore,
        transport: Arc<dyn VoiceTransport>,
        notifier: Arc<dyn PlaybackNotifier>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, mut pending_events) = mpsc::unbounded_channel();

        // Delivered in order, off the coordinator task.
        tokio::spawn(async move {
            while let Some((text_channel, event)) = pending_events.recv().await {
                notifier.notify(guild, text_channel, event).await;
            }
        });

        let coordinator = GuildCoordinator {
            guild,
            library,
            transport,
            events,
            connection: None,
            playing: None,
            next_token: 0,
            epoch: 0,
            completions: tx.downgrade(),
            rx,
        };
        tokio::spawn(coordinator.run());
        Self { guild, tx }
    }

    pub fn guild(&self) -> u64 {
        self.guild
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> MusicResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| MusicError::CoordinatorGone)?;
        rx.await.map_err(|_| MusicError::CoordinatorGone)
    }

    pub async fn join(&self, channel: Option<u64>) -> MusicResult<JoinOutcome> {
        self.request(|reply| Command::Join { channel, reply }).await?
    }

    /// Plays one track from the default collection or from `playlist`.
    pub async fn play_single(
        &self,
        playlist: Option<String>,
        track: String,
        requester: Requester,
    ) -> MusicResult<String> {
        self.request(|reply| Command::PlaySingle {
            playlist,
            track,
            requester,
            reply,
        })
        .await?
    }

    pub async fn play_playlist(
        &self,
        playlist: String,
        requester: Requester,
    ) -> MusicResult<PlaylistStarted> {
        self.request(|reply| Command::PlayPlaylist {
            playlist,
            requester,
            reply,
        })
        .await?
    }

    /// Stops the current track and drops the queue. Stays connected.
    pub async fn stop(&self) -> MusicResult<String> {
        self.request(|reply| Command::Stop { reply }).await?
    }

    pub async fn leave(&self) -> MusicResult<()> {
        self.request(|reply| Command::Leave { reply }).await?
    }

    pub async fn status(&self) -> MusicResult<SessionStatus> {
        self.request(|reply| Command::Status { reply }).await
    }
}

struct Playing {
    token: u64,
    current: Track,
    queue: VecDeque<Track>,
    playlist: Option<String>,
    text_channel: Option<u64>,
}

struct GuildCoordinator {
    guild: u64,
    library: LibraryStore,
    transport: Arc<dyn VoiceTransport>,
    events: mpsc::UnboundedSender<(Option<u64>, PlaybackEvent)>,
    connection: Option<Box<dyn VoiceConnection>>,
    playing: Option<Playing>,
    next_token: u64,
    /// Bumped on every connect; disconnect signals from older connections are stale
    epoch: u64,
    /// Weak so the task ends once every handle is dropped
    completions: mpsc::WeakUnboundedSender<Command>,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl GuildCoordinator {
    async fn run(mut self) {
        debug!("Coordinator for guild {} started", self.guild);

        while let Some(command) = self.rx.recv().await {
            self.handle(command).await;
        }

        self.playing = None;
        if let Some(connection) = self.connection.take() {
            connection.disconnect().await;
        }
        debug!("Coordinator for guild {} ended", self.guild);
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Join { channel, reply } => {
                let _ = reply.send(self.join(channel).await);
            }
            Command::PlaySingle {
                playlist,
                track,
                requester,
                reply,
            } => {
                let result = self.play_single(playlist, &track, requester).await;
                let _ = reply.send(result);
            }
            Command::PlayPlaylist {
                playlist,
                requester,
                reply,
            } => {
                let _ = reply.send(self.play_playlist(&playlist, requester).await);
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop().await);
            }
            Command::Leave { reply } => {
                let _ = reply.send(self.leave().await);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status().await);
            }
            Command::Finished { token, error } => {
                self.on_finished(token, error).await;
            }
            Command::Disconnected { epoch, reason } => {
                if epoch == self.epoch && self.connection.is_some() {
                    self.connection_lost(reason).await;
                } else {
                    debug!("Guild {} ignoring stale disconnect {}", self.guild, epoch);
                }
            }
        }
    }

    fn state(&self) -> PlaybackState {
        match (&self.connection, &self.playing) {
            (None, _) => PlaybackState::Disconnected,
            (Some(_), None) => PlaybackState::Idle,
            (Some(_), Some(_)) => PlaybackState::Playing,
        }
    }

    async fn status(&self) -> SessionStatus {
        let channel = match &self.connection {
            Some(connection) => connection.channel().await,
            None => None,
        };
        SessionStatus {
            state: self.state(),
            channel,
            now_playing: self.playing.as_ref().map(|p| p.current.id.clone()),
            playlist: self.playing.as_ref().and_then(|p| p.playlist.clone()),
            queue: self
                .playing
                .as_ref()
                .map(|p| p.queue.iter().map(|t| t.id.clone()).collect())
                .unwrap_or_default(),
        }
    }

    async fn join(&mut self, channel: Option<u64>) -> MusicResult<JoinOutcome> {
        let channel = channel.ok_or(MusicError::NoVoiceChannel)?;

        if let Some(current) = self.live_channel().await {
            return if current == channel {
                Ok(JoinOutcome::AlreadyHere(channel))
            } else {
                Err(MusicError::AlreadyConnectedElsewhere)
            };
        }

        self.epoch += 1;
        let on_disconnect = self.disconnect_callback(self.epoch);
        let connection = self
            .transport
            .connect(self.guild, channel, on_disconnect)
            .await?;
        self.connection = Some(connection);
        info!("Guild {} connected to channel {}", self.guild, channel);
        Ok(JoinOutcome::Joined(channel))
    }

    /// Where the connection is right now. A connection that dropped without
    /// telling us is cleaned up here.
    async fn live_channel(&mut self) -> Option<u64> {
        let channel = self.connection.as_ref()?.channel().await;
        if channel.is_none() {
            self.connection_lost(None).await;
        }
        channel
    }

    /// Releases a connection the bot no longer has, e.g. after a kick.
    async fn connection_lost(&mut self, reason: Option<String>) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        let text_channel = self.playing.take().and_then(|p| p.text_channel);
        warn!("Guild {} lost its voice connection: {:?}", self.guild, reason);

        connection.disconnect().await;
        self.notify(text_channel, PlaybackEvent::Disconnected { reason });
    }

    fn disconnect_callback(&self, epoch: u64) -> DisconnectCallback {
        // Upgraded per call: songbird keeps this for as long as the call exists.
        let tx = self.completions.clone();
        Box::new(move |reason| {
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Disconnected { epoch, reason });
            }
        })
    }

    /// Joins the requester's channel when disconnected. Returns whether a
    /// connection was opened, so a failed start can be rolled back.
    async fn ensure_connected(&mut self, requester: &Requester) -> MusicResult<bool> {
        if self.live_channel().await.is_some() {
            return Ok(false);
        }
        self.join(requester.voice_channel).await?;
        Ok(true)
    }

    async fn rollback_join(&mut self, joined: bool) {
        if joined {
            if let Some(connection) = self.connection.take() {
                connection.disconnect().await;
            }
        }
    }

    async fn play_single(
        &mut self,
        playlist: Option<String>,
        raw_track: &str,
        requester: Requester,
    ) -> MusicResult<String> {
        if self.playing.is_some() {
            return Err(MusicError::AlreadyPlaying);
        }

        let not_found = || MusicError::TrackNotFound(raw_track.to_string());
        let playlist = match playlist.as_deref() {
            Some(name) => Some(sanitize(name).map_err(|_| not_found())?),
            None => None,
        };
        let id = sanitize(raw_track).map_err(|_| not_found())?;
        let track = self
            .library
            .resolve(self.guild, playlist.as_deref(), &id)
            .ok_or_else(not_found)?;

        let joined = self.ensure_connected(&requester).await?;
        let token = match self.begin(&track).await {
            Ok(token) => token,
            Err(e) => {
                self.rollback_join(joined).await;
                return Err(e);
            }
        };

        let id = track.id.clone();
        self.playing = Some(Playing {
            token,
            current: track,
            queue: VecDeque::new(),
            playlist: None,
            text_channel: requester.text_channel,
        });
        Ok(id)
    }

    async fn play_playlist(
        &mut self,
        raw_name: &str,
        requester: Requester,
    ) -> MusicResult<PlaylistStarted> {
        if self.playing.is_some() {
            return Err(MusicError::AlreadyPlaying);
        }

        let name =
            sanitize(raw_name).map_err(|_| MusicError::PlaylistNotFound(raw_name.to_string()))?;
        let mut queue: VecDeque<Track> = self
            .library
            .list_tracks(self.guild, Some(&name))
            .map_err(MusicError::from)?
            .into();
        let total = queue.len();
        let Some(first) = queue.pop_front() else {
            return Err(MusicError::PlaylistNotFound(name));
        };

        let joined = self.ensure_connected(&requester).await?;
        let token = match self.begin(&first).await {
            Ok(token) => token,
            Err(e) => {
                self.rollback_join(joined).await;
                return Err(e);
            }
        };

        let started = PlaylistStarted {
            playlist: name.clone(),
            first: first.id.clone(),
            total,
        };
        self.playing = Some(Playing {
            token,
            current: first,
            queue,
            playlist: Some(name),
            text_channel: requester.text_channel,
        });
        Ok(started)
    }

    async fn stop(&mut self) -> MusicResult<String> {
        let playing = self.playing.take().ok_or(MusicError::NothingPlaying)?;
        if let Some(connection) = self.connection.as_mut() {
            connection.stop().await;
        }
        info!(
            "Guild {} stopped {} ({} queued tracks dropped)",
            self.guild,
            playing.current.id,
            playing.queue.len()
        );
        Ok(playing.current.id)
    }

    async fn leave(&mut self) -> MusicResult<()> {
        let connection = self.connection.take().ok_or(MusicError::NotConnected)?;
        self.playing = None;
        connection.disconnect().await;
        info!("Guild {} disconnected", self.guild);
        Ok(())
    }

    /// Starts streaming `track` and returns the token its completion will carry.
    async fn begin(&mut self, track: &Track) -> MusicResult<u64> {
        if !track.path.is_file() {
            return Err(MusicError::TrackNotFound(track.id.clone()));
        }

        self.next_token += 1;
        let token = self.next_token;
        let on_complete = self.completion_callback(token);

        let connection = self.connection.as_mut().ok_or(MusicError::NotConnected)?;
        if connection.is_playing().await {
            // One stream per connection, even if an old one is still draining.
            connection.stop().await;
        }
        connection.play(&track.path, on_complete).await?;

        info!("Guild {} now playing {}", self.guild, track.id);
        Ok(token)
    }

    fn completion_callback(&self, token: u64) -> CompletionCallback {
        let tx = self.completions.upgrade();
        Box::new(move |error| {
            if let Some(tx) = tx {
                let _ = tx.send(Command::Finished { token, error });
            }
        })
    }

    async fn on_finished(&mut self, token: u64, error: Option<String>) {
        let finished = match self.playing.take() {
            Some(playing) if playing.token == token => playing,
            other => {
                // Completion of a track that was stopped or replaced.
                debug!("Guild {} ignoring stale completion {}", self.guild, token);
                self.playing = other;
                return;
            }
        };

        let Playing {
            current,
            queue,
            playlist,
            text_channel,
            ..
        } = finished;

        match error {
            Some(reason) => {
                warn!("Guild {} stream error on {}: {}", self.guild, current.id, reason);
                self.notify(
                    text_channel,
                    PlaybackEvent::StreamFailed {
                        track: current.id,
                        reason,
                    },
                );
            }
            None => info!("Guild {} finished playing {}", self.guild, current.id),
        }

        self.advance(queue, playlist, text_channel).await;
    }

    /// Plays the next queued track, skipping tracks that fail to start.
    async fn advance(
        &mut self,
        mut queue: VecDeque<Track>,
        playlist: Option<String>,
        text_channel: Option<u64>,
    ) {
        while let Some(next) = queue.pop_front() {
            match self.begin(&next).await {
                Ok(token) => {
                    self.notify(
                        text_channel,
                        PlaybackEvent::NowPlaying {
                            track: next.id.clone(),
                            remaining: queue.len(),
                        },
                    );
                    self.playing = Some(Playing {
                        token,
                        current: next,
                        queue,
                        playlist,
                        text_channel,
                    });
                    return;
                }
                Err(e) => {
                    warn!("Guild {} skipping {}: {}", self.guild, next.id, e);
                    self.notify(
                        text_channel,
                        PlaybackEvent::StreamFailed {
                            track: next.id,
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }

        if let Some(playlist) = playlist {
            info!("Guild {} finished playlist {}", self.guild, playlist);
            self.notify(text_channel, PlaybackEvent::QueueFinished { playlist });
        }
    }

    fn notify(&self, text_channel: Option<u64>, event: PlaybackEvent) {
        let _ = self.events.send((text_channel, event));
    }
}
