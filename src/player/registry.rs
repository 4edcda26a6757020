use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::coordinator::CoordinatorHandle;
use super::notifier::PlaybackNotifier;
use crate::library::LibraryStore;
use crate::voice::VoiceTransport;

/// Guild id -> coordinator. Coordinators are created on first use.
pub struct CoordinatorRegistry {
    coordinators: DashMap<u64, CoordinatorHandle>,
    library: LibraryStore,
    transport: Arc<dyn VoiceTransport>,
    notifier: Arc<dyn PlaybackNotifier>,
}

impl CoordinatorRegistry {
    pub fn new(
        library: LibraryStore,
        transport: Arc<dyn VoiceTransport>,
        notifier: Arc<dyn PlaybackNotifier>,
    ) -> Self {
        Self {
            coordinators: DashMap::new(),
            library,
            transport,
            notifier,
        }
    }

    fn spawn(&self, guild: u64) -> CoordinatorHandle {
        info!("Starting coordinator for guild {}", guild);
        CoordinatorHandle::spawn(
            guild,
            self.library.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.notifier),
        )
    }

    /// Returns the guild's coordinator, restarting it if its task died.
    pub fn coordinator(&self, guild: u64) -> CoordinatorHandle {
        let mut entry = self
            .coordinators
            .entry(guild)
            .or_insert_with(|| self.spawn(guild));

        if entry.is_closed() {
            warn!("Coordinator for guild {} was gone, restarting", guild);
            *entry = self.spawn(guild);
        }
        entry.value().clone()
    }

    /// Existing coordinator only; never spawns one.
    pub fn get(&self, guild: u64) -> Option<CoordinatorHandle> {
        self.coordinators
            .get(&guild)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
    }
}
