pub mod acquire;
pub mod coordinator;
pub mod notifier;
pub mod registry;

#[cfg(test)]
pub mod testing;

pub use acquire::{AddRequest, TrackAcquirer};
pub use coordinator::{JoinOutcome, PlaybackState, Requester, SessionStatus};
pub use notifier::DiscordNotifier;
pub use registry::CoordinatorRegistry;
