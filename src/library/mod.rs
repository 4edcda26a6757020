pub mod naming;
pub mod store;

pub use naming::{resolve_identifier, sanitize};
pub use store::{LibraryStore, StoreError, Track, TrackMeta, AUDIO_EXT};
