pub mod call;
pub mod events;
pub mod transport;

pub use call::SongbirdTransport;
pub use transport::{CompletionCallback, DisconnectCallback, VoiceConnection, VoiceTransport};
