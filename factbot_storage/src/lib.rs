//! All things storage for the bot.

extern crate tracing;

/// key-value store backend
pub mod kv;

/// Flat json file backend
pub mod file;

/// In-memory backend
pub mod memory;

/// All the storage models
pub mod model;

/// The guild to channel registry and the storage traits behind it
pub mod registry;

/// factbot_storage prelude
pub mod prelude {
    pub use crate::file::JsonFileStore;
    pub use crate::kv::{Identifiable, KVClient, KVIdentity};
    pub use crate::memory::MemoryStore;
    pub use crate::model::{self, *};
    pub use crate::registry::{ChannelMap, ChannelRegistry, ChannelStore, DeliveryLedger, Destination, Removal};
}
