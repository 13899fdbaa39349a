//! Value objects - immutable types describing how a client connects

mod encoding;
mod intents;
mod presence;
mod shard;

pub use encoding::GatewayEncoding;
pub use intents::Intents;
pub use presence::{Activity, ActivityType, Presence, PresenceStatus};
pub use shard::ShardId;
