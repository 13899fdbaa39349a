//! Shard identity
//!
//! A shard is one partition of a client's guilds. Each shard runs its own
//! gateway connection and identifies with `[index, count]`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::ValueError;

/// Shard index and total shard count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardId {
    index: u32,
    count: u32,
}

impl ShardId {
    /// The single shard used by unsharded clients
    pub const ONE: Self = Self { index: 0, count: 1 };

    /// Create a shard identity, rejecting an index outside `0..count`
    pub fn new(index: u32, count: u32) -> Result<Self, ValueError> {
        if count == 0 {
            return Err(ValueError::ZeroShardCount);
        }
        if index >= count {
            return Err(ValueError::ShardOutOfRange { index, count });
        }
        Ok(Self { index, count })
    }

    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Shard that receives events for a guild: `(guild_id >> 22) % count`
    pub fn for_guild(guild_id: u64, count: u32) -> Result<Self, ValueError> {
        if count == 0 {
            return Err(ValueError::ZeroShardCount);
        }
        let index = ((guild_id >> 22) % u64::from(count)) as u32;
        Self::new(index, count)
    }
}

impl Default for ShardId {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.index, self.count)
    }
}

// Serialized as the `[index, count]` pair used by the identify payload
impl Serialize for ShardId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        [self.index, self.count].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ShardId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let [index, count] = <[u32; 2]>::deserialize(deserializer)?;
        Self::new(index, count).map_err(serde::de::Error::custom)
    }
}
