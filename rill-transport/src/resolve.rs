// Copyright ⓒ 2024-2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde_json::Value;
use tracing::debug;

use crate::{Error, Result, TopicConfig, WriteOptions};

/// Key field consulted when neither the write options nor the topic
/// configuration project a key.
pub const DEFAULT_KEY_FIELD: &str = "id";

/// The effective key and partition of a logical message.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Resolution {
    key: Option<Value>,
    partition: i32,
}

impl Resolution {
    pub fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }
}

/// Resolve a logical message into its effective key and partition.
///
/// Key precedence, first match wins: the explicit option key, the option key
/// fn, the topic key fn, then the conventional [`DEFAULT_KEY_FIELD`] of the
/// message. Partition precedence mirrors it: the explicit option partition,
/// the option partition fn, the topic partition fn, then a deterministic
/// default over the key. The resolved partition is validated against the
/// topic's partition count whichever layer produced it.
pub fn resolve(config: &TopicConfig, message: &Value, options: &WriteOptions) -> Result<Resolution> {
    let key = options
        .key()
        .cloned()
        .or_else(|| options.key_fn().and_then(|key_fn| key_fn(message)))
        .or_else(|| config.key_fn().and_then(|key_fn| key_fn(message)))
        .or_else(|| message.get(DEFAULT_KEY_FIELD).cloned());

    let partition = if let Some(partition) = options.partition() {
        partition
    } else if let Some(partition_fn) = options.partition_fn() {
        partition_fn(config, key.as_ref())
    } else if let Some(partition_fn) = config.partition_fn() {
        partition_fn(config, key.as_ref())
    } else {
        default_partition(config, key.as_ref())?
    };

    debug!(topic = config.name(), ?key, partition);

    if partition < 0 || partition >= config.partitions() {
        return Err(Error::InvalidPartition {
            topic: config.name().to_owned(),
            partition,
            partitions: config.partitions(),
        });
    }

    Ok(Resolution { key, partition })
}

/// Keyed records hash onto a partition, keyless records land on partition 0.
fn default_partition(config: &TopicConfig, key: Option<&Value>) -> Result<i32> {
    match key {
        Some(key) => serde_json::to_vec(key)
            .map_err(Into::into)
            .map(|encoded| ((murmur2(&encoded) & 0x7fff_ffff) % config.partitions() as u32) as i32),

        None => Ok(0),
    }
}

/// 32 bit murmur2, the hash behind the Kafka default partitioner, so
/// partition expectations carry over from real producer clients.
fn murmur2(data: &[u8]) -> u32 {
    const SEED: u32 = 0x9747_b28c;
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let mut h = SEED ^ data.len() as u32;

    let mut chunks = data.chunks_exact(4);

    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h = h.wrapping_mul(M);
        h ^= k;
    }

    let remainder = chunks.remainder();

    if remainder.len() == 3 {
        h ^= (remainder[2] as u32) << 16;
    }

    if remainder.len() >= 2 {
        h ^= (remainder[1] as u32) << 8;
    }

    if !remainder.is_empty() {
        h ^= remainder[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;

    h
}
