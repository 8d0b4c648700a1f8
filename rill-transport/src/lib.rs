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
//
//! Rill Mock Transport
//!
//! [`Transport`] bridges a synchronous, record at a time topology [`Driver`]
//! to an asynchronous channel model: an intake task resolves, encodes and
//! injects each submitted message, while a polling task drains the driver's
//! buffered output onto an outtake channel.
//!
//! ```
//! use rill_transport::{Acknowledgment, Driver, ResolvedRecord, Result, TopicConfig, Transport};
//!
//! #[derive(Debug)]
//! struct Discard;
//!
//! impl Driver for Discard {
//!     fn inject(&mut self, record: ResolvedRecord) -> Result<Acknowledgment> {
//!         Ok(Acknowledgment::new(record.topic, record.partition, 0))
//!     }
//!
//!     fn read_output(&mut self, _topic: &str) -> Result<Option<ResolvedRecord>> {
//!         Ok(None)
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let transport = Transport::builder(Discard)
//!     .with_topic(TopicConfig::new("sensor-readings", 3))
//!     .build()?;
//! # _ = transport;
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::{self, Display, Formatter},
    io,
    num::TryFromIntError,
    result,
    sync::Arc,
    time::{Duration, SystemTime, SystemTimeError},
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinError,
};
use tracing_subscriber::filter::ParseError;

mod codec;
mod consume;
mod driver;
mod poll;
mod produce;
mod resolve;
mod transport;

pub use codec::RecordCodec;
pub use driver::Driver;
pub use resolve::{DEFAULT_KEY_FIELD, Resolution, resolve};
pub use transport::{Builder, Transport};

/// Transport Errors
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    Injection(String),

    InvalidPartition {
        topic: String,
        partition: i32,
        partitions: i32,
    },

    InvalidPartitionCount {
        topic: String,
        partitions: i32,
    },

    Io(Arc<io::Error>),

    Join(Arc<JoinError>),

    Message(String),

    OneshotRecv,

    ParseFilter(Arc<ParseError>),

    Poll {
        topic: String,
        message: String,
    },

    Serde(#[from] rill_serde::Error),

    SerdeJson(Arc<serde_json::Error>),

    SystemTime(#[from] SystemTimeError),

    TransportStopped,

    TryFromInt(#[from] TryFromIntError),

    UnableToSend,

    UnknownTopic(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<JoinError> for Error {
    fn from(value: JoinError) -> Self {
        Self::Join(Arc::new(value))
    }
}

impl From<ParseError> for Error {
    fn from(value: ParseError) -> Self {
        Self::ParseFilter(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::from(Arc::new(value))
    }
}

impl From<Arc<serde_json::Error>> for Error {
    fn from(value: Arc<serde_json::Error>) -> Self {
        Self::SerdeJson(value)
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;

/// convert a record timestamp into system time
pub fn to_system_time(timestamp: i64) -> Result<SystemTime> {
    u64::try_from(timestamp)
        .map(|timestamp| SystemTime::UNIX_EPOCH + Duration::from_millis(timestamp))
        .map_err(Into::into)
}

/// convert system time into a record timestamp
pub fn to_timestamp(system_time: &SystemTime) -> Result<i64> {
    system_time
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_err(Into::into)
        .map(|since_epoch| since_epoch.as_millis())
        .and_then(|since_epoch| i64::try_from(since_epoch).map_err(Into::into))
}

/// Projects a logical message onto its key, `None` leaving the record keyless.
pub type KeyFn = fn(&Value) -> Option<Value>;

/// Chooses a partition for a resolved key.
pub type PartitionFn = fn(&TopicConfig, Option<&Value>) -> i32;

/// Topic Configuration
///
/// Loaded once per transport instance and immutable thereafter. Any resolved
/// partition `p` for this topic satisfies `0 <= p < partitions`.
#[derive(Clone, Debug)]
pub struct TopicConfig {
    name: String,
    partitions: i32,
    replication_factor: i16,
    key_serde: String,
    value_serde: String,
    key_fn: Option<KeyFn>,
    partition_fn: Option<PartitionFn>,
}

impl TopicConfig {
    pub fn new(name: impl Into<String>, partitions: i32) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication_factor: 1,
            key_serde: String::from("json"),
            value_serde: String::from("json"),
            key_fn: None,
            partition_fn: None,
        }
    }

    /// Replication factor, carried but not modelled by the mock.
    pub fn with_replication_factor(self, replication_factor: i16) -> Self {
        Self {
            replication_factor,
            ..self
        }
    }

    pub fn with_key_serde(self, key_serde: impl Into<String>) -> Self {
        Self {
            key_serde: key_serde.into(),
            ..self
        }
    }

    pub fn with_value_serde(self, value_serde: impl Into<String>) -> Self {
        Self {
            value_serde: value_serde.into(),
            ..self
        }
    }

    pub fn with_key_fn(self, key_fn: KeyFn) -> Self {
        Self {
            key_fn: Some(key_fn),
            ..self
        }
    }

    pub fn with_partition_fn(self, partition_fn: PartitionFn) -> Self {
        Self {
            partition_fn: Some(partition_fn),
            ..self
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> i32 {
        self.partitions
    }

    pub fn replication_factor(&self) -> i16 {
        self.replication_factor
    }

    pub fn key_serde(&self) -> &str {
        &self.key_serde
    }

    pub fn value_serde(&self) -> &str {
        &self.value_serde
    }

    pub fn key_fn(&self) -> Option<KeyFn> {
        self.key_fn
    }

    pub fn partition_fn(&self) -> Option<PartitionFn> {
        self.partition_fn
    }
}

/// Per write overrides, each taking precedence over the topic configuration.
#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    key: Option<Value>,
    partition: Option<i32>,
    key_fn: Option<KeyFn>,
    partition_fn: Option<PartitionFn>,
}

impl WriteOptions {
    pub fn with_key(self, key: Value) -> Self {
        Self {
            key: Some(key),
            ..self
        }
    }

    pub fn with_partition(self, partition: i32) -> Self {
        Self {
            partition: Some(partition),
            ..self
        }
    }

    pub fn with_key_fn(self, key_fn: KeyFn) -> Self {
        Self {
            key_fn: Some(key_fn),
            ..self
        }
    }

    pub fn with_partition_fn(self, partition_fn: PartitionFn) -> Self {
        Self {
            partition_fn: Some(partition_fn),
            ..self
        }
    }

    pub fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    pub fn partition(&self) -> Option<i32> {
        self.partition
    }

    pub fn key_fn(&self) -> Option<KeyFn> {
        self.key_fn
    }

    pub fn partition_fn(&self) -> Option<PartitionFn> {
        self.partition_fn
    }
}

/// A logical message bound for a topic, with its per write overrides.
#[derive(Clone, Debug)]
pub struct WriteRequest {
    topic: String,
    message: Value,
    options: WriteOptions,
}

impl WriteRequest {
    pub fn new(topic: impl Into<String>, message: Value, options: WriteOptions) -> Self {
        Self {
            topic: topic.into(),
            message,
            options,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn message(&self) -> &Value {
        &self.message
    }

    pub fn options(&self) -> &WriteOptions {
        &self.options
    }
}

/// Wire shaped record, both injected into and emitted by the [`Driver`].
///
/// Unknown partition and offset are the `-1` sentinel.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ResolvedRecord {
    pub topic: String,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: i64,
}

impl Default for ResolvedRecord {
    fn default() -> Self {
        Self {
            topic: String::new(),
            key: None,
            value: None,
            partition: -1,
            offset: -1,
            timestamp: -1,
        }
    }
}

/// Delivered exactly once per accepted write.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Acknowledgment {
    topic: String,
    partition: i32,
    offset: i64,
}

impl Acknowledgment {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

/// A decoded record emitted by the topology under test.
///
/// A missing key or value decodes to [`Value::Null`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct OutputRecord {
    topic: String,
    key: Value,
    value: Value,
    partition: i32,
}

impl OutputRecord {
    pub fn new(topic: impl Into<String>, key: Value, value: Value, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            key,
            value,
            partition,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }
}

pub type AcknowledgmentSender = oneshot::Sender<Result<Acknowledgment>>;

pub type IntakeSender = mpsc::Sender<(WriteRequest, AcknowledgmentSender)>;
pub type IntakeReceiver = mpsc::Receiver<(WriteRequest, AcknowledgmentSender)>;

pub fn intake_channel(buffer: usize) -> (IntakeSender, IntakeReceiver) {
    mpsc::channel::<(WriteRequest, AcknowledgmentSender)>(buffer)
}

pub type OuttakeSender = mpsc::Sender<Result<OutputRecord>>;
pub type OuttakeReceiver = mpsc::Receiver<Result<OutputRecord>>;

pub fn outtake_channel(buffer: usize) -> (OuttakeSender, OuttakeReceiver) {
    mpsc::channel::<Result<OutputRecord>>(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn topic_config_defaults() {
        let config = TopicConfig::new("alerts", 6);

        assert_eq!("alerts", config.name());
        assert_eq!(6, config.partitions());
        assert_eq!(1, config.replication_factor());
        assert_eq!("json", config.key_serde());
        assert_eq!("json", config.value_serde());
        assert!(config.key_fn().is_none());
        assert!(config.partition_fn().is_none());
    }

    #[test]
    fn topic_config_overrides() {
        fn ident(message: &Value) -> Option<Value> {
            Some(message.clone())
        }

        let config = TopicConfig::new("alerts", 6)
            .with_replication_factor(3)
            .with_key_serde("string")
            .with_value_serde("long")
            .with_key_fn(ident);

        assert_eq!(3, config.replication_factor());
        assert_eq!("string", config.key_serde());
        assert_eq!("long", config.value_serde());
        assert_eq!(
            Some(json!("abc")),
            config.key_fn().and_then(|key_fn| key_fn(&json!("abc")))
        );
    }

    #[test]
    fn timestamp_round_trip() -> Result<()> {
        let now = SystemTime::now();
        let timestamp = to_timestamp(&now)?;

        assert!(timestamp > 0);
        assert_eq!(timestamp, to_timestamp(&to_system_time(timestamp)?)?);

        Ok(())
    }

    #[test]
    fn resolved_record_sentinels() {
        let record = ResolvedRecord::default();

        assert_eq!(-1, record.partition);
        assert_eq!(-1, record.offset);
        assert_eq!(-1, record.timestamp);
        assert!(record.key.is_none());
        assert!(record.value.is_none());
    }
}
