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

use std::time::SystemTime;

use rill_serde::{Registry, Serde};
use serde_json::Value;
use tracing::debug;

use crate::{OutputRecord, ResolvedRecord, Result, TopicConfig, resolve::Resolution, to_timestamp};

/// A topic's key and value codecs, resolved once from the [`Registry`].
///
/// Binding fails on an unknown codec id, so a misconfigured topic surfaces
/// when the transport is built rather than on the first record.
#[derive(Clone, Debug)]
pub struct RecordCodec {
    topic: String,
    key: Serde,
    value: Serde,
}

impl RecordCodec {
    pub fn bind(registry: &Registry, config: &TopicConfig) -> Result<Self> {
        let key = registry.lookup(config.key_serde())?;
        let value = registry.lookup(config.value_serde())?;

        Ok(Self {
            topic: config.name().to_owned(),
            key,
            value,
        })
    }

    /// Serialize a resolved message into the wire shape the driver expects,
    /// stamping the creation timestamp. The offset stays at the unset
    /// sentinel until injection assigns one.
    pub fn encode(&self, message: &Value, resolution: &Resolution) -> Result<ResolvedRecord> {
        debug!(topic = %self.topic, ?message, ?resolution);

        let key = resolution
            .key()
            .map(|key| self.key.encode(key))
            .transpose()?;
        let value = Some(self.value.encode(message)?);
        let timestamp = to_timestamp(&SystemTime::now())?;

        Ok(ResolvedRecord {
            topic: self.topic.clone(),
            key,
            value,
            partition: resolution.partition(),
            offset: -1,
            timestamp,
        })
    }

    /// Rebuild a logical record from a driver emitted one. A missing key or
    /// value decodes to [`Value::Null`] rather than an error.
    pub fn decode(&self, record: &ResolvedRecord) -> Result<OutputRecord> {
        debug!(?record);

        let key = record
            .key
            .as_ref()
            .map(|key| self.key.decode(key))
            .transpose()?
            .unwrap_or(Value::Null);

        let value = record
            .value
            .as_ref()
            .map(|value| self.value.decode(value))
            .transpose()?
            .unwrap_or(Value::Null);

        Ok(OutputRecord::new(
            record.topic.clone(),
            key,
            value,
            record.partition,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Error, WriteOptions, resolve};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn binding_rejects_unknown_codec_ids() {
        let config = TopicConfig::new("orders", 3).with_value_serde("pickle");

        assert!(matches!(
            RecordCodec::bind(&Registry::default(), &config),
            Err(Error::Serde(rill_serde::Error::UnknownCodec(id))) if id == "pickle"
        ));
    }

    #[test]
    fn encode_stamps_timestamp_and_leaves_offset_unset() -> Result<()> {
        let config = TopicConfig::new("orders", 3);
        let codec = RecordCodec::bind(&Registry::default(), &config)?;

        let message = json!({"id": 32123, "name": "alice"});
        let resolution = resolve(&config, &message, &WriteOptions::default())?;
        let record = codec.encode(&message, &resolution)?;

        assert_eq!("orders", record.topic);
        assert_eq!(resolution.partition(), record.partition);
        assert_eq!(-1, record.offset);
        assert!(record.timestamp > 0);
        assert!(record.key.is_some());
        assert!(record.value.is_some());

        Ok(())
    }

    #[test]
    fn keyless_messages_encode_without_key_bytes() -> Result<()> {
        let config = TopicConfig::new("orders", 3);
        let codec = RecordCodec::bind(&Registry::default(), &config)?;

        let message = json!({"name": "alice"});
        let resolution = resolve(&config, &message, &WriteOptions::default())?;
        let record = codec.encode(&message, &resolution)?;

        assert!(record.key.is_none());

        Ok(())
    }

    #[test]
    fn encode_surfaces_serialization_mismatches() -> Result<()> {
        let config = TopicConfig::new("orders", 3).with_value_serde("long");
        let codec = RecordCodec::bind(&Registry::default(), &config)?;

        let message = json!({"name": "alice"});
        let resolution = resolve(&config, &message, &WriteOptions::default())?;

        assert!(matches!(
            codec.encode(&message, &resolution),
            Err(Error::Serde(rill_serde::Error::Mismatch {
                codec: "long",
                ..
            }))
        ));

        Ok(())
    }

    #[test]
    fn round_trip_through_the_wire_shape() -> Result<()> {
        let config = TopicConfig::new("orders", 3)
            .with_key_serde("string")
            .with_key_fn(|message| message.get("name").cloned());
        let codec = RecordCodec::bind(&Registry::default(), &config)?;

        let message = json!({"name": "alice", "total": 42});
        let resolution = resolve(&config, &message, &WriteOptions::default())?;
        let record = codec.encode(&message, &resolution)?;

        let output = codec.decode(&record)?;

        assert_eq!("orders", output.topic());
        assert_eq!(&json!("alice"), output.key());
        assert_eq!(&message, output.value());
        assert_eq!(resolution.partition(), output.partition());

        Ok(())
    }

    #[test]
    fn decode_maps_missing_fields_to_null() -> Result<()> {
        let config = TopicConfig::new("orders", 3);
        let codec = RecordCodec::bind(&Registry::default(), &config)?;

        let output = codec.decode(&ResolvedRecord {
            topic: String::from("orders"),
            partition: 0,
            offset: 0,
            ..Default::default()
        })?;

        assert_eq!(&Value::Null, output.key());
        assert_eq!(&Value::Null, output.value());

        Ok(())
    }
}
