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

//! Serde
//!
//! Per-field codecs over [`serde_json::Value`] and [`bytes::Bytes`], looked
//! up by identifier in a [`Registry`]. A topic configures one codec for its
//! keys and one for its values; everything else resolves codecs through the
//! registry rather than branching on formats.

use std::{
    array::TryFromSliceError,
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    result,
    string::FromUtf8Error,
    sync::Arc,
};

use bytes::Bytes;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Serde Errors
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    FromUtf8(#[from] FromUtf8Error),

    Mismatch {
        codec: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    SerdeJson(Arc<serde_json::Error>),

    TryFromSlice(#[from] TryFromSliceError),

    UnknownCodec(String),

    Uuid(#[from] uuid::Error),

    WrongLength {
        codec: &'static str,
        expected: usize,
        found: usize,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::SerdeJson(Arc::new(value))
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Array(_) => "array",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
        Value::Number(_) => "number",
        Value::Object(_) => "object",
        Value::String(_) => "string",
    }
}

/// An encode/decode pair over [`Value`] and [`Bytes`]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Serde {
    Bytes,
    Json,
    Long,
    Text,
    Uuid,
}

impl Serde {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Bytes => "bytes",
            Self::Json => "json",
            Self::Long => "long",
            Self::Text => "string",
            Self::Uuid => "uuid",
        }
    }

    pub fn encode(&self, decoded: &Value) -> Result<Bytes> {
        debug!(codec = self.id(), ?decoded);

        match self {
            Self::Bytes => decoded
                .as_array()
                .ok_or(Error::Mismatch {
                    codec: "bytes",
                    expected: "array",
                    found: json_type(decoded),
                })
                .and_then(|elements| {
                    elements
                        .iter()
                        .map(|element| {
                            element
                                .as_u64()
                                .and_then(|element| u8::try_from(element).ok())
                                .ok_or(Error::Mismatch {
                                    codec: "bytes",
                                    expected: "unsigned 8 bit integer",
                                    found: json_type(element),
                                })
                        })
                        .collect::<Result<Vec<u8>>>()
                })
                .map(Bytes::from),

            Self::Json => serde_json::to_vec(decoded)
                .map_err(Into::into)
                .map(Bytes::from),

            Self::Long => decoded
                .as_i64()
                .ok_or(Error::Mismatch {
                    codec: "long",
                    expected: "integer",
                    found: json_type(decoded),
                })
                .map(|decoded| Bytes::copy_from_slice(&decoded.to_be_bytes())),

            Self::Text => decoded
                .as_str()
                .ok_or(Error::Mismatch {
                    codec: "string",
                    expected: "string",
                    found: json_type(decoded),
                })
                .map(|decoded| Bytes::copy_from_slice(decoded.as_bytes())),

            Self::Uuid => decoded
                .as_str()
                .ok_or(Error::Mismatch {
                    codec: "uuid",
                    expected: "string",
                    found: json_type(decoded),
                })
                .and_then(|decoded| Uuid::parse_str(decoded).map_err(Into::into))
                .map(|decoded| Bytes::copy_from_slice(decoded.as_bytes())),
        }
    }

    pub fn decode(&self, encoded: &Bytes) -> Result<Value> {
        debug!(codec = self.id(), ?encoded);

        match self {
            Self::Bytes => Ok(Value::Array(
                encoded.iter().copied().map(Value::from).collect(),
            )),

            Self::Json => serde_json::from_slice(encoded).map_err(Into::into),

            Self::Long => {
                if encoded.len() != 8 {
                    return Err(Error::WrongLength {
                        codec: "long",
                        expected: 8,
                        found: encoded.len(),
                    });
                }

                <[u8; 8]>::try_from(encoded.as_ref())
                    .map_err(Into::into)
                    .map(|be| Value::from(i64::from_be_bytes(be)))
            }

            Self::Text => String::from_utf8(encoded.to_vec())
                .map_err(Into::into)
                .map(Value::from),

            Self::Uuid => {
                if encoded.len() != 16 {
                    return Err(Error::WrongLength {
                        codec: "uuid",
                        expected: 16,
                        found: encoded.len(),
                    });
                }

                Uuid::from_slice(encoded)
                    .map_err(Into::into)
                    .map(|uuid| Value::from(uuid.to_string()))
            }
        }
    }
}

/// Codec Registry
///
/// Maps a codec id onto a [`Serde`]. The built in codecs are registered by
/// [`Registry::default`]; [`Registry::with`] registers further ids without
/// touching any caller.
#[derive(Clone, Debug)]
pub struct Registry {
    serdes: BTreeMap<String, Serde>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            serdes: BTreeMap::from_iter(
                [
                    Serde::Bytes,
                    Serde::Json,
                    Serde::Long,
                    Serde::Text,
                    Serde::Uuid,
                ]
                .into_iter()
                .map(|serde| (serde.id().to_owned(), serde)),
            ),
        }
    }
}

impl Registry {
    pub fn with(mut self, id: impl Into<String>, serde: Serde) -> Self {
        _ = self.serdes.insert(id.into(), serde);
        self
    }

    pub fn lookup(&self, id: &str) -> Result<Serde> {
        self.serdes
            .get(id)
            .copied()
            .ok_or_else(|| Error::UnknownCodec(id.to_owned()))
    }
}
