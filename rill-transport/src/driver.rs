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

use std::fmt::Debug;

use crate::{Acknowledgment, ResolvedRecord, Result};

/// A synchronous topology driver.
///
/// The driver executes one record of topology logic per injection and buffers
/// anything the topology emits for later retrieval, one topic at a time.
///
/// Implementations are not expected to be thread safe. The transport wraps
/// the driver in a single `Arc<tokio::sync::Mutex<_>>`, so injects and polls
/// are serialized by construction; an extension to multiple producers must
/// keep that exclusion.
pub trait Driver: Debug + Send + 'static {
    /// Inject one record, running any topology logic it triggers before
    /// returning. A rejected record is reported as `Err`.
    fn inject(&mut self, record: ResolvedRecord) -> Result<Acknowledgment>;

    /// The next buffered output record for a topic, `None` once the topic is
    /// drained.
    fn read_output(&mut self, topic: &str) -> Result<Option<ResolvedRecord>>;
}
