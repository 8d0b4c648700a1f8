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

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::error;

use crate::{Driver, Error, ResolvedRecord, Result};

/// One sweep over the configured topics, draining each until the driver
/// reports no more output.
///
/// Topics are visited in a fixed name order so a sweep is deterministic. A
/// read error ends that topic's drain for this sweep and is surfaced as an
/// `Err` marker in the returned batch; the remaining topics are still swept.
#[derive(Clone, Debug)]
pub(crate) struct Poller<D> {
    driver: Arc<Mutex<D>>,
    topics: Vec<String>,
}

impl<D> Poller<D>
where
    D: Driver,
{
    /// Topics are expected in their fixed sweep order.
    pub(crate) fn new(driver: Arc<Mutex<D>>, topics: Vec<String>) -> Self {
        Self { driver, topics }
    }

    pub(crate) async fn poll(&self) -> Vec<Result<ResolvedRecord>> {
        let mut polled = Vec::new();

        let mut driver = self.driver.lock().await;

        for topic in &self.topics {
            loop {
                match driver.read_output(topic) {
                    Ok(Some(record)) => polled.push(Ok(record)),

                    Ok(None) => break,

                    Err(error) => {
                        error!(%topic, %error);

                        polled.push(Err(Error::Poll {
                            topic: topic.clone(),
                            message: error.to_string(),
                        }));

                        break;
                    }
                }
            }
        }

        polled
    }
}
