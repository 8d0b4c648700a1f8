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

use std::{collections::BTreeMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::{
    Acknowledgment, Driver, Error, IntakeReceiver, RecordCodec, Result, TopicConfig, WriteRequest,
    resolve,
};

/// The intake loop: one resolve, encode, inject round per submitted message.
///
/// Every message dequeued from the intake yields exactly one acknowledgment
/// on its oneshot handle, success or error; a failed write never ends the
/// loop. The loop ends when the intake channel closes.
#[derive(Debug)]
pub(crate) struct Producer<D> {
    driver: Arc<Mutex<D>>,
    configs: BTreeMap<String, TopicConfig>,
    codecs: BTreeMap<String, RecordCodec>,
    intake: IntakeReceiver,
}

impl<D> Producer<D>
where
    D: Driver,
{
    pub(crate) fn new(
        driver: Arc<Mutex<D>>,
        configs: BTreeMap<String, TopicConfig>,
        codecs: BTreeMap<String, RecordCodec>,
        intake: IntakeReceiver,
    ) -> Self {
        Self {
            driver,
            configs,
            codecs,
            intake,
        }
    }

    pub(crate) async fn serve(mut self) {
        while let Some((request, acknowledgment)) = self.intake.recv().await {
            debug!(?request);

            let outcome = self.write(&request).await;

            if let Err(undelivered) = acknowledgment.send(outcome) {
                debug!(?undelivered);
            }
        }

        debug!("intake closed");
    }

    async fn write(&self, request: &WriteRequest) -> Result<Acknowledgment> {
        let config = self
            .configs
            .get(request.topic())
            .ok_or_else(|| Error::UnknownTopic(request.topic().to_owned()))?;

        let codec = self
            .codecs
            .get(request.topic())
            .ok_or_else(|| Error::UnknownTopic(request.topic().to_owned()))?;

        let resolution = resolve(config, request.message(), request.options())?;
        let record = codec.encode(request.message(), &resolution)?;

        let mut driver = self.driver.lock().await;

        driver
            .inject(record)
            .inspect_err(|error| error!(topic = request.topic(), ?error))
    }
}
