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

use std::{collections::BTreeMap, time::Duration};

use tokio::{sync::oneshot, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    Driver, Error, OutputRecord, OuttakeSender, RecordCodec, ResolvedRecord, Result, poll::Poller,
};

/// The polling loop: sweep the driver, decode what surfaced, publish each
/// outcome on the outtake, sleep, repeat.
///
/// Readiness is signalled exactly once before the first sweep. The loop runs
/// until its cancellation token fires, observed between iterations; on exit
/// the outtake sender drops, closing the channel. An `Err` published on the
/// outtake is the poll error marker for one topic's failed drain, after which
/// the loop itself survives and retries on the next tick.
#[derive(Debug)]
pub(crate) struct Consumer<D> {
    poller: Poller<D>,
    codecs: BTreeMap<String, RecordCodec>,
    outtake: OuttakeSender,
    poll_interval: Duration,
    cancellation: CancellationToken,
}

impl<D> Consumer<D>
where
    D: Driver,
{
    pub(crate) fn new(
        poller: Poller<D>,
        codecs: BTreeMap<String, RecordCodec>,
        outtake: OuttakeSender,
        poll_interval: Duration,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            poller,
            codecs,
            outtake,
            poll_interval,
            cancellation,
        }
    }

    pub(crate) async fn serve(self, readiness: oneshot::Sender<()>) {
        if let Err(undelivered) = readiness.send(()) {
            debug!(?undelivered);
        }

        while !self.cancellation.is_cancelled() {
            for outcome in self.sweep().await {
                tokio::select! {
                    sent = self.outtake.send(outcome) => {
                        if sent.is_err() {
                            debug!("outtake closed");
                            return;
                        }
                    }

                    cancelled = self.cancellation.cancelled() => {
                        debug!(?cancelled);
                        return;
                    }
                }
            }

            tokio::select! {
                _ = sleep(self.poll_interval) => {}

                cancelled = self.cancellation.cancelled() => {
                    debug!(?cancelled);
                    break;
                }
            }
        }
    }

    async fn sweep(&self) -> Vec<Result<OutputRecord>> {
        self.poller
            .poll()
            .await
            .into_iter()
            .map(|polled| polled.and_then(|record| self.decode(record)))
            .collect()
    }

    fn decode(&self, record: ResolvedRecord) -> Result<OutputRecord> {
        self.codecs
            .get(&record.topic)
            .ok_or_else(|| Error::UnknownTopic(record.topic.clone()))
            .and_then(|codec| codec.decode(&record))
    }
}
