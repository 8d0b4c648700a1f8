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

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use rill_serde::Registry;
use serde_json::Value;
use tokio::{
    sync::{Mutex, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    Acknowledgment, Driver, Error, IntakeSender, OutputRecord, OuttakeReceiver, RecordCodec,
    Result, TopicConfig, WriteOptions, WriteRequest, consume::Consumer, intake_channel,
    outtake_channel, poll::Poller, produce::Producer,
};

/// Assembles a [`Transport`] against one driver and topic set.
///
/// The driver is required up front; the codec registry and poll interval
/// have defaults. [`Builder::build`] validates every topic configuration and
/// binds its codecs without starting anything.
#[derive(Clone, Debug)]
pub struct Builder<D> {
    driver: D,
    topics: Vec<TopicConfig>,
    registry: Registry,
    poll_interval: Duration,
}

impl<D> Builder<D>
where
    D: Driver,
{
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            topics: Vec::new(),
            registry: Registry::default(),
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn with_topic(mut self, config: TopicConfig) -> Self {
        self.topics.push(config);
        self
    }

    pub fn with_topics(mut self, configs: impl IntoIterator<Item = TopicConfig>) -> Self {
        self.topics.extend(configs);
        self
    }

    pub fn with_registry(self, registry: Registry) -> Self {
        Self { registry, ..self }
    }

    /// The delay between sweeps of the driver's output. A latency versus
    /// spin trade off, not a correctness setting.
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    pub fn build(self) -> Result<Transport<D>> {
        let mut configs = BTreeMap::new();
        let mut codecs = BTreeMap::new();

        for config in self.topics {
            if config.partitions() < 1 {
                return Err(Error::InvalidPartitionCount {
                    topic: config.name().to_owned(),
                    partitions: config.partitions(),
                });
            }

            let codec = RecordCodec::bind(&self.registry, &config)?;

            if codecs.insert(config.name().to_owned(), codec).is_some() {
                return Err(Error::Message(format!(
                    "duplicate topic configuration: {}",
                    config.name()
                )));
            }

            _ = configs.insert(config.name().to_owned(), config);
        }

        Ok(Transport {
            driver: Arc::new(Mutex::new(self.driver)),
            configs,
            codecs,
            poll_interval: self.poll_interval,
            cancellation: CancellationToken::new(),
            intake: None,
            outtake: None,
            producer: None,
            consumer: None,
        })
    }
}

/// The mock transport: an intake task injecting writes into the driver and a
/// polling task draining its output, wired over bounded channels.
///
/// The intake has capacity 1, so a second [`Transport::submit`] blocks until
/// the producer drains the first; writes are serialized deliberately to
/// preserve per partition ordering.
#[derive(Debug)]
pub struct Transport<D> {
    driver: Arc<Mutex<D>>,
    configs: BTreeMap<String, TopicConfig>,
    codecs: BTreeMap<String, RecordCodec>,
    poll_interval: Duration,
    cancellation: CancellationToken,
    intake: Option<IntakeSender>,
    outtake: Option<OuttakeReceiver>,
    producer: Option<JoinHandle<()>>,
    consumer: Option<JoinHandle<()>>,
}

impl<D> Transport<D>
where
    D: Driver,
{
    pub fn builder(driver: D) -> Builder<D> {
        Builder::new(driver)
    }

    /// Spawn the polling loop, await its readiness, then spawn the intake
    /// loop. Output can never land before someone is polling.
    pub async fn start(&mut self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(Error::TransportStopped);
        }

        if self.intake.is_some() {
            return Err(Error::Message(String::from("transport already started")));
        }

        let (intake_sender, intake_receiver) = intake_channel(1);
        let (outtake_sender, outtake_receiver) = outtake_channel(1);
        let (readiness_sender, readiness_receiver) = oneshot::channel();

        let consumer = Consumer::new(
            Poller::new(self.driver.clone(), self.configs.keys().cloned().collect()),
            self.codecs.clone(),
            outtake_sender,
            self.poll_interval,
            self.cancellation.clone(),
        );

        self.consumer = Some(tokio::spawn(consumer.serve(readiness_sender)));

        readiness_receiver.await.map_err(|_| Error::OneshotRecv)?;
        debug!("consumer ready");

        let producer = Producer::new(
            self.driver.clone(),
            self.configs.clone(),
            self.codecs.clone(),
            intake_receiver,
        );

        self.producer = Some(tokio::spawn(producer.serve()));

        self.intake = Some(intake_sender);
        self.outtake = Some(outtake_receiver);

        Ok(())
    }

    /// Submit one logical message and await its acknowledgment.
    ///
    /// An unknown topic fails before anything is enqueued; after
    /// [`Transport::stop`] the call fails fast with
    /// [`Error::TransportStopped`].
    pub async fn submit(
        &self,
        topic: &str,
        message: Value,
        options: WriteOptions,
    ) -> Result<Acknowledgment> {
        debug!(%topic, ?message);

        if self.cancellation.is_cancelled() {
            return Err(Error::TransportStopped);
        }

        if !self.configs.contains_key(topic) {
            return Err(Error::UnknownTopic(topic.to_owned()));
        }

        let intake = self
            .intake
            .as_ref()
            .ok_or_else(|| Error::Message(String::from("transport not started")))?;

        let (acknowledgment_sender, acknowledgment_receiver) = oneshot::channel();

        intake
            .send((
                WriteRequest::new(topic, message, options),
                acknowledgment_sender,
            ))
            .await
            .map_err(|_unsent| Error::UnableToSend)?;

        acknowledgment_receiver
            .await
            .map_err(|_| Error::OneshotRecv)?
    }

    /// The next decoded output record, or the poll error marker for a failed
    /// drain. `None` once the transport has stopped and the channel has
    /// drained.
    pub async fn recv(&mut self) -> Option<Result<OutputRecord>> {
        match self.outtake.as_mut() {
            Some(outtake) => outtake.recv().await,
            None => None,
        }
    }

    /// The single exit hook, idempotent: close the intake, cancel the
    /// polling loop, then await both tasks, in that order, unconditionally.
    pub async fn stop(&mut self) -> Result<()> {
        debug!(topics = ?self.configs.keys().collect::<Vec<_>>());

        drop(self.intake.take());
        self.cancellation.cancel();

        let producer = match self.producer.take() {
            Some(task) => task.await.map_err(Error::from),
            None => Ok(()),
        };

        let consumer = match self.consumer.take() {
            Some(task) => task.await.map_err(Error::from),
            None => Ok(()),
        };

        producer.and(consumer)
    }
}
