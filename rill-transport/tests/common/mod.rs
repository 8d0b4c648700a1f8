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

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};

use rand::{distr::Alphanumeric, prelude::*, rng};
use rill_transport::{Acknowledgment, Driver, Error, ResolvedRecord, Result};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

pub(crate) fn init_tracing() -> Result<DefaultGuard> {
    use std::{
        fs::{File, create_dir_all},
        sync::Arc,
        thread,
    };

    let directory = format!("../logs/{}", env!("CARGO_PKG_NAME"));
    create_dir_all(&directory)?;

    Ok(tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_level(true)
            .with_line_number(true)
            .with_thread_names(false)
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(format!("{}=debug", env!("CARGO_CRATE_NAME")).parse()?)
                    .add_directive("rill_transport=debug".parse()?),
            )
            .with_writer(
                thread::current()
                    .name()
                    .ok_or(Error::Message(String::from("unnamed thread")))
                    .and_then(|name| {
                        File::create(format!(
                            "{directory}/{}::{name}.log",
                            env!("CARGO_CRATE_NAME")
                        ))
                        .map_err(Into::into)
                    })
                    .map(Arc::new)?,
            )
            .finish(),
    ))
}

pub(crate) fn alphanumeric_string(length: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// A scripted stand in for a real topology driver.
///
/// Each injected record is acknowledged with the next offset of its topic
/// partition and, when a route is configured, copied `fan_out` times onto the
/// route's output topic. Failures are programmed up front: the first
/// `inject_failures` injections are rejected, and the first scripted reads of
/// a topic fail before reads behave again.
#[derive(Clone, Debug, Default)]
pub(crate) struct TopologyDriver {
    routes: BTreeMap<String, String>,
    fan_out: usize,
    inject_failures: usize,
    poll_failures: BTreeMap<String, usize>,
    offsets: BTreeMap<(String, i32), i64>,
    buffered: BTreeMap<String, VecDeque<ResolvedRecord>>,
}

impl TopologyDriver {
    pub(crate) fn new() -> Self {
        Self {
            fan_out: 1,
            ..Self::default()
        }
    }

    pub(crate) fn with_route(
        mut self,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        _ = self.routes.insert(input.into(), output.into());
        self
    }

    pub(crate) fn with_fan_out(self, fan_out: usize) -> Self {
        Self { fan_out, ..self }
    }

    pub(crate) fn with_inject_failures(self, inject_failures: usize) -> Self {
        Self {
            inject_failures,
            ..self
        }
    }

    pub(crate) fn with_poll_failures(mut self, topic: impl Into<String>, failures: usize) -> Self {
        _ = self.poll_failures.insert(topic.into(), failures);
        self
    }

    fn next_offset(&mut self, topic: &str, partition: i32) -> i64 {
        let offset = self
            .offsets
            .entry((topic.to_owned(), partition))
            .or_default();
        let assigned = *offset;
        *offset += 1;
        assigned
    }
}

impl Driver for TopologyDriver {
    fn inject(&mut self, record: ResolvedRecord) -> Result<Acknowledgment> {
        if self.inject_failures > 0 {
            self.inject_failures -= 1;
            return Err(Error::Injection(format!(
                "{} rejected by topology",
                record.topic
            )));
        }

        let offset = self.next_offset(&record.topic, record.partition);

        if let Some(output) = self.routes.get(&record.topic).cloned() {
            for _ in 0..self.fan_out {
                let offset = self.next_offset(&output, record.partition);

                self.buffered
                    .entry(output.clone())
                    .or_default()
                    .push_back(ResolvedRecord {
                        topic: output.clone(),
                        offset,
                        ..record.clone()
                    });
            }
        }

        Ok(Acknowledgment::new(record.topic, record.partition, offset))
    }

    fn read_output(&mut self, topic: &str) -> Result<Option<ResolvedRecord>> {
        if let Some(failures) = self.poll_failures.get_mut(topic) {
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Message(format!("{topic} read failed")));
            }
        }

        Ok(self.buffered.get_mut(topic).and_then(VecDeque::pop_front))
    }
}
