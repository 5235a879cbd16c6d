// Copyright 2025 Tether Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Load-generating client: pushes rounds of person-service calls through
//! the worker pool and reports how many of them made it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tether_common::pool::WorkerPool;
use tether_common::protocol::{Result, TetherError};
use tether_container::{Autowired, Descriptor, Participant, Reference};

use crate::person::{PersonService, SEXES};

/// Default number of rounds for `tether client`.
pub const DEFAULT_TIMES: usize = 5000;

/// Upper bound on waiting for submitted rounds to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of [`Customer::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub times: usize,
    pub submitted: u64,
    pub completed: u64,
    pub dropped: u64,
    /// Rounds in which at least one call failed
    pub failed: u64,
    pub elapsed: Duration,
}

impl Report {
    pub fn unfinished(&self) -> u64 {
        self.submitted.saturating_sub(self.completed)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rounds={} submitted={} completed={} dropped={} failed={} elapsed={}.{:03}s",
            self.times,
            self.submitted,
            self.completed,
            self.dropped,
            self.failed,
            self.elapsed.as_secs(),
            self.elapsed.subsec_millis()
        )
    }
}

/// Client entry participant.
#[derive(Default)]
pub struct Customer {
    person_service: Reference<dyn PersonService>,
    pool: Autowired<WorkerPool>,
}

impl Participant for Customer {
    fn descriptor() -> Descriptor<Self> {
        Descriptor::<Self>::new()
            .client_entry()
            .reference("person_service", |c| &c.person_service)
            .autowired("pool", |c| &c.pool)
    }
}

impl Customer {
    pub fn person_service(&self) -> Result<Arc<dyn PersonService>> {
        self.person_service.get()
    }

    /// Submits `times` call rounds to the pool and waits for them to
    /// drain. Rounds the pool drops are counted, not retried.
    pub fn run(&self, times: usize) -> Result<Report> {
        let service = self.person_service.get()?;
        let pool = self.pool.get()?;
        let before = pool.stats();
        let failed = Arc::new(AtomicU64::new(0));
        let started = Instant::now();

        for round in 0..times {
            let service = service.clone();
            let failed = failed.clone();
            let outcome = pool.execute(move || {
                if let Err(e) = call_round(service.as_ref(), round) {
                    tracing::warn!(round, error = %e, "Call round failed");
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            });
            match outcome {
                Ok(()) | Err(TetherError::QueueOverflowDropped { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        if !pool.wait_idle(DRAIN_TIMEOUT) {
            tracing::warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "Pool did not drain in time");
        }

        let after = pool.stats();
        let report = Report {
            times,
            submitted: after.submitted - before.submitted,
            completed: after.completed - before.completed,
            dropped: after.dropped - before.dropped,
            failed: failed.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        };
        tracing::info!(%report, "Customer finished");
        Ok(report)
    }
}

/// One round: add, get, remove, count and both `number` forms.
fn call_round(service: &dyn PersonService, round: usize) -> Result<()> {
    let mut rng = rand::thread_rng();
    let n = i32::try_from(round).unwrap_or(i32::MAX);

    let sex = SEXES[rng.gen_range(0..SEXES.len())].to_string();
    service.add(random_name(&mut rng), sex, rng.gen_range(0..100))?;

    let name = random_name(&mut rng);
    let person = service.get(name.clone())?;
    tracing::debug!(round, %name, ?person, "get");

    let name = random_name(&mut rng);
    let removed = service.remove(name.clone())?;
    tracing::debug!(round, %name, ?removed, "remove");

    let count = service.count()?;
    let plain = service.number(n)?;
    let boxed = service.number_or_null(Some(n))?;
    tracing::debug!(round, count, plain, boxed, "count and number");
    Ok(())
}

/// Short hex name, possibly empty, so lookups hit and miss.
fn random_name(rng: &mut impl Rng) -> String {
    let len = rng.gen_range(0..6);
    (0..len)
        .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
        .collect()
}
