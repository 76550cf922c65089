// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The conveyor: drives ordered work items through an ordered list of stages.
//!
//! # Schedules
//!
//! ```text
//! Sequential                     Overlapped (wavefront)
//! tick: 0  1  2  3  4  5        tick: 0  1  2  3
//! s0:   k0       k1             s0:   k0 k1
//! s1:      k0       k1          s1:      k0 k1
//! s2:         k0       k1       s2:         k0 k1
//! ```
//!
//! In the overlapped schedule stage `m` works on item `t - m` at tick `t`.
//! Every stage active in a tick runs on its own rayon worker, so a stage is
//! never touched by two threads at once. Both schedules feed items to every
//! stage in index order and produce identical results.

use crate::PipelineError;
use rayon::prelude::*;
use std::fmt;

/// How the conveyor interleaves items and stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    /// Drain each item through all stages before starting the next.
    Sequential,
    /// Advance a wavefront so different stages work on different items.
    #[default]
    Overlapped,
}

impl Schedule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Overlapped => "overlapped",
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hook applied to every item leaving the final stage.
pub type LastStageHook<'a, T> = &'a (dyn Fn(T) -> T + Sync);

/// Pipeline driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct Conveyor {
    schedule: Schedule,
}

impl Conveyor {
    pub fn new(schedule: Schedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Number of ticks a run over `items` items and `stages` stages takes.
    pub fn ticks(&self, items: usize, stages: usize) -> usize {
        if items == 0 || stages == 0 {
            return 0;
        }
        match self.schedule {
            Schedule::Sequential => items * stages,
            Schedule::Overlapped => items + stages - 1,
        }
    }

    /// Passes every item through every stage via `step`.
    ///
    /// `step(stage, k, item)` processes item `k` on `stage`. Result `k`
    /// corresponds to `items[k]`. When `collect_results` is false the final
    /// outputs are dropped and the returned vector is empty.
    ///
    /// Fails outright on the first error; no partial results are returned.
    pub fn run<S, T, F>(
        &self,
        items: Vec<T>,
        stages: &mut [S],
        step: F,
        last_stage_hook: Option<LastStageHook<'_, T>>,
        collect_results: bool,
    ) -> Result<Vec<T>, PipelineError>
    where
        S: Send,
        T: Send,
        F: Fn(&mut S, usize, T) -> Result<T, PipelineError> + Sync,
    {
        let n = items.len();
        tracing::debug!(
            items = n,
            stages = stages.len(),
            schedule = %self.schedule,
            "conveyor run",
        );

        let mut results = Vec::with_capacity(if collect_results { n } else { 0 });
        let mut finish = |item: T| {
            let item = match last_stage_hook {
                Some(hook) => hook(item),
                None => item,
            };
            if collect_results {
                results.push(item);
            }
        };

        match self.schedule {
            Schedule::Sequential => {
                for (k, item) in items.into_iter().enumerate() {
                    let mut item = item;
                    for stage in stages.iter_mut() {
                        item = step(stage, k, item)?;
                    }
                    finish(item);
                }
            }
            Schedule::Overlapped => run_wavefront(items, stages, &step, &mut finish)?,
        }

        Ok(results)
    }
}

fn run_wavefront<S, T, F>(
    items: Vec<T>,
    stages: &mut [S],
    step: &F,
    finish: &mut dyn FnMut(T),
) -> Result<(), PipelineError>
where
    S: Send,
    T: Send,
    F: Fn(&mut S, usize, T) -> Result<T, PipelineError> + Sync,
{
    let m = stages.len();
    if m == 0 {
        items.into_iter().for_each(finish);
        return Ok(());
    }

    let n = items.len();
    let mut pending = items.into_iter().enumerate();
    // waiting[s] holds the item about to enter stage s.
    let mut waiting: Vec<Option<(usize, T)>> = (0..m).map(|_| None).collect();

    for tick in 0..n + m - 1 {
        waiting[0] = pending.next();
        let active = waiting.iter().filter(|w| w.is_some()).count();
        tracing::debug!(tick, active, "conveyor tick");

        let jobs = std::mem::replace(&mut waiting, (0..m).map(|_| None).collect());
        let outputs: Vec<Result<Option<(usize, T)>, PipelineError>> = stages
            .par_iter_mut()
            .zip(jobs.into_par_iter())
            .map(|(stage, job)| match job {
                Some((k, item)) => step(stage, k, item).map(|out| Some((k, out))),
                None => Ok(None),
            })
            .collect();

        for (s, output) in outputs.into_iter().enumerate() {
            if let Some((k, item)) = output? {
                if s + 1 < m {
                    waiting[s + 1] = Some((k, item));
                } else {
                    finish(item);
                }
            }
        }
    }
    Ok(())
}
