//! The work done by one worker thread.
//!
//! A worker owns a set of arrays, all allocated from the shared pool, and mirrors each of them in
//! a `HashMap` model. It runs a random mix of writes, reads and shrinks, checking every read
//! against the model. Shrinks are driven in slices of at most `step_budget` steps, yielding to
//! the other workers and checking the head for consistency between slices.

use std::collections::HashMap;

use anyhow::{ensure, Result};
use dynarr::{DynArr, Error, Head, Pool, Shared, Step};
use rand::prelude::*;

use crate::cli::WorkloadParams;

/// Counters of what a worker did.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub sets: u64,
    pub gets: u64,
    pub trims: u64,
    pub truncates: u64,
    pub releases: u64,
    pub shrink_steps: u64,
    pub out_of_memory: u64,
}

impl Stats {
    pub fn merge(&mut self, other: &Stats) {
        self.sets += other.sets;
        self.gets += other.gets;
        self.trims += other.trims;
        self.truncates += other.truncates;
        self.releases += other.releases;
        self.shrink_steps += other.shrink_steps;
        self.out_of_memory += other.out_of_memory;
    }
}

enum Shrink {
    Release,
    Trim(u32),
    Truncate(u32),
}

pub struct Worker<'p> {
    id: usize,
    pool: &'p Pool<Shared>,
    params: WorkloadParams,
    rng: rand_pcg::Pcg64,
    heads: Vec<Head>,
    models: Vec<HashMap<u32, u32>>,
    stats: Stats,
}

impl<'p> Worker<'p> {
    pub fn new(id: usize, pool: &'p Pool<Shared>, params: WorkloadParams, seed: u64) -> Self {
        let heads = (0..params.arrays).map(|_| Head::new()).collect();
        let models = (0..params.arrays).map(|_| HashMap::new()).collect();
        Worker {
            id,
            pool,
            params,
            rng: rand_pcg::Pcg64::seed_from_u64(seed),
            heads,
            models,
            stats: Stats::default(),
        }
    }

    /// Run the workload, then release every array.
    pub fn run(mut self) -> Result<Stats> {
        let outcome = self.run_ops();
        let teardown = self.teardown();
        outcome?;
        teardown?;
        tracing::debug!(worker = self.id, stats = ?self.stats, "worker finished");
        Ok(self.stats)
    }

    fn run_ops(&mut self) -> Result<()> {
        if self.heads.is_empty() {
            return Ok(());
        }
        for _ in 0..self.params.ops {
            let a = self.rng.gen_range(0..self.heads.len());
            match self.rng.gen_range(0..100) {
                0..=44 => self.set(a)?,
                45..=79 => self.get(a)?,
                80..=86 => self.trim(a)?,
                87..=91 => self.truncate(a)?,
                92..=94 => self.release(a)?,
                _ => self.census(a)?,
            }
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        let mut result = Ok(());
        for a in 0..self.heads.len() {
            let released = self.release(a);
            if result.is_ok() {
                result = released;
            }
        }
        result
    }

    // Mostly positions inside the array, sometimes anywhere.
    fn pick_pos(&mut self, a: usize) -> u32 {
        let size = self.heads[a].size();
        let max_pos = self.params.max_pos;
        if size > 0 && self.rng.gen_bool(0.7) {
            self.rng.gen_range(0..size.min(max_pos + 1))
        } else {
            self.rng.gen_range(0..=max_pos)
        }
    }

    fn set(&mut self, a: usize) -> Result<()> {
        let pos = self.pick_pos(a);
        let value = self.rng.gen_range(1..=u32::MAX);
        self.stats.sets += 1;

        let written = DynArr::new(self.pool, &mut self.heads[a])
            .set(pos)
            .map(|word| *word = value);
        match written {
            Ok(()) => {
                self.models[a].insert(pos, value);
            }
            Err(Error::OutOfMemory { .. }) => {
                self.stats.out_of_memory += 1;
                tracing::trace!(worker = self.id, array = a, pos, "out of memory, releasing");
                self.release(a)?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn get(&mut self, a: usize) -> Result<()> {
        let pos = self.pick_pos(a);
        self.stats.gets += 1;

        let arr = DynArr::new(self.pool, &mut self.heads[a]);
        let model = &self.models[a];
        match arr.get(pos) {
            Some(&word) => {
                let expected = model.get(&pos).copied().unwrap_or(0);
                ensure!(
                    word == expected,
                    "worker {}: array {} read {} at {}, expected {}",
                    self.id,
                    a,
                    word,
                    pos,
                    expected
                );
            }
            None => {
                ensure!(
                    pos >= arr.head().size(),
                    "worker {}: array {} failed to read {} below its size {}",
                    self.id,
                    a,
                    pos,
                    arr.head().size()
                );
                ensure!(
                    !model.contains_key(&pos),
                    "worker {}: array {} lost position {}",
                    self.id,
                    a,
                    pos
                );
            }
        }
        Ok(())
    }

    fn census(&mut self, a: usize) -> Result<()> {
        let arr = DynArr::new(self.pool, &mut self.heads[a]);
        let census = arr.node_census();
        ensure!(
            census as i64 == arr.head().node_count() as i64,
            "worker {}: array {} reaches {} nodes but counts {}",
            self.id,
            a,
            census,
            arr.head().node_count()
        );
        Ok(())
    }

    fn trim(&mut self, a: usize) -> Result<()> {
        let Some(target) = self.pick_target(a) else {
            return Ok(());
        };
        self.stats.trims += 1;
        self.shrink(a, Shrink::Trim(target))?;
        self.check_shrunk(a, target)?;
        self.models[a].retain(|&pos, _| pos < target);
        Ok(())
    }

    fn truncate(&mut self, a: usize) -> Result<()> {
        let Some(target) = self.pick_target(a) else {
            return Ok(());
        };
        self.stats.truncates += 1;
        let surfaced = self.shrink(a, Shrink::Truncate(target))?;
        self.check_shrunk(a, target)?;

        let mut dropped: Vec<u32> = self.models[a]
            .iter()
            .filter(|&(&pos, _)| pos >= target)
            .map(|(_, &value)| value)
            .collect();
        self.models[a].retain(|&pos, _| pos < target);
        self.check_surfaced(a, surfaced, &mut dropped)
    }

    fn release(&mut self, a: usize) -> Result<()> {
        self.stats.releases += 1;
        let surfaced = self.shrink(a, Shrink::Release)?;
        let head = &self.heads[a];
        ensure!(
            head.is_empty() && head.node_count() == 0,
            "worker {}: array {} not empty after release: {:?}",
            self.id,
            a,
            head
        );

        let mut dropped: Vec<u32> = self.models[a].drain().map(|(_, value)| value).collect();
        self.check_surfaced(a, surfaced, &mut dropped)
    }

    fn pick_target(&mut self, a: usize) -> Option<u32> {
        let size = self.heads[a].size();
        (size > 0).then(|| self.rng.gen_range(0..size))
    }

    /// Drive a shrink to completion in slices of `step_budget` steps. Returns the surfaced words.
    fn shrink(&mut self, a: usize, shrink: Shrink) -> Result<Vec<u32>> {
        let mut arr = DynArr::new(self.pool, &mut self.heads[a]);
        let mut iter = arr.release_iter();
        let mut surfaced = Vec::new();
        let mut out = 0;

        loop {
            for _ in 0..self.params.step_budget {
                self.stats.shrink_steps += 1;
                let step = match shrink {
                    Shrink::Release => arr.release(&mut iter, &mut out),
                    Shrink::Trim(pos) => arr.trim(pos, &mut iter),
                    Shrink::Truncate(pos) => arr.truncate(pos, &mut iter, Some(&mut out)),
                };
                match step {
                    Step::Done => return Ok(surfaced),
                    Step::Data => surfaced.push(out),
                    Step::NoData => {}
                }
            }

            let census = arr.node_census();
            ensure!(
                census as i64 == arr.head().node_count() as i64,
                "worker {}: array {} reaches {} nodes but counts {} mid-shrink",
                self.id,
                a,
                census,
                arr.head().node_count()
            );
            std::thread::yield_now();
        }
    }

    fn check_shrunk(&self, a: usize, target: u32) -> Result<()> {
        let head = &self.heads[a];
        ensure!(
            head.size() == target,
            "worker {}: array {} has size {} after shrinking to {}",
            self.id,
            a,
            head.size(),
            target
        );
        Ok(())
    }

    // Words are only ever written non-zero, so the non-zero surfaced words must be exactly the
    // values dropped from the model.
    fn check_surfaced(&self, a: usize, surfaced: Vec<u32>, dropped: &mut Vec<u32>) -> Result<()> {
        let mut surfaced: Vec<u32> = surfaced.into_iter().filter(|&w| w != 0).collect();
        surfaced.sort_unstable();
        dropped.sort_unstable();
        ensure!(
            surfaced == *dropped,
            "worker {}: array {} surfaced {} values, expected {}",
            self.id,
            a,
            surfaced.len(),
            dropped.len()
        );
        Ok(())
    }
}
