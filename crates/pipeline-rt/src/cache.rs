// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-stage activation cache.
//!
//! A bounded FIFO of forward records. Records are consumed in the order
//! they were produced, which is what lets backward hand each stage the
//! gradient for the same micro-batch whose activation it pops.

use crate::{Context, PipelineError};
use std::collections::VecDeque;

/// One retained forward record.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Sequence index of the micro-batch within its full batch.
    pub micro_batch: usize,
    /// State saved by the unit's forward call.
    pub context: Context,
}

/// Bounded FIFO of [`CacheEntry`] records for one stage.
#[derive(Debug, Clone)]
pub struct ActivationCache {
    stage: usize,
    capacity: Option<usize>,
    entries: VecDeque<CacheEntry>,
}

impl ActivationCache {
    /// Creates an empty cache. `capacity` of `None` means unbounded.
    pub fn new(stage: usize, capacity: Option<usize>) -> Self {
        Self {
            stage,
            capacity,
            entries: VecDeque::with_capacity(capacity.unwrap_or(0)),
        }
    }

    /// Retains `context` for `micro_batch`.
    ///
    /// Returns `Ok(false)` without touching the cache when a record for
    /// this micro-batch is already pending: only the first forward
    /// invocation is kept.
    pub fn push(&mut self, micro_batch: usize, context: Context) -> Result<bool, PipelineError> {
        if self.contains(micro_batch) {
            tracing::warn!(
                stage = self.stage,
                micro_batch,
                "forward re-invoked for a cached micro-batch; keeping the first record",
            );
            return Ok(false);
        }
        if let Some(capacity) = self.capacity {
            if self.entries.len() >= capacity {
                return Err(PipelineError::CacheOverflow {
                    stage: self.stage,
                    capacity,
                });
            }
        }
        self.entries.push_back(CacheEntry {
            micro_batch,
            context,
        });
        Ok(true)
    }

    /// Removes and returns the oldest record.
    pub fn pop(&mut self) -> Result<CacheEntry, PipelineError> {
        self.entries
            .pop_front()
            .ok_or(PipelineError::CacheUnderflow { stage: self.stage })
    }

    /// Returns `true` if a record for `micro_batch` is pending.
    pub fn contains(&self, micro_batch: usize) -> bool {
        self.entries.iter().any(|e| e.micro_batch == micro_batch)
    }

    /// Micro-batch indices of the pending records, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|e| e.micro_batch)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Bytes held by all pending records.
    pub fn size_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.context.size_bytes()).sum()
    }

    /// Drops every pending record, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut cache = ActivationCache::new(0, None);
        for mb in 0..3 {
            assert!(cache.push(mb, Context::new()).unwrap());
        }
        assert_eq!(cache.pending().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(cache.pop().unwrap().micro_batch, 0);
        assert_eq!(cache.pop().unwrap().micro_batch, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_first_record_wins() {
        let mut cache = ActivationCache::new(2, None);
        let first = Context::with_saved(vec![tensor_core::Tensor::zeros(
            tensor_core::Shape::vector(1),
        )]);
        assert!(cache.push(0, first.clone()).unwrap());
        assert!(!cache.push(0, Context::new()).unwrap());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.pop().unwrap().context, first);
    }

    #[test]
    fn test_underflow_names_stage() {
        let mut cache = ActivationCache::new(3, None);
        assert!(matches!(
            cache.pop(),
            Err(PipelineError::CacheUnderflow { stage: 3 })
        ));
    }

    #[test]
    fn test_overflow() {
        let mut cache = ActivationCache::new(1, Some(2));
        cache.push(0, Context::new()).unwrap();
        cache.push(1, Context::new()).unwrap();
        assert!(matches!(
            cache.push(2, Context::new()),
            Err(PipelineError::CacheOverflow { stage: 1, capacity: 2 })
        ));
        // A slot frees up once a record is consumed.
        cache.pop().unwrap();
        assert!(cache.push(2, Context::new()).is_ok());
    }

    #[test]
    fn test_clear() {
        let mut cache = ActivationCache::new(0, None);
        cache.push(0, Context::new()).unwrap();
        cache.push(1, Context::new()).unwrap();
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }
}
