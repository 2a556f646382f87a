//! Bounded top-k queue and neighbor results.
//!
//! The queue is a max-heap keyed by `(distance, id)`: the root is always the
//! farthest retained candidate, so a closer candidate evicts it once the
//! queue is full. Equal distances are ordered by ascending id, both when
//! deciding which candidate to keep and in the drained output.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::space::SpaceType;

/// One ranked neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeighborResult {
    pub id: i64,
    pub distance: f32,
}

impl NeighborResult {
    pub fn new(id: i64, distance: f32) -> Self {
        Self { id, distance }
    }

    /// Higher-is-better score for `space`.
    pub fn score(&self, space: SpaceType) -> f32 {
        space.score_translation(self.distance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    distance: OrderedFloat<f32>,
    id: i64,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Retains the `k` closest candidates pushed into it.
#[derive(Debug, Clone)]
pub struct TopKQueue {
    k: usize,
    heap: BinaryHeap<QueueEntry>,
}

impl TopKQueue {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offer a candidate. Returns whether it was retained.
    pub fn push(&mut self, id: i64, distance: f32) -> bool {
        if self.k == 0 {
            return false;
        }
        let entry = QueueEntry {
            distance: OrderedFloat(distance),
            id,
        };
        if self.heap.len() < self.k {
            self.heap.push(entry);
            return true;
        }
        match self.heap.peek() {
            Some(worst) if entry < *worst => {
                self.heap.pop();
                self.heap.push(entry);
                true
            }
            _ => false,
        }
    }

    /// Distance of the farthest retained candidate.
    pub fn top_distance(&self) -> Option<f32> {
        self.heap.peek().map(|e| e.distance.0)
    }

    /// Remove and return the farthest retained candidate.
    pub fn pop(&mut self) -> Option<NeighborResult> {
        self.heap
            .pop()
            .map(|e| NeighborResult::new(e.id, e.distance.0))
    }

    /// Drain into a list ordered nearest first.
    pub fn into_sorted_vec(mut self) -> Vec<NeighborResult> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(farthest) = self.pop() {
            out.push(farthest);
        }
        out.reverse();
        out
    }
}
