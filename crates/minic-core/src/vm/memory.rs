// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Memory pool layout and the heap allocator.

use std::fmt;
use std::ops::Range;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// One region of the memory pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Instructions and operands
    Text,
    /// Globals and string literals
    Data,
    /// `malloc` arena
    Heap,
    /// Call stack, growing downward
    Stack,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Segment::Text => "text",
            Segment::Data => "data",
            Segment::Heap => "heap",
            Segment::Stack => "stack",
        })
    }
}

/// How the pool is split between the segments.
///
/// Text, data and heap each get a quarter of the pool; the stack takes the
/// remainder at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLayout {
    /// Instruction segment
    pub text: Range<usize>,
    /// Global data segment
    pub data: Range<usize>,
    /// Heap segment
    pub heap: Range<usize>,
    /// Stack segment
    pub stack: Range<usize>,
}

impl MemoryLayout {
    /// Smallest pool that still leaves every segment usable.
    pub const MIN_POOL_SIZE: usize = 64;

    /// Partitions a pool of `pool_size` words.
    pub fn partition(pool_size: usize) -> Result<Self> {
        if pool_size < Self::MIN_POOL_SIZE {
            return Err(Error::PoolTooSmall { words: pool_size });
        }
        let quarter = pool_size / 4;
        Ok(Self {
            text: 0..quarter,
            data: quarter..2 * quarter,
            heap: 2 * quarter..3 * quarter,
            stack: 3 * quarter..pool_size,
        })
    }

    /// Total number of words in the pool.
    pub fn pool_size(&self) -> usize {
        self.stack.end
    }

    /// The segment an address belongs to.
    pub fn segment_of(&self, address: usize) -> Option<Segment> {
        [
            (Segment::Text, &self.text),
            (Segment::Data, &self.data),
            (Segment::Heap, &self.heap),
            (Segment::Stack, &self.stack),
        ]
        .into_iter()
        .find(|(_, range)| range.contains(&address))
        .map(|(segment, _)| segment)
    }
}

/// First-fit allocator over the heap segment.
///
/// The allocator only tracks block boundaries; zeroing the returned words is
/// the caller's job since the pool lives in the VM.
#[derive(Debug, Clone)]
pub(crate) struct Heap {
    region: Range<usize>,
    /// Free blocks, sorted by start address and never adjacent
    free: Vec<Range<usize>>,
    /// Live blocks: start address -> size in words
    live: FxHashMap<usize, usize>,
}

impl Heap {
    pub(crate) fn new(region: Range<usize>) -> Self {
        let mut heap = Self {
            region,
            free: Vec::new(),
            live: FxHashMap::default(),
        };
        heap.reset();
        heap
    }

    /// Releases every block.
    pub(crate) fn reset(&mut self) {
        self.free.clear();
        if !self.region.is_empty() {
            self.free.push(self.region.clone());
        }
        self.live.clear();
    }

    /// Finds the first free block with room for `words` words.
    pub(crate) fn allocate(&mut self, words: usize) -> Option<usize> {
        if words == 0 {
            return None;
        }
        let index = self.free.iter().position(|block| block.len() >= words)?;
        let start = self.free[index].start;
        if self.free[index].len() == words {
            self.free.remove(index);
        } else {
            self.free[index].start += words;
        }
        self.live.insert(start, words);
        Some(start)
    }

    /// Returns a block to the free list, merging it with its neighbours.
    /// Returns the size of the block, or `None` if `address` is not the start
    /// of a live block.
    pub(crate) fn release(&mut self, address: usize) -> Option<usize> {
        let words = self.live.remove(&address)?;
        let block = address..address + words;
        let index = self.free.partition_point(|free| free.start < block.start);
        self.free.insert(index, block);

        if index + 1 < self.free.len() && self.free[index].end == self.free[index + 1].start {
            let next = self.free.remove(index + 1);
            self.free[index].end = next.end;
        }
        if index > 0 && self.free[index - 1].end == self.free[index].start {
            let current = self.free.remove(index);
            self.free[index - 1].end = current.end;
        }
        Some(words)
    }

    /// Number of live blocks.
    pub(crate) fn live_blocks(&self) -> usize {
        self.live.len()
    }
}
