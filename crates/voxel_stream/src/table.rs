//! Resident chunks and the streaming bookkeeping queues.

use std::collections::hash_map::{Entry, Values, ValuesMut};
use std::collections::{HashMap, HashSet, VecDeque};


use crate::chunk::Chunk;
use crate::coord::ChunkCoord;
use crate::protocol::ChunkPayload;

/// FIFO of chunk coordinates in which each coordinate appears at most once.
#[derive(Clone, Debug, Default)]
pub struct CoordQueue {
    queue: VecDeque<ChunkCoord>,
    queued: HashSet<ChunkCoord>,
}

impl CoordQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a coordinate.
    ///
    /// Returns false (and does nothing) if it is already queued.
    pub fn push(&mut self, coord: ChunkCoord) -> bool {
        if self.queued.insert(coord) {
            self.queue.push_back(coord);
            true
        } else {
            false
        }
    }

    /// Take the oldest queued coordinate.
    pub fn pop(&mut self) -> Option<ChunkCoord> {
        let coord = self.queue.pop_front()?;
        self.queued.remove(&coord);
        Some(coord)
    }

    /// Pop up to `max` coordinates from the front.
    pub fn take(&mut self, max: usize) -> Vec<ChunkCoord> {
        let count = max.min(self.queue.len());
        let taken: Vec<ChunkCoord> = self.queue.drain(..count).collect();
        for coord in &taken {
            self.queued.remove(coord);
        }
        taken
    }

    /// Remove a coordinate wherever it is in the queue.
    pub fn remove(&mut self, coord: ChunkCoord) -> bool {
        if self.queued.remove(&coord) {
            self.queue.retain(|c| *c != coord);
            true
        } else {
            false
        }
    }

    /// Whether the coordinate is queued.
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.queued.contains(&coord)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkCoord> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Empty the queue.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.queued.clear();
    }
}

/// A received chunk payload waiting to be meshed.
#[derive(Clone, Debug)]
pub struct PendingPayload {
    pub payload: ChunkPayload,
    /// Arrival order; later payloads have larger values.
    pub sequence: u64,
}

impl PendingPayload {
    /// Coordinate named by the payload.
    pub fn coord(&self) -> ChunkCoord {
        self.payload.coord()
    }
}

/// Resident chunks plus the request/process/add queues the scheduler drives.
///
/// A coordinate is in at most one of `to_request` and `requested`; use
/// [`ChunkTable::queue_request`], [`ChunkTable::mark_requested`] and
/// [`ChunkTable::requeue`] to move it between them.
#[derive(Debug, Default)]
pub struct ChunkTable {
    chunks: HashMap<ChunkCoord, Chunk>,

    /// Coordinates waiting for an outbound LOAD.
    pub to_request: CoordQueue,

    /// Coordinates with a LOAD in flight, mapped to surround passes without a reply.
    pub requested: HashMap<ChunkCoord, u32>,

    /// Received payloads waiting to be meshed. Not deduplicated.
    pub to_process: Vec<PendingPayload>,

    /// Meshed chunks waiting to be attached to the scene.
    pub to_add: CoordQueue,

    /// Chunk the observer stands in.
    pub current_chunk: ChunkCoord,

    received: u64,
}

impl ChunkTable {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Chunk Access
    // ========================================================================

    /// Get a reference to a resident chunk by coordinate.
    pub fn get(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    /// Get a mutable reference to a resident chunk by coordinate.
    pub fn get_mut(&mut self, coord: ChunkCoord) -> Option<&mut Chunk> {
        self.chunks.get_mut(&coord)
    }

    /// Insert a chunk, returning the one it replaced.
    pub fn set(&mut self, chunk: Chunk) -> Option<Chunk> {
        self.chunks.insert(chunk.coord, chunk)
    }

    /// Map entry for a coordinate, for insert-or-get.
    pub fn entry(&mut self, coord: ChunkCoord) -> Entry<'_, ChunkCoord, Chunk> {
        self.chunks.entry(coord)
    }

    /// Remove a chunk from the table and return it.
    pub fn delete(&mut self, coord: ChunkCoord) -> Option<Chunk> {
        self.chunks.remove(&coord)
    }

    /// Whether a chunk is resident at the coordinate.
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord)
    }

    /// Lazy pass over live chunks. Call again to restart.
    pub fn values(&self) -> Values<'_, ChunkCoord, Chunk> {
        self.chunks.values()
    }

    /// Iterate mutably over resident chunks.
    pub fn values_mut(&mut self) -> ValuesMut<'_, ChunkCoord, Chunk> {
        self.chunks.values_mut()
    }

    /// Coordinates of all resident chunks.
    pub fn coords(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.chunks.keys().copied()
    }

    /// Number of resident chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    // ========================================================================
    // Request Bookkeeping
    // ========================================================================

    /// Queue a coordinate for request unless it is already queued or in flight.
    pub fn queue_request(&mut self, coord: ChunkCoord) -> bool {
        if self.requested.contains_key(&coord) {
            return false;
        }
        self.to_request.push(coord)
    }

    /// Move a coordinate from `to_request` to `requested` with a fresh counter.
    pub fn mark_requested(&mut self, coord: ChunkCoord) {
        self.to_request.remove(coord);
        self.requested.insert(coord, 1);
    }

    /// Move an in-flight coordinate back to `to_request` for another attempt.
    pub fn requeue(&mut self, coord: ChunkCoord) -> bool {
        if self.requested.remove(&coord).is_none() {
            return false;
        }
        self.to_request.push(coord)
    }

    /// Whether the coordinate is waiting for or has an outstanding request.
    pub fn is_pending(&self, coord: ChunkCoord) -> bool {
        self.requested.contains_key(&coord) || self.to_request.contains(coord)
    }

    /// Drop every chunk and empty every queue.
    /// Queue a received payload for meshing, stamped with its arrival order.
    pub fn push_payload(&mut self, payload: ChunkPayload) {
        self.received += 1;
        self.to_process.push(PendingPayload {
            payload,
            sequence: self.received,
        });
    }

    /// Drop every chunk and empty every queue. Returns the dropped chunks.
    pub fn clear(&mut self) -> Vec<Chunk> {
        self.to_request.clear();
        self.requested.clear();
        self.to_process.clear();
        self.to_add.clear();
        self.current_chunk = ChunkCoord::ZERO;
        self.chunks.drain().map(|(_, chunk)| chunk).collect()
    }
}
