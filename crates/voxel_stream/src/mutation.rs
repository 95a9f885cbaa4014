//! Optimistic voxel edits and the previous-value cache.
//!
//! Local edits are validated and queued, then applied to chunk storage when
//! flushed so rendering reflects them before the server answers. Server
//! updates overwrite storage directly. Whichever write arrives last wins.

use std::collections::{HashMap, VecDeque};

use crate::codec::{self, BlockRotation, RotationAxis};
use crate::config::ServerParams;
use crate::coord::ChunkCoord;
use crate::protocol::{OutboundUpdate, VoxelUpdate};
use crate::registry::BlockRegistry;
use crate::table::ChunkTable;

/// A requested edit as supplied by the caller.
///
/// `None` rotation fields mean "not specified".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoxelEdit {
    pub vx: i32,
    pub vy: i32,
    pub vz: i32,
    pub type_id: u32,
    pub rotation: Option<u32>,
    pub y_rotation: Option<u32>,
}

impl VoxelEdit {
    pub fn new(vx: i32, vy: i32, vz: i32, type_id: u32) -> Self {
        Self {
            vx,
            vy,
            vz,
            type_id,
            rotation: None,
            y_rotation: None,
        }
    }

    pub fn with_rotation(mut self, rotation: u32, y_rotation: u32) -> Self {
        self.rotation = Some(rotation);
        self.y_rotation = Some(y_rotation);
        self
    }
}

/// A validated, normalized edit waiting to be flushed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockUpdate {
    pub vx: i32,
    pub vy: i32,
    pub vz: i32,
    pub type_id: u32,
    pub rotation: RotationAxis,
    pub y_rotation: u32,
}

impl BlockUpdate {
    pub fn block_rotation(&self) -> BlockRotation {
        BlockRotation::new(self.rotation, self.y_rotation as u8)
    }

    /// Voxel word with id and rotation packed.
    pub fn raw_word(&self) -> u32 {
        codec::insert_rotation(codec::insert_id(0, self.type_id), self.block_rotation())
    }

    pub fn voxel(&self) -> [i32; 3] {
        [self.vx, self.vy, self.vz]
    }
}

/// Pending local edits plus the id each voxel held before its latest change.
#[derive(Clone, Debug, Default)]
pub struct MutationQueue {
    to_update: VecDeque<BlockUpdate>,
    block_cache: HashMap<[i32; 3], u32>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and queue edits. Returns how many were queued.
    ///
    /// Dropped: voxels outside `0..max_height`, unregistered block ids (with a
    /// warning), and edits that would not change the voxel. An unspecified
    /// rotation becomes upright; the y-rotation is zeroed for blocks that
    /// cannot be y-rotated.
    pub fn update_voxels(
        &mut self,
        edits: impl IntoIterator<Item = VoxelEdit>,
        registry: &BlockRegistry,
        table: &ChunkTable,
        params: &ServerParams,
    ) -> usize {
        let mut queued = 0;

        for edit in edits {
            let VoxelEdit { vx, vy, vz, type_id, .. } = edit;

            if vy < 0 || vy >= params.max_height as i32 {
                log::trace!("dropping edit at ({vx}, {vy}, {vz}): outside world height");
                continue;
            }

            let block = match registry.require(type_id) {
                Ok(block) => block,
                Err(err) => {
                    log::warn!("{err}, dropping edit at ({vx}, {vy}, {vz})");
                    continue;
                }
            };

            let chunk = table.get(ChunkCoord::from_voxel(vx, vz, params.chunk_size));
            let current_id = chunk.map_or(0, |c| c.voxel(vx, vy, vz));
            let current_rotation = chunk.map(|c| c.voxel_rotation(vx, vy, vz)).unwrap_or_default();

            let same_rotation = edit.rotation == Some(current_rotation.axis.raw());
            let same_y_rotation = edit.y_rotation == Some(current_rotation.y_rotation as u32);
            if current_id == type_id && same_rotation && same_y_rotation {
                continue;
            }

            let rotation = match edit.rotation {
                Some(raw) => RotationAxis::from_raw(raw).unwrap_or_else(|| {
                    log::warn!("invalid rotation {raw} for edit at ({vx}, {vy}, {vz}), using upright");
                    RotationAxis::default()
                }),
                None => RotationAxis::default(),
            };
            let y_rotation = if block.y_rotatable {
                edit.y_rotation.unwrap_or(0) % codec::Y_ROT_SEGMENTS
            } else {
                0
            };

            self.to_update.push_back(BlockUpdate {
                vx,
                vy,
                vz,
                type_id,
                rotation,
                y_rotation,
            });
            queued += 1;
        }

        queued
    }

    /// Apply up to `max` queued edits to storage and return them for the outbound UPDATE.
    ///
    /// Edits to chunks that are not resident are sent without local prediction.
    pub fn flush(&mut self, max: usize, table: &mut ChunkTable, chunk_size: u32) -> Vec<OutboundUpdate> {
        let count = max.min(self.to_update.len());
        let mut outbound = Vec::with_capacity(count);

        for update in self.to_update.drain(..count) {
            let BlockUpdate { vx, vy, vz, .. } = update;

            if let Some(chunk) = table.get_mut(ChunkCoord::from_voxel(vx, vz, chunk_size)) {
                let previous = chunk.voxel(vx, vy, vz);
                if previous != update.type_id {
                    self.block_cache.insert(update.voxel(), previous);
                }
                chunk.set_voxel(vx, vy, vz, update.type_id);
                chunk.set_voxel_rotation(vx, vy, vz, update.block_rotation());
            }

            outbound.push(OutboundUpdate {
                vx,
                vy,
                vz,
                type_id: update.type_id,
                rotation: update.rotation.raw(),
                y_rotation: update.y_rotation,
                voxel: update.raw_word(),
            });
        }

        outbound
    }

    /// Put flushed edits back at the front of the queue, in their original order.
    ///
    /// Used when the UPDATE carrying them could not be sent. The local
    /// prediction stays in storage.
    pub fn requeue(&mut self, updates: &[OutboundUpdate]) {
        for update in updates.iter().rev() {
            self.to_update.push_front(BlockUpdate {
                vx: update.vx,
                vy: update.vy,
                vz: update.vz,
                type_id: update.type_id,
                rotation: RotationAxis::from_raw(update.rotation).unwrap_or_default(),
                y_rotation: update.y_rotation,
            });
        }
    }

    /// Write authoritative voxel and light words. Returns how many landed in resident chunks.
    pub fn apply_server_updates(
        &mut self,
        updates: &[VoxelUpdate],
        table: &mut ChunkTable,
        chunk_size: u32,
    ) -> usize {
        let mut applied = 0;

        for update in updates {
            let VoxelUpdate { vx, vy, vz, voxel, light } = *update;
            let Some(chunk) = table.get_mut(ChunkCoord::from_voxel(vx, vz, chunk_size)) else {
                log::trace!("server update at ({vx}, {vy}, {vz}) for a chunk that is not resident");
                continue;
            };

            let previous = chunk.voxel(vx, vy, vz);
            if previous != codec::extract_id(voxel) {
                self.block_cache.insert([vx, vy, vz], previous);
            }
            chunk.set_raw_value(vx, vy, vz, voxel);
            chunk.set_raw_light(vx, vy, vz, light);
            applied += 1;
        }

        applied
    }

    /// Id the voxel held immediately before its most recent id change.
    pub fn previous_voxel(&self, vx: i32, vy: i32, vz: i32) -> Option<u32> {
        self.block_cache.get(&[vx, vy, vz]).copied()
    }

    pub fn pending(&self) -> impl Iterator<Item = &BlockUpdate> {
        self.to_update.iter()
    }

    pub fn len(&self) -> usize {
        self.to_update.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_update.is_empty()
    }

    /// Forget queued edits and the previous-value cache.
    pub fn clear(&mut self) {
        self.to_update.clear();
        self.block_cache.clear();
    }
}
