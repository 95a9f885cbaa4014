//! Chunk column storage, point queries and mesh builds.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt};

use super::mesh::ChunkMesh;
use super::state::ChunkState;
use crate::codec::{self, BlockRotation, LightColor};
use crate::config::ServerParams;
use crate::coord::ChunkCoord;
use crate::protocol::{ChunkPayload, WordArray};
use crate::registry::{BlockRegistry, AIR_ID};

/// Problems found while decoding a payload. None of them abort the build.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Voxel array had the wrong length (or truncated bytes) and was zero-filled.
    pub voxels_resized: bool,
    /// Light array had the wrong length (or truncated bytes) and was zero-filled.
    pub lights_resized: bool,
    /// Voxels whose id is not in the registry.
    pub unknown_voxels: usize,
    /// First unknown id seen, for the log line.
    pub first_unknown: Option<u32>,
}

impl BuildReport {
    /// Whether the payload decoded without resizing or unknown ids.
    pub fn is_clean(&self) -> bool {
        !self.voxels_resized && !self.lights_resized && self.unknown_voxels == 0
    }
}

/// Geometry construction started by [`Chunk::build`].
///
/// The future owns everything it needs, so it can be polled from the frame
/// loop or handed to an executor.
pub struct MeshJob {
    pub coord: ChunkCoord,
    pub data_version: u64,
    pub report: BuildReport,
    future: BoxFuture<'static, ChunkMesh>,
}

impl fmt::Debug for MeshJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshJob")
            .field("coord", &self.coord)
            .field("data_version", &self.data_version)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

impl MeshJob {
    /// Poll once without blocking. Must not be called again after it returns `Some`.
    pub fn try_complete(&mut self) -> Option<ChunkMesh> {
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        match self.future.poll_unpin(&mut cx) {
            Poll::Ready(mesh) => Some(mesh),
            Poll::Pending => None,
        }
    }

    /// Wait for the geometry.
    pub async fn finish(self) -> ChunkMesh {
        self.future.await
    }
}

/// One vertical column of voxel and light storage.
///
/// Point queries take global voxel coordinates; anything outside the column
/// reads as zero and writes are ignored.
#[derive(Clone, Debug)]
pub struct Chunk {
    /// Server-assigned identifier.
    pub id: String,

    /// Chunk coordinate in chunk-space.
    pub coord: ChunkCoord,

    /// Current build state.
    pub state: ChunkState,

    /// Incremented on every build; finished builds for older versions are discarded.
    pub data_version: u64,

    /// At least one build has completed.
    pub is_ready: bool,

    /// Currently attached to the scene graph.
    pub added: bool,

    size: u32,
    max_height: u32,
    sub_chunks: u32,
    voxels: Vec<u32>,
    lights: Vec<u32>,
    mesh: Option<ChunkMesh>,
}

impl Chunk {
    /// Create an empty column at the given coordinate.
    pub fn new(id: impl Into<String>, coord: ChunkCoord, params: &ServerParams) -> Self {
        let size = params.chunk_size as usize;
        let volume = size * size * params.max_height as usize;
        Self {
            id: id.into(),
            coord,
            state: ChunkState::Empty,
            data_version: 0,
            is_ready: false,
            added: false,
            size: params.chunk_size,
            max_height: params.max_height,
            sub_chunks: params.sub_chunks,
            voxels: vec![0; volume],
            lights: vec![0; volume],
            mesh: None,
        }
    }

    /// Volume of the column in voxels.
    pub fn volume(&self) -> usize {
        self.voxels.len()
    }

    fn index(&self, vx: i32, vy: i32, vz: i32) -> Option<usize> {
        let [min_x, _, min_z] = self.coord.min_voxel(self.size);
        let (lx, lz) = (vx - min_x, vz - min_z);
        let size = self.size as i32;
        if lx < 0 || lx >= size || lz < 0 || lz >= size || vy < 0 || vy >= self.max_height as i32 {
            return None;
        }
        let (lx, ly, lz) = (lx as usize, vy as usize, lz as usize);
        Some((lx * self.max_height as usize + ly) * self.size as usize + lz)
    }

    /// Whether the voxel lies inside this column.
    pub fn contains(&self, vx: i32, vy: i32, vz: i32) -> bool {
        self.index(vx, vy, vz).is_some()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Raw voxel word at a world voxel position, 0 outside the column.
    pub fn raw_value(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        self.index(vx, vy, vz).map_or(0, |i| self.voxels[i])
    }

    /// Raw light word at a world voxel position, 0 outside the column.
    pub fn raw_light(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        self.index(vx, vy, vz).map_or(0, |i| self.lights[i])
    }

    /// Block id at a world voxel position.
    pub fn voxel(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        codec::extract_id(self.raw_value(vx, vy, vz))
    }

    /// Decoded rotation at a world voxel position.
    pub fn voxel_rotation(&self, vx: i32, vy: i32, vz: i32) -> BlockRotation {
        codec::extract_rotation(self.raw_value(vx, vy, vz))
    }

    /// Stage field at a world voxel position.
    pub fn voxel_stage(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        codec::extract_stage(self.raw_value(vx, vy, vz))
    }

    /// Sunlight level at a world voxel position.
    pub fn sunlight(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        codec::extract_sunlight(self.raw_light(vx, vy, vz))
    }

    /// Torch light level in one channel at a world voxel position.
    pub fn torch_light(&self, vx: i32, vy: i32, vz: i32, color: LightColor) -> u32 {
        codec::extract_torch_light(self.raw_light(vx, vy, vz), color)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    fn update_value(&mut self, vx: i32, vy: i32, vz: i32, f: impl FnOnce(u32) -> u32) {
        if let Some(i) = self.index(vx, vy, vz) {
            self.voxels[i] = f(self.voxels[i]);
        }
    }

    fn update_light(&mut self, vx: i32, vy: i32, vz: i32, f: impl FnOnce(u32) -> u32) {
        if let Some(i) = self.index(vx, vy, vz) {
            self.lights[i] = f(self.lights[i]);
        }
    }

    /// Overwrite the voxel word (authoritative server state).
    pub fn set_raw_value(&mut self, vx: i32, vy: i32, vz: i32, word: u32) {
        self.update_value(vx, vy, vz, |_| word);
    }

    /// Overwrite the light word (authoritative server state).
    pub fn set_raw_light(&mut self, vx: i32, vy: i32, vz: i32, light: u32) {
        self.update_light(vx, vy, vz, |_| light);
    }

    /// Replace only the block id (local prediction).
    pub fn set_voxel(&mut self, vx: i32, vy: i32, vz: i32, id: u32) {
        self.update_value(vx, vy, vz, |word| codec::insert_id(word, id));
    }

    /// Replace only the rotation (local prediction).
    pub fn set_voxel_rotation(&mut self, vx: i32, vy: i32, vz: i32, rotation: BlockRotation) {
        self.update_value(vx, vy, vz, |word| codec::insert_rotation(word, rotation));
    }

    /// Set the stage field, keeping id and rotation.
    pub fn set_voxel_stage(&mut self, vx: i32, vy: i32, vz: i32, stage: u32) {
        self.update_value(vx, vy, vz, |word| codec::insert_stage(word, stage));
    }

    /// Set the sunlight level, keeping torch light and AO.
    pub fn set_sunlight(&mut self, vx: i32, vy: i32, vz: i32, level: u32) {
        self.update_light(vx, vy, vz, |light| codec::insert_sunlight(light, level));
    }

    /// Set one torch light channel.
    pub fn set_torch_light(&mut self, vx: i32, vy: i32, vz: i32, color: LightColor, level: u32) {
        self.update_light(vx, vy, vz, |light| codec::insert_torch_light(light, color, level));
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Decode a payload into storage and start building its geometry.
    ///
    /// Storage is replaced immediately so point queries see the new data;
    /// the returned job resolves to the mesh. Calling this again before an
    /// earlier job finishes makes the earlier job stale.
    pub fn build(&mut self, payload: ChunkPayload, registry: &Arc<BlockRegistry>) -> MeshJob {
        let mut report = BuildReport::default();

        if !payload.id.is_empty() {
            self.id = payload.id;
        }

        let volume = self.volume();
        if let Some(voxels) = decode_storage(payload.voxels, volume, &mut report.voxels_resized) {
            self.voxels = voxels;
        }
        if let Some(lights) = decode_storage(payload.lights, volume, &mut report.lights_resized) {
            self.lights = lights;
        }

        for &word in &self.voxels {
            let id = codec::extract_id(word);
            if id != AIR_ID && !registry.contains(id) {
                report.unknown_voxels += 1;
                report.first_unknown.get_or_insert(id);
            }
        }

        if report.voxels_resized || report.lights_resized {
            log::warn!(
                "chunk {}: storage length mismatch (expected {} words), zero-filled",
                self.coord,
                volume
            );
        }
        if let Some(id) = report.first_unknown {
            log::warn!(
                "chunk {}: {} voxels reference unregistered block ids (first: {}), rendering as placeholder",
                self.coord,
                report.unknown_voxels,
                id
            );
        }

        self.data_version += 1;
        self.state = ChunkState::Meshing {
            data_version: self.data_version,
        };

        let data_version = self.data_version;
        let sub_chunks = self.sub_chunks;
        let meshes = payload.meshes;
        let registry = Arc::clone(registry);
        let future = async move { ChunkMesh::from_payloads(meshes, &registry, sub_chunks, data_version) }.boxed();

        log::trace!("chunk {}: build v{} started", self.coord, data_version);

        MeshJob {
            coord: self.coord,
            data_version,
            report,
            future,
        }
    }

    /// Install a finished mesh if it belongs to the newest build.
    ///
    /// Returns false for stale meshes, which are dropped.
    pub fn complete_build(&mut self, mesh: ChunkMesh) -> bool {
        if !self.state.accepts(mesh.data_version) {
            log::debug!(
                "chunk {}: discarding stale mesh v{} (current v{})",
                self.coord,
                mesh.data_version,
                self.data_version
            );
            return false;
        }

        self.state = ChunkState::Meshed {
            data_version: mesh.data_version,
        };
        match self.mesh.as_mut() {
            Some(current) => current.merge_levels(mesh),
            None => self.mesh = Some(mesh),
        }
        self.is_ready = true;
        true
    }

    /// Get reference to the active mesh, if any.
    pub fn mesh(&self) -> Option<&ChunkMesh> {
        self.mesh.as_ref()
    }

    /// Release geometry. Storage stays until the chunk is dropped.
    pub fn dispose(&mut self) {
        self.mesh = None;
        self.added = false;
    }

    /// Approximate memory held by voxel and light storage.
    pub fn storage_bytes(&self) -> usize {
        (self.voxels.len() + self.lights.len()) * 4
    }
}

/// `None` means the payload carried no array and storage is left alone.
fn decode_storage(array: WordArray, volume: usize, resized: &mut bool) -> Option<Vec<u32>> {
    if matches!(&array, WordArray::Words(words) if words.is_empty()) {
        return None;
    }

    let mut words = match array.into_words() {
        Some(words) => words,
        None => {
            *resized = true;
            return Some(vec![0; volume]);
        }
    };
    if words.len() != volume {
        *resized = true;
        words.resize(volume, 0);
    }
    Some(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RotationAxis;
    use crate::protocol::{GeometryPayload, MeshPayload};
    use crate::registry::Block;
    use futures::executor::block_on;

    fn params() -> ServerParams {
        ServerParams {
            chunk_size: 4,
            max_height: 8,
            sub_chunks: 2,
            ..ServerParams::default()
        }
    }

    fn registry() -> Arc<BlockRegistry> {
        Arc::new(BlockRegistry::from_blocks([
            Block { id: 0, name: "Air".into(), is_empty: true, ..Block::default() },
            Block { id: 1, name: "Stone".into(), ..Block::default() },
        ]))
    }

    fn payload(coord: ChunkCoord, voxels: Vec<u32>) -> ChunkPayload {
        ChunkPayload {
            x: coord.x,
            z: coord.z,
            id: "c".into(),
            voxels: WordArray::Words(voxels),
            lights: WordArray::Words(Vec::new()),
            meshes: vec![MeshPayload {
                level: 0,
                geometries: vec![GeometryPayload {
                    voxel: 1,
                    positions: vec![0.0; 9],
                    indices: vec![0, 1, 2],
                    ..GeometryPayload::default()
                }],
            }],
        }
    }

    #[test]
    fn new_chunk_reads_zero() {
        let chunk = Chunk::new("a", ChunkCoord::new(1, -1), &params());
        assert_eq!(chunk.volume(), 4 * 4 * 8);
        assert_eq!(chunk.state, ChunkState::Empty);
        assert_eq!(chunk.voxel(4, 0, -4), 0);
        assert!(!chunk.is_ready);
    }

    #[test]
    fn queries_use_global_coordinates() {
        let mut chunk = Chunk::new("a", ChunkCoord::new(1, -1), &params());
        chunk.set_voxel(5, 3, -2, 1);
        assert_eq!(chunk.voxel(5, 3, -2), 1);
        assert_eq!(chunk.voxel(5, 4, -2), 0);
        assert!(chunk.contains(7, 7, -1));
        assert!(!chunk.contains(8, 0, -1));
    }

    #[test]
    fn out_of_range_reads_zero_and_writes_ignored() {
        let mut chunk = Chunk::new("a", ChunkCoord::ZERO, &params());
        chunk.set_raw_value(0, 8, 0, 0xFFFF_FFFF);
        chunk.set_raw_value(-1, 0, 0, 0xFFFF_FFFF);
        chunk.set_raw_light(4, 0, 0, 0xFFFF);

        assert_eq!(chunk.raw_value(0, 8, 0), 0);
        assert_eq!(chunk.raw_value(-1, 0, 0), 0);
        assert_eq!(chunk.sunlight(4, 0, 0), 0);
        assert!(chunk.voxels.iter().all(|&w| w == 0));
    }

    #[test]
    fn predictive_setters_keep_other_fields() {
        let mut chunk = Chunk::new("a", ChunkCoord::ZERO, &params());
        chunk.set_voxel_stage(1, 1, 1, 3);
        chunk.set_voxel(1, 1, 1, 1);
        chunk.set_voxel_rotation(1, 1, 1, BlockRotation::new(RotationAxis::NZ, 0));

        assert_eq!(chunk.voxel(1, 1, 1), 1);
        assert_eq!(chunk.voxel_stage(1, 1, 1), 3);
        assert_eq!(chunk.voxel_rotation(1, 1, 1).axis, RotationAxis::NZ);
    }

    #[test]
    fn light_setters() {
        let mut chunk = Chunk::new("a", ChunkCoord::ZERO, &params());
        chunk.set_sunlight(0, 0, 0, 15);
        chunk.set_torch_light(0, 0, 0, LightColor::Red, 9);
        assert_eq!(chunk.sunlight(0, 0, 0), 15);
        assert_eq!(chunk.torch_light(0, 0, 0, LightColor::Red), 9);
        assert_eq!(chunk.torch_light(0, 0, 0, LightColor::Blue), 0);
    }

    #[test]
    fn build_decodes_storage_and_meshes() {
        let mut chunk = Chunk::new("", ChunkCoord::ZERO, &params());
        let mut voxels = vec![0; 128];
        voxels[0] = 1;

        let job = chunk.build(payload(ChunkCoord::ZERO, voxels), &registry());
        assert!(job.report.is_clean());
        assert_eq!(chunk.id, "c");
        assert_eq!(chunk.voxel(0, 0, 0), 1);
        assert!(chunk.state.is_meshing());

        let mesh = block_on(job.finish());
        assert!(chunk.complete_build(mesh));
        assert!(chunk.is_ready);
        assert_eq!(chunk.state, ChunkState::Meshed { data_version: 1 });
        assert_eq!(chunk.mesh().unwrap().triangle_count(), 1);
    }

    #[test]
    fn rebuild_replaces_mesh() {
        let mut chunk = Chunk::new("", ChunkCoord::ZERO, &params());
        let reg = registry();

        for _ in 0..3 {
            let mut job = chunk.build(payload(ChunkCoord::ZERO, vec![0; 128]), &reg);
            let mesh = job.try_complete().unwrap();
            assert!(chunk.complete_build(mesh));
        }

        assert_eq!(chunk.data_version, 3);
        assert_eq!(chunk.mesh().unwrap().triangle_count(), 1);
    }

    #[test]
    fn stale_build_is_discarded() {
        let mut chunk = Chunk::new("", ChunkCoord::ZERO, &params());
        let reg = registry();

        let old = chunk.build(payload(ChunkCoord::ZERO, vec![0; 128]), &reg);
        let new = chunk.build(payload(ChunkCoord::ZERO, vec![1; 128]), &reg);

        assert!(!chunk.complete_build(block_on(old.finish())));
        assert!(!chunk.is_ready);
        assert!(chunk.complete_build(block_on(new.finish())));
        assert_eq!(chunk.mesh().unwrap().data_version, 2);
    }

    #[test]
    fn unknown_ids_are_reported_not_fatal() {
        let mut chunk = Chunk::new("", ChunkCoord::ZERO, &params());
        let mut voxels = vec![0; 128];
        voxels[5] = 77;
        voxels[6] = 77;

        let job = chunk.build(payload(ChunkCoord::ZERO, voxels), &registry());
        assert_eq!(job.report.unknown_voxels, 2);
        assert_eq!(job.report.first_unknown, Some(77));
        assert_eq!(chunk.raw_value(0, 1, 1), 77);
    }

    #[test]
    fn wrong_length_is_zero_filled() {
        let mut chunk = Chunk::new("", ChunkCoord::ZERO, &params());
        let job = chunk.build(payload(ChunkCoord::ZERO, vec![1; 10]), &registry());

        assert!(job.report.voxels_resized);
        assert_eq!(chunk.volume(), 128);
        assert_eq!(chunk.raw_value(0, 0, 0), 1);
        assert_eq!(chunk.raw_value(3, 7, 3), 0);
    }

    #[test]
    fn dispose_drops_mesh() {
        let mut chunk = Chunk::new("", ChunkCoord::ZERO, &params());
        let mut job = chunk.build(payload(ChunkCoord::ZERO, vec![0; 128]), &registry());
        let mesh = job.try_complete().unwrap();
        chunk.complete_build(mesh);
        chunk.added = true;

        chunk.dispose();
        assert!(chunk.mesh().is_none());
        assert!(!chunk.added);
        assert_eq!(chunk.storage_bytes(), 2 * 128 * 4);
    }
}
