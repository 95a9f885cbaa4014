//! Per-frame driver that requests, meshes, attaches and evicts chunks.
//!
//! One [`StreamingScheduler::tick`] runs per rendered frame:
//!
//! ```text
//!  even tick: surround ─┐                         ┌─ add ─ request ─ maintain ─ emit updates
//!                       ├─ poll finished builds ──┤
//!  odd tick:  mesh ─────┘                         └─ (same)
//! ```
//!
//! Every step has a count budget; surround and mesh also stop at a
//! wall-clock [`Deadline`] and leave the rest for a later tick.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use web_time::Instant;

use crate::budget::Deadline;
use crate::chunk::{Chunk, ChunkMesh, MeshJob};
use crate::config::{ClientParams, ServerParams, WorldParams, MAX_CHUNK_RADIUS};
use crate::coord::ChunkCoord;
use crate::error::Result;
use crate::mutation::MutationQueue;
use crate::protocol::{ChunkPayload, ClientMessage};
use crate::registry::BlockRegistry;
use crate::scene::SceneGraph;
use crate::stats::{StreamDebugInfo, TickPhase, TickStats};
use crate::table::ChunkTable;
use crate::transport::Transport;

/// Callback run once when a chunk's first build completes.
pub type ChunkInitListener = Box<dyn FnOnce(&Chunk)>;

/// Everything a tick touches that the scheduler does not own.
pub struct TickContext<'a> {
    pub registry: &'a Arc<BlockRegistry>,
    pub params: &'a WorldParams,
    pub mutations: &'a mut MutationQueue,
    pub transport: &'a mut dyn Transport,
    pub scene: &'a mut dyn SceneGraph,
}

/// Where an interrupted surround scan picks up again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SurroundCursor {
    center: ChunkCoord,
    radius: i32,
    x: i32,
    z: i32,
}

/// Owns the chunk table and moves coordinates through the streaming states.
pub struct StreamingScheduler {
    /// Resident chunks and bookkeeping queues.
    pub table: ChunkTable,

    params: ClientParams,
    tick: u64,
    render_radius: u32,
    delete_radius: u32,
    cursor: Option<SurroundCursor>,
    pending_builds: Vec<MeshJob>,
    listeners: HashMap<ChunkCoord, Vec<ChunkInitListener>>,
}

impl StreamingScheduler {
    pub fn new(params: ClientParams) -> Self {
        Self {
            table: ChunkTable::new(),
            render_radius: params.default_render_radius.min(MAX_CHUNK_RADIUS),
            delete_radius: params.default_delete_radius.min(MAX_CHUNK_RADIUS),
            params,
            tick: 0,
            cursor: None,
            pending_builds: Vec::new(),
            listeners: HashMap::new(),
        }
    }

    pub fn params(&self) -> &ClientParams {
        &self.params
    }

    /// Number of ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn render_radius(&self) -> u32 {
        self.render_radius
    }

    /// Change the request radius, clamped to [`MAX_CHUNK_RADIUS`]. The delete
    /// radius is raised to match if needed.
    pub fn set_render_radius(&mut self, radius: u32) {
        let radius = radius.min(MAX_CHUNK_RADIUS);
        self.render_radius = radius;
        self.delete_radius = self.delete_radius.max(radius);
        self.cursor = None;
    }

    pub fn delete_radius(&self) -> u32 {
        self.delete_radius
    }

    /// Change the eviction radius. Never drops below the render radius.
    pub fn set_delete_radius(&mut self, radius: u32) {
        self.delete_radius = radius.min(MAX_CHUNK_RADIUS).max(self.render_radius);
    }

    /// Number of builds started but not yet finished.
    pub fn pending_builds(&self) -> usize {
        self.pending_builds.len()
    }

    pub fn add_init_listener(&mut self, coord: ChunkCoord, listener: ChunkInitListener) {
        self.listeners.entry(coord).or_default().push(listener);
    }

    // ========================================================================
    // Frame Update
    // ========================================================================

    /// Run one frame of streaming work around the observer at `position`.
    ///
    /// Every step runs even when the transport fails; the first send error is
    /// returned after the tick counter has advanced.
    pub fn tick(&mut self, position: Vec3, ctx: &mut TickContext<'_>) -> Result<TickStats> {
        let start = Instant::now();
        let params = ctx.params;
        let server = &params.server;
        let mut stats = TickStats {
            tick: self.tick,
            ..TickStats::default()
        };

        self.table.current_chunk = ChunkCoord::from_world(position.x, position.z, server.chunk_size);

        if self.tick % 2 == 0 {
            stats.phase = TickPhase::Surround;
            self.surround(server, Deadline::after(self.params.update_timeout()), &mut stats);
        } else {
            stats.phase = TickPhase::Mesh;
            self.mesh(
                ctx.registry,
                server,
                &mut *ctx.scene,
                Deadline::after(self.params.update_timeout()),
                &mut stats,
            );
        }

        self.poll_builds(&mut *ctx.scene, &mut stats);
        self.add(&mut *ctx.scene, &mut stats);
        let requested = self.request(&mut *ctx.transport, &mut stats);
        let maintained = self.maintain(position, server, &mut *ctx.scene, &mut *ctx.transport, &mut stats);
        let emitted = self.emit_updates(ctx.mutations, server, &mut *ctx.transport, &mut stats);

        self.tick += 1;
        stats.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        requested.and(maintained).and(emitted).map(|()| stats)
    }

    /// Queue payloads from a LOAD reply for budgeted meshing.
    pub fn receive(&mut self, chunks: impl IntoIterator<Item = ChunkPayload>) {
        for payload in chunks {
            log::trace!("chunk {} received", payload.coord());
            self.table.push_payload(payload);
        }
    }

    /// Mesh a payload immediately, bypassing the process queue.
    pub fn mesh_urgent(
        &mut self,
        payload: ChunkPayload,
        registry: &Arc<BlockRegistry>,
        server: &ServerParams,
        scene: &mut dyn SceneGraph,
    ) {
        let mut stats = TickStats::default();
        self.mesh_chunk(payload, registry, server, scene, &mut stats);
    }

    // ========================================================================
    // Steps
    // ========================================================================

    /// Queue missing chunks around the center, age in-flight requests, and
    /// queue ready chunks for the scene.
    ///
    /// Offsets with `x² + z² <= r²` are scanned. When the deadline expires the
    /// scan remembers its position and continues from there next time.
    pub fn surround(&mut self, server: &ServerParams, deadline: Deadline, stats: &mut TickStats) {
        let center = self.table.current_chunk;
        let r = self.render_radius.min(MAX_CHUNK_RADIUS) as i32;
        let r_squared = i64::from(r) * i64::from(r);

        let (start_x, start_z) = match self.cursor.take() {
            Some(cursor) if cursor.center == center && cursor.radius == r => (cursor.x, cursor.z),
            _ => (-r, -r),
        };

        for x in start_x..=r {
            let z_from = if x == start_x { start_z } else { -r };
            for z in z_from..=r {
                if deadline.expired() {
                    self.cursor = Some(SurroundCursor { center, radius: r, x, z });
                    stats.surround_deferred = true;
                    log::trace!("surround deferred at offset ({x}, {z})");
                    return;
                }

                // Inclusive: offsets exactly on the radius are kept.
                if i64::from(x).pow(2) + i64::from(z).pow(2) > r_squared {
                    continue;
                }

                let (Some(cx), Some(cz)) = (center.x.checked_add(x), center.z.checked_add(z)) else {
                    continue;
                };
                let coord = ChunkCoord::new(cx, cz);
                if !server.contains_chunk(coord) {
                    continue;
                }

                if let Some(count) = self.table.requested.get_mut(&coord) {
                    *count += 1;
                    if *count > self.params.rerequest_ticks {
                        self.table.requeue(coord);
                        stats.chunks_requeued += 1;
                        log::debug!("chunk {coord} unanswered, requesting again");
                    }
                    continue;
                }

                match self.table.get(coord) {
                    None => {
                        if self.table.queue_request(coord) {
                            stats.chunks_queued += 1;
                        }
                    }
                    Some(chunk) if chunk.is_ready && !chunk.added => {
                        self.table.to_add.push(coord);
                    }
                    Some(_) => {}
                }
            }
        }
    }

    /// Build received payloads, nearest to the center first.
    pub fn mesh(
        &mut self,
        registry: &Arc<BlockRegistry>,
        server: &ServerParams,
        scene: &mut dyn SceneGraph,
        deadline: Deadline,
        stats: &mut TickStats,
    ) {
        let center = self.table.current_chunk;

        // Sorted farthest-first so the next payload pops off the end.
        self.table.to_process.sort_by(|a, b| {
            let (ca, cb) = (a.coord(), b.coord());
            let key_a = (center.chunk_distance_squared(ca), ca, a.sequence);
            let key_b = (center.chunk_distance_squared(cb), cb, b.sequence);
            key_b.cmp(&key_a)
        });

        let mut count = 0;
        while count < self.params.max_processes_per_tick {
            let Some(pending) = self.table.to_process.pop() else {
                break;
            };

            self.table.requested.remove(&pending.coord());
            count += 1;
            self.mesh_chunk(pending.payload, registry, server, scene, stats);

            if deadline.expired() {
                stats.mesh_deferred = !self.table.to_process.is_empty();
                break;
            }
        }
    }

    fn mesh_chunk(
        &mut self,
        payload: ChunkPayload,
        registry: &Arc<BlockRegistry>,
        server: &ServerParams,
        scene: &mut dyn SceneGraph,
        stats: &mut TickStats,
    ) {
        let coord = payload.coord();
        let chunk = self
            .table
            .entry(coord)
            .or_insert_with(|| Chunk::new(payload.id.clone(), coord, server));

        let mut job = chunk.build(payload, registry);
        stats.chunks_built += 1;

        match job.try_complete() {
            Some(mesh) => self.finish_build(coord, mesh, scene, stats),
            None => self.pending_builds.push(job),
        }
    }

    fn poll_builds(&mut self, scene: &mut dyn SceneGraph, stats: &mut TickStats) {
        let mut finished = Vec::new();
        self.pending_builds.retain_mut(|job| match job.try_complete() {
            Some(mesh) => {
                finished.push((job.coord, mesh));
                false
            }
            None => true,
        });

        for (coord, mesh) in finished {
            self.finish_build(coord, mesh, scene, stats);
        }
    }

    fn finish_build(&mut self, coord: ChunkCoord, mesh: ChunkMesh, scene: &mut dyn SceneGraph, stats: &mut TickStats) {
        let Some(chunk) = self.table.get_mut(coord) else {
            return;
        };

        let first = !chunk.is_ready;
        if !chunk.complete_build(mesh) {
            stats.stale_meshes += 1;
            return;
        }
        stats.meshes_completed += 1;

        if chunk.added {
            if let Some(mesh) = chunk.mesh() {
                scene.attach(coord, mesh);
            }
        }

        if first {
            if let Some(listeners) = self.listeners.remove(&coord) {
                for listener in listeners {
                    listener(&*chunk);
                }
            }
        }
    }

    /// Attach up to `maxAddsPerTick` ready chunks to the scene.
    pub fn add(&mut self, scene: &mut dyn SceneGraph, stats: &mut TickStats) {
        for coord in self.table.to_add.take(self.params.max_adds_per_tick) {
            let Some(chunk) = self.table.get_mut(coord) else {
                continue;
            };
            let Some(mesh) = chunk.mesh() else {
                continue;
            };
            scene.attach(coord, mesh);
            chunk.added = true;
            stats.chunks_added += 1;
        }
    }

    /// Send one LOAD for the front of the request queue.
    ///
    /// The batch is ten times larger while the center chunk is missing.
    pub fn request(&mut self, transport: &mut dyn Transport, stats: &mut TickStats) -> Result<()> {
        let mut budget = self.params.max_requests_per_tick;
        if !self.table.contains(self.table.current_chunk) {
            budget *= 10;
        }

        let coords = self.table.to_request.take(budget);
        if coords.is_empty() {
            return Ok(());
        }

        for &coord in &coords {
            self.table.mark_requested(coord);
        }
        stats.chunks_requested = coords.len();
        log::debug!("requesting {} chunks", coords.len());

        transport.send(ClientMessage::Load {
            chunks: coords.into_iter().map(Into::into).collect(),
        })
    }

    /// Evict chunks farther than `deleteRadius · chunkSize` and send one UNLOAD.
    pub fn maintain(
        &mut self,
        position: Vec3,
        server: &ServerParams,
        scene: &mut dyn SceneGraph,
        transport: &mut dyn Transport,
        stats: &mut TickStats,
    ) -> Result<()> {
        let limit = self.delete_radius as f32 * server.chunk_size as f32;
        let observer = position.to_array();

        let evicted: Vec<ChunkCoord> = self
            .table
            .values()
            .filter(|chunk| chunk.coord.distance_to(observer, server.chunk_size) > limit)
            .map(|chunk| chunk.coord)
            .collect();

        if evicted.is_empty() {
            return Ok(());
        }

        for &coord in &evicted {
            if let Some(mut chunk) = self.table.delete(coord) {
                if chunk.added {
                    scene.detach(coord);
                }
                chunk.dispose();
            }
            self.table.to_add.remove(coord);
            self.pending_builds.retain(|job| job.coord != coord);
            log::trace!("chunk {coord} evicted");
        }

        stats.chunks_unloaded = evicted.len();
        log::debug!("unloading {} chunks", evicted.len());

        transport.send(ClientMessage::Unload {
            chunks: evicted.into_iter().map(Into::into).collect(),
        })
    }

    /// Flush queued local edits as one UPDATE.
    ///
    /// If the send fails the edits go back to the front of the queue and are
    /// sent again next tick.
    pub fn emit_updates(
        &mut self,
        mutations: &mut MutationQueue,
        server: &ServerParams,
        transport: &mut dyn Transport,
        stats: &mut TickStats,
    ) -> Result<()> {
        let updates = mutations.flush(self.params.max_updates_per_tick, &mut self.table, server.chunk_size);
        if updates.is_empty() {
            return Ok(());
        }

        let sent = updates.len();
        let message = ClientMessage::Update {
            updates: updates.clone(),
        };
        if let Err(err) = transport.send(message) {
            log::warn!("{err}, keeping {sent} edits for the next tick");
            mutations.requeue(&updates);
            return Err(err);
        }

        stats.updates_sent = sent;
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Detach and drop every chunk and empty every queue.
    pub fn reset(&mut self, scene: &mut dyn SceneGraph) {
        for chunk in self.table.values_mut() {
            if chunk.added {
                scene.detach(chunk.coord);
            }
            chunk.dispose();
        }
        self.table.clear();
        self.pending_builds.clear();
        self.cursor = None;
    }

    pub fn debug_info(&self) -> StreamDebugInfo {
        let mut info = StreamDebugInfo {
            total_chunks: self.table.len(),
            to_request: self.table.to_request.len(),
            requested: self.table.requested.len(),
            to_process: self.table.to_process.len(),
            to_add: self.table.to_add.len(),
            ..StreamDebugInfo::default()
        };

        for chunk in self.table.values() {
            if chunk.is_ready {
                info.ready_chunks += 1;
            }
            if chunk.added {
                info.added_chunks += 1;
            }
            if chunk.state.is_meshing() {
                info.meshing_chunks += 1;
            }
            info.storage_memory_bytes += chunk.storage_bytes();
            if let Some(mesh) = chunk.mesh() {
                info.total_triangles += mesh.triangle_count();
                info.mesh_memory_bytes += mesh.memory_bytes();
            }
        }

        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::mutation::VoxelEdit;
    use crate::protocol::{GeometryPayload, MeshPayload, WordArray};
    use crate::registry::Block;
    use crate::scene::{NullScene, RecordingScene, SceneEvent};
    use crate::transport::PacketBuffer;
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::rc::Rc;

    fn server() -> ServerParams {
        ServerParams {
            chunk_size: 16,
            max_height: 16,
            sub_chunks: 1,
            ..ServerParams::default()
        }
    }

    fn registry() -> Arc<BlockRegistry> {
        Arc::new(BlockRegistry::from_blocks([Block {
            id: 1,
            name: "Stone".into(),
            ..Block::default()
        }]))
    }

    fn payload(x: i32, z: i32) -> ChunkPayload {
        ChunkPayload {
            x,
            z,
            id: format!("{x}|{z}"),
            voxels: WordArray::Words(Vec::new()),
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

    fn filled_payload(x: i32, z: i32, id: u32) -> ChunkPayload {
        ChunkPayload {
            voxels: WordArray::Words(vec![id; 16 * 16 * 16]),
            ..payload(x, z)
        }
    }

    fn scheduler(radius: u32) -> StreamingScheduler {
        let mut scheduler = StreamingScheduler::new(ClientParams {
            update_timeout: 1000.0,
            ..ClientParams::default()
        });
        scheduler.set_render_radius(radius);
        scheduler
    }

    fn offsets(coords: impl Iterator<Item = ChunkCoord>) -> HashSet<(i32, i32)> {
        coords.map(|c| (c.x, c.z)).collect()
    }

    #[test]
    fn surround_radius_two_queues_thirteen() {
        let mut sched = scheduler(2);
        let mut stats = TickStats::default();
        sched.surround(&server(), Deadline::unbounded(), &mut stats);

        assert_eq!(stats.chunks_queued, 13);
        let queued = offsets(sched.table.to_request.iter().copied());
        assert_eq!(queued.len(), 13);
        for (x, z) in &queued {
            assert!(x * x + z * z <= 4);
        }
        assert!(queued.contains(&(2, 0)));
        assert!(!queued.contains(&(2, 1)));
    }

    #[test]
    fn surround_respects_world_bounds() {
        let mut sched = scheduler(2);
        let bounded = ServerParams {
            min_chunk: [0, 0],
            max_chunk: [10, 10],
            ..server()
        };
        let mut stats = TickStats::default();
        sched.surround(&bounded, Deadline::unbounded(), &mut stats);

        let queued = offsets(sched.table.to_request.iter().copied());
        assert_eq!(queued, HashSet::from([(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (0, 2)]));
    }

    #[test]
    fn surround_resumes_after_deadline() {
        let mut sched = scheduler(2);
        let mut stats = TickStats::default();
        sched.surround(&server(), Deadline::after_ms(0.0), &mut stats);
        assert!(stats.surround_deferred);
        assert_eq!(stats.chunks_queued, 0);

        let mut stats = TickStats::default();
        sched.surround(&server(), Deadline::unbounded(), &mut stats);
        assert!(!stats.surround_deferred);
        assert_eq!(stats.chunks_queued, 13);
    }

    #[test]
    fn surround_skips_offsets_past_coordinate_range() {
        let mut sched = scheduler(2);
        sched.table.current_chunk = ChunkCoord::new(i32::MAX, 0);
        let unbounded = ServerParams {
            min_chunk: [i32::MIN, i32::MIN],
            max_chunk: [i32::MAX, i32::MAX],
            ..server()
        };
        let mut stats = TickStats::default();
        sched.surround(&unbounded, Deadline::unbounded(), &mut stats);

        assert_eq!(stats.chunks_queued, 9);
        assert!(sched.table.to_request.iter().all(|c| c.x >= i32::MAX - 2));
    }

    #[test]
    fn oversized_radii_are_clamped() {
        let mut sched = scheduler(1);
        sched.set_render_radius(50_000);
        assert_eq!(sched.render_radius(), MAX_CHUNK_RADIUS);
        sched.set_delete_radius(u32::MAX);
        assert_eq!(sched.delete_radius(), MAX_CHUNK_RADIUS);

        let mut stats = TickStats::default();
        sched.surround(&server(), Deadline::after_ms(1.0), &mut stats);
        assert!(stats.surround_deferred);

        let mut scene = NullScene;
        let mut transport = PacketBuffer::new();
        sched.mesh_urgent(payload(0, 0), &registry(), &server(), &mut scene);
        sched
            .maintain(Vec3::new(8.0, 0.0, 8.0), &server(), &mut scene, &mut transport, &mut stats)
            .unwrap();
        assert!(sched.table.contains(ChunkCoord::ZERO));
        assert!(transport.is_empty());
    }

    #[test]
    fn request_batches_and_moves_to_requested() {
        let mut sched = scheduler(2);
        let mut transport = PacketBuffer::new();
        let mut stats = TickStats::default();
        sched.surround(&server(), Deadline::unbounded(), &mut stats);
        sched.request(&mut transport, &mut stats).unwrap();

        // Center chunk missing: 10x budget covers all 13.
        assert_eq!(stats.chunks_requested, 13);
        assert!(sched.table.to_request.is_empty());
        assert_eq!(sched.table.requested.len(), 13);
        assert!(sched.table.requested.values().all(|&n| n == 1));

        let packets = transport.drain();
        assert_eq!(packets.len(), 1);
        match &packets[0] {
            ClientMessage::Load { chunks } => assert_eq!(chunks.len(), 13),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn request_budget_when_center_resident() {
        let mut sched = scheduler(2);
        sched.table.set(Chunk::new("c", ChunkCoord::ZERO, &server()));
        let mut transport = PacketBuffer::new();
        let mut stats = TickStats::default();

        sched.surround(&server(), Deadline::unbounded(), &mut stats);
        sched.request(&mut transport, &mut stats).unwrap();
        assert_eq!(stats.chunks_requested, 4);
        assert_eq!(sched.table.to_request.len(), 12 - 4);
    }

    #[test]
    fn unanswered_requests_requeue_once_per_cycle() {
        let mut sched = StreamingScheduler::new(ClientParams {
            rerequest_ticks: 2,
            update_timeout: 1000.0,
            ..ClientParams::default()
        });
        sched.set_render_radius(0);
        let mut transport = PacketBuffer::new();
        let mut stats = TickStats::default();

        sched.surround(&server(), Deadline::unbounded(), &mut stats);
        sched.request(&mut transport, &mut stats).unwrap();
        assert_eq!(sched.table.requested.get(&ChunkCoord::ZERO), Some(&1));

        let mut stats = TickStats::default();
        sched.surround(&server(), Deadline::unbounded(), &mut stats);
        assert_eq!(stats.chunks_requeued, 0);
        sched.surround(&server(), Deadline::unbounded(), &mut stats);
        assert_eq!(stats.chunks_requeued, 1);
        assert!(sched.table.to_request.contains(ChunkCoord::ZERO));
        assert!(!sched.table.requested.contains_key(&ChunkCoord::ZERO));

        sched.surround(&server(), Deadline::unbounded(), &mut stats);
        assert_eq!(stats.chunks_requeued, 1);
        assert_eq!(sched.table.to_request.len(), 1);
    }

    #[test]
    fn mesh_orders_by_distance_then_arrival() {
        let mut sched = scheduler(2);
        sched.params.max_processes_per_tick = 2;
        sched.receive([payload(3, 0), payload(0, 1), payload(0, 0)]);
        let mut scene = NullScene;
        let mut stats = TickStats::default();

        sched.mesh(&registry(), &server(), &mut scene, Deadline::unbounded(), &mut stats);

        assert_eq!(stats.chunks_built, 2);
        assert!(sched.table.contains(ChunkCoord::ZERO));
        assert!(sched.table.contains(ChunkCoord::new(0, 1)));
        assert!(!sched.table.contains(ChunkCoord::new(3, 0)));
        assert_eq!(sched.table.to_process.len(), 1);
    }

    #[test]
    fn duplicate_payloads_are_all_processed() {
        let mut sched = scheduler(2);
        sched.receive([payload(0, 0), payload(0, 0)]);
        let mut stats = TickStats::default();
        sched.mesh(&registry(), &server(), &mut NullScene, Deadline::unbounded(), &mut stats);

        assert_eq!(stats.chunks_built, 2);
        assert_eq!(sched.table.get(ChunkCoord::ZERO).unwrap().data_version, 2);
    }

    #[test]
    fn same_coordinate_payloads_build_oldest_first() {
        let mut sched = scheduler(2);
        sched.receive([filled_payload(0, 0, 1), filled_payload(0, 0, 0)]);
        let mut stats = TickStats::default();
        sched.mesh(&registry(), &server(), &mut NullScene, Deadline::unbounded(), &mut stats);

        let chunk = sched.table.get(ChunkCoord::ZERO).unwrap();
        assert_eq!(chunk.data_version, 2);
        assert_eq!(chunk.voxel(3, 3, 3), 0);
    }

    #[test]
    fn mesh_stops_at_deadline() {
        let mut sched = scheduler(2);
        sched.receive((0..3).map(|x| payload(x, 0)));
        let mut stats = TickStats::default();
        sched.mesh(&registry(), &server(), &mut NullScene, Deadline::after_ms(0.0), &mut stats);

        assert_eq!(stats.chunks_built, 1);
        assert!(stats.mesh_deferred);
        assert!(sched.table.contains(ChunkCoord::ZERO));
        assert_eq!(sched.table.to_process.len(), 2);

        let mut stats = TickStats::default();
        sched.mesh(&registry(), &server(), &mut NullScene, Deadline::unbounded(), &mut stats);
        assert_eq!(stats.chunks_built, 2);
        assert!(!stats.mesh_deferred);
        assert!(sched.table.to_process.is_empty());
    }

    #[test]
    fn mesh_clears_requested_and_fires_listener_once() {
        let mut sched = scheduler(0);
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        sched.add_init_listener(ChunkCoord::ZERO, Box::new(move |chunk: &Chunk| {
            assert!(chunk.is_ready);
            counter.set(counter.get() + 1);
        }));

        sched.table.queue_request(ChunkCoord::ZERO);
        sched.table.mark_requested(ChunkCoord::ZERO);
        sched.receive([payload(0, 0), payload(0, 0)]);
        let mut stats = TickStats::default();
        sched.mesh(&registry(), &server(), &mut NullScene, Deadline::unbounded(), &mut stats);

        assert!(sched.table.requested.is_empty());
        assert_eq!(stats.meshes_completed, 2);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn ready_chunks_are_added_within_budget() {
        let mut sched = scheduler(2);
        sched.receive((0..3).map(|x| payload(x, 0)));
        let mut scene = RecordingScene::new();
        let mut stats = TickStats::default();
        sched.mesh(&registry(), &server(), &mut scene, Deadline::unbounded(), &mut stats);

        sched.surround(&server(), Deadline::unbounded(), &mut stats);
        assert_eq!(sched.table.to_add.len(), 3);

        let mut stats = TickStats::default();
        sched.add(&mut scene, &mut stats);
        assert_eq!(stats.chunks_added, 2);
        assert_eq!(scene.events().len(), 2);
        assert_eq!(sched.table.to_add.len(), 1);
    }

    #[test]
    fn rebuild_of_added_chunk_reattaches() {
        let mut sched = scheduler(1);
        let mut scene = RecordingScene::new();
        sched.mesh_urgent(payload(0, 0), &registry(), &server(), &mut scene);
        sched.table.to_add.push(ChunkCoord::ZERO);
        sched.add(&mut scene, &mut TickStats::default());

        sched.mesh_urgent(payload(0, 0), &registry(), &server(), &mut scene);
        assert_eq!(
            scene.drain(),
            vec![
                SceneEvent::Attach { coord: ChunkCoord::ZERO, data_version: 1 },
                SceneEvent::Attach { coord: ChunkCoord::ZERO, data_version: 2 },
            ]
        );
    }

    #[test]
    fn maintain_evicts_far_chunks_once() {
        let mut sched = scheduler(1);
        sched.set_delete_radius(2);
        let mut scene = RecordingScene::new();
        sched.mesh_urgent(payload(0, 0), &registry(), &server(), &mut scene);
        sched.mesh_urgent(payload(5, 0), &registry(), &server(), &mut scene);
        sched.table.get_mut(ChunkCoord::new(5, 0)).unwrap().added = true;

        let mut transport = PacketBuffer::new();
        let mut stats = TickStats::default();
        let observer = Vec3::new(8.0, 0.0, 8.0);
        sched.maintain(observer, &server(), &mut scene, &mut transport, &mut stats).unwrap();
        sched.maintain(observer, &server(), &mut scene, &mut transport, &mut stats).unwrap();

        assert_eq!(transport.drain(), vec![ClientMessage::Unload { chunks: vec![[5, 0]] }]);
        assert!(!sched.table.contains(ChunkCoord::new(5, 0)));
        assert!(sched.table.contains(ChunkCoord::ZERO));
        assert_eq!(scene.drain(), vec![SceneEvent::Detach { coord: ChunkCoord::new(5, 0) }]);
    }

    #[test]
    fn tick_alternates_phases() {
        let mut sched = scheduler(1);
        let registry = registry();
        let params = WorldParams::new(sched.params.clone(), server());
        let mut mutations = MutationQueue::new();
        let mut transport = PacketBuffer::new();
        let mut scene = NullScene;
        let mut ctx = TickContext {
            registry: &registry,
            params: &params,
            mutations: &mut mutations,
            transport: &mut transport,
            scene: &mut scene,
        };

        let first = sched.tick(Vec3::new(8.0, 0.0, 8.0), &mut ctx).unwrap();
        assert_eq!(first.phase, TickPhase::Surround);
        assert_eq!(first.chunks_queued, 5);
        assert_eq!(first.chunks_requested, 5);

        let second = sched.tick(Vec3::new(8.0, 0.0, 8.0), &mut ctx).unwrap();
        assert_eq!(second.phase, TickPhase::Mesh);
        assert_eq!(sched.tick_count(), 2);
    }

    #[test]
    fn closed_transport_still_advances_and_keeps_edits() {
        let mut sched = scheduler(1);
        let registry = registry();
        let params = WorldParams::new(sched.params.clone(), server());
        let mut mutations = MutationQueue::new();
        mutations.update_voxels([VoxelEdit::new(1, 2, 3, 1)], &registry, &sched.table, &params.server);
        let mut scene = NullScene;
        let mut closed = PacketBuffer::new();
        closed.close();

        for expected in 1..=3 {
            let mut ctx = TickContext {
                registry: &registry,
                params: &params,
                mutations: &mut mutations,
                transport: &mut closed,
                scene: &mut scene,
            };
            let result = sched.tick(Vec3::new(8.0, 0.0, 8.0), &mut ctx);
            assert!(matches!(result, Err(StreamError::TransportClosed)));
            assert_eq!(sched.tick_count(), expected);
            assert_eq!(mutations.len(), 1);
        }

        let mut open = PacketBuffer::new();
        let mut ctx = TickContext {
            registry: &registry,
            params: &params,
            mutations: &mut mutations,
            transport: &mut open,
            scene: &mut scene,
        };
        let stats = sched.tick(Vec3::new(8.0, 0.0, 8.0), &mut ctx).unwrap();
        assert_eq!(stats.updates_sent, 1);
        assert!(mutations.is_empty());
        assert!(open
            .drain()
            .iter()
            .any(|message| matches!(message, ClientMessage::Update { updates } if updates.len() == 1)));
    }

    #[test]
    fn reset_clears_state() {
        let mut sched = scheduler(1);
        let mut scene = RecordingScene::new();
        sched.mesh_urgent(payload(0, 0), &registry(), &server(), &mut scene);
        sched.table.get_mut(ChunkCoord::ZERO).unwrap().added = true;
        sched.table.queue_request(ChunkCoord::new(1, 0));

        sched.reset(&mut scene);
        assert!(sched.table.is_empty());
        assert!(sched.table.to_request.is_empty());
        assert_eq!(scene.drain(), vec![SceneEvent::Detach { coord: ChunkCoord::ZERO }]);
        assert_eq!(sched.debug_info().total_chunks, 0);
    }

    #[test]
    fn debug_info_counts() {
        let mut sched = scheduler(1);
        sched.mesh_urgent(payload(0, 0), &registry(), &server(), &mut NullScene);
        sched.receive([payload(1, 0)]);

        let info = sched.debug_info();
        assert_eq!(info.total_chunks, 1);
        assert_eq!(info.ready_chunks, 1);
        assert_eq!(info.to_process, 1);
        assert_eq!(info.total_triangles, 1);
        assert!(info.storage_memory_bytes > 0);
    }
}
