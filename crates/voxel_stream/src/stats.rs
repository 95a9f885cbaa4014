//! Statistics structs for streaming ticks and debug overlays.

/// Which half of the alternating tick ran.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TickPhase {
    /// Even tick: the surround scan ran.
    #[default]
    Surround,
    /// Odd tick: received payloads were meshed.
    Mesh,
}

/// Work done by one scheduler tick.
#[derive(Clone, Debug, Default)]
pub struct TickStats {
    /// Tick counter value this tick ran with.
    pub tick: u64,
    pub phase: TickPhase,

    /// Coordinates newly queued for request by the surround scan.
    pub chunks_queued: usize,
    /// In-flight requests sent back to the request queue after going unanswered.
    pub chunks_requeued: usize,
    /// Whether the surround scan stopped early on the deadline.
    pub surround_deferred: bool,

    /// Payloads handed to `Chunk::build` this tick.
    pub chunks_built: usize,
    /// Builds that finished and were installed this tick.
    pub meshes_completed: usize,
    /// Finished builds dropped because a newer build superseded them.
    pub stale_meshes: usize,
    /// Whether the mesh batch stopped early on the deadline.
    pub mesh_deferred: bool,

    /// Chunks attached to the scene.
    pub chunks_added: usize,
    /// Coordinates named in the outbound LOAD.
    pub chunks_requested: usize,
    /// Chunks evicted and named in the outbound UNLOAD.
    pub chunks_unloaded: usize,
    /// Local edits flushed in the outbound UPDATE.
    pub updates_sent: usize,

    /// Time spent in the tick (milliseconds).
    pub elapsed_ms: f64,
}

impl TickStats {
    /// Check if the tick did anything observable.
    pub fn any_work(&self) -> bool {
        self.chunks_queued
            + self.chunks_requeued
            + self.chunks_built
            + self.meshes_completed
            + self.chunks_added
            + self.chunks_requested
            + self.chunks_unloaded
            + self.updates_sent
            > 0
    }

    /// Check if either time-boxed step ran out of budget.
    pub fn deferred(&self) -> bool {
        self.surround_deferred || self.mesh_deferred
    }
}

/// Snapshot of the streaming state.
#[derive(Clone, Debug, Default)]
pub struct StreamDebugInfo {
    /// Resident chunks.
    pub total_chunks: usize,
    /// Chunks with at least one completed build.
    pub ready_chunks: usize,
    /// Chunks attached to the scene.
    pub added_chunks: usize,
    /// Chunks with a build in flight.
    pub meshing_chunks: usize,

    pub to_request: usize,
    pub requested: usize,
    pub to_process: usize,
    pub to_add: usize,
    pub pending_updates: usize,

    /// Total triangles across all meshes.
    pub total_triangles: usize,
    /// Estimated memory used by voxel and light storage (bytes).
    pub storage_memory_bytes: usize,
    /// Estimated memory used by mesh data (bytes).
    pub mesh_memory_bytes: usize,
}

impl StreamDebugInfo {
    /// Get total estimated memory usage.
    pub fn total_memory_bytes(&self) -> usize {
        self.storage_memory_bytes + self.mesh_memory_bytes
    }

    /// Get memory usage in megabytes.
    pub fn total_memory_mb(&self) -> f32 {
        self.total_memory_bytes() as f32 / (1024.0 * 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tick_did_nothing() {
        let stats = TickStats::default();
        assert!(!stats.any_work());
        assert!(!stats.deferred());
        assert_eq!(stats.phase, TickPhase::Surround);
    }

    #[test]
    fn any_work_and_deferred() {
        let stats = TickStats {
            chunks_unloaded: 1,
            mesh_deferred: true,
            ..TickStats::default()
        };
        assert!(stats.any_work());
        assert!(stats.deferred());
    }

    #[test]
    fn memory_totals() {
        let info = StreamDebugInfo {
            storage_memory_bytes: 1024 * 1024,
            mesh_memory_bytes: 1024 * 1024,
            ..StreamDebugInfo::default()
        };
        assert_eq!(info.total_memory_bytes(), 2 * 1024 * 1024);
        assert!((info.total_memory_mb() - 2.0).abs() < 1e-6);
    }
}
