//! Client and server parameters for chunk streaming.

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::coord::ChunkCoord;
use crate::error::{Result, StreamError};

/// Largest render or delete radius, in chunks. Larger requests are clamped.
pub const MAX_CHUNK_RADIUS: u32 = 4096;

/// Client-side tuning for the streaming scheduler.
///
/// All budgets are per tick (one tick per rendered frame).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientParams {
    /// Chunks within this radius (in chunks) always count as in view.
    pub in_view_radius: u32,

    /// Maximum chunks named in one outbound LOAD request.
    pub max_requests_per_tick: usize,

    /// Maximum received payloads built per meshing tick.
    pub max_processes_per_tick: usize,

    /// Maximum local voxel edits flushed per tick.
    pub max_updates_per_tick: usize,

    /// Maximum built chunks attached to the scene per tick.
    pub max_adds_per_tick: usize,

    /// Brightness at sunlight level 0.
    pub min_brightness: f32,

    /// Surround passes a request may go unanswered before it is re-sent.
    pub rerequest_ticks: u32,

    /// Initial radius (in chunks) around the center that is requested.
    pub default_render_radius: u32,

    /// Radius (in chunks) past which resident chunks are evicted.
    pub default_delete_radius: u32,

    /// Wall-clock budget (ms) for one surround scan or one meshing batch.
    pub update_timeout: f64,
}

impl Default for ClientParams {
    fn default() -> Self {
        Self {
            in_view_radius: 5,
            max_requests_per_tick: 4,
            max_processes_per_tick: 8,
            max_updates_per_tick: 1000,
            max_adds_per_tick: 2,
            min_brightness: 0.04,
            rerequest_ticks: 100,
            default_render_radius: 8,
            default_delete_radius: 12,
            update_timeout: 1.5,
        }
    }
}

impl ClientParams {
    /// Larger budgets for fast machines.
    pub fn high_performance() -> Self {
        Self {
            max_requests_per_tick: 8,
            max_processes_per_tick: 16,
            max_adds_per_tick: 4,
            default_render_radius: 12,
            default_delete_radius: 16,
            update_timeout: 3.0,
            ..Self::default()
        }
    }

    /// Smaller budgets for low-end machines.
    pub fn low_performance() -> Self {
        Self {
            max_requests_per_tick: 2,
            max_processes_per_tick: 4,
            max_adds_per_tick: 1,
            default_render_radius: 5,
            default_delete_radius: 8,
            update_timeout: 1.0,
            ..Self::default()
        }
    }

    /// `update_timeout` as a duration.
    pub fn update_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.update_timeout.max(0.0) / 1000.0)
    }
}

/// World parameters supplied by the server in the INIT message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerParams {
    /// Horizontal footprint of a chunk column, in voxels.
    pub chunk_size: u32,

    /// Vertical mesh levels per column.
    pub sub_chunks: u32,

    /// Column height, in voxels.
    pub max_height: u32,

    /// Highest value any light channel may take.
    pub max_light_level: u32,

    /// Inclusive lower chunk bound `[cx, cz]`.
    pub min_chunk: [i32; 2],

    /// Inclusive upper chunk bound `[cx, cz]`.
    pub max_chunk: [i32; 2],
}

impl Default for ServerParams {
    fn default() -> Self {
        Self {
            chunk_size: 16,
            sub_chunks: 8,
            max_height: 256,
            max_light_level: 15,
            min_chunk: [-i32::MAX / 2, -i32::MAX / 2],
            max_chunk: [i32::MAX / 2, i32::MAX / 2],
        }
    }
}

impl ServerParams {
    /// Whether a chunk coordinate lies inside the world bounds (inclusive).
    pub fn contains_chunk(&self, coord: ChunkCoord) -> bool {
        let [min_x, min_z] = self.min_chunk;
        let [max_x, max_z] = self.max_chunk;
        coord.x >= min_x && coord.x <= max_x && coord.z >= min_z && coord.z <= max_z
    }
}

/// Combined client and server parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldParams {
    pub client: ClientParams,
    pub server: ServerParams,
}

impl WorldParams {
    pub fn new(client: ClientParams, server: ServerParams) -> Self {
        Self { client, server }
    }

    /// Number of voxel (and light) words a column stores.
    pub fn column_volume(&self) -> usize {
        let size = self.server.chunk_size as usize;
        size * size * self.server.max_height as usize
    }

    /// Whether a chunk coordinate lies inside the configured world bounds (inclusive).
    pub fn is_within_world(&self, coord: ChunkCoord) -> bool {
        self.server.contains_chunk(coord)
    }

    /// Reject parameter sets the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        let client = &self.client;

        if server.chunk_size == 0 {
            return Err(StreamError::InvalidParams("chunkSize must be positive".into()));
        }
        if server.max_height == 0 {
            return Err(StreamError::InvalidParams("maxHeight must be positive".into()));
        }
        if server.sub_chunks == 0 || server.max_height % server.sub_chunks != 0 {
            return Err(StreamError::InvalidParams(format!(
                "subChunks ({}) must evenly divide maxHeight ({})",
                server.sub_chunks, server.max_height
            )));
        }
        let volume = (server.chunk_size as usize)
            .checked_mul(server.chunk_size as usize)
            .and_then(|area| area.checked_mul(server.max_height as usize));
        if volume.is_none() {
            return Err(StreamError::InvalidParams(format!(
                "a {}x{}x{} column does not fit in memory",
                server.chunk_size, server.max_height, server.chunk_size
            )));
        }
        if server.max_light_level > 15 {
            return Err(StreamError::InvalidParams(format!(
                "maxLightLevel ({}) does not fit in a 4-bit channel",
                server.max_light_level
            )));
        }
        if server.min_chunk[0] > server.max_chunk[0] || server.min_chunk[1] > server.max_chunk[1] {
            return Err(StreamError::InvalidParams(format!(
                "minChunk {:?} exceeds maxChunk {:?}",
                server.min_chunk, server.max_chunk
            )));
        }
        if client.max_requests_per_tick == 0
            || client.max_processes_per_tick == 0
            || client.max_adds_per_tick == 0
        {
            return Err(StreamError::InvalidParams(
                "per-tick request/process/add budgets must be positive".into(),
            ));
        }
        if client.default_delete_radius < client.default_render_radius {
            return Err(StreamError::InvalidParams(format!(
                "defaultDeleteRadius ({}) is smaller than defaultRenderRadius ({})",
                client.default_delete_radius, client.default_render_radius
            )));
        }
        if client.default_delete_radius > MAX_CHUNK_RADIUS {
            return Err(StreamError::InvalidParams(format!(
                "defaultDeleteRadius ({}) exceeds {MAX_CHUNK_RADIUS}",
                client.default_delete_radius
            )));
        }
        if client.update_timeout.is_nan() || client.update_timeout < 0.0 {
            return Err(StreamError::InvalidParams("updateTimeout must be non-negative".into()));
        }

        Ok(())
    }
}
