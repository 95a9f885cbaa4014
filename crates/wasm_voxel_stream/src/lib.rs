//! WASM bindings for the voxel chunk streaming client.
//!
//! The host owns the WebSocket and the Three.js scene. Each frame it feeds
//! received messages to [`StreamClient::on_message`], calls
//! [`StreamClient::update`], sends whatever [`StreamClient::take_packets`]
//! returns, and replays [`StreamClient::take_scene_changes`] against its scene.

use glam::{Vec2, Vec3};
use wasm_bindgen::prelude::*;

use voxel_stream::{
    ChunkCoord, ClientParams, LightColor, MeshGeometry, PacketBuffer, RecordingScene, SceneEvent, StreamDebugInfo,
    TickStats, VoxelEdit, World,
};

/// Install the panic hook and route `log` records to the browser console.
///
/// Level is one of `"error"`, `"warn"`, `"info"`, `"debug"` or `"trace"`;
/// anything else means `"info"`.
#[wasm_bindgen]
pub fn init_logging(level: &str) {
    console_error_panic_hook::set_once();

    let level = parse_level(level);
    if console_log::init_with_level(level).is_err() {
        // Already installed; only the filter changes.
        log::set_max_level(level.to_level_filter());
        web_sys::console::debug_1(&"[wasm_voxel_stream] logger already installed".into());
    }
}

/// Change the log filter after [`init_logging`].
#[wasm_bindgen]
pub fn set_log_level(level: &str) {
    log::set_max_level(parse_level(level).to_level_filter());
}

fn parse_level(level: &str) -> log::Level {
    match level.to_ascii_lowercase().as_str() {
        "error" => log::Level::Error,
        "warn" => log::Level::Warn,
        "debug" => log::Level::Debug,
        "trace" => log::Level::Trace,
        _ => log::Level::Info,
    }
}

/// Get the version of the streaming library.
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

// ============================================================================
// Results
// ============================================================================

/// What one frame of streaming did.
#[wasm_bindgen]
pub struct TickResult {
    stats: TickStats,
}

#[wasm_bindgen]
impl TickResult {
    #[wasm_bindgen(getter)]
    pub fn tick(&self) -> u64 { self.stats.tick }

    #[wasm_bindgen(getter)]
    pub fn chunks_queued(&self) -> usize { self.stats.chunks_queued }

    #[wasm_bindgen(getter)]
    pub fn chunks_requested(&self) -> usize { self.stats.chunks_requested }

    #[wasm_bindgen(getter)]
    pub fn chunks_built(&self) -> usize { self.stats.chunks_built }

    #[wasm_bindgen(getter)]
    pub fn chunks_added(&self) -> usize { self.stats.chunks_added }

    #[wasm_bindgen(getter)]
    pub fn chunks_unloaded(&self) -> usize { self.stats.chunks_unloaded }

    #[wasm_bindgen(getter)]
    pub fn updates_sent(&self) -> usize { self.stats.updates_sent }

    /// Whether the frame ran out of time and left work for later.
    #[wasm_bindgen(getter)]
    pub fn deferred(&self) -> bool { self.stats.deferred() }

    #[wasm_bindgen(getter)]
    pub fn elapsed_ms(&self) -> f64 { self.stats.elapsed_ms }
}

/// One change the host should apply to its scene.
#[wasm_bindgen]
pub struct SceneChange {
    attach: bool,
    cx: i32,
    cz: i32,
    data_version: u64,
}

#[wasm_bindgen]
impl SceneChange {
    /// True to (re)attach the chunk mesh, false to remove it.
    #[wasm_bindgen(getter)]
    pub fn attach(&self) -> bool { self.attach }

    #[wasm_bindgen(getter)]
    pub fn cx(&self) -> i32 { self.cx }

    #[wasm_bindgen(getter)]
    pub fn cz(&self) -> i32 { self.cz }

    /// Payload version the attached mesh was built from; 0 for removals.
    #[wasm_bindgen(getter)]
    pub fn data_version(&self) -> u64 { self.data_version }
}

impl From<SceneEvent> for SceneChange {
    fn from(event: SceneEvent) -> Self {
        match event {
            SceneEvent::Attach { coord, data_version } => Self {
                attach: true,
                cx: coord.x,
                cz: coord.z,
                data_version,
            },
            SceneEvent::Detach { coord } => Self {
                attach: false,
                cx: coord.x,
                cz: coord.z,
                data_version: 0,
            },
        }
    }
}

/// Geometry of one block type within one sub-chunk level.
///
/// Contains vertex data ready for use with Three.js BufferGeometry.
#[wasm_bindgen]
pub struct GeometryResult {
    level: u32,
    transparent: bool,
    geometry: MeshGeometry,
}

#[wasm_bindgen]
impl GeometryResult {
    #[wasm_bindgen(getter)]
    pub fn level(&self) -> u32 { self.level }

    /// Whether the geometry belongs in the transparent render pass.
    #[wasm_bindgen(getter)]
    pub fn transparent(&self) -> bool { self.transparent }

    #[wasm_bindgen(getter)]
    pub fn voxel(&self) -> u32 { self.geometry.voxel }

    #[wasm_bindgen(getter)]
    pub fn material(&self) -> String { self.geometry.material.clone() }

    /// Vertex positions (3 floats per vertex).
    #[wasm_bindgen(getter)]
    pub fn positions(&self) -> Vec<f32> { self.geometry.positions.clone() }

    #[wasm_bindgen(getter)]
    pub fn indices(&self) -> Vec<u32> { self.geometry.indices.clone() }

    /// UV coordinates (2 floats per vertex).
    #[wasm_bindgen(getter)]
    pub fn uvs(&self) -> Vec<f32> { self.geometry.uvs.clone() }

    /// Packed light word per vertex.
    #[wasm_bindgen(getter)]
    pub fn lights(&self) -> Vec<u32> { self.geometry.lights.clone() }

    #[wasm_bindgen(getter)]
    pub fn triangle_count(&self) -> usize { self.geometry.triangle_count() }
}

/// Snapshot of the streaming queues and memory use.
#[wasm_bindgen]
pub struct DebugInfo {
    info: StreamDebugInfo,
}

#[wasm_bindgen]
impl DebugInfo {
    #[wasm_bindgen(getter)]
    pub fn total_chunks(&self) -> usize { self.info.total_chunks }

    #[wasm_bindgen(getter)]
    pub fn ready_chunks(&self) -> usize { self.info.ready_chunks }

    #[wasm_bindgen(getter)]
    pub fn added_chunks(&self) -> usize { self.info.added_chunks }

    #[wasm_bindgen(getter)]
    pub fn meshing_chunks(&self) -> usize { self.info.meshing_chunks }

    #[wasm_bindgen(getter)]
    pub fn to_request(&self) -> usize { self.info.to_request }

    #[wasm_bindgen(getter)]
    pub fn requested(&self) -> usize { self.info.requested }

    #[wasm_bindgen(getter)]
    pub fn to_process(&self) -> usize { self.info.to_process }

    #[wasm_bindgen(getter)]
    pub fn to_add(&self) -> usize { self.info.to_add }

    #[wasm_bindgen(getter)]
    pub fn pending_updates(&self) -> usize { self.info.pending_updates }

    #[wasm_bindgen(getter)]
    pub fn total_triangles(&self) -> usize { self.info.total_triangles }

    #[wasm_bindgen(getter)]
    pub fn total_memory_mb(&self) -> f32 { self.info.total_memory_mb() }
}

// ============================================================================
// Client
// ============================================================================

/// Streaming client for one server connection.
#[wasm_bindgen]
pub struct StreamClient {
    world: World<PacketBuffer, RecordingScene>,
}

#[wasm_bindgen]
impl StreamClient {
    /// Create a client with budgets from a preset: `"high"`, `"low"` or anything else for the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(preset: &str) -> StreamClient {
        let params = match preset {
            "high" => ClientParams::high_performance(),
            "low" => ClientParams::low_performance(),
            _ => ClientParams::default(),
        };
        Self {
            world: World::new(params, PacketBuffer::new(), RecordingScene::new()),
        }
    }

    /// Handle one JSON message from the server.
    pub fn on_message(&mut self, json: &str) -> Result<(), JsError> {
        Ok(self.world.on_message_json(json)?)
    }

    /// Initialize from the INIT message received earlier.
    pub fn init(&mut self) -> Result<(), JsError> {
        Ok(self.world.init()?)
    }

    #[wasm_bindgen(getter)]
    pub fn initialized(&self) -> bool {
        self.world.is_initialized()
    }

    /// Run one frame of streaming work around the observer.
    pub fn update(&mut self, x: f32, y: f32, z: f32) -> Result<TickResult, JsError> {
        let stats = self.world.update(Vec3::new(x, y, z))?;
        Ok(TickResult { stats })
    }

    /// Queue a local edit. Returns false if it was dropped.
    pub fn update_voxel(
        &mut self,
        vx: i32,
        vy: i32,
        vz: i32,
        type_id: u32,
        rotation: Option<u32>,
        y_rotation: Option<u32>,
    ) -> Result<bool, JsError> {
        let edit = VoxelEdit {
            rotation,
            y_rotation,
            ..VoxelEdit::new(vx, vy, vz, type_id)
        };
        Ok(self.world.update_voxel(edit)?)
    }

    /// Outbound messages as JSON strings, oldest first.
    pub fn take_packets(&mut self) -> Result<Vec<String>, JsError> {
        Ok(self.world.transport_mut().drain_json()?)
    }

    /// Scene attach/detach changes since the last call, oldest first.
    pub fn take_scene_changes(&mut self) -> js_sys::Array {
        let changes = js_sys::Array::new();
        for event in self.world.scene_mut().drain() {
            changes.push(&JsValue::from(SceneChange::from(event)));
        }
        changes
    }

    /// Every geometry of a resident chunk's current mesh.
    pub fn chunk_geometries(&self, cx: i32, cz: i32) -> Vec<GeometryResult> {
        let Some(mesh) = self.world.chunk(ChunkCoord::new(cx, cz)).and_then(|c| c.mesh()) else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for sub in mesh.levels.values() {
            for (geometries, transparent) in [(&sub.opaque, false), (&sub.transparent, true)] {
                results.extend(geometries.iter().map(|geometry| GeometryResult {
                    level: sub.level,
                    transparent,
                    geometry: geometry.clone(),
                }));
            }
        }
        results
    }

    pub fn voxel(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        self.world.voxel(vx, vy, vz)
    }

    /// `[axis, yRotation]` of the voxel.
    pub fn voxel_rotation(&self, vx: i32, vy: i32, vz: i32) -> Vec<u32> {
        let rotation = self.world.voxel_rotation(vx, vy, vz);
        vec![rotation.axis.raw(), rotation.y_rotation as u32]
    }

    pub fn voxel_stage(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        self.world.voxel_stage(vx, vy, vz)
    }

    pub fn sunlight(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        self.world.sunlight(vx, vy, vz)
    }

    /// `[red, green, blue]` torch light levels.
    pub fn torch_light(&self, vx: i32, vy: i32, vz: i32) -> Vec<u32> {
        LightColor::ALL
            .iter()
            .map(|&color| self.world.torch_light(vx, vy, vz, color))
            .collect()
    }

    /// `[r, g, b]` brightness at a world position.
    pub fn light_color(&self, x: f32, y: f32, z: f32) -> Vec<f32> {
        self.world.light_color_by_world(Vec3::new(x, y, z)).to_array().to_vec()
    }

    pub fn previous_voxel(&self, vx: i32, vy: i32, vz: i32) -> Option<u32> {
        self.world.previous_voxel(vx, vy, vz)
    }

    pub fn max_height(&self, vx: i32, vz: i32) -> u32 {
        self.world.max_height(vx, vz)
    }

    /// Collision boxes at the voxel as flat `[minX, minY, minZ, maxX, maxY, maxZ, ...]`.
    pub fn collision_aabbs(&self, vx: i32, vy: i32, vz: i32) -> Vec<f32> {
        self.world
            .collision_aabbs(vx, vy, vz)
            .iter()
            .flat_map(|aabb| [aabb.min_x, aabb.min_y, aabb.min_z, aabb.max_x, aabb.max_y, aabb.max_z])
            .collect()
    }

    pub fn is_within_world(&self, cx: i32, cz: i32) -> bool {
        self.world.is_within_world(cx, cz)
    }

    pub fn is_chunk_in_view(&self, cx: i32, cz: i32, dx: f32, dz: f32) -> bool {
        self.world.is_chunk_in_view(ChunkCoord::new(cx, cz), Vec2::new(dx, dz))
    }

    #[wasm_bindgen(getter)]
    pub fn render_radius(&self) -> u32 {
        self.world.render_radius()
    }

    #[wasm_bindgen(setter)]
    pub fn set_render_radius(&mut self, radius: u32) {
        self.world.set_render_radius(radius);
    }

    #[wasm_bindgen(getter)]
    pub fn delete_radius(&self) -> u32 {
        self.world.delete_radius()
    }

    #[wasm_bindgen(setter)]
    pub fn set_delete_radius(&mut self, radius: u32) {
        self.world.set_delete_radius(radius);
    }

    pub fn set_sunlight_intensity(&mut self, intensity: f32) -> Result<(), JsError> {
        Ok(self.world.set_sunlight_intensity(intensity)?)
    }

    pub fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            info: self.world.debug_info(),
        }
    }

    /// Drop every chunk and pending edit. Scene removals are reported through `take_scene_changes`.
    pub fn reset(&mut self) {
        self.world.reset();
    }
}
