//! World facade tying the registry, scheduler and edit queue to a connection.

use std::f32::consts::PI;
use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::chunk::Chunk;
use crate::codec::{BlockRotation, LightColor};
use crate::config::{ClientParams, ServerParams, WorldParams};
use crate::coord::{world_to_voxel, ChunkCoord};
use crate::error::{Result, StreamError};
use crate::mutation::{MutationQueue, VoxelEdit};
use crate::protocol::ServerMessage;
use crate::registry::{Aabb, Block, BlockRegistry, DynamicBlockBehavior, VoxelAccess};
use crate::scene::SceneGraph;
use crate::scheduler::{StreamingScheduler, TickContext};
use crate::stats::{StreamDebugInfo, TickStats};
use crate::table::ChunkTable;
use crate::transport::{InboundReceiver, Transport};

/// Chunks whose direction from the observer is within this angle of the view count as in view.
const VIEW_HALF_ANGLE: f32 = PI * 3.0 / 5.0;

/// Data from the server's INIT message, held until [`World::init`].
#[derive(Clone, Debug)]
struct InitData {
    blocks: Vec<Block>,
    params: ServerParams,
}

/// Read-only voxel lookups across resident chunks.
struct VoxelView<'a> {
    table: &'a ChunkTable,
    chunk_size: u32,
}

impl<'a> VoxelView<'a> {
    fn chunk(&self, vx: i32, vz: i32) -> Option<&'a Chunk> {
        self.table.get(ChunkCoord::from_voxel(vx, vz, self.chunk_size))
    }
}

impl VoxelAccess for VoxelView<'_> {
    fn voxel(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        self.chunk(vx, vz).map_or(0, |c| c.voxel(vx, vy, vz))
    }

    fn voxel_rotation(&self, vx: i32, vy: i32, vz: i32) -> BlockRotation {
        self.chunk(vx, vz).map(|c| c.voxel_rotation(vx, vy, vz)).unwrap_or_default()
    }

    fn voxel_stage(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        self.chunk(vx, vz).map_or(0, |c| c.voxel_stage(vx, vy, vz))
    }
}

/// A client-side voxel world kept in sync with the server.
///
/// The host forwards every server message to [`World::on_message`], calls
/// [`World::init`] once the INIT message has arrived, and then calls
/// [`World::update`] once per frame with the observer position.
pub struct World<T: Transport, S: SceneGraph> {
    params: WorldParams,
    registry: Arc<BlockRegistry>,
    scheduler: StreamingScheduler,
    mutations: MutationQueue,
    transport: T,
    scene: S,

    init_data: Option<InitData>,
    initialized: bool,
    pending_dynamic: Vec<(String, Arc<dyn DynamicBlockBehavior>)>,
    sunlight_intensity: f32,
    min_brightness: f32,
}

impl<T: Transport, S: SceneGraph> World<T, S> {
    pub fn new(client: ClientParams, transport: T, scene: S) -> Self {
        Self {
            min_brightness: client.min_brightness,
            scheduler: StreamingScheduler::new(client.clone()),
            params: WorldParams::new(client, ServerParams::default()),
            registry: Arc::new(BlockRegistry::new()),
            mutations: MutationQueue::new(),
            transport,
            scene,
            init_data: None,
            initialized: false,
            pending_dynamic: Vec::new(),
            sunlight_intensity: 1.0,
        }
    }

    fn init_check(&self, action: &'static str) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(StreamError::NotInitialized { action })
        }
    }

    fn view(&self) -> VoxelView<'_> {
        VoxelView {
            table: &self.scheduler.table,
            chunk_size: self.params.server.chunk_size,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Handle one message from the server.
    ///
    /// INIT is stored for [`World::init`]; LOAD payloads are queued for
    /// meshing; UPDATE writes voxels immediately and meshes its chunks
    /// without waiting for the queue.
    pub fn on_message(&mut self, message: ServerMessage) -> Result<()> {
        match message {
            ServerMessage::Init { blocks, params } => {
                self.init_data = Some(InitData { blocks, params });
            }
            ServerMessage::Load { chunks } => {
                self.scheduler.receive(chunks);
            }
            ServerMessage::Update { updates, chunks } => {
                if !self.initialized {
                    log::warn!("dropping UPDATE received before the world was initialized");
                    return Ok(());
                }

                let chunk_size = self.params.server.chunk_size;
                self.mutations
                    .apply_server_updates(&updates, &mut self.scheduler.table, chunk_size);
                for payload in chunks {
                    self.scheduler
                        .mesh_urgent(payload, &self.registry, &self.params.server, &mut self.scene);
                }
            }
            ServerMessage::Other => {}
        }
        Ok(())
    }

    /// Parse a JSON message and handle it.
    pub fn on_message_json(&mut self, text: &str) -> Result<()> {
        self.on_message(ServerMessage::from_json(text)?)
    }

    /// Handle every message waiting on an inbound channel. Returns how many were handled.
    pub fn pump(&mut self, inbound: &mut InboundReceiver) -> Result<usize> {
        let messages = inbound.drain();
        let count = messages.len();
        for message in messages {
            self.on_message(message)?;
        }
        Ok(count)
    }

    /// Load the block registry and server parameters from the stored INIT message.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Err(StreamError::AlreadyInitialized);
        }
        let data = self.init_data.take().ok_or(StreamError::MissingInitData)?;

        let params = WorldParams::new(self.params.client.clone(), data.params);
        if let Err(err) = params.validate() {
            self.init_data = Some(InitData {
                blocks: data.blocks,
                params: params.server,
            });
            return Err(err);
        }

        let mut registry = BlockRegistry::from_blocks(data.blocks);
        for (name, behavior) in self.pending_dynamic.drain(..) {
            if !registry.set_dynamic_by_name(&name, behavior) {
                log::warn!("dynamic behavior registered for unknown block \"{name}\"");
            }
        }

        log::info!(
            "world initialized: {} blocks, chunk size {}, max height {}",
            registry.len(),
            params.server.chunk_size,
            params.server.max_height
        );

        self.registry = Arc::new(registry);
        self.params = params;
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run one frame of streaming work around the observer.
    pub fn update(&mut self, position: Vec3) -> Result<TickStats> {
        self.init_check("update the world")?;

        let mut ctx = TickContext {
            registry: &self.registry,
            params: &self.params,
            mutations: &mut self.mutations,
            transport: &mut self.transport,
            scene: &mut self.scene,
        };
        self.scheduler.tick(position, &mut ctx)
    }

    /// Drop all chunks, queues and the previous-value cache.
    pub fn reset(&mut self) {
        self.scheduler.reset(&mut self.scene);
        self.mutations.clear();
        log::info!("world reset");
    }

    // ========================================================================
    // Edits
    // ========================================================================

    /// Queue one local edit. Returns whether it survived validation.
    pub fn update_voxel(&mut self, edit: VoxelEdit) -> Result<bool> {
        Ok(self.update_voxels([edit])? == 1)
    }

    /// Queue local edits. Returns how many survived validation.
    pub fn update_voxels(&mut self, edits: impl IntoIterator<Item = VoxelEdit>) -> Result<usize> {
        self.init_check("update voxels")?;
        Ok(self.mutations.update_voxels(
            edits,
            &self.registry,
            &self.scheduler.table,
            &self.params.server,
        ))
    }

    /// Attach a dynamic behavior to a block by name.
    ///
    /// Before init the behavior is held and applied once the registry arrives.
    pub fn set_block_dynamic(&mut self, name: &str, behavior: Arc<dyn DynamicBlockBehavior>) -> bool {
        if !self.initialized {
            self.pending_dynamic.push((name.to_string(), behavior));
            return true;
        }
        Arc::make_mut(&mut self.registry).set_dynamic_by_name(name, behavior)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn params(&self) -> &WorldParams {
        &self.params
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.scheduler.table.get(coord)
    }

    pub fn chunk_by_voxel(&self, vx: i32, vz: i32) -> Option<&Chunk> {
        self.view().chunk(vx, vz)
    }

    pub fn scheduler(&self) -> &StreamingScheduler {
        &self.scheduler
    }

    pub fn mutations(&self) -> &MutationQueue {
        &self.mutations
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn voxel(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        self.view().voxel(vx, vy, vz)
    }

    pub fn voxel_by_world(&self, position: Vec3) -> u32 {
        let [vx, vy, vz] = world_to_voxel(position.to_array());
        self.voxel(vx, vy, vz)
    }

    pub fn voxel_rotation(&self, vx: i32, vy: i32, vz: i32) -> BlockRotation {
        self.view().voxel_rotation(vx, vy, vz)
    }

    pub fn voxel_stage(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        self.view().voxel_stage(vx, vy, vz)
    }

    pub fn sunlight(&self, vx: i32, vy: i32, vz: i32) -> u32 {
        self.chunk_by_voxel(vx, vz).map_or(0, |c| c.sunlight(vx, vy, vz))
    }

    pub fn torch_light(&self, vx: i32, vy: i32, vz: i32, color: LightColor) -> u32 {
        self.chunk_by_voxel(vx, vz).map_or(0, |c| c.torch_light(vx, vy, vz, color))
    }

    /// Block definition of the voxel, `None` if the id is unregistered.
    pub fn block(&self, vx: i32, vy: i32, vz: i32) -> Option<&Block> {
        self.registry.get(self.voxel(vx, vy, vz))
    }

    /// Id the voxel held before its most recent change.
    pub fn previous_voxel(&self, vx: i32, vy: i32, vz: i32) -> Option<u32> {
        self.mutations.previous_voxel(vx, vy, vz)
    }

    pub fn previous_voxel_by_world(&self, position: Vec3) -> Option<u32> {
        let [vx, vy, vz] = world_to_voxel(position.to_array());
        self.previous_voxel(vx, vy, vz)
    }

    /// Highest solid voxel in the column, or 0.
    pub fn max_height(&self, vx: i32, vz: i32) -> u32 {
        let view = self.view();
        for vy in (0..self.params.server.max_height as i32).rev() {
            let id = view.voxel(vx, vy, vz);
            if vy == 0 || self.registry.get(id).is_some_and(Block::counts_for_height) {
                return vy as u32;
            }
        }
        0
    }

    pub fn max_height_by_world(&self, x: f32, z: f32) -> u32 {
        let [vx, _, vz] = world_to_voxel([x, 0.0, z]);
        self.max_height(vx, vz)
    }

    /// RGB brightness an object at the voxel would be lit with.
    ///
    /// Sunlight follows a squared curve scaled by the sunlight intensity and
    /// floored at the minimum brightness; each torch channel adds on top.
    pub fn light_color(&self, vx: i32, vy: i32, vz: i32) -> Vec3 {
        let max = self.params.server.max_light_level.max(1) as f32;
        let sun = self.sunlight(vx, vy, vz) as f32 / max;
        let s = (sun * sun * self.sunlight_intensity * (1.0 - self.min_brightness) + self.min_brightness).min(1.0);

        let channel = |color| {
            let level = self.torch_light(vx, vy, vz, color) as f32 / max;
            s + level * level
        };
        Vec3::new(channel(LightColor::Red), channel(LightColor::Green), channel(LightColor::Blue))
    }

    pub fn light_color_by_world(&self, position: Vec3) -> Vec3 {
        let [vx, vy, vz] = world_to_voxel(position.to_array());
        self.light_color(vx, vy, vz)
    }

    /// Rotated bounding boxes of the block at the voxel, in block-local units.
    pub fn block_aabbs(&self, vx: i32, vy: i32, vz: i32) -> Vec<Aabb> {
        if vy < 0 || vy >= self.params.server.max_height as i32 {
            return Vec::new();
        }

        let view = self.view();
        let id = view.voxel(vx, vy, vz);
        let Some(block) = self.registry.get(id) else {
            return Vec::new();
        };
        let rotation = view.voxel_rotation(vx, vy, vz);

        let boxes = match self.registry.dynamic(id) {
            Some(behavior) => behavior.aabbs([vx, vy, vz], &view),
            None => block.aabbs.clone(),
        };
        boxes.iter().map(|aabb| aabb.rotated(rotation)).collect()
    }

    pub fn block_aabbs_by_world(&self, position: Vec3) -> Vec<Aabb> {
        let [vx, vy, vz] = world_to_voxel(position.to_array());
        self.block_aabbs(vx, vy, vz)
    }

    /// World-space boxes a physics body collides with at the voxel.
    ///
    /// Passable and fluid blocks, and voxels in chunks that are not resident, have none.
    pub fn collision_aabbs(&self, vx: i32, vy: i32, vz: i32) -> Vec<Aabb> {
        if self.chunk_by_voxel(vx, vz).is_none() {
            return Vec::new();
        }
        match self.block(vx, vy, vz) {
            Some(block) if !block.is_passable && !block.is_fluid => self
                .block_aabbs(vx, vy, vz)
                .iter()
                .map(|aabb| aabb.translated([vx, vy, vz]))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether a chunk coordinate lies inside the world bounds (inclusive).
    pub fn is_within_world(&self, cx: i32, cz: i32) -> bool {
        self.params.is_within_world(ChunkCoord::new(cx, cz))
    }

    /// Whether a chunk is near the observer or roughly in front of them.
    ///
    /// `direction` is the horizontal view direction `(x, z)`.
    pub fn is_chunk_in_view(&self, coord: ChunkCoord, direction: Vec2) -> bool {
        let center = self.scheduler.table.current_chunk;
        let radius = self.params.client.in_view_radius as i64;
        if center.chunk_distance_squared(coord) <= radius * radius {
            return true;
        }

        if direction.length_squared() <= f32::EPSILON {
            return false;
        }
        let offset = Vec2::new((coord.x - center.x) as f32, (coord.z - center.z) as f32);
        offset.angle_between(direction).abs() < VIEW_HALF_ANGLE
    }

    // ========================================================================
    // Render Settings
    // ========================================================================

    pub fn render_radius(&self) -> u32 {
        self.scheduler.render_radius()
    }

    pub fn set_render_radius(&mut self, radius: u32) {
        self.scheduler.set_render_radius(radius);
    }

    pub fn delete_radius(&self) -> u32 {
        self.scheduler.delete_radius()
    }

    pub fn set_delete_radius(&mut self, radius: u32) {
        self.scheduler.set_delete_radius(radius);
    }

    pub fn sunlight_intensity(&self) -> f32 {
        self.sunlight_intensity
    }

    /// Scale applied to sunlight, within `0..=maxLightLevel`.
    pub fn set_sunlight_intensity(&mut self, intensity: f32) -> Result<()> {
        let max = self.params.server.max_light_level;
        if !(0.0..=max as f32).contains(&intensity) {
            return Err(StreamError::SunlightOutOfRange { value: intensity, max });
        }
        self.sunlight_intensity = intensity;
        Ok(())
    }

    pub fn min_brightness(&self) -> f32 {
        self.min_brightness
    }

    pub fn set_min_brightness(&mut self, brightness: f32) {
        self.min_brightness = brightness;
    }

    /// Register a callback run once when the chunk's first build completes.
    pub fn add_chunk_init_listener(&mut self, coord: ChunkCoord, listener: impl FnOnce(&Chunk) + 'static) {
        self.scheduler.add_init_listener(coord, Box::new(listener));
    }

    pub fn debug_info(&self) -> StreamDebugInfo {
        StreamDebugInfo {
            pending_updates: self.mutations.len(),
            ..self.scheduler.debug_info()
        }
    }
}
