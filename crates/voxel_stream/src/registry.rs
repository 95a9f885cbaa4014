//! Block definitions received from the server.

use std::collections::HashMap;
use std::f32::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::sync::Arc;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::codec::{BlockRotation, RotationAxis};
use crate::error::{Result, StreamError};

/// Id reserved for empty space.
pub const AIR_ID: u32 = 0;

/// Name of the placeholder used for ids missing from the registry.
pub const UNKNOWN_BLOCK_NAME: &str = "unknown";

/// Axis-aligned box in block-local units (a full block is 0..1 on every axis).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aabb {
    pub min_x: f32,
    pub min_y: f32,
    pub min_z: f32,
    pub max_x: f32,
    pub max_y: f32,
    pub max_z: f32,
}

impl Aabb {
    /// The unit cube.
    pub const FULL: Aabb = Aabb {
        min_x: 0.0,
        min_y: 0.0,
        min_z: 0.0,
        max_x: 1.0,
        max_y: 1.0,
        max_z: 1.0,
    };

    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self {
            min_x: min[0],
            min_y: min[1],
            min_z: min[2],
            max_x: max[0],
            max_y: max[1],
            max_z: max[2],
        }
    }

    pub fn min(&self) -> Vec3 {
        Vec3::new(self.min_x, self.min_y, self.min_z)
    }

    pub fn max(&self) -> Vec3 {
        Vec3::new(self.max_x, self.max_y, self.max_z)
    }

    fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for p in points {
            min = min.min(p);
            max = max.max(p);
        }
        Self::new(min.to_array(), max.to_array())
    }

    /// Rotate around the block center, returning the bounding box of the result.
    ///
    /// The y-rotation is applied first, then the major axis.
    pub fn rotated(&self, rotation: BlockRotation) -> Aabb {
        let quat = axis_quat(rotation.axis) * Quat::from_rotation_y(rotation.y_angle());
        if quat.abs_diff_eq(Quat::IDENTITY, 1e-6) {
            return *self;
        }

        let center = Vec3::splat(0.5);
        let (lo, hi) = (self.min(), self.max());
        let corners = (0..8).map(|i| {
            let corner = Vec3::new(
                if i & 1 == 0 { lo.x } else { hi.x },
                if i & 2 == 0 { lo.y } else { hi.y },
                if i & 4 == 0 { lo.z } else { hi.z },
            );
            quat * (corner - center) + center
        });

        let rotated = Self::from_points(corners);
        Self::from_points([snap(rotated.min()), snap(rotated.max())])
    }

    /// Move into world space at the given voxel.
    pub fn translated(&self, voxel: [i32; 3]) -> Aabb {
        let offset = Vec3::new(voxel[0] as f32, voxel[1] as f32, voxel[2] as f32);
        Self::new((self.min() + offset).to_array(), (self.max() + offset).to_array())
    }
}

fn axis_quat(axis: RotationAxis) -> Quat {
    match axis {
        RotationAxis::PY => Quat::IDENTITY,
        RotationAxis::NY => Quat::from_rotation_x(PI),
        RotationAxis::PX => Quat::from_rotation_z(-FRAC_PI_2),
        RotationAxis::NX => Quat::from_rotation_z(FRAC_PI_2),
        RotationAxis::PZ => Quat::from_rotation_x(FRAC_PI_2),
        RotationAxis::NZ => Quat::from_rotation_x(-FRAC_PI_2),
    }
}

// Removes float noise such as 0.49999997 after quarter turns.
fn snap(v: Vec3) -> Vec3 {
    (v * 1e4).round() / 1e4
}

/// Read access to voxel state, handed to dynamic block behaviors.
pub trait VoxelAccess {
    fn voxel(&self, vx: i32, vy: i32, vz: i32) -> u32;
    fn voxel_rotation(&self, vx: i32, vy: i32, vz: i32) -> BlockRotation;
    fn voxel_stage(&self, vx: i32, vy: i32, vz: i32) -> u32;
}

/// Per-block behavior for blocks whose shape depends on their surroundings
/// (fences, panes, crops by stage).
pub trait DynamicBlockBehavior: Send + Sync {
    /// Collision boxes for the block at `voxel`, in block-local units.
    fn aabbs(&self, voxel: [i32; 3], world: &dyn VoxelAccess) -> Vec<Aabb>;
}

/// Static description of one block type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Block {
    pub id: u32,
    pub name: String,
    pub rotatable: bool,
    pub y_rotatable: bool,
    pub is_empty: bool,
    pub is_fluid: bool,
    pub is_passable: bool,
    pub is_see_through: bool,
    pub is_transparent: bool,
    pub is_dynamic: bool,
    pub aabbs: Vec<Aabb>,
}

impl Default for Block {
    fn default() -> Self {
        Self {
            id: AIR_ID,
            name: String::new(),
            rotatable: false,
            y_rotatable: false,
            is_empty: false,
            is_fluid: false,
            is_passable: false,
            is_see_through: false,
            is_transparent: false,
            is_dynamic: false,
            aabbs: vec![Aabb::FULL],
        }
    }
}

impl Block {
    /// Placeholder rendered in place of ids the registry does not know.
    pub fn unknown() -> Self {
        Self {
            id: u32::MAX,
            name: UNKNOWN_BLOCK_NAME.to_string(),
            ..Self::default()
        }
    }

    /// Material identifier the scene uses to pick a shader/texture for this block.
    pub fn material_key(&self) -> String {
        self.name.to_lowercase()
    }

    /// Whether this block terminates a column scan for the highest block.
    pub fn counts_for_height(&self) -> bool {
        !self.is_empty && !self.is_fluid
    }
}

/// All block types known to the client, keyed by id.
#[derive(Clone, Default)]
pub struct BlockRegistry {
    blocks: HashMap<u32, Block>,
    names: HashMap<String, u32>,
    dynamic: HashMap<u32, Arc<dyn DynamicBlockBehavior>>,
    unknown: Block,
}

impl fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockRegistry")
            .field("blocks", &self.blocks.len())
            .field("dynamic", &self.dynamic.len())
            .finish()
    }
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self {
            unknown: Block::unknown(),
            ..Default::default()
        }
    }

    /// Build a registry from the server's block list.
    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let mut registry = Self::new();
        for block in blocks {
            registry.register(block);
        }
        registry
    }

    /// Add or replace a block definition.
    pub fn register(&mut self, block: Block) {
        self.names.insert(block.name.to_lowercase(), block.id);
        self.blocks.insert(block.id, block);
    }

    pub fn get(&self, id: u32) -> Option<&Block> {
        self.blocks.get(&id)
    }

    /// Case-insensitive lookup by name.
    pub fn get_by_name(&self, name: &str) -> Option<&Block> {
        self.names
            .get(&name.to_lowercase())
            .and_then(|id| self.blocks.get(id))
    }

    /// The block for `id`, or [`StreamError::UnknownBlock`].
    pub fn require(&self, id: u32) -> Result<&Block> {
        self.blocks.get(&id).ok_or(StreamError::UnknownBlock(id))
    }

    /// The block for `id`, or the unknown-block placeholder.
    pub fn get_or_unknown(&self, id: u32) -> &Block {
        self.blocks.get(&id).unwrap_or(&self.unknown)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.blocks.contains_key(&id)
    }

    /// Attach a dynamic behavior to a registered block.
    ///
    /// Returns false if no block has that name.
    pub fn set_dynamic_by_name(&mut self, name: &str, behavior: Arc<dyn DynamicBlockBehavior>) -> bool {
        match self.names.get(&name.to_lowercase()) {
            Some(&id) => {
                self.dynamic.insert(id, behavior);
                true
            }
            None => false,
        }
    }

    pub fn dynamic(&self, id: u32) -> Option<&Arc<dyn DynamicBlockBehavior>> {
        self.dynamic.get(&id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
