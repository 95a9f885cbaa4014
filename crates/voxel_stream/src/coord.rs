//! Chunk coordinate type for chunk-space addressing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator used in the string form of a chunk coordinate.
pub const CHUNK_NAME_SEPARATOR: char = '|';

/// Column coordinate in chunk-space (not world-space).
///
/// A chunk spans the full world height, so only X and Z are needed.
/// Coordinates can be negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    /// Origin chunk at (0, 0).
    pub const ZERO: ChunkCoord = ChunkCoord { x: 0, z: 0 };

    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the given voxel.
    ///
    /// Uses Euclidean division for correct negative coordinate handling.
    ///
    /// # Example
    /// ```
    /// use voxel_stream::coord::ChunkCoord;
    ///
    /// assert_eq!(ChunkCoord::from_voxel(17, 19, 16), ChunkCoord::new(1, 1));
    /// assert_eq!(ChunkCoord::from_voxel(-1, 0, 16), ChunkCoord::new(-1, 0));
    /// ```
    pub fn from_voxel(vx: i32, vz: i32, chunk_size: u32) -> Self {
        let cs = chunk_size as i32;
        Self {
            x: vx.div_euclid(cs),
            z: vz.div_euclid(cs),
        }
    }

    /// Chunk containing the given world-space position.
    pub fn from_world(wx: f32, wz: f32, chunk_size: u32) -> Self {
        let [vx, _, vz] = world_to_voxel([wx, 0.0, wz]);
        Self::from_voxel(vx, vz, chunk_size)
    }

    /// Minimum voxel corner of this column (y is always 0).
    pub fn min_voxel(&self, chunk_size: u32) -> [i32; 3] {
        let cs = chunk_size as i32;
        [self.x * cs, 0, self.z * cs]
    }

    /// World-space XZ center of this column.
    pub fn center_world(&self, chunk_size: u32) -> [f32; 2] {
        let cs = chunk_size as f32;
        [self.x as f32 * cs + cs * 0.5, self.z as f32 * cs + cs * 0.5]
    }

    /// Horizontal distance from the column center to a world position.
    pub fn distance_to(&self, world_pos: [f32; 3], chunk_size: u32) -> f32 {
        let [cx, cz] = self.center_world(chunk_size);
        let dx = cx - world_pos[0];
        let dz = cz - world_pos[2];
        (dx * dx + dz * dz).sqrt()
    }

    /// Squared distance in chunk units to another chunk.
    pub fn chunk_distance_squared(&self, other: ChunkCoord) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dz = i64::from(self.z) - i64::from(other.z);
        dx.saturating_mul(dx).saturating_add(dz.saturating_mul(dz))
    }

    /// String form used by the wire protocol and in logs, e.g. `"3|-2"`.
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Parse the string form produced by [`ChunkCoord::name`].
    pub fn parse_name(name: &str) -> Option<Self> {
        let (x, z) = name.split_once(CHUNK_NAME_SEPARATOR)?;
        Some(Self {
            x: x.trim().parse().ok()?,
            z: z.trim().parse().ok()?,
        })
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.x, CHUNK_NAME_SEPARATOR, self.z)
    }
}

impl From<[i32; 2]> for ChunkCoord {
    fn from([x, z]: [i32; 2]) -> Self {
        Self { x, z }
    }
}

impl From<ChunkCoord> for [i32; 2] {
    fn from(coord: ChunkCoord) -> Self {
        [coord.x, coord.z]
    }
}

/// Floor a world position to the voxel containing it.
pub fn world_to_voxel(world_pos: [f32; 3]) -> [i32; 3] {
    [
        world_pos[0].floor() as i32,
        world_pos[1].floor() as i32,
        world_pos[2].floor() as i32,
    ]
}

/// Convert a voxel index to local coordinates within its chunk column.
///
/// Y passes through unchanged since columns span the full height.
pub fn voxel_to_local(vx: i32, vy: i32, vz: i32, chunk_size: u32) -> [i32; 3] {
    let cs = chunk_size as i32;
    [vx.rem_euclid(cs), vy, vz.rem_euclid(cs)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_voxel_positive() {
        assert_eq!(ChunkCoord::from_voxel(0, 0, 16), ChunkCoord::ZERO);
        assert_eq!(ChunkCoord::from_voxel(15, 15, 16), ChunkCoord::ZERO);
        assert_eq!(ChunkCoord::from_voxel(16, 31, 16), ChunkCoord::new(1, 1));
    }

    #[test]
    fn from_voxel_negative() {
        // Euclidean division: -1 / 16 = -1 (not 0)
        assert_eq!(ChunkCoord::from_voxel(-1, 0, 16), ChunkCoord::new(-1, 0));
        assert_eq!(ChunkCoord::from_voxel(-16, -17, 16), ChunkCoord::new(-1, -2));
    }

    #[test]
    fn from_world_floors() {
        assert_eq!(ChunkCoord::from_world(15.9, 0.1, 16), ChunkCoord::ZERO);
        assert_eq!(ChunkCoord::from_world(-0.1, 16.0, 16), ChunkCoord::new(-1, 1));
    }

    #[test]
    fn local_coordinates() {
        assert_eq!(voxel_to_local(17, 40, 3, 16), [1, 40, 3]);
        assert_eq!(voxel_to_local(-1, 5, -16, 16), [15, 5, 0]);
    }

    #[test]
    fn name_roundtrip() {
        let coord = ChunkCoord::new(3, -2);
        assert_eq!(coord.name(), "3|-2");
        assert_eq!(ChunkCoord::parse_name("3|-2"), Some(coord));
        assert_eq!(ChunkCoord::parse_name("3,-2"), None);
        assert_eq!(ChunkCoord::parse_name("a|1"), None);
    }

    #[test]
    fn distance_uses_column_center() {
        let coord = ChunkCoord::ZERO;
        assert!(coord.distance_to([8.0, 100.0, 8.0], 16) < 0.001);

        let far = ChunkCoord::new(2, 0);
        assert!((far.distance_to([8.0, 0.0, 8.0], 16) - 32.0).abs() < 0.001);
    }

    #[test]
    fn chunk_distance_squared() {
        let a = ChunkCoord::new(1, 2);
        assert_eq!(a.chunk_distance_squared(ChunkCoord::new(-2, 6)), 25);

        let far = ChunkCoord::new(i32::MAX, 0).chunk_distance_squared(ChunkCoord::new(-1, 0));
        assert_eq!(far, 1 << 62);
        let corner = ChunkCoord::new(i32::MAX, i32::MAX).chunk_distance_squared(ChunkCoord::new(-1, -1));
        assert_eq!(corner, i64::MAX);
    }
}
