//! Bit packing for voxel words and light words.
//!
//! Every lattice point is described by two `u32` words:
//!
//! ```text
//! voxel word:  [31 ........ 24][23 .. 20][19 .. 16][15 ............. 0]
//!                  stage         y-rot      axis            id
//!
//! light word:  [31 .. 18][17 16][15 .. 12][11 .. 8][7 .. 4][3 .. 0]
//!                unused     ao     sun       red     green    blue
//! ```
//!
//! All functions here are pure. Insert functions replace exactly one field and
//! leave every other bit of the word untouched; values wider than their field
//! are truncated, not validated.

/// Mask of the block id field (bits 0..16).
pub const ID_MASK: u32 = 0x0000_FFFF;
/// Mask of the rotation axis field (bits 16..20).
pub const AXIS_MASK: u32 = 0x000F_0000;
/// Mask of the y-rotation field (bits 20..24).
pub const Y_ROTATION_MASK: u32 = 0x00F0_0000;
/// Mask of the combined rotation byte (axis + y-rotation, bits 16..24).
pub const ROTATION_MASK: u32 = AXIS_MASK | Y_ROTATION_MASK;
/// Mask of the stage field (bits 24..32).
pub const STAGE_MASK: u32 = 0xFF00_0000;

const ROTATION_SHIFT: u32 = 16;
const STAGE_SHIFT: u32 = 24;

/// Number of discrete y-rotation segments around the Y axis.
pub const Y_ROT_SEGMENTS: u32 = 16;

/// Mask of the sunlight field (bits 12..16).
pub const SUNLIGHT_MASK: u32 = 0x0000_F000;
/// Mask of the ambient-occlusion index field (bits 16..18).
pub const AO_MASK: u32 = 0x0003_0000;

const SUNLIGHT_SHIFT: u32 = 12;
const AO_SHIFT: u32 = 16;

// ============================================================================
// Rotation
// ============================================================================

/// Major axis a block's local +Y points along.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RotationAxis {
    /// Upright (identity).
    #[default]
    PY = 0,
    NY = 1,
    PX = 2,
    NX = 3,
    PZ = 4,
    NZ = 5,
}

impl RotationAxis {
    /// All six axes in wire order.
    pub const ALL: [RotationAxis; 6] = [
        RotationAxis::PY,
        RotationAxis::NY,
        RotationAxis::PX,
        RotationAxis::NX,
        RotationAxis::PZ,
        RotationAxis::NZ,
    ];

    /// Axis for a raw 4-bit value, `None` for values past `NZ`.
    pub fn from_raw(value: u32) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Raw 4-bit value.
    #[inline]
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Whether the y-rotation sub-field means anything for this axis.
    #[inline]
    pub fn is_vertical(self) -> bool {
        matches!(self, RotationAxis::PY | RotationAxis::NY)
    }
}

/// Decoded rotation of one voxel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BlockRotation {
    pub axis: RotationAxis,
    /// Segment index in `0..Y_ROT_SEGMENTS`.
    pub y_rotation: u8,
}

impl BlockRotation {
    pub const fn new(axis: RotationAxis, y_rotation: u8) -> Self {
        Self { axis, y_rotation }
    }

    /// Pack into the 8-bit rotation word stored at bits 16..24 of a voxel word.
    #[inline]
    pub fn encode(self) -> u32 {
        encode_rotation(self.axis, self.y_rotation as u32)
    }

    /// Unpack an 8-bit rotation word. Unknown axis values decode as `PY`.
    #[inline]
    pub fn decode(rotation_word: u32) -> Self {
        let axis = RotationAxis::from_raw(rotation_word & 0xF).unwrap_or_default();
        let y_rotation = ((rotation_word >> 4) & 0xF) as u8;
        Self { axis, y_rotation }
    }

    /// Y rotation in radians.
    pub fn y_angle(self) -> f32 {
        self.y_rotation as f32 * std::f32::consts::TAU / Y_ROT_SEGMENTS as f32
    }
}

/// Build a rotation word from a major axis and a y-rotation segment.
#[inline]
pub fn encode_rotation(axis: RotationAxis, y_rotation: u32) -> u32 {
    (axis.raw() & 0xF) | ((y_rotation & 0xF) << 4)
}

// ============================================================================
// Voxel word
// ============================================================================

/// Block id stored in a voxel word.
#[inline]
pub fn extract_id(word: u32) -> u32 {
    word & ID_MASK
}

/// Replace the block id, keeping the other fields.
#[inline]
pub fn insert_id(word: u32, id: u32) -> u32 {
    (word & !ID_MASK) | (id & ID_MASK)
}

/// Raw 8-bit rotation word (axis + y-rotation).
#[inline]
pub fn extract_rotation_word(word: u32) -> u32 {
    (word & ROTATION_MASK) >> ROTATION_SHIFT
}

/// Replace the raw rotation word, keeping the other fields.
#[inline]
pub fn insert_rotation_word(word: u32, rotation_word: u32) -> u32 {
    (word & !ROTATION_MASK) | ((rotation_word << ROTATION_SHIFT) & ROTATION_MASK)
}

/// Decoded rotation of a voxel word.
#[inline]
pub fn extract_rotation(word: u32) -> BlockRotation {
    BlockRotation::decode(extract_rotation_word(word))
}

/// Replace the rotation, keeping the other fields.
#[inline]
pub fn insert_rotation(word: u32, rotation: BlockRotation) -> u32 {
    insert_rotation_word(word, rotation.encode())
}

/// Growth or damage stage (bits 24..32).
#[inline]
pub fn extract_stage(word: u32) -> u32 {
    (word & STAGE_MASK) >> STAGE_SHIFT
}

/// Replace the stage, keeping the other fields.
#[inline]
pub fn insert_stage(word: u32, stage: u32) -> u32 {
    (word & !STAGE_MASK) | ((stage << STAGE_SHIFT) & STAGE_MASK)
}

/// Pack all voxel fields into a fresh word.
#[inline]
pub fn pack_voxel(id: u32, rotation: BlockRotation, stage: u32) -> u32 {
    insert_stage(insert_rotation(insert_id(0, id), rotation), stage)
}

/// Unpack a voxel word.
///
/// Returns (id, rotation, stage).
#[inline]
pub fn unpack_voxel(word: u32) -> (u32, BlockRotation, u32) {
    (extract_id(word), extract_rotation(word), extract_stage(word))
}

// ============================================================================
// Light word
// ============================================================================

/// Torch light color channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightColor {
    Red,
    Green,
    Blue,
}

impl LightColor {
    pub const ALL: [LightColor; 3] = [LightColor::Red, LightColor::Green, LightColor::Blue];

    #[inline]
    fn shift(self) -> u32 {
        match self {
            LightColor::Blue => 0,
            LightColor::Green => 4,
            LightColor::Red => 8,
        }
    }

    #[inline]
    fn mask(self) -> u32 {
        0xF << self.shift()
    }
}

/// Sunlight level of a light word.
#[inline]
pub fn extract_sunlight(light: u32) -> u32 {
    (light & SUNLIGHT_MASK) >> SUNLIGHT_SHIFT
}

/// Replace the sunlight level.
#[inline]
pub fn insert_sunlight(light: u32, level: u32) -> u32 {
    (light & !SUNLIGHT_MASK) | ((level << SUNLIGHT_SHIFT) & SUNLIGHT_MASK)
}

/// Torch light level in one color channel.
#[inline]
pub fn extract_torch_light(light: u32, color: LightColor) -> u32 {
    (light & color.mask()) >> color.shift()
}

/// Replace one torch light channel.
#[inline]
pub fn insert_torch_light(light: u32, color: LightColor, level: u32) -> u32 {
    (light & !color.mask()) | ((level << color.shift()) & color.mask())
}

/// Ambient-occlusion index of a light word.
#[inline]
pub fn extract_ao(light: u32) -> u32 {
    (light & AO_MASK) >> AO_SHIFT
}

/// Replace the ambient-occlusion index.
#[inline]
pub fn insert_ao(light: u32, ao: u32) -> u32 {
    (light & !AO_MASK) | ((ao << AO_SHIFT) & AO_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_rotation(rng: &mut impl Rng) -> BlockRotation {
        let axis = RotationAxis::ALL[rng.gen_range(0..6)];
        BlockRotation::new(axis, rng.gen_range(0..Y_ROT_SEGMENTS as u8))
    }

    #[test]
    fn layout_matches_documented_bits() {
        let word = pack_voxel(0xABCD, BlockRotation::new(RotationAxis::PZ, 7), 0x5A);
        assert_eq!(word, 0x5A_7_4_ABCD);
    }

    #[test]
    fn voxel_fields_roundtrip_random() {
        let mut rng = rand::thread_rng();
        for _ in 0..2000 {
            let id = rng.gen_range(0..=ID_MASK);
            let rotation = random_rotation(&mut rng);
            let stage = rng.gen_range(0..=0xFF);

            let word = pack_voxel(id, rotation, stage);
            assert_eq!(unpack_voxel(word), (id, rotation, stage));
        }
    }

    #[test]
    fn insert_id_leaves_rotation_and_stage() {
        let mut rng = rand::thread_rng();
        for _ in 0..2000 {
            let word: u32 = rng.gen();
            let id: u32 = rng.gen();
            let updated = insert_id(word, id);

            assert_eq!(updated & !ID_MASK, word & !ID_MASK);
            assert_eq!(extract_id(updated), id & ID_MASK);
        }
    }

    #[test]
    fn insert_rotation_and_stage_leave_other_fields() {
        let mut rng = rand::thread_rng();
        for _ in 0..2000 {
            let word: u32 = rng.gen();
            let rotation = random_rotation(&mut rng);
            let stage = rng.gen_range(0..=0xFF);

            let rotated = insert_rotation(word, rotation);
            assert_eq!(rotated & !ROTATION_MASK, word & !ROTATION_MASK);
            assert_eq!(extract_rotation(rotated), rotation);

            let staged = insert_stage(word, stage);
            assert_eq!(staged & !STAGE_MASK, word & !STAGE_MASK);
            assert_eq!(extract_stage(staged), stage);
        }
    }

    #[test]
    fn oversized_values_are_truncated() {
        assert_eq!(insert_id(0, 0x1_0005), 5);
        assert_eq!(insert_stage(0x1234, 0x1FF), 0xFF00_1234);
    }

    #[test]
    fn encode_rotation_layout() {
        assert_eq!(encode_rotation(RotationAxis::PY, 0), 0);
        assert_eq!(encode_rotation(RotationAxis::NX, 2), 0x23);
        assert_eq!(BlockRotation::decode(0x23), BlockRotation::new(RotationAxis::NX, 2));
    }

    #[test]
    fn unknown_axis_decodes_upright() {
        let rotation = BlockRotation::decode(0x0E);
        assert_eq!(rotation.axis, RotationAxis::PY);
    }

    #[test]
    fn light_channels_are_independent() {
        let mut light = 0;
        light = insert_sunlight(light, 15);
        light = insert_torch_light(light, LightColor::Red, 12);
        light = insert_torch_light(light, LightColor::Green, 7);
        light = insert_torch_light(light, LightColor::Blue, 3);
        light = insert_ao(light, 2);

        assert_eq!(light, 0x2_F_C_7_3);
        assert_eq!(extract_sunlight(light), 15);
        assert_eq!(extract_torch_light(light, LightColor::Red), 12);
        assert_eq!(extract_torch_light(light, LightColor::Green), 7);
        assert_eq!(extract_torch_light(light, LightColor::Blue), 3);
        assert_eq!(extract_ao(light), 2);

        let dimmed = insert_torch_light(light, LightColor::Green, 0);
        assert_eq!(extract_torch_light(dimmed, LightColor::Red), 12);
        assert_eq!(extract_torch_light(dimmed, LightColor::Blue), 3);
        assert_eq!(extract_sunlight(dimmed), 15);
    }

    #[test]
    fn vertical_axes() {
        assert!(RotationAxis::PY.is_vertical());
        assert!(RotationAxis::NY.is_vertical());
        assert!(!RotationAxis::PX.is_vertical());
        assert!(RotationAxis::from_raw(6).is_none());
    }
}
