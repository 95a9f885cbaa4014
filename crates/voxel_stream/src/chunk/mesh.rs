//! Render-ready geometry for one chunk column.

use std::collections::BTreeMap;

use crate::protocol::{GeometryPayload, MeshPayload};
use crate::registry::BlockRegistry;

/// Faces of one block type within one sub-chunk level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshGeometry {
    /// Block id the faces belong to.
    pub voxel: u32,
    /// Material identifier resolved through the block registry.
    pub material: String,
    /// Vertex positions (flattened xyz triplets).
    pub positions: Vec<f32>,
    /// Triangle indices.
    pub indices: Vec<u32>,
    /// UV coordinates (flattened uv pairs).
    pub uvs: Vec<f32>,
    /// Packed light word per vertex.
    pub lights: Vec<u32>,
}

impl MeshGeometry {
    fn from_payload(payload: GeometryPayload, material: String) -> Self {
        Self {
            voxel: payload.voxel,
            material,
            positions: payload.positions,
            indices: payload.indices,
            uvs: payload.uvs,
            lights: payload.lights,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn memory_bytes(&self) -> usize {
        self.positions.len() * 4 + self.indices.len() * 4 + self.uvs.len() * 4 + self.lights.len() * 4
    }
}

/// Geometry of one sub-chunk level, split by render pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubChunkMesh {
    pub level: u32,
    pub opaque: Vec<MeshGeometry>,
    pub transparent: Vec<MeshGeometry>,
}

impl SubChunkMesh {
    pub fn geometries(&self) -> impl Iterator<Item = &MeshGeometry> {
        self.opaque.iter().chain(self.transparent.iter())
    }
}

/// All geometry for a chunk column, keyed by sub-chunk level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkMesh {
    pub levels: BTreeMap<u32, SubChunkMesh>,

    /// Version of the chunk payload this mesh was built from.
    pub data_version: u64,

    /// Number of geometries that referenced unregistered block ids.
    pub unknown_geometries: usize,
}

impl ChunkMesh {
    /// Create an empty mesh placeholder.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve server geometry into opaque and transparent groups.
    ///
    /// Levels outside `0..sub_chunks` are dropped. Geometry for an unknown
    /// block id is kept and drawn with the placeholder material.
    pub fn from_payloads(
        meshes: Vec<MeshPayload>,
        registry: &BlockRegistry,
        sub_chunks: u32,
        data_version: u64,
    ) -> Self {
        let mut mesh = Self {
            data_version,
            ..Self::default()
        };

        for payload in meshes {
            if payload.level >= sub_chunks {
                log::warn!(
                    "dropping mesh for level {} (column has {} levels)",
                    payload.level,
                    sub_chunks
                );
                continue;
            }

            let mut level = SubChunkMesh {
                level: payload.level,
                ..SubChunkMesh::default()
            };

            for geometry in payload.geometries {
                if !registry.contains(geometry.voxel) {
                    mesh.unknown_geometries += 1;
                }
                let block = registry.get_or_unknown(geometry.voxel);
                let see_through = block.is_see_through || block.is_transparent || block.is_fluid;
                let built = MeshGeometry::from_payload(geometry, block.material_key());
                if see_through {
                    level.transparent.push(built);
                } else {
                    level.opaque.push(built);
                }
            }

            mesh.levels.insert(level.level, level);
        }

        mesh
    }

    /// Replace every level named in `newer`, keeping levels it does not mention.
    ///
    /// A level is always replaced as a whole, never appended to.
    pub fn merge_levels(&mut self, newer: ChunkMesh) {
        self.levels.extend(newer.levels);
        self.data_version = newer.data_version;
        self.unknown_geometries = newer.unknown_geometries;
    }

    pub fn level(&self, level: u32) -> Option<&SubChunkMesh> {
        self.levels.get(&level)
    }

    /// Check if the mesh has no vertices.
    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0
    }

    pub fn vertex_count(&self) -> usize {
        self.levels
            .values()
            .flat_map(SubChunkMesh::geometries)
            .map(MeshGeometry::vertex_count)
            .sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.levels
            .values()
            .flat_map(SubChunkMesh::geometries)
            .map(MeshGeometry::triangle_count)
            .sum()
    }

    /// Get approximate memory usage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.levels
            .values()
            .flat_map(SubChunkMesh::geometries)
            .map(MeshGeometry::memory_bytes)
            .sum()
    }
}
