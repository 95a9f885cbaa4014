//! Chunk columns: storage, geometry and build lifecycle.
//!
//! - [`Chunk`]: voxel/light storage for one column, point queries, `build`
//! - [`ChunkMesh`]: per-level geometry split into opaque and transparent groups
//! - [`ChunkState`]: build state with the version used to drop stale meshes
//! - [`MeshJob`]: in-flight geometry construction
//!
//! # Build lifecycle
//!
//! ```text
//! ┌─────────┐  build()   ┌──────────────────┐  complete_build()  ┌──────────────────┐
//! │  Empty  │──────────▶│ Meshing { v }    │──────────────────▶│ Meshed { v }     │
//! └─────────┘            └──────────────────┘                    └──────────────────┘
//!                              ▲     │ build() again: v+1, old job now stale   │
//!                              │     ▼                                         │
//!                              └─────┴─────────────────────────────────────────┘
//! ```

pub mod chunk;
pub mod mesh;
pub mod state;

pub use chunk::{BuildReport, Chunk, MeshJob};
pub use mesh::{ChunkMesh, MeshGeometry, SubChunkMesh};
pub use state::ChunkState;
