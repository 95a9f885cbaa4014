//! Client-side chunk streaming for server-authoritative voxel worlds.
//!
//! The client keeps a sliding window of chunk columns around the observer:
//! it requests missing columns from the server, meshes the payloads that come
//! back under a per-frame budget, attaches meshes to the scene, evicts columns
//! that fall out of range, and applies local voxel edits optimistically before
//! forwarding them.
//!
//! # Example
//!
//! ```
//! use voxel_stream::{ClientMessage, ClientParams, NullScene, PacketBuffer, World};
//!
//! let mut world = World::new(ClientParams::default(), PacketBuffer::new(), NullScene);
//! world
//!     .on_message_json(r#"{ "type": "INIT", "blocks": [], "params": { "chunkSize": 16, "maxHeight": 64, "subChunks": 4 } }"#)
//!     .unwrap();
//! world.init().unwrap();
//!
//! world.update(glam::Vec3::ZERO).unwrap();
//! let packets = world.transport_mut().drain();
//! assert!(matches!(packets[0], ClientMessage::Load { .. }));
//! ```

pub mod budget;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod coord;
pub mod error;
pub mod mutation;
pub mod protocol;
pub mod registry;
pub mod scene;
pub mod scheduler;
pub mod stats;
pub mod table;
pub mod transport;
pub mod world;

// Re-export primary types
pub use crate::chunk::{BuildReport, Chunk, ChunkMesh, ChunkState, MeshGeometry, MeshJob, SubChunkMesh};
pub use crate::codec::{BlockRotation, LightColor, RotationAxis};
pub use crate::config::{ClientParams, ServerParams, WorldParams};
pub use crate::coord::ChunkCoord;
pub use crate::error::{Result, StreamError};
pub use crate::mutation::{BlockUpdate, MutationQueue, VoxelEdit};
pub use crate::protocol::{
    ChunkPayload, ChunkRequest, ClientMessage, GeometryPayload, MeshPayload, OutboundUpdate, ServerMessage,
    VoxelUpdate, WordArray,
};
pub use crate::registry::{Aabb, Block, BlockRegistry, DynamicBlockBehavior, VoxelAccess};
pub use crate::scene::{NullScene, RecordingScene, SceneEvent, SceneGraph};
pub use crate::scheduler::StreamingScheduler;
pub use crate::stats::{StreamDebugInfo, TickPhase, TickStats};
pub use crate::table::ChunkTable;
pub use crate::transport::{inbound_channel, InboundReceiver, InboundSender, PacketBuffer, Transport};
pub use crate::world::World;
