//! Wire messages exchanged with the world server.
//!
//! Both directions are closed tagged unions keyed by a `type` field, e.g.
//! `{"type":"LOAD","chunks":[...]}`. Framing and compression belong to the
//! transport; this module only fixes the message shapes.

use serde::{Deserialize, Serialize};

use crate::config::ServerParams;
use crate::coord::ChunkCoord;
use crate::error::Result;
use crate::registry::Block;

// ============================================================================
// Server -> client
// ============================================================================

/// Messages received from the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// World definition: block registry and server parameters.
    Init {
        #[serde(default)]
        blocks: Vec<Block>,
        #[serde(default)]
        params: ServerParams,
    },

    /// Chunk data answering an earlier LOAD request.
    Load { chunks: Vec<ChunkPayload> },

    /// Authoritative voxel changes, plus re-meshed chunks that must be shown urgently.
    Update {
        #[serde(default)]
        updates: Vec<VoxelUpdate>,
        #[serde(default)]
        chunks: Vec<ChunkPayload>,
    },

    /// Any message type this client does not handle (chat, peers, entities).
    #[serde(other)]
    Other,
}

impl ServerMessage {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Message type as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Init { .. } => "INIT",
            ServerMessage::Load { .. } => "LOAD",
            ServerMessage::Update { .. } => "UPDATE",
            ServerMessage::Other => "OTHER",
        }
    }
}

/// One server-side voxel change: raw voxel and light words.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelUpdate {
    pub vx: i32,
    pub vy: i32,
    pub vz: i32,
    pub voxel: u32,
    pub light: u32,
}

/// Dense `u32` storage as sent by the server.
///
/// Either a plain word array or the same words as little-endian bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WordArray {
    Words(Vec<u32>),
    Bytes { bytes: Vec<u8> },
}

impl Default for WordArray {
    fn default() -> Self {
        WordArray::Words(Vec::new())
    }
}

impl WordArray {
    /// Number of words this array decodes to, `None` if the byte form is truncated.
    pub fn word_len(&self) -> Option<usize> {
        match self {
            WordArray::Words(words) => Some(words.len()),
            WordArray::Bytes { bytes } if bytes.len() % 4 == 0 => Some(bytes.len() / 4),
            WordArray::Bytes { .. } => None,
        }
    }

    /// Decode into native words, `None` if the byte form is truncated.
    pub fn into_words(self) -> Option<Vec<u32>> {
        match self {
            WordArray::Words(words) => Some(words),
            WordArray::Bytes { bytes } => {
                if bytes.len() % 4 != 0 {
                    return None;
                }
                let mut words = vec![0u32; bytes.len() / 4];
                bytemuck::cast_slice_mut::<u32, u8>(&mut words).copy_from_slice(&bytes);
                for word in &mut words {
                    *word = u32::from_le(*word);
                }
                Some(words)
            }
        }
    }

    /// Encode words as little-endian bytes.
    pub fn from_words_le(words: &[u32]) -> Self {
        let le: Vec<u32> = words.iter().map(|w| w.to_le()).collect();
        WordArray::Bytes {
            bytes: bytemuck::cast_slice::<u32, u8>(&le).to_vec(),
        }
    }
}

/// Full data for one chunk column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub x: i32,
    pub z: i32,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub voxels: WordArray,
    #[serde(default)]
    pub lights: WordArray,
    #[serde(default)]
    pub meshes: Vec<MeshPayload>,
}

impl ChunkPayload {
    pub fn coord(&self) -> ChunkCoord {
        ChunkCoord::new(self.x, self.z)
    }
}

/// Pre-built geometry for one sub-chunk level.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshPayload {
    pub level: u32,
    #[serde(default)]
    pub geometries: Vec<GeometryPayload>,
}

/// Geometry for all faces of one block type within a level.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryPayload {
    /// Block id the faces belong to.
    pub voxel: u32,
    #[serde(default)]
    pub positions: Vec<f32>,
    #[serde(default)]
    pub indices: Vec<u32>,
    #[serde(default)]
    pub uvs: Vec<f32>,
    /// Packed light word per vertex.
    #[serde(default)]
    pub lights: Vec<u32>,
}

// ============================================================================
// Client -> server
// ============================================================================

/// Messages sent to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Batched chunk request.
    Load { chunks: Vec<ChunkRequest> },

    /// Batched local edits with their pre-packed voxel words.
    Update { updates: Vec<OutboundUpdate> },

    /// Chunks the client has evicted, as `[cx, cz]` pairs.
    Unload { chunks: Vec<[i32; 2]> },
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Load { .. } => "LOAD",
            ClientMessage::Update { .. } => "UPDATE",
            ClientMessage::Unload { .. } => "UNLOAD",
        }
    }
}

/// Coordinate named in an outbound LOAD.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub x: i32,
    pub z: i32,
}

impl From<ChunkCoord> for ChunkRequest {
    fn from(coord: ChunkCoord) -> Self {
        Self { x: coord.x, z: coord.z }
    }
}

/// One local edit as sent to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundUpdate {
    pub vx: i32,
    pub vy: i32,
    pub vz: i32,
    #[serde(rename = "type")]
    pub type_id: u32,
    pub rotation: u32,
    pub y_rotation: u32,
    /// Raw voxel word with id and rotation already packed.
    pub voxel: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_load_with_word_arrays() {
        let json = r#"{
            "type": "LOAD",
            "chunks": [{ "x": 1, "z": -2, "id": "abc", "voxels": [1, 2, 3], "lights": [4, 5, 6], "meshes": [] }]
        }"#;

        let message = ServerMessage::from_json(json).unwrap();
        let ServerMessage::Load { chunks } = message else {
            panic!("expected LOAD");
        };
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].coord(), ChunkCoord::new(1, -2));
        assert_eq!(chunks[0].voxels, WordArray::Words(vec![1, 2, 3]));
    }

    #[test]
    fn parse_update_defaults_missing_lists() {
        let json = r#"{ "type": "UPDATE", "updates": [{ "vx": 1, "vy": 2, "vz": 3, "voxel": 7, "light": 0 }] }"#;
        let message = ServerMessage::from_json(json).unwrap();
        match message {
            ServerMessage::Update { updates, chunks } => {
                assert_eq!(updates[0].voxel, 7);
                assert!(chunks.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unhandled_types_parse_as_other() {
        let message = ServerMessage::from_json(r#"{ "type": "CHAT", "text": "hi" }"#).unwrap();
        assert_eq!(message, ServerMessage::Other);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(ServerMessage::from_json("{ not json").is_err());
        assert!(ServerMessage::from_json(r#"{ "type": "LOAD" }"#).is_err());
    }

    #[test]
    fn byte_arrays_decode_little_endian() {
        let words = vec![0x0102_0304, 0xDEAD_BEEF, 0];
        let encoded = WordArray::from_words_le(&words);
        match &encoded {
            WordArray::Bytes { bytes } => assert_eq!(&bytes[..4], &[4, 3, 2, 1]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(encoded.word_len(), Some(3));
        assert_eq!(encoded.into_words(), Some(words));
    }

    #[test]
    fn truncated_bytes_are_rejected() {
        let array = WordArray::Bytes { bytes: vec![1, 2, 3] };
        assert_eq!(array.word_len(), None);
        assert_eq!(array.into_words(), None);
    }

    #[test]
    fn outbound_shapes() {
        let unload = ClientMessage::Unload { chunks: vec![[2, 3]] };
        assert_eq!(unload.to_json().unwrap(), r#"{"type":"UNLOAD","chunks":[[2,3]]}"#);

        let update = ClientMessage::Update {
            updates: vec![OutboundUpdate {
                vx: 5,
                vy: 10,
                vz: 5,
                type_id: 42,
                rotation: 0,
                y_rotation: 0,
                voxel: 42,
            }],
        };
        let json = update.to_json().unwrap();
        assert!(json.contains(r#""type":42"#));
        assert!(json.contains(r#""yRotation":0"#));
        assert_eq!(ClientMessage::from_json(&json).unwrap(), update);

        let load = ClientMessage::Load {
            chunks: vec![ChunkCoord::new(-1, 4).into()],
        };
        assert_eq!(load.to_json().unwrap(), r#"{"type":"LOAD","chunks":[{"x":-1,"z":4}]}"#);
    }
}
