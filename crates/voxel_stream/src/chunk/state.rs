//! Chunk lifecycle state.

/// Build state of a resident chunk.
///
/// Request bookkeeping (to-request, requested) lives in the chunk table; a
/// `Chunk` only exists once data for it has arrived or an update named it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChunkState {
    /// Created without data (for example by a server update naming an unknown chunk).
    #[default]
    Empty,

    /// Storage decoded; geometry for `data_version` is still being built.
    Meshing {
        /// Version of the payload the pending build was started from.
        data_version: u64,
    },

    /// Geometry matches the latest payload.
    Meshed {
        /// Version of the payload the current mesh was built from.
        data_version: u64,
    },
}

impl ChunkState {
    /// Check if a build is in flight.
    pub fn is_meshing(&self) -> bool {
        matches!(self, ChunkState::Meshing { .. })
    }

    /// Check if the current mesh reflects the latest payload.
    pub fn is_meshed(&self) -> bool {
        matches!(self, ChunkState::Meshed { .. })
    }

    /// Whether a finished build for `version` is still the newest one.
    pub fn accepts(&self, version: u64) -> bool {
        matches!(self, ChunkState::Meshing { data_version } if *data_version == version)
    }
}
