//! Scene graph collaborator that receives chunk meshes.

use crate::chunk::ChunkMesh;
use crate::coord::ChunkCoord;

/// Where built chunk meshes are displayed.
///
/// `attach` may be called again for a chunk that is already attached when a
/// rebuild finishes; the scene should swap the geometry in place.
pub trait SceneGraph {
    fn attach(&mut self, coord: ChunkCoord, mesh: &ChunkMesh);
    fn detach(&mut self, coord: ChunkCoord);
}

impl<S: SceneGraph + ?Sized> SceneGraph for &mut S {
    fn attach(&mut self, coord: ChunkCoord, mesh: &ChunkMesh) {
        (**self).attach(coord, mesh)
    }

    fn detach(&mut self, coord: ChunkCoord) {
        (**self).detach(coord)
    }
}

/// Scene that displays nothing, for headless use.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullScene;

impl SceneGraph for NullScene {
    fn attach(&mut self, _coord: ChunkCoord, _mesh: &ChunkMesh) {}
    fn detach(&mut self, _coord: ChunkCoord) {}
}

/// What happened to the scene, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneEvent {
    Attach { coord: ChunkCoord, data_version: u64 },
    Detach { coord: ChunkCoord },
}

/// Scene that records attach/detach calls for a host to replay.
#[derive(Clone, Debug, Default)]
pub struct RecordingScene {
    events: Vec<SceneEvent>,
}

impl RecordingScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SceneEvent] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }
}

impl SceneGraph for RecordingScene {
    fn attach(&mut self, coord: ChunkCoord, mesh: &ChunkMesh) {
        self.events.push(SceneEvent::Attach {
            coord,
            data_version: mesh.data_version,
        });
    }

    fn detach(&mut self, coord: ChunkCoord) {
        self.events.push(SceneEvent::Detach { coord });
    }
}
