//! Entity spawning seam and the roster of spawned seat entities.

use classroom_shared::protocol::ParticipantId;
use classroom_shared::vec3::{Quat, Vec3};
use std::collections::BTreeMap;

/// Opaque handle returned by the spawn collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(pub u64);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpawnError {
    #[error("no entity template configured")]
    MissingTemplate,
    #[error("spawn rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub seat_index: u32,
    pub occupant: Option<ParticipantId>,
    pub position: Vec3,
    pub heading_degrees: f64,
}

/// Instantiates visual entities. Implemented by the presentation layer.
pub trait EntitySpawner {
    fn is_ready(&self) -> bool;

    fn spawn(&mut self, request: &SpawnRequest) -> Result<EntityHandle, SpawnError>;

    fn despawn(&mut self, handle: EntityHandle);

    /// Attach the local camera to an entity. Returns false if the entity has no viewpoint.
    fn bind_viewpoint(&mut self, handle: EntityHandle, heading_degrees: f64) -> bool;

    /// Push a replicated transform onto a remote participant's entity.
    fn apply_transform(&mut self, _handle: EntityHandle, _position: Vec3, _rotation: Quat) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnedEntity {
    pub handle: EntityHandle,
    pub seat_index: u32,
    pub occupant: Option<ParticipantId>,
    pub position: Vec3,
    pub heading_degrees: f64,
}

/// Seat entities of the current generation.
#[derive(Debug, Default)]
pub struct EntityRoster {
    entities: Vec<SpawnedEntity>,
}

impl EntityRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: SpawnedEntity) {
        self.entities.retain(|e| e.seat_index != entity.seat_index);
        self.entities.push(entity);
    }

    pub fn by_seat(&self, seat_index: u32) -> Option<&SpawnedEntity> {
        self.entities.iter().find(|e| e.seat_index == seat_index)
    }

    pub fn by_occupant(&self, id: ParticipantId) -> Option<&SpawnedEntity> {
        self.entities.iter().find(|e| e.occupant == Some(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpawnedEntity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Despawn every entity through `spawner` and empty the roster.
    pub fn despawn_all<S: EntitySpawner>(&mut self, spawner: &mut S) {
        for entity in self.entities.drain(..) {
            spawner.despawn(entity.handle);
        }
    }
}

/// In-memory spawner for processes without a renderer.
#[derive(Debug)]
pub struct HeadlessSpawner {
    next_handle: u64,
    ready: bool,
    missing_template: bool,
    viewpoints: bool,
    live: BTreeMap<EntityHandle, SpawnRequest>,
    transforms: BTreeMap<EntityHandle, (Vec3, Quat)>,
    viewpoint: Option<EntityHandle>,
    spawned_total: usize,
    despawned_total: usize,
}

impl Default for HeadlessSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessSpawner {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            ready: true,
            missing_template: false,
            viewpoints: true,
            live: BTreeMap::new(),
            transforms: BTreeMap::new(),
            viewpoint: None,
            spawned_total: 0,
            despawned_total: 0,
        }
    }

    /// A spawner whose every spawn fails with `MissingTemplate`.
    pub fn without_template() -> Self {
        Self {
            missing_template: true,
            ..Self::new()
        }
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// When false, `bind_viewpoint` always fails.
    pub fn set_viewpoints_available(&mut self, available: bool) {
        self.viewpoints = available;
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn spawned_total(&self) -> usize {
        self.spawned_total
    }

    pub fn despawned_total(&self) -> usize {
        self.despawned_total
    }

    pub fn request(&self, handle: EntityHandle) -> Option<&SpawnRequest> {
        self.live.get(&handle)
    }

    pub fn live_requests(&self) -> impl Iterator<Item = &SpawnRequest> {
        self.live.values()
    }

    pub fn transform(&self, handle: EntityHandle) -> Option<(Vec3, Quat)> {
        self.transforms.get(&handle).copied()
    }

    pub fn viewpoint(&self) -> Option<EntityHandle> {
        self.viewpoint
    }
}

impl EntitySpawner for HeadlessSpawner {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn spawn(&mut self, request: &SpawnRequest) -> Result<EntityHandle, SpawnError> {
        if self.missing_template {
            return Err(SpawnError::MissingTemplate);
        }
        let handle = EntityHandle(self.next_handle);
        self.next_handle += 1;
        self.live.insert(handle, *request);
        self.spawned_total += 1;
        Ok(handle)
    }

    fn despawn(&mut self, handle: EntityHandle) {
        if self.live.remove(&handle).is_some() {
            self.despawned_total += 1;
        }
        self.transforms.remove(&handle);
        if self.viewpoint == Some(handle) {
            self.viewpoint = None;
        }
    }

    fn bind_viewpoint(&mut self, handle: EntityHandle, _heading_degrees: f64) -> bool {
        if !self.viewpoints || !self.live.contains_key(&handle) {
            return false;
        }
        self.viewpoint = Some(handle);
        true
    }

    fn apply_transform(&mut self, handle: EntityHandle, position: Vec3, rotation: Quat) {
        if self.live.contains_key(&handle) {
            self.transforms.insert(handle, (position, rotation));
        }
    }
}
