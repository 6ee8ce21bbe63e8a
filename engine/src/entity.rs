//! Entities, the entity table, and the controller seam.

use schema::{ClassId, FieldDef, ENTITY_REF_SIZE};
use wire::ByteWriter;

/// Entity role flags. The three roles are orthogonal bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntityFlags(u8);

impl EntityFlags {
    /// Exists only on this client, never synchronized.
    pub const IS_LOCAL: u8 = 1 << 0;

    /// Authority lies with this client; predicted and rolled back.
    pub const IS_LOCAL_CONTROLLED: u8 = 1 << 1;

    /// Authority lies with the server; interpolated.
    pub const IS_SERVER_CONTROLLED: u8 = 1 << 2;

    /// Creates flags from a raw value.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// A purely local entity.
    #[must_use]
    pub const fn local() -> Self {
        Self(Self::IS_LOCAL)
    }

    /// A synchronized entity controlled by this client.
    #[must_use]
    pub const fn local_controlled() -> Self {
        Self(Self::IS_LOCAL_CONTROLLED)
    }

    /// A synchronized entity controlled by the server.
    #[must_use]
    pub const fn server_controlled() -> Self {
        Self(Self::IS_SERVER_CONTROLLED)
    }

    /// An optimistically spawned entity awaiting server acknowledgement.
    #[must_use]
    pub const fn predicted_spawn() -> Self {
        Self(Self::IS_LOCAL | Self::IS_LOCAL_CONTROLLED)
    }

    #[must_use]
    pub const fn is_local(self) -> bool {
        self.0 & Self::IS_LOCAL != 0
    }

    #[must_use]
    pub const fn is_local_controlled(self) -> bool {
        self.0 & Self::IS_LOCAL_CONTROLLED != 0
    }

    #[must_use]
    pub const fn is_server_controlled(self) -> bool {
        self.0 & Self::IS_SERVER_CONTROLLED != 0
    }

    /// Returns `true` if the entity participates in rollback: locally
    /// controlled but synchronized with the server.
    #[must_use]
    pub const fn is_predicted(self) -> bool {
        self.is_local_controlled() && !self.is_local()
    }
}

/// A live entity: identity plus its raw field image.
///
/// All synchronized state lives in `data`, addressed by the class's
/// field descriptors. Behavior is resolved through class metadata, not
/// stored here.
#[derive(Debug)]
pub struct Entity {
    pub id: u16,
    pub version: u8,
    pub class_id: ClassId,
    pub flags: EntityFlags,
    data: Vec<u8>,
}

impl Entity {
    /// Creates an entity with a zeroed field image of `fields_size`.
    #[must_use]
    pub fn new(id: u16, version: u8, class_id: ClassId, flags: EntityFlags, fields_size: usize) -> Self {
        Self {
            id,
            version,
            class_id,
            flags,
            data: vec![0; fields_size],
        }
    }

    /// The live field image.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The live field image, mutable.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// One field's bytes.
    #[must_use]
    pub fn field(&self, field: &FieldDef) -> &[u8] {
        &self.data[field.offset..field.offset + field.size]
    }

    /// One field's bytes, mutable.
    pub fn field_mut(&mut self, field: &FieldDef) -> &mut [u8] {
        &mut self.data[field.offset..field.offset + field.size]
    }

    /// Encodes a reference to this entity (id + version).
    #[must_use]
    pub fn ref_bytes(&self) -> [u8; ENTITY_REF_SIZE] {
        let id = self.id.to_le_bytes();
        [id[0], id[1], self.version]
    }
}

/// Dense entity storage indexed by id.
///
/// Entity references resolve through this table; nothing in the engine
/// holds an owning pointer to another entity.
#[derive(Debug)]
pub struct EntityTable {
    slots: Vec<Option<Entity>>,
}

impl EntityTable {
    /// Creates a table for ids `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    /// Returns the id bound.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Looks up a live entity.
    #[must_use]
    pub fn get(&self, id: u16) -> Option<&Entity> {
        self.slots.get(usize::from(id))?.as_ref()
    }

    /// Looks up a live entity, mutable.
    pub fn get_mut(&mut self, id: u16) -> Option<&mut Entity> {
        self.slots.get_mut(usize::from(id))?.as_mut()
    }

    /// Inserts an entity, replacing any previous occupant of its slot,
    /// and returns the live reference.
    pub fn insert(&mut self, entity: Entity) -> &mut Entity {
        let slot = usize::from(entity.id);
        self.slots[slot].insert(entity)
    }

    /// Removes and returns the entity at `id`.
    pub fn remove(&mut self, id: u16) -> Option<Entity> {
        self.slots.get_mut(usize::from(id))?.take()
    }

    /// Finds a free id scanning down from the top of the id space.
    ///
    /// Server-assigned ids grow densely from zero; optimistic spawns
    /// claim from the other end to avoid colliding with them.
    #[must_use]
    pub fn free_id_from_top(&self) -> Option<u16> {
        (0..self.slots.len())
            .rev()
            .find(|slot| self.slots[*slot].is_none())
            .map(|slot| slot as u16)
    }

    /// Resolves an encoded entity reference, requiring a version match.
    #[must_use]
    pub fn resolve_ref(&self, bytes: &[u8]) -> Option<&Entity> {
        if bytes.len() < ENTITY_REF_SIZE {
            return None;
        }
        let id = u16::from_le_bytes([bytes[0], bytes[1]]);
        let entity = self.get(id)?;
        (entity.version == bytes[2]).then_some(entity)
    }

    /// Iterates live entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Iterates live entities in id order, mutable.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}

/// A human input source.
///
/// One controller produces input bytes each logic tick and applies them
/// to the entities it drives, both for the live prediction step and
/// again during rollback replay.
pub trait Controller {
    /// Appends this controller's input for the current tick.
    fn generate_input(&mut self, writer: &mut ByteWriter);

    /// Applies an input payload to the entities this controller drives.
    ///
    /// Must be deterministic: replaying the same payload over the same
    /// entity state must produce the same result.
    fn read_input(&mut self, entities: &mut EntityTable, payload: &[u8]);
}
