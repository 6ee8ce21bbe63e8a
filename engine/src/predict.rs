//! Prediction state: authoritative images, interpolation scratch, and
//! optimistic spawns.

use std::collections::VecDeque;

use schema::ClassDef;

use crate::entity::Entity;
use crate::tick::Tick;

/// Whether the engine is replaying buffered inputs after a rollback.
///
/// Entity logic can consult this to suppress one-shot side effects
/// (sounds, particles) during replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    #[default]
    Normal,
    PredictionRollback,
}

/// Per-entity prediction and interpolation buffers.
///
/// `predicted` holds the last authoritative flat field image of every
/// locally controlled entity (the rollback seed). `initial` and `prev`
/// hold interpolated-field images at the start of the current and
/// previous visual frame. All buffers grow on first use and are reused
/// in place afterwards.
#[derive(Debug)]
pub(crate) struct PredictionEngine {
    predicted: Vec<Option<Vec<u8>>>,
    initial: Vec<Option<Vec<u8>>>,
    prev: Vec<Option<Vec<u8>>>,
    pending_spawns: VecDeque<(Tick, u16)>,
    mode: EngineMode,
}

impl PredictionEngine {
    pub fn new(capacity: usize) -> Self {
        let mut predicted = Vec::with_capacity(capacity);
        predicted.resize_with(capacity, || None);
        let mut initial = Vec::with_capacity(capacity);
        initial.resize_with(capacity, || None);
        let mut prev = Vec::with_capacity(capacity);
        prev.resize_with(capacity, || None);
        Self {
            predicted,
            initial,
            prev,
            pending_spawns: VecDeque::new(),
            mode: EngineMode::Normal,
        }
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: EngineMode) {
        self.mode = mode;
    }

    /// Ensures the predicted image exists for `entity_id`, sized to the
    /// class's flat layout.
    pub fn track_predicted(&mut self, entity_id: u16, fixed_size: usize) -> &mut Vec<u8> {
        let slot = &mut self.predicted[usize::from(entity_id)];
        let image = slot.get_or_insert_with(Vec::new);
        if image.len() < fixed_size {
            image.resize(fixed_size, 0);
        }
        image
    }

    /// Ensures the interpolation scratch exists for `entity_id`.
    pub fn track_scratch(&mut self, entity_id: u16, interpolated_size: usize) {
        for buffers in [&mut self.initial, &mut self.prev] {
            let slot = &mut buffers[usize::from(entity_id)];
            let image = slot.get_or_insert_with(Vec::new);
            if image.len() < interpolated_size {
                image.resize(interpolated_size, 0);
            }
        }
    }

    /// Drops all buffers for a destroyed entity.
    pub fn untrack(&mut self, entity_id: u16) {
        self.predicted[usize::from(entity_id)] = None;
        self.initial[usize::from(entity_id)] = None;
        self.prev[usize::from(entity_id)] = None;
    }

    pub fn predicted(&self, entity_id: u16) -> Option<&[u8]> {
        self.predicted[usize::from(entity_id)].as_deref()
    }

    pub fn predicted_mut(&mut self, entity_id: u16) -> Option<&mut [u8]> {
        self.predicted[usize::from(entity_id)].as_deref_mut()
    }

    pub fn initial(&self, entity_id: u16) -> Option<&[u8]> {
        self.initial[usize::from(entity_id)].as_deref()
    }

    pub fn initial_mut(&mut self, entity_id: u16) -> Option<&mut [u8]> {
        self.initial[usize::from(entity_id)].as_deref_mut()
    }

    pub fn prev(&self, entity_id: u16) -> Option<&[u8]> {
        self.prev[usize::from(entity_id)].as_deref()
    }

    /// Copies `initial` into `prev` at the start of a logic tick.
    pub fn rotate_scratch(&mut self, entity_id: u16) {
        let slot = usize::from(entity_id);
        if let (Some(initial), Some(prev)) = (&self.initial[slot], &mut self.prev[slot]) {
            prev[..initial.len()].copy_from_slice(initial);
        }
    }

    /// Captures an entity's current interpolated fields into `initial`.
    pub fn capture_initial(&mut self, entity: &Entity, class: &ClassDef) {
        self.track_scratch(entity.id, class.interpolated_size());
        let Some(initial) = self.initial[usize::from(entity.id)].as_mut() else {
            return;
        };
        for field in class.fields() {
            if field.is_interpolated() {
                initial[field.interp_offset..field.interp_offset + field.size]
                    .copy_from_slice(entity.field(field));
            }
        }
    }

    /// Restores an entity's live fields from its predicted image,
    /// honoring the field layout. Remote-only fields are left alone.
    pub fn reset_to_authoritative(&self, entity: &mut Entity, class: &ClassDef) {
        let Some(image) = self.predicted(entity.id) else {
            return;
        };
        for field in class.fields() {
            if field.flags.is_only_for_remote() {
                continue;
            }
            let src = &image[field.fixed_offset..field.fixed_offset + field.size];
            entity.field_mut(field).copy_from_slice(src);
        }
    }

    /// Records an optimistic spawn awaiting server acknowledgement.
    pub fn push_pending_spawn(&mut self, spawn_tick: Tick, entity_id: u16) {
        self.pending_spawns.push_back((spawn_tick, entity_id));
    }

    /// Pops acknowledged optimistic spawns from the queue head.
    ///
    /// Returns each entity id whose spawn tick the server has processed;
    /// the caller destroys them (the authoritative entity has arrived or
    /// never will).
    pub fn drain_acked_spawns(&mut self, processed_tick: Tick) -> Vec<u16> {
        let mut acked = Vec::new();
        while let Some((spawn_tick, entity_id)) = self.pending_spawns.front().copied() {
            if processed_tick.seq_diff(spawn_tick) < 0 {
                break;
            }
            self.pending_spawns.pop_front();
            acked.push(entity_id);
        }
        acked
    }

    #[cfg(test)]
    pub fn pending_spawn_count(&self) -> usize {
        self.pending_spawns.len()
    }
}
