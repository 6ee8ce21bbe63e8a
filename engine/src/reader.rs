//! Applies snapshot records to live entities.
//!
//! Runs at snapshot advance: every preloaded record is either a
//! full-sync (create or replace the entity, then copy every field) or a
//! diff (copy the fields whose presence bit is set). Change callbacks
//! are queued during the record parse and fired once per record with the
//! pre-change bytes.

use schema::{ClassRegistry, OnSyncFn};
use wire::ByteReader;

use crate::entity::{Entity, EntityFlags, EntityTable};
use crate::error::{ParseError, ParseResult};
use crate::predict::PredictionEngine;
use crate::snapshot::{bit_set, PreloadEntry, ServerState};

/// Owner byte marking a server-owned entity in a full-sync record.
pub const SERVER_OWNER: u8 = 0xFF;

#[derive(Debug)]
struct PendingSync {
    on_sync: OnSyncFn,
    entity_id: u16,
    start: usize,
    len: usize,
}

/// Interprets snapshot bytes against class metadata.
#[derive(Debug, Default)]
pub(crate) struct StateReader {
    pending: Vec<PendingSync>,
    prev_bytes: Vec<u8>,
}

impl StateReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies every preloaded record of `state` to the world.
    ///
    /// A poisoned record aborts the loop; already-applied records stand
    /// (the next snapshot re-converges them).
    pub fn apply_state(
        &mut self,
        state: &ServerState,
        registry: &ClassRegistry,
        entities: &mut EntityTable,
        predict: &mut PredictionEngine,
        player_id: u8,
    ) {
        for entry in &state.preload {
            let result = if entry.fields_offset.is_none() {
                self.apply_full_sync(state.payload(), entry, registry, entities, predict, player_id)
            } else {
                self.apply_diff(state.payload(), entry, registry, entities, predict)
            };
            self.flush_pending();
            if let Err(err) = result {
                log::error!("state read aborted at entity {}: {err}", entry.entity_id);
                break;
            }
        }
    }

    fn apply_full_sync(
        &mut self,
        payload: &[u8],
        entry: &PreloadEntry,
        registry: &ClassRegistry,
        entities: &mut EntityTable,
        predict: &mut PredictionEngine,
        player_id: u8,
    ) -> ParseResult<()> {
        let body = &payload[entry.data_offset..entry.data_offset + entry.body_len];
        let mut reader = ByteReader::new(body);
        let version = reader.read_u8()?;
        let class_id = schema::ClassId::new(reader.read_u16()?);
        let owner = reader.read_u8()?;
        let class = registry.get(class_id).ok_or(ParseError::UnknownClass {
            class_id: class_id.get(),
        })?;

        // A different version is a new life of the same id.
        if let Some(existing) = entities.get(entry.entity_id) {
            if existing.version != version {
                entities.remove(entry.entity_id);
                predict.untrack(entry.entity_id);
            }
        }
        if entities.get(entry.entity_id).is_none() {
            let flags = if owner != SERVER_OWNER && owner == player_id {
                EntityFlags::local_controlled()
            } else {
                EntityFlags::server_controlled()
            };
            entities.insert(Entity::new(
                entry.entity_id,
                version,
                class_id,
                flags,
                class.fields_size(),
            ));
        }

        let flat = reader.read_bytes(class.fixed_size())?;
        let Some(entity) = entities.get_mut(entry.entity_id) else {
            return Err(ParseError::BadRecordFraming {
                entity_id: entry.entity_id,
            });
        };
        for field in class.fields() {
            let src = &flat[field.fixed_offset..field.fixed_offset + field.size];
            entity.field_mut(field).copy_from_slice(src);
        }

        for syncable in class.syncables() {
            let blob_len = usize::from(reader.read_u16()?);
            let blob = reader.read_bytes(blob_len)?;
            let region = &mut entity.data_mut()[syncable.offset..syncable.offset + syncable.size];
            (syncable.read_full)(region, blob);
        }

        if entity.flags.is_local_controlled() {
            let image = predict.track_predicted(entry.entity_id, class.fixed_size());
            image[..class.fixed_size()].copy_from_slice(flat);
        }
        if class.interpolated_count() > 0 {
            predict.capture_initial(entity, class);
        }
        Ok(())
    }

    fn apply_diff(
        &mut self,
        payload: &[u8],
        entry: &PreloadEntry,
        registry: &ClassRegistry,
        entities: &mut EntityTable,
        predict: &mut PredictionEngine,
    ) -> ParseResult<()> {
        let Some(flags_offset) = entry.fields_offset else {
            return Ok(());
        };
        let Some(entity) = entities.get_mut(entry.entity_id) else {
            log::warn!("diff for missing entity {}, skipping", entry.entity_id);
            return Ok(());
        };
        let class = registry.get(entity.class_id).ok_or(ParseError::UnknownClass {
            class_id: entity.class_id.get(),
        })?;

        let record_end = entry.data_offset + entry.body_len;
        if flags_offset + class.flags_size() > record_end {
            return Err(ParseError::BadRecordFraming {
                entity_id: entry.entity_id,
            });
        }
        let flags = &payload[flags_offset..flags_offset + class.flags_size()];

        let mut cursor = flags_offset + class.flags_size();
        for (field_index, field) in class.fields().iter().enumerate() {
            if !bit_set(flags, field_index) {
                continue;
            }
            if cursor + field.size > record_end {
                return Err(ParseError::BadRecordFraming {
                    entity_id: entry.entity_id,
                });
            }
            let new_bytes = &payload[cursor..cursor + field.size];

            if let Some(on_sync) = field.on_sync {
                if entity.field(field) != new_bytes {
                    let start = self.prev_bytes.len();
                    self.prev_bytes.extend_from_slice(entity.field(field));
                    self.pending.push(PendingSync {
                        on_sync,
                        entity_id: entry.entity_id,
                        start,
                        len: field.size,
                    });
                }
            }

            entity.field_mut(field).copy_from_slice(new_bytes);

            if field.is_interpolated() && entity.flags.is_server_controlled() {
                predict.track_scratch(entry.entity_id, class.interpolated_size());
                if let Some(initial) = predict.initial_mut(entry.entity_id) {
                    initial[field.interp_offset..field.interp_offset + field.size]
                        .copy_from_slice(new_bytes);
                }
            }
            if entity.flags.is_local_controlled() {
                // The new authoritative image for the next rollback.
                let image = predict.track_predicted(entry.entity_id, class.fixed_size());
                image[field.fixed_offset..field.fixed_offset + field.size]
                    .copy_from_slice(new_bytes);
            }

            cursor += field.size;
        }
        Ok(())
    }

    /// Fires queued change callbacks with their pre-change bytes.
    fn flush_pending(&mut self) {
        for pending in self.pending.drain(..) {
            let prev = &self.prev_bytes[pending.start..pending.start + pending.len];
            (pending.on_sync)(pending.entity_id, prev);
        }
        self.prev_bytes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{FULL_SYNC_FLAG, FULL_SYNC_PREFIX};
    use schema::interp::lerp_f32;
    use schema::{ClassDef, ClassId, ClassRegistry, FieldSpec};
    use std::cell::RefCell;
    use wire::ByteWriter;

    thread_local! {
        static SYNC_CALLS: RefCell<Vec<(u16, Vec<u8>)>> = const { RefCell::new(Vec::new()) };
    }

    fn record_sync(entity_id: u16, prev: &[u8]) {
        SYNC_CALLS.with(|calls| calls.borrow_mut().push((entity_id, prev.to_vec())));
    }

    fn take_sync_calls() -> Vec<(u16, Vec<u8>)> {
        SYNC_CALLS.with(|calls| calls.borrow_mut().drain(..).collect())
    }

    fn read_counter_blob(region: &mut [u8], blob: &[u8]) {
        let len = blob.len().min(region.len());
        region[..len].copy_from_slice(&blob[..len]);
    }

    // class 2: u32 health (on_sync) | f32 x (interpolated) | syncable
    // counter region of 4 bytes holding one u32 sync-var.
    fn registry() -> ClassRegistry {
        let class = ClassDef::builder(ClassId::new(2))
            .field(FieldSpec::value(4).with_on_sync(record_sync))
            .field(FieldSpec::interpolated(4, lerp_f32))
            .syncable(4, read_counter_blob, vec![FieldSpec::value(4)])
            .build()
            .unwrap();
        ClassRegistry::new(vec![class]).unwrap()
    }

    fn full_sync_payload(entity_id: u16, version: u8, owner: u8, health: u32, x: f32, counter: u32) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_u16(1); // record count
        let body_len = FULL_SYNC_PREFIX + 12 + 2 + 4; // fields + blob framing
        writer.write_u16(body_len as u16 | FULL_SYNC_FLAG);
        writer.write_u16(entity_id);
        writer.write_u8(version);
        writer.write_u16(2);
        writer.write_u8(owner);
        writer.write_u32(health);
        writer.write_bytes(&x.to_le_bytes());
        writer.write_u32(counter); // syncable var flat bytes
        writer.write_u16(4); // blob len
        writer.write_u32(counter + 1); // blob payload applied by read_full
        writer.finish()
    }

    fn diff_payload(entity_id: u16, bits: u8, fields: &[u8]) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_u16(1);
        writer.write_u16((1 + fields.len()) as u16);
        writer.write_u16(entity_id);
        writer.write_u8(bits);
        writer.write_bytes(fields);
        writer.finish()
    }

    fn apply(
        payload: Vec<u8>,
        registry: &ClassRegistry,
        entities: &mut EntityTable,
        predict: &mut PredictionEngine,
        player_id: u8,
    ) {
        let mut state = ServerState::new();
        state.set_payload(&payload);
        state.preload(registry, entities, 64).unwrap();
        StateReader::new().apply_state(&state, registry, entities, predict, player_id);
    }

    #[test]
    fn full_sync_creates_entity_with_fields() {
        let registry = registry();
        let mut entities = EntityTable::new(64);
        let mut predict = PredictionEngine::new(64);

        apply(
            full_sync_payload(1, 0, SERVER_OWNER, 42, 2.5, 7),
            &registry,
            &mut entities,
            &mut predict,
            3,
        );

        let entity = entities.get(1).unwrap();
        assert_eq!(entity.version, 0);
        assert!(entity.flags.is_server_controlled());
        assert_eq!(&entity.data()[0..4], &42u32.to_le_bytes());
        assert_eq!(&entity.data()[4..8], &2.5f32.to_le_bytes());
        // Syncable blob reader overwrote the flat bytes.
        assert_eq!(&entity.data()[8..12], &8u32.to_le_bytes());
        // Interpolated field mirrored into scratch.
        assert_eq!(predict.initial(1).unwrap(), &2.5f32.to_le_bytes());
    }

    #[test]
    fn full_sync_owner_match_marks_local_controlled() {
        let registry = registry();
        let mut entities = EntityTable::new(64);
        let mut predict = PredictionEngine::new(64);

        apply(
            full_sync_payload(1, 0, 3, 42, 1.0, 0),
            &registry,
            &mut entities,
            &mut predict,
            3,
        );

        let entity = entities.get(1).unwrap();
        assert!(entity.flags.is_local_controlled());
        assert!(entity.flags.is_predicted());
        // Authoritative image captured for rollback.
        let image = predict.predicted(1).unwrap();
        assert_eq!(&image[0..4], &42u32.to_le_bytes());
    }

    #[test]
    fn full_sync_version_mismatch_replaces_entity() {
        let registry = registry();
        let mut entities = EntityTable::new(64);
        let mut predict = PredictionEngine::new(64);

        apply(
            full_sync_payload(1, 0, SERVER_OWNER, 1, 0.0, 0),
            &registry,
            &mut entities,
            &mut predict,
            3,
        );
        entities.get_mut(1).unwrap().data_mut()[0] = 0xEE;

        apply(
            full_sync_payload(1, 1, SERVER_OWNER, 9, 0.0, 0),
            &registry,
            &mut entities,
            &mut predict,
            3,
        );

        let entity = entities.get(1).unwrap();
        assert_eq!(entity.version, 1);
        assert_eq!(&entity.data()[0..4], &9u32.to_le_bytes());
    }

    #[test]
    fn full_sync_is_idempotent() {
        let registry = registry();
        let mut entities = EntityTable::new(64);
        let mut predict = PredictionEngine::new(64);

        for _ in 0..2 {
            apply(
                full_sync_payload(1, 0, SERVER_OWNER, 42, 2.5, 7),
                &registry,
                &mut entities,
                &mut predict,
                3,
            );
        }
        let entity = entities.get(1).unwrap();
        assert_eq!(&entity.data()[0..4], &42u32.to_le_bytes());
        assert_eq!(&entity.data()[4..8], &2.5f32.to_le_bytes());
    }

    #[test]
    fn diff_copies_only_present_fields() {
        let registry = registry();
        let mut entities = EntityTable::new(64);
        let mut predict = PredictionEngine::new(64);

        apply(
            full_sync_payload(1, 0, SERVER_OWNER, 42, 1.0, 0),
            &registry,
            &mut entities,
            &mut predict,
            3,
        );
        take_sync_calls();

        // Only field 1 (x) present.
        apply(
            diff_payload(1, 0b10, &5.0f32.to_le_bytes()),
            &registry,
            &mut entities,
            &mut predict,
            3,
        );

        let entity = entities.get(1).unwrap();
        assert_eq!(&entity.data()[0..4], &42u32.to_le_bytes());
        assert_eq!(&entity.data()[4..8], &5.0f32.to_le_bytes());
        assert_eq!(predict.initial(1).unwrap(), &5.0f32.to_le_bytes());
        assert!(take_sync_calls().is_empty());
    }

    #[test]
    fn diff_fires_on_sync_with_pre_change_bytes() {
        let registry = registry();
        let mut entities = EntityTable::new(64);
        let mut predict = PredictionEngine::new(64);

        apply(
            full_sync_payload(1, 0, SERVER_OWNER, 42, 0.0, 0),
            &registry,
            &mut entities,
            &mut predict,
            3,
        );
        take_sync_calls();

        apply(
            diff_payload(1, 0b01, &99u32.to_le_bytes()),
            &registry,
            &mut entities,
            &mut predict,
            3,
        );

        let calls = take_sync_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 1);
        assert_eq!(calls[0].1, 42u32.to_le_bytes());
        assert_eq!(&entities.get(1).unwrap().data()[0..4], &99u32.to_le_bytes());
    }

    #[test]
    fn diff_with_unchanged_bytes_skips_on_sync() {
        let registry = registry();
        let mut entities = EntityTable::new(64);
        let mut predict = PredictionEngine::new(64);

        apply(
            full_sync_payload(1, 0, SERVER_OWNER, 42, 0.0, 0),
            &registry,
            &mut entities,
            &mut predict,
            3,
        );
        take_sync_calls();

        apply(
            diff_payload(1, 0b01, &42u32.to_le_bytes()),
            &registry,
            &mut entities,
            &mut predict,
            3,
        );
        assert!(take_sync_calls().is_empty());
    }

    #[test]
    fn diff_updates_predicted_image_for_local_controlled() {
        let registry = registry();
        let mut entities = EntityTable::new(64);
        let mut predict = PredictionEngine::new(64);

        apply(
            full_sync_payload(1, 0, 3, 10, 0.0, 0),
            &registry,
            &mut entities,
            &mut predict,
            3,
        );

        apply(
            diff_payload(1, 0b01, &77u32.to_le_bytes()),
            &registry,
            &mut entities,
            &mut predict,
            3,
        );

        let image = predict.predicted(1).unwrap();
        assert_eq!(&image[0..4], &77u32.to_le_bytes());
    }

    #[test]
    fn unknown_class_aborts_record() {
        let registry = registry();
        let mut entities = EntityTable::new(64);
        let mut predict = PredictionEngine::new(64);

        let mut writer = ByteWriter::new();
        writer.write_u16(1);
        writer.write_u16((FULL_SYNC_PREFIX as u16) | FULL_SYNC_FLAG);
        writer.write_u16(1);
        writer.write_u8(0);
        writer.write_u16(99); // unknown class
        writer.write_u8(SERVER_OWNER);

        apply(writer.finish(), &registry, &mut entities, &mut predict, 3);
        assert!(entities.get(1).is_none());
    }
}
