//! Server state snapshots and the preload index.
//!
//! A `ServerState` is one logical server tick: the reassembled payload
//! bytes plus the parsed index the frame loop consumes (per-entity
//! offsets, interpolated-field caches, cached remote calls). Payload
//! buffers grow monotonically and recycle through the state pool.

use schema::ClassRegistry;
use wire::ByteReader;

use crate::error::{ParseError, ParseResult};
use crate::entity::EntityTable;
use crate::tick::Tick;

/// Bit 15 of a record's `size_and_flag` word marks a full-sync record.
pub(crate) const FULL_SYNC_FLAG: u16 = 0x8000;

/// Field id addressing the entity itself in a remote call.
pub const ENTITY_RPC_FIELD_ID: u8 = 0xFF;

/// Byte length of the fixed full-sync body prefix:
/// version (u8) + class id (u16) + owner (u8).
pub(crate) const FULL_SYNC_PREFIX: usize = 4;

/// One entry of the preload index: where an entity's record lives in the
/// payload and which of its interpolated fields it carries.
#[derive(Debug, Clone, Default)]
pub(crate) struct PreloadEntry {
    pub entity_id: u16,
    /// Offset of the record body in `data`.
    pub data_offset: usize,
    /// Body length in bytes.
    pub body_len: usize,
    /// Offset of the presence bitfield for diff records; `None` marks a
    /// full-sync record.
    pub fields_offset: Option<usize>,
    /// Interpolated fields present in this record.
    pub caches: Vec<InterpCache>,
}

/// Source location of one interpolated field's new value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InterpCache {
    /// Index into the class's field list.
    pub field_index: usize,
    /// Offset of the value in `data`.
    pub data_offset: usize,
}

/// A remote call cached from a snapshot, dispatched during logic ticks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RemoteCall {
    pub tick: Tick,
    pub entity_id: u16,
    /// `ENTITY_RPC_FIELD_ID` targets the entity; otherwise the nth
    /// syncable field.
    pub field_id: u8,
    pub rpc_id: u8,
    pub data_offset: usize,
    pub payload_len: usize,
    pub count: u16,
}

/// One logical server tick's worth of state.
#[derive(Debug, Default)]
pub struct ServerState {
    pub tick: Tick,
    pub is_baseline: bool,
    /// Reassembled payload bytes; only `..size` is valid.
    pub(crate) data: Vec<u8>,
    /// Final payload length.
    pub(crate) size: usize,
    /// Most recent local input tick the server has consumed.
    pub processed_tick: Tick,
    /// Most recent local input tick the server has received.
    pub last_received_tick: Tick,
    pub(crate) preload: Vec<PreloadEntry>,
    pub(crate) remote_calls: Vec<RemoteCall>,
    /// Indices into `preload` that carry interpolated fields.
    pub(crate) interpolated_fields: Vec<usize>,
}

impl ServerState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the state for pool reuse. Buffer capacity is retained.
    pub fn reset(&mut self) {
        self.tick = Tick::default();
        self.is_baseline = false;
        self.size = 0;
        self.processed_tick = Tick::default();
        self.last_received_tick = Tick::default();
        self.preload.clear();
        self.remote_calls.clear();
        self.interpolated_fields.clear();
    }

    /// The valid payload bytes.
    #[must_use]
    pub(crate) fn payload(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Appends one fragment's bytes, growing the buffer if needed.
    pub(crate) fn append_fragment(&mut self, bytes: &[u8]) {
        let end = self.size + bytes.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[self.size..end].copy_from_slice(bytes);
        self.size = end;
    }

    /// Replaces the payload wholesale (baseline decompression target).
    pub(crate) fn set_payload(&mut self, bytes: &[u8]) {
        self.size = 0;
        self.append_fragment(bytes);
    }

    /// Parses the preload index against the entities currently known.
    ///
    /// Diff payload layout: `u16 record_count | records | rpc records to
    /// end`. Poisons on an out-of-range entity id; diff records for
    /// unknown entities are skipped (the server full-syncs new entities).
    pub(crate) fn preload(
        &mut self,
        registry: &ClassRegistry,
        entities: &EntityTable,
        max_entities: usize,
    ) -> ParseResult<()> {
        self.preload.clear();
        self.remote_calls.clear();
        self.interpolated_fields.clear();

        let payload = &self.data[..self.size];
        let mut reader = ByteReader::new(payload);
        let record_count = reader.read_u16()?;

        for _ in 0..record_count {
            let size_and_flag = reader.read_u16()?;
            let full_sync = size_and_flag & FULL_SYNC_FLAG != 0;
            let body_len = usize::from(size_and_flag & !FULL_SYNC_FLAG);
            let entity_id = reader.read_u16()?;
            if usize::from(entity_id) >= max_entities {
                return Err(ParseError::EntityIdOutOfRange { entity_id });
            }
            let data_offset = reader.position();
            reader.skip(body_len)?;

            let mut entry = PreloadEntry {
                entity_id,
                data_offset,
                body_len,
                fields_offset: if full_sync { None } else { Some(data_offset) },
                caches: Vec::new(),
            };

            if full_sync {
                cache_full_sync(&mut entry, payload, registry)?;
            } else {
                match entities.get(entity_id) {
                    Some(entity) => {
                        cache_diff(&mut entry, payload, registry, entity.class_id)?;
                    }
                    None => {
                        log::warn!("diff record for unknown entity {entity_id}, skipping");
                        continue;
                    }
                }
            }

            if !entry.caches.is_empty() {
                self.interpolated_fields.push(self.preload.len());
            }
            self.preload.push(entry);
        }

        while !reader.is_empty() {
            let entity_id = reader.read_u16()?;
            let field_id = reader.read_u8()?;
            let rpc_id = reader.read_u8()?;
            let tick = Tick::new(reader.read_u16()?);
            let count = reader.read_u16()?;
            let payload_len = usize::from(reader.read_u16()?);
            let data_offset = reader.position();
            reader.skip(payload_len)?;
            self.remote_calls.push(RemoteCall {
                tick,
                entity_id,
                field_id,
                rpc_id,
                data_offset,
                payload_len,
                count,
            });
        }

        Ok(())
    }
}

fn cache_full_sync(
    entry: &mut PreloadEntry,
    payload: &[u8],
    registry: &ClassRegistry,
) -> ParseResult<()> {
    let mut body = ByteReader::new(&payload[entry.data_offset..entry.data_offset + entry.body_len]);
    let _version = body.read_u8()?;
    let class_id = schema::ClassId::new(body.read_u16()?);
    let Some(class) = registry.get(class_id) else {
        // The apply pass reports this; no caches to build here.
        return Ok(());
    };
    if entry.body_len < FULL_SYNC_PREFIX + class.fixed_size() {
        return Err(ParseError::BadRecordFraming {
            entity_id: entry.entity_id,
        });
    }
    let fields_base = entry.data_offset + FULL_SYNC_PREFIX;
    for (field_index, field) in class.fields().iter().enumerate() {
        if field.is_interpolated() {
            entry.caches.push(InterpCache {
                field_index,
                data_offset: fields_base + field.fixed_offset,
            });
        }
    }
    Ok(())
}

fn cache_diff(
    entry: &mut PreloadEntry,
    payload: &[u8],
    registry: &ClassRegistry,
    class_id: schema::ClassId,
) -> ParseResult<()> {
    let Some(class) = registry.get(class_id) else {
        return Err(ParseError::UnknownClass {
            class_id: class_id.get(),
        });
    };
    if entry.body_len < class.flags_size() {
        return Err(ParseError::BadRecordFraming {
            entity_id: entry.entity_id,
        });
    }

    let flags = &payload[entry.data_offset..entry.data_offset + class.flags_size()];
    let mut cursor = entry.data_offset + class.flags_size();
    let record_end = entry.data_offset + entry.body_len;
    for (field_index, field) in class.fields().iter().enumerate() {
        // Presence bits follow declared field order.
        if !bit_set(flags, field_index) {
            continue;
        }
        if cursor + field.size > record_end {
            return Err(ParseError::BadRecordFraming {
                entity_id: entry.entity_id,
            });
        }
        if field.is_interpolated() {
            entry.caches.push(InterpCache {
                field_index,
                data_offset: cursor,
            });
        }
        cursor += field.size;
    }
    Ok(())
}

/// Reads bit `index` of a presence bitfield.
pub(crate) fn bit_set(flags: &[u8], index: usize) -> bool {
    flags[index / 8] & (1 << (index % 8)) != 0
}
