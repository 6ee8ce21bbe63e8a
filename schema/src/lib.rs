//! Entity class metadata for the ticksync engine.
//!
//! This crate defines how entity state is laid out for synchronization:
//! - Field descriptors: position in the live entity image, position in the
//!   flat on-wire layout, size, kind tag, and role flags
//! - Syncable aggregates: structured sub-objects with their own full-sync
//!   blob readers and RPC endpoints
//! - Per-class derived layout totals and behavior hooks
//! - A validated, sorted class registry with deterministic hashing
//!
//! # Design Principles
//!
//! - **Untyped byte images** - field state is raw bytes addressed by
//!   descriptor offsets; dispatch is by kind tag, never by type metadata.
//! - **Pure callbacks** - interpolators and sync hooks are plain `fn`
//!   pointers over byte slices; they own no state.
//! - **Registration-time validation** - a registry that constructs is a
//!   registry the engine can trust; the hot path does no layout checks.

mod class;
mod error;
mod field;
mod hash;
pub mod interp;

pub use class::{ClassBuilder, ClassDef, ClassRegistry, RpcDef, SyncableDef};
pub use error::{SchemaError, SchemaResult};
pub use field::{
    FieldDef, FieldFlags, FieldKind, FieldSpec, InterpolateFn, OnSyncFn, RpcFn, SyncableReadFn,
    UpdateFn, ENTITY_REF_SIZE,
};
pub use hash::registry_hash;

/// An entity class identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u16);

impl ClassId {
    /// Creates a new class ID.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Returns the underlying numeric value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}
