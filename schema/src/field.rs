//! Field descriptors and callback types.

/// Blends two byte images of one field into an output image.
///
/// `from` and `to` are the field's value at the window start and end,
/// `out` is the live field, `t` is the blend factor in `[0, 1]`.
pub type InterpolateFn = fn(from: &[u8], to: &[u8], out: &mut [u8], t: f32);

/// Notification that a synchronized field changed; receives the entity id
/// and the pre-change byte image.
pub type OnSyncFn = fn(entity_id: u16, prev: &[u8]);

/// Advances an entity's live field image by one simulation tick.
pub type UpdateFn = fn(data: &mut [u8]);

/// Applies a syncable aggregate's self-serialized full-sync blob to its
/// region of the entity image.
pub type SyncableReadFn = fn(region: &mut [u8], blob: &[u8]);

/// Handles a remote call targeting an entity or one of its syncable
/// fields. `count` is the element count carried by the call.
pub type RpcFn = fn(entity_id: u16, payload: &[u8], count: u16);

/// On-wire size of an entity reference: id (u16) plus version (u8).
pub const ENTITY_REF_SIZE: usize = 3;

/// How a field's bytes are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain value bytes copied verbatim.
    Value,

    /// An entity reference (id + version), resolved through the entity
    /// table on access; never an owning pointer.
    EntityRef,

    /// A sync-var nested inside a syncable aggregate; its offset points
    /// into the owning syncable's region of the entity image.
    SyncableSyncVar,
}

/// Per-field role flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldFlags(u8);

impl FieldFlags {
    /// The field is only meaningful on remote (non-controlling) clients;
    /// rollback does not restore it.
    pub const ONLY_FOR_REMOTE: u8 = 1 << 0;

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

    /// Creates the remote-only flag set.
    #[must_use]
    pub const fn only_for_remote() -> Self {
        Self(Self::ONLY_FOR_REMOTE)
    }

    /// Returns `true` if the field is remote-only.
    #[must_use]
    pub const fn is_only_for_remote(self) -> bool {
        self.0 & Self::ONLY_FOR_REMOTE != 0
    }
}

/// A field as declared by the user, before layout assignment.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub size: usize,
    pub kind: FieldKind,
    pub flags: FieldFlags,
    pub interpolator: Option<InterpolateFn>,
    pub on_sync: Option<OnSyncFn>,
}

impl FieldSpec {
    /// A plain value field.
    #[must_use]
    pub const fn value(size: usize) -> Self {
        Self {
            size,
            kind: FieldKind::Value,
            flags: FieldFlags::from_raw(0),
            interpolator: None,
            on_sync: None,
        }
    }

    /// A value field blended between snapshots by `interpolator`.
    #[must_use]
    pub const fn interpolated(size: usize, interpolator: InterpolateFn) -> Self {
        Self {
            size,
            kind: FieldKind::Value,
            flags: FieldFlags::from_raw(0),
            interpolator: Some(interpolator),
            on_sync: None,
        }
    }

    /// An entity reference field.
    #[must_use]
    pub const fn entity_ref() -> Self {
        Self {
            size: ENTITY_REF_SIZE,
            kind: FieldKind::EntityRef,
            flags: FieldFlags::from_raw(0),
            interpolator: None,
            on_sync: None,
        }
    }

    /// Sets the change-notification hook.
    #[must_use]
    pub const fn with_on_sync(mut self, on_sync: OnSyncFn) -> Self {
        self.on_sync = Some(on_sync);
        self
    }

    /// Sets the role flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: FieldFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// A field after layout assignment. Produced by [`crate::ClassBuilder`].
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    /// Byte offset of the field in the live entity image.
    pub offset: usize,
    /// Byte offset in the flat on-wire layout (and the predicted image).
    pub fixed_offset: usize,
    /// Byte offset in the interpolation scratch buffers; only meaningful
    /// when `interpolator` is set.
    pub interp_offset: usize,
    /// Field size in bytes.
    pub size: usize,
    pub kind: FieldKind,
    pub flags: FieldFlags,
    pub interpolator: Option<InterpolateFn>,
    pub on_sync: Option<OnSyncFn>,
}

impl FieldDef {
    /// Returns `true` if this field is blended between snapshots.
    #[must_use]
    pub const fn is_interpolated(&self) -> bool {
        self.interpolator.is_some()
    }
}
