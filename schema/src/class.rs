//! Class definitions, layout assignment, and the registry.

use crate::error::{SchemaError, SchemaResult};
use crate::field::{FieldDef, FieldKind, FieldSpec, RpcFn, SyncableReadFn, UpdateFn};
use crate::ClassId;

/// A remote-call endpoint: an id the server addresses plus its handler.
#[derive(Debug, Clone, Copy)]
pub struct RpcDef {
    pub id: u8,
    pub handler: RpcFn,
}

/// A syncable aggregate: a structured sub-object owning a contiguous
/// region of the entity image, with its own full-sync blob reader and
/// RPC endpoints.
#[derive(Debug, Clone)]
pub struct SyncableDef {
    /// Region base offset in the entity image.
    pub offset: usize,
    /// Region size in bytes.
    pub size: usize,
    pub read_full: SyncableReadFn,
    rpcs: Vec<RpcDef>,
}

impl SyncableDef {
    /// Resolves an RPC endpoint by id.
    #[must_use]
    pub fn rpc(&self, id: u8) -> Option<&RpcDef> {
        self.rpcs.iter().find(|rpc| rpc.id == id)
    }
}

/// Immutable metadata for one entity class.
///
/// Holds the declared fields with their assigned layout, the syncable
/// aggregates, behavior hooks, and the derived layout totals the engine
/// reads on every snapshot.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub id: ClassId,
    fields: Vec<FieldDef>,
    syncables: Vec<SyncableDef>,
    rpcs: Vec<RpcDef>,
    update: Option<UpdateFn>,
    visual_update: Option<UpdateFn>,
    update_on_client: bool,
    interpolated_count: usize,
    interpolated_size: usize,
    fixed_size: usize,
    flags_size: usize,
    fields_size: usize,
}

impl ClassDef {
    /// Creates a class builder.
    #[must_use]
    pub fn builder(id: ClassId) -> ClassBuilder {
        ClassBuilder {
            id,
            fields: Vec::new(),
            syncables: Vec::new(),
            rpcs: Vec::new(),
            update: None,
            visual_update: None,
            update_on_client: false,
        }
    }

    /// All fields in flat wire order: plain fields first, then each
    /// syncable's vars, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Syncable aggregates in declaration order.
    #[must_use]
    pub fn syncables(&self) -> &[SyncableDef] {
        &self.syncables
    }

    /// Resolves an entity-level RPC endpoint by id.
    #[must_use]
    pub fn rpc(&self, id: u8) -> Option<&RpcDef> {
        self.rpcs.iter().find(|rpc| rpc.id == id)
    }

    /// Per-tick simulation hook, if any.
    #[must_use]
    pub fn update(&self) -> Option<UpdateFn> {
        self.update
    }

    /// Per-frame presentation hook, if any.
    #[must_use]
    pub fn visual_update(&self) -> Option<UpdateFn> {
        self.visual_update
    }

    /// Returns `true` if the class has a simulation hook.
    #[must_use]
    pub fn is_updateable(&self) -> bool {
        self.update.is_some()
    }

    /// Whether remote instances also run the simulation hook.
    #[must_use]
    pub fn update_on_client(&self) -> bool {
        self.update_on_client
    }

    /// Number of interpolated fields.
    #[must_use]
    pub fn interpolated_count(&self) -> usize {
        self.interpolated_count
    }

    /// Total size of the interpolation scratch image.
    #[must_use]
    pub fn interpolated_size(&self) -> usize {
        self.interpolated_size
    }

    /// Total size of the flat on-wire field layout.
    #[must_use]
    pub fn fixed_size(&self) -> usize {
        self.fixed_size
    }

    /// Size of the diff-record presence bitfield.
    #[must_use]
    pub fn flags_size(&self) -> usize {
        self.flags_size
    }

    /// Size of the live entity image.
    #[must_use]
    pub fn fields_size(&self) -> usize {
        self.fields_size
    }
}

/// Builder for [`ClassDef`].
///
/// Layout assignment happens in [`ClassBuilder::build`]: plain fields
/// claim image offsets in declaration order, then each syncable claims a
/// region and its vars claim offsets inside it.
#[derive(Debug)]
pub struct ClassBuilder {
    id: ClassId,
    fields: Vec<FieldSpec>,
    syncables: Vec<(usize, SyncableReadFn, Vec<FieldSpec>, Vec<RpcDef>)>,
    rpcs: Vec<RpcDef>,
    update: Option<UpdateFn>,
    visual_update: Option<UpdateFn>,
    update_on_client: bool,
}

impl ClassBuilder {
    /// Declares a plain field.
    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Declares a syncable aggregate of `size` bytes with its sync-vars.
    #[must_use]
    pub fn syncable(mut self, size: usize, read_full: SyncableReadFn, vars: Vec<FieldSpec>) -> Self {
        self.syncables.push((size, read_full, vars, Vec::new()));
        self
    }

    /// Declares a syncable aggregate with RPC endpoints.
    #[must_use]
    pub fn syncable_with_rpcs(
        mut self,
        size: usize,
        read_full: SyncableReadFn,
        vars: Vec<FieldSpec>,
        rpcs: Vec<RpcDef>,
    ) -> Self {
        self.syncables.push((size, read_full, vars, rpcs));
        self
    }

    /// Declares an entity-level RPC endpoint.
    #[must_use]
    pub fn rpc(mut self, id: u8, handler: RpcFn) -> Self {
        self.rpcs.push(RpcDef { id, handler });
        self
    }

    /// Sets the per-tick simulation hook.
    #[must_use]
    pub fn update(mut self, update: UpdateFn) -> Self {
        self.update = Some(update);
        self
    }

    /// Sets the per-frame presentation hook.
    #[must_use]
    pub fn visual_update(mut self, visual_update: UpdateFn) -> Self {
        self.visual_update = Some(visual_update);
        self
    }

    /// Makes remote instances run the simulation hook too.
    #[must_use]
    pub fn update_on_client(mut self) -> Self {
        self.update_on_client = true;
        self
    }

    /// Assigns the layout and validates the class.
    pub fn build(self) -> SchemaResult<ClassDef> {
        let class_id = self.id;
        let mut fields = Vec::new();
        let mut image_pos = 0usize;

        for spec in &self.fields {
            validate_spec(class_id, spec)?;
            fields.push(place(spec, image_pos));
            image_pos += spec.size;
        }

        let mut syncables = Vec::new();
        for (size, read_full, vars, rpcs) in &self.syncables {
            if *size == 0 {
                return Err(SchemaError::ZeroSizeSyncable { class: class_id });
            }
            validate_rpc_ids(class_id, rpcs)?;

            let region_base = image_pos;
            let mut var_pos = 0usize;
            for spec in vars {
                validate_spec(class_id, spec)?;
                if var_pos + spec.size > *size {
                    return Err(SchemaError::SyncableVarsOverflow {
                        class: class_id,
                        region_size: *size,
                        vars_size: var_pos + spec.size,
                    });
                }
                let mut spec = *spec;
                spec.kind = FieldKind::SyncableSyncVar;
                fields.push(place(&spec, region_base + var_pos));
                var_pos += spec.size;
            }

            syncables.push(SyncableDef {
                offset: region_base,
                size: *size,
                read_full: *read_full,
                rpcs: rpcs.clone(),
            });
            image_pos += size;
        }

        validate_rpc_ids(class_id, &self.rpcs)?;

        // Flat wire layout and interpolation scratch offsets follow the
        // final field order.
        let mut fixed_pos = 0usize;
        let mut interp_pos = 0usize;
        let mut interpolated_count = 0usize;
        for field in &mut fields {
            field.fixed_offset = fixed_pos;
            fixed_pos += field.size;
            if field.is_interpolated() {
                field.interp_offset = interp_pos;
                interp_pos += field.size;
                interpolated_count += 1;
            }
        }

        Ok(ClassDef {
            id: class_id,
            flags_size: fields.len().div_ceil(8),
            fields,
            syncables,
            rpcs: self.rpcs,
            update: self.update,
            visual_update: self.visual_update,
            update_on_client: self.update_on_client,
            interpolated_count,
            interpolated_size: interp_pos,
            fixed_size: fixed_pos,
            fields_size: image_pos,
        })
    }
}

fn place(spec: &FieldSpec, offset: usize) -> FieldDef {
    FieldDef {
        offset,
        fixed_offset: 0,
        interp_offset: 0,
        size: spec.size,
        kind: spec.kind,
        flags: spec.flags,
        interpolator: spec.interpolator,
        on_sync: spec.on_sync,
    }
}

fn validate_spec(class: ClassId, spec: &FieldSpec) -> SchemaResult<()> {
    if spec.size == 0 {
        return Err(SchemaError::ZeroSizeField { class });
    }
    if spec.interpolator.is_some() && !matches!(spec.kind, FieldKind::Value) {
        return Err(SchemaError::InterpolatorOnNonValue { class });
    }
    Ok(())
}

fn validate_rpc_ids(class: ClassId, rpcs: &[RpcDef]) -> SchemaResult<()> {
    for (i, rpc) in rpcs.iter().enumerate() {
        if rpcs[..i].iter().any(|other| other.id == rpc.id) {
            return Err(SchemaError::DuplicateRpcId {
                class,
                rpc: rpc.id,
            });
        }
    }
    Ok(())
}

/// A validated set of classes, sorted by id for lookup.
#[derive(Debug, Clone)]
pub struct ClassRegistry {
    classes: Vec<ClassDef>,
}

impl ClassRegistry {
    /// Creates a registry from class definitions after validation.
    pub fn new(mut classes: Vec<ClassDef>) -> SchemaResult<Self> {
        classes.sort_by_key(|class| class.id);
        for pair in classes.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(SchemaError::DuplicateClassId { id: pair[0].id });
            }
        }
        Ok(Self { classes })
    }

    /// Looks up a class by id.
    #[must_use]
    pub fn get(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes
            .binary_search_by_key(&id, |class| class.id)
            .ok()
            .map(|index| &self.classes[index])
    }

    /// Returns the number of registered classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if no classes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Iterates classes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.iter()
    }
}
