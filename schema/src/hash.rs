//! Deterministic registry hashing.

use blake3::Hasher;

use crate::field::{FieldDef, FieldKind};
use crate::ClassRegistry;

/// Computes a deterministic hash of a class registry's layout.
///
/// Covers everything that affects the wire format: class ids, field
/// layout (offsets, sizes, kinds, flags, interpolation), syncable
/// regions, and RPC ids. Callback identities are deliberately excluded;
/// two builds with the same layout but different function addresses
/// hash equal.
#[must_use]
pub fn registry_hash(registry: &ClassRegistry) -> u64 {
    let mut hasher = Hasher::new();
    write_u32(&mut hasher, registry.len() as u32);

    for class in registry.iter() {
        write_u16(&mut hasher, class.id.get());
        write_u32(&mut hasher, class.fields().len() as u32);
        for field in class.fields() {
            write_field(&mut hasher, field);
        }

        write_u32(&mut hasher, class.syncables().len() as u32);
        for syncable in class.syncables() {
            write_u32(&mut hasher, syncable.offset as u32);
            write_u32(&mut hasher, syncable.size as u32);
        }
    }

    let hash = hasher.finalize();
    let bytes = hash.as_bytes();
    u64::from_le_bytes(bytes[0..8].try_into().unwrap())
}

fn write_field(hasher: &mut Hasher, field: &FieldDef) {
    write_u32(hasher, field.offset as u32);
    write_u32(hasher, field.fixed_offset as u32);
    write_u32(hasher, field.size as u32);
    write_u8(hasher, kind_tag(field.kind));
    write_u8(hasher, field.flags.raw());
    write_u8(hasher, u8::from(field.is_interpolated()));
}

fn kind_tag(kind: FieldKind) -> u8 {
    match kind {
        FieldKind::Value => 0,
        FieldKind::EntityRef => 1,
        FieldKind::SyncableSyncVar => 2,
    }
}

fn write_u8(hasher: &mut Hasher, value: u8) {
    hasher.update(&[value]);
}

fn write_u16(hasher: &mut Hasher, value: u16) {
    hasher.update(&value.to_le_bytes());
}

fn write_u32(hasher: &mut Hasher, value: u32) {
    hasher.update(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::lerp_f32;
    use crate::{ClassDef, ClassId, FieldSpec};

    fn registry_with_sizes(sizes: &[usize]) -> ClassRegistry {
        let mut builder = ClassDef::builder(ClassId::new(1));
        for size in sizes {
            builder = builder.field(FieldSpec::value(*size));
        }
        ClassRegistry::new(vec![builder.build().unwrap()]).unwrap()
    }

    #[test]
    fn hash_is_stable() {
        let registry = registry_with_sizes(&[4, 2]);
        assert_eq!(registry_hash(&registry), registry_hash(&registry));
    }

    #[test]
    fn hash_changes_with_field_size() {
        let a = registry_with_sizes(&[4, 2]);
        let b = registry_with_sizes(&[4, 3]);
        assert_ne!(registry_hash(&a), registry_hash(&b));
    }

    #[test]
    fn hash_changes_with_field_order() {
        let a = registry_with_sizes(&[4, 2]);
        let b = registry_with_sizes(&[2, 4]);
        assert_ne!(registry_hash(&a), registry_hash(&b));
    }

    #[test]
    fn hash_changes_with_interpolation() {
        let plain = registry_with_sizes(&[4]);
        let interpolated = ClassRegistry::new(vec![ClassDef::builder(ClassId::new(1))
            .field(FieldSpec::interpolated(4, lerp_f32))
            .build()
            .unwrap()])
        .unwrap();
        assert_ne!(registry_hash(&plain), registry_hash(&interpolated));
    }

    #[test]
    fn hash_ignores_callbacks_with_same_layout() {
        fn read_a(region: &mut [u8], blob: &[u8]) {
            let len = blob.len().min(region.len());
            region[..len].copy_from_slice(&blob[..len]);
        }
        fn read_b(_region: &mut [u8], _blob: &[u8]) {}

        let a = ClassRegistry::new(vec![ClassDef::builder(ClassId::new(1))
            .syncable(4, read_a, Vec::new())
            .build()
            .unwrap()])
        .unwrap();
        let b = ClassRegistry::new(vec![ClassDef::builder(ClassId::new(1))
            .syncable(4, read_b, Vec::new())
            .build()
            .unwrap()])
        .unwrap();
        assert_eq!(registry_hash(&a), registry_hash(&b));
    }

    #[test]
    fn empty_registry_hashes() {
        let registry = ClassRegistry::new(Vec::new()).unwrap();
        assert_ne!(registry_hash(&registry), 0);
    }
}
