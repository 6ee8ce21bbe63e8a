//! Error types for schema validation.

use std::fmt;

use crate::ClassId;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while building classes or the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaError {
    /// Two classes share an id.
    DuplicateClassId { id: ClassId },

    /// A field was declared with zero size.
    ZeroSizeField { class: ClassId },

    /// A syncable aggregate was declared with zero size.
    ZeroSizeSyncable { class: ClassId },

    /// A syncable's vars do not fit in its region.
    SyncableVarsOverflow {
        class: ClassId,
        region_size: usize,
        vars_size: usize,
    },

    /// An interpolator was attached to a non-value field.
    InterpolatorOnNonValue { class: ClassId },

    /// Two RPC endpoints share an id within one scope.
    DuplicateRpcId { class: ClassId, rpc: u8 },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateClassId { id } => {
                write!(f, "duplicate class id {}", id.get())
            }
            Self::ZeroSizeField { class } => {
                write!(f, "zero-size field in class {}", class.get())
            }
            Self::ZeroSizeSyncable { class } => {
                write!(f, "zero-size syncable in class {}", class.get())
            }
            Self::SyncableVarsOverflow {
                class,
                region_size,
                vars_size,
            } => {
                write!(
                    f,
                    "syncable vars overflow in class {}: {vars_size} bytes in a {region_size}-byte region",
                    class.get()
                )
            }
            Self::InterpolatorOnNonValue { class } => {
                write!(f, "interpolator on non-value field in class {}", class.get())
            }
            Self::DuplicateRpcId { class, rpc } => {
                write!(f, "duplicate rpc id {rpc} in class {}", class.get())
            }
        }
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_duplicate_class() {
        let err = SchemaError::DuplicateClassId {
            id: ClassId::new(42),
        };
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn display_vars_overflow() {
        let err = SchemaError::SyncableVarsOverflow {
            class: ClassId::new(1),
            region_size: 4,
            vars_size: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains('4'));
        assert!(msg.contains('8'));
    }

    #[test]
    fn display_duplicate_rpc() {
        let err = SchemaError::DuplicateRpcId {
            class: ClassId::new(1),
            rpc: 9,
        };
        assert!(err.to_string().contains('9'));
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<SchemaError>();
    }
}
