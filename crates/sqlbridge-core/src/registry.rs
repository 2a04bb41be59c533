//! Model metadata registry.
//!
//! Registration happens once during start-up through [`RegistryBuilder`].
//! [`RegistryBuilder::build`] freezes the set into an immutable [`Registry`]
//! that is shared behind an `Arc` and read without locking afterwards.

use std::any::{TypeId, type_name};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::field::FieldInfo;
use crate::identifiers::validate_portable_identifier;
use crate::model::Model;

/// Validated mapping metadata of one model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMetadata {
    type_id: TypeId,
    type_name: &'static str,
    table_name: &'static str,
    fields: &'static [FieldInfo],
    primary_key: Vec<usize>,
    partial_update: bool,
}

impl ModelMetadata {
    /// Build and validate metadata for `M`.
    ///
    /// The table name and every column name are checked against the
    /// identifier grammar here, before any of them can reach SQL.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidIdentifier`] for a malformed table or column name,
    /// [`Error::DuplicateColumn`] when two fields share a column.
    pub fn of<M: Model>() -> Result<Self> {
        validate_portable_identifier(M::TABLE_NAME)?;

        let fields = M::fields();
        let mut seen = HashSet::with_capacity(fields.len());
        for field in fields {
            validate_portable_identifier(field.column_name)?;
            if field.column_name.contains('.') {
                return Err(Error::InvalidIdentifier(field.column_name.to_string()));
            }
            if !seen.insert(field.column_name) {
                return Err(Error::DuplicateColumn {
                    table: M::TABLE_NAME,
                    column: field.column_name,
                });
            }
        }

        Ok(Self {
            type_id: TypeId::of::<M>(),
            type_name: type_name::<M>(),
            table_name: M::TABLE_NAME,
            fields,
            primary_key: M::primary_key_indices(),
            partial_update: M::PARTIAL_UPDATE,
        })
    }

    /// Rust type name of the model.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether this metadata describes `M`.
    pub fn describes<M: Model>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }

    /// Unquoted table name.
    pub fn table_name(&self) -> &'static str {
        self.table_name
    }

    /// Field descriptors in declaration order.
    pub fn fields(&self) -> &'static [FieldInfo] {
        self.fields
    }

    /// Descriptor at `idx`.
    pub fn field(&self, idx: usize) -> Option<&'static FieldInfo> {
        self.fields.get(idx)
    }

    /// Position and descriptor of the field mapped to `column`.
    pub fn field_by_column(&self, column: &str) -> Option<(usize, &'static FieldInfo)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.column_name == column)
    }

    /// Positions of the primary-key fields (possibly empty).
    pub fn primary_key(&self) -> &[usize] {
        &self.primary_key
    }

    /// Positions of the primary-key fields, required to be non-empty.
    pub fn require_primary_key(&self) -> Result<&[usize]> {
        if self.primary_key.is_empty() {
            Err(Error::MissingPrimaryKey {
                table: self.table_name,
            })
        } else {
            Ok(&self.primary_key)
        }
    }

    /// The primary key when it is a single auto-increment column.
    pub fn single_auto_key(&self) -> Option<(usize, &'static FieldInfo)> {
        match self.primary_key.as_slice() {
            [idx] => self
                .fields
                .get(*idx)
                .filter(|f| f.auto_increment)
                .map(|f| (*idx, f)),
            _ => None,
        }
    }

    /// Whether the model opted into baseline-diff updates.
    pub fn partial_update(&self) -> bool {
        self.partial_update
    }
}

/// Collects model registrations during start-up.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    models: HashMap<TypeId, Arc<ModelMetadata>>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `M`. Registering the same type twice replaces the entry.
    pub fn register<M: Model>(mut self) -> Result<Self> {
        let meta = ModelMetadata::of::<M>()?;
        tracing::debug!(
            model = meta.type_name(),
            table = meta.table_name(),
            fields = meta.fields().len(),
            "Registered model"
        );
        self.models.insert(TypeId::of::<M>(), Arc::new(meta));
        Ok(self)
    }

    /// Freeze the registrations.
    pub fn build(self) -> Arc<Registry> {
        Arc::new(Registry {
            models: self.models,
        })
    }
}

/// Immutable set of registered models, looked up by type.
#[derive(Debug, Default)]
pub struct Registry {
    models: HashMap<TypeId, Arc<ModelMetadata>>,
}

impl Registry {
    /// Start a registration phase.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Metadata of `M`.
    ///
    /// # Errors
    ///
    /// [`Error::UnregisteredModel`] if `M` was never registered.
    pub fn get<M: Model>(&self) -> Result<&Arc<ModelMetadata>> {
        self.models
            .get(&TypeId::of::<M>())
            .ok_or(Error::UnregisteredModel(type_name::<M>()))
    }

    /// Whether `M` is registered.
    pub fn contains<M: Model>(&self) -> bool {
        self.models.contains_key(&TypeId::of::<M>())
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// True if nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::{FromValue, Kind, ToValue};
    use crate::error::TypeMismatch;
    use crate::value::Value;

    #[derive(Debug, Default)]
    struct Account {
        id: i64,
        email: String,
    }

    impl Model for Account {
        const TABLE_NAME: &'static str = "accounts";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: [FieldInfo; 2] = [
                FieldInfo::new("id", "id", Kind::Int64)
                    .primary_key(true)
                    .auto_increment(true),
                FieldInfo::new("email", "email", Kind::Text),
            ];
            &FIELDS
        }

        fn get_field(&self, idx: usize) -> Value {
            match idx {
                0 => self.id.to_value(),
                1 => self.email.to_value(),
                _ => Value::Null,
            }
        }

        fn set_field(&mut self, idx: usize, value: &Value) -> std::result::Result<(), TypeMismatch> {
            match idx {
                0 => self.id = FromValue::from_value(value)?,
                1 => self.email = FromValue::from_value(value)?,
                _ => {}
            }
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct BadTable;

    impl Model for BadTable {
        const TABLE_NAME: &'static str = "users; drop";

        fn fields() -> &'static [FieldInfo] {
            &[]
        }

        fn get_field(&self, _idx: usize) -> Value {
            Value::Null
        }

        fn set_field(&mut self, _idx: usize, _value: &Value) -> std::result::Result<(), TypeMismatch> {
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct DupColumns;

    impl Model for DupColumns {
        const TABLE_NAME: &'static str = "dups";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: [FieldInfo; 2] = [
                FieldInfo::new("a", "value", Kind::Text),
                FieldInfo::new("b", "value", Kind::Text),
            ];
            &FIELDS
        }

        fn get_field(&self, _idx: usize) -> Value {
            Value::Null
        }

        fn set_field(&mut self, _idx: usize, _value: &Value) -> std::result::Result<(), TypeMismatch> {
            Ok(())
        }
    }

    #[test]
    fn test_metadata_of_valid_model() {
        let meta = ModelMetadata::of::<Account>().unwrap();
        assert_eq!(meta.table_name(), "accounts");
        assert_eq!(meta.primary_key(), &[0]);
        assert_eq!(meta.single_auto_key().map(|(i, _)| i), Some(0));
        assert_eq!(meta.field_by_column("email").map(|(i, _)| i), Some(1));
        assert!(meta.describes::<Account>());
        assert!(!meta.partial_update());
    }

    #[test]
    fn test_register_rejects_bad_identifiers() {
        let err = RegistryBuilder::new().register::<BadTable>().unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(tok) if tok == "users; drop"));
    }

    #[test]
    fn test_register_rejects_duplicate_columns() {
        let err = RegistryBuilder::new().register::<DupColumns>().unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateColumn {
                table: "dups",
                column: "value"
            }
        ));
    }

    #[test]
    fn test_lookup_by_type() {
        let registry = Registry::builder()
            .register::<Account>()
            .unwrap()
            .build();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains::<Account>());
        assert_eq!(registry.get::<Account>().unwrap().table_name(), "accounts");
        assert!(matches!(
            registry.get::<DupColumns>(),
            Err(Error::UnregisteredModel(_))
        ));
    }

    #[derive(Debug, Default)]
    struct AuditEntry;

    impl Model for AuditEntry {
        const TABLE_NAME: &'static str = "audit.entries";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: [FieldInfo; 1] = [FieldInfo::new("message", "message", Kind::Text)];
            &FIELDS
        }

        fn get_field(&self, _idx: usize) -> Value {
            Value::Null
        }

        fn set_field(&mut self, _idx: usize, _value: &Value) -> std::result::Result<(), TypeMismatch> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_primary_key() {
        let meta = ModelMetadata::of::<AuditEntry>().unwrap();
        assert_eq!(meta.table_name(), "audit.entries");
        assert!(meta.single_auto_key().is_none());
        assert!(matches!(
            meta.require_primary_key(),
            Err(Error::MissingPrimaryKey {
                table: "audit.entries"
            })
        ));
    }
}
