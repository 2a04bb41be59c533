//! The `Model` trait implemented by mapped record types.
//!
//! Implementations are normally generated by `#[derive(Model)]`, which emits
//! the field table and one typed getter/setter arm per field at compile time.

use crate::error::TypeMismatch;
use crate::field::FieldInfo;
use crate::value::Value;

/// A record type mapped to a database table.
///
/// Field indices are positions in [`Model::fields`] and are stable for the
/// life of the program.
pub trait Model: Default + Send + Sync + 'static {
    /// Unquoted table name.
    const TABLE_NAME: &'static str;

    /// Whether UPDATE uses baseline diffing instead of whole-record
    /// overwrite, and INSERT skips zero-valued fields on the partial path.
    const PARTIAL_UPDATE: bool = false;

    /// Field descriptors in declaration order.
    fn fields() -> &'static [FieldInfo];

    /// Current value of field `idx` as a bind value.
    ///
    /// Returns NULL for an index outside [`Model::fields`].
    fn get_field(&self, idx: usize) -> Value;

    /// Coerce `value` into field `idx`.
    ///
    /// Indices outside [`Model::fields`] are ignored.
    fn set_field(&mut self, idx: usize, value: &Value) -> Result<(), TypeMismatch>;

    /// Positions of the primary-key fields.
    fn primary_key_indices() -> Vec<usize> {
        Self::fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(i, _)| i)
            .collect()
    }

    /// Primary-key values of this record, in field order.
    fn primary_key_values(&self) -> Vec<Value> {
        Self::fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(i, _)| self.get_field(i))
            .collect()
    }
}
