//! Field and column definitions.

use crate::coerce::Kind;

/// Database-side timestamp population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoTimestamp {
    /// Regular field.
    #[default]
    None,
    /// Set by the database clock on INSERT ("created at").
    OnCreate,
    /// Set by the database clock on INSERT and every UPDATE ("updated at").
    OnUpdate,
}

impl AutoTimestamp {
    /// Whether the column takes the database clock on INSERT.
    #[must_use]
    pub const fn on_insert(&self) -> bool {
        !matches!(self, AutoTimestamp::None)
    }

    /// Whether the column takes the database clock on UPDATE.
    #[must_use]
    pub const fn on_update(&self) -> bool {
        matches!(self, AutoTimestamp::OnUpdate)
    }
}

/// Metadata about a model field/column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust field name
    pub name: &'static str,
    /// Database column name (may differ from field name)
    pub column_name: &'static str,
    /// Coercion target for values read into this field
    pub kind: Kind,
    /// Whether this is (part of) the primary key
    pub primary_key: bool,
    /// Whether the database generates this key
    pub auto_increment: bool,
    /// Whether a zero value means "not provided" on the partial write paths
    pub partial_update: bool,
    /// Whether the value is replaced by a marker in log events
    pub redact: bool,
    /// Database-clock timestamp behaviour
    pub auto_timestamp: AutoTimestamp,
}

impl FieldInfo {
    /// Create a new field info with minimal required data.
    pub const fn new(name: &'static str, column_name: &'static str, kind: Kind) -> Self {
        Self {
            name,
            column_name,
            kind,
            primary_key: false,
            auto_increment: false,
            partial_update: true,
            redact: false,
            auto_timestamp: AutoTimestamp::None,
        }
    }

    /// Set the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column_name = name;
        self
    }

    /// Set primary key flag.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set auto-increment flag.
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    /// Set the partial-update eligibility flag.
    pub const fn partial_update(mut self, value: bool) -> Self {
        self.partial_update = value;
        self
    }

    /// Set redact flag.
    pub const fn redact(mut self, value: bool) -> Self {
        self.redact = value;
        self
    }

    /// Set database-clock timestamp behaviour.
    pub const fn auto_timestamp(mut self, value: AutoTimestamp) -> Self {
        self.auto_timestamp = value;
        self
    }

    /// Whether a value counts as "not provided" for this field.
    ///
    /// Nullable fields are absent only when NULL, so an explicit zero
    /// survives. Other fields are absent at their zero value.
    pub fn is_absent(&self, value: &crate::Value) -> bool {
        if self.kind.is_nullable() {
            value.is_null()
        } else {
            value.is_zero()
        }
    }
}
