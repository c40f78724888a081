//! Typed column descriptors for persisted entity fields.

use serde_json::Value;
use std::fmt;

/// Default for a field left unset at construction: nothing, a static value,
/// or a zero-arg generator invoked lazily at first access.
#[derive(Clone)]
pub enum FieldDefault {
    None,
    Value(Value),
    Generator(fn() -> Value),
}

impl FieldDefault {
    /// Resolve to a concrete value, invoking the generator if there is one.
    pub fn resolve(&self) -> Option<Value> {
        match self {
            FieldDefault::None => None,
            FieldDefault::Value(v) => Some(v.clone()),
            FieldDefault::Generator(f) => Some(f()),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::None => write!(f, "None"),
            FieldDefault::Value(v) => write!(f, "Value({})", v),
            FieldDefault::Generator(_) => write!(f, "Generator"),
        }
    }
}

/// Declarative description of one persisted column. Immutable once the
/// owning schema has been derived.
#[derive(Clone, Debug)]
pub struct Field {
    /// Column name override; defaults to the attribute key used at derivation.
    pub name: Option<String>,
    /// DDL-ish storage type tag (e.g. "varchar(100)", "bigint").
    pub column_type: String,
    pub primary_key: bool,
    pub default: FieldDefault,
}

impl Field {
    fn new(column_type: &str, default: FieldDefault) -> Self {
        Field {
            name: None,
            column_type: column_type.into(),
            primary_key: false,
            default,
        }
    }

    pub fn string() -> Self {
        Self::new("varchar(100)", FieldDefault::None)
    }

    pub fn boolean() -> Self {
        Self::new("boolean", FieldDefault::Value(Value::Bool(false)))
    }

    pub fn integer() -> Self {
        Self::new("bigint", FieldDefault::Value(Value::from(0)))
    }

    pub fn float() -> Self {
        Self::new("real", FieldDefault::Value(Value::from(0.0)))
    }

    pub fn text() -> Self {
        Self::new("text", FieldDefault::None)
    }

    /// Override the column name.
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the storage type tag.
    pub fn ddl(mut self, column_type: &str) -> Self {
        self.column_type = column_type.into();
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn default_value(mut self, v: Value) -> Self {
        self.default = FieldDefault::Value(v);
        self
    }

    pub fn default_fn(mut self, f: fn() -> Value) -> Self {
        self.default = FieldDefault::Generator(f);
        self
    }
}
