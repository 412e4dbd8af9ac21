//! Type algebra driving the dynamic codec

use std::collections::HashSet;
use std::fmt;

use crate::datatype::DataType;
use crate::error::{Error, Result};

/// A node of a type tree
#[derive(Debug, Clone, PartialEq)]
pub enum AnyType {
    /// Self-describing value: one datatype tag byte, then that type's encoding
    Variant,
    /// Fixed scalar type
    DataType(DataType),
    /// Named properties in wire order
    Object(ObjectType),
    /// Elements repeated until the enclosing buffer ends
    GreedyRepeated(Box<AnyType>),
    /// Status byte, followed by the inner value only when the status is 0x00
    ///
    /// Decodes to `{"status": n}` or `{"status": 0, "value": ...}`.
    ErrorOr(Box<AnyType>),
}

pub const STATUS_KEY: &str = "status";
pub const VALUE_KEY: &str = "value";
pub const STATUS_SUCCESS: u8 = 0x00;

/// Named property of an [`ObjectType`]
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    pub name: String,
    pub ty: AnyType,
}

/// Ordered list of named properties
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectType {
    pub properties: Vec<ObjectEntry>,
}

impl ObjectType {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a property (builder style)
    pub fn with(mut self, name: impl Into<String>, ty: impl Into<AnyType>) -> Self {
        self.push(name, ty);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, ty: impl Into<AnyType>) {
        self.properties.push(ObjectEntry {
            name: name.into(),
            ty: ty.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Check that greedy lists only appear where the buffer end bounds them
    ///
    /// A greedy list may not contain another greedy list, and inside an
    /// object it must be the last property. Property names must be unique.
    pub fn validate(&self) -> Result<()> {
        let last = self.properties.len().saturating_sub(1);
        let mut seen = HashSet::new();
        for (index, entry) in self.properties.iter().enumerate() {
            if !seen.insert(entry.name.as_str()) {
                return Err(Error::schema(format!(
                    "duplicate property name '{}'",
                    entry.name
                )));
            }
            if entry.ty.contains_greedy() && index != last {
                return Err(Error::schema(format!(
                    "repeated property '{}' must be the last property",
                    entry.name
                )));
            }
            entry.ty.validate().map_err(|e| match e {
                Error::SchemaError(msg) => Error::schema(format!("{} (in '{}')", msg, entry.name)),
                other => other,
            })?;
        }
        Ok(())
    }
}

impl AnyType {
    pub fn repeated(inner: impl Into<AnyType>) -> Self {
        AnyType::GreedyRepeated(Box::new(inner.into()))
    }

    pub fn error_or(inner: impl Into<AnyType>) -> Self {
        AnyType::ErrorOr(Box::new(inner.into()))
    }

    /// Whether a greedy list appears anywhere in this tree
    pub fn contains_greedy(&self) -> bool {
        match self {
            AnyType::GreedyRepeated(_) => true,
            AnyType::Object(obj) => obj.properties.iter().any(|e| e.ty.contains_greedy()),
            AnyType::ErrorOr(inner) => inner.contains_greedy(),
            AnyType::Variant | AnyType::DataType(_) => false,
        }
    }

    /// See [`ObjectType::validate`]
    pub fn validate(&self) -> Result<()> {
        match self {
            AnyType::GreedyRepeated(inner) => {
                if inner.contains_greedy() {
                    return Err(Error::schema("repeated element may not itself be repeated"));
                }
                inner.validate()
            }
            AnyType::Object(obj) => obj.validate(),
            AnyType::ErrorOr(inner) => inner.validate(),
            AnyType::Variant | AnyType::DataType(_) => Ok(()),
        }
    }
}

impl From<DataType> for AnyType {
    fn from(dt: DataType) -> Self {
        AnyType::DataType(dt)
    }
}

impl From<ObjectType> for AnyType {
    fn from(obj: ObjectType) -> Self {
        AnyType::Object(obj)
    }
}

impl fmt::Display for AnyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyType::Variant => f.write_str("variant"),
            AnyType::DataType(dt) => write!(f, "{}", dt),
            AnyType::GreedyRepeated(inner) => write!(f, "repeated:{}", inner),
            AnyType::ErrorOr(inner) => write!(f, "error_or:{}", inner),
            AnyType::Object(obj) => {
                f.write_str("object{")?;
                for (i, entry) in obj.properties.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", entry.name, entry.ty)?;
                }
                f.write_str("}")
            }
        }
    }
}
