//! Typed field declarations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The type of a declared storage field.
///
/// Widths are counted in whole slots; value types are not packed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Uint { bits: u16 },
    Int { bits: u16 },
    Address,
    Bytes32,
    /// One anchor slot; entries live at hashed slots.
    Mapping,
    /// One length slot; elements live at hashed slots.
    DynamicArray,
    FixedArray { element: Box<FieldType>, len: u64 },
    Struct { fields: Vec<Field> },
}

impl FieldType {
    pub fn uint256() -> Self {
        FieldType::Uint { bits: 256 }
    }

    pub fn fixed_array(element: FieldType, len: u64) -> Self {
        FieldType::FixedArray {
            element: Box::new(element),
            len,
        }
    }

    /// Number of consecutive slots this type occupies.
    ///
    /// `None` when the width does not fit in the slot space.
    pub fn slots(&self) -> Option<u64> {
        match self {
            FieldType::Bool
            | FieldType::Uint { .. }
            | FieldType::Int { .. }
            | FieldType::Address
            | FieldType::Bytes32
            | FieldType::Mapping
            | FieldType::DynamicArray => Some(1),
            FieldType::FixedArray { element, len } => element.slots()?.checked_mul(*len),
            FieldType::Struct { fields } => fields
                .iter()
                .try_fold(0u64, |acc, f| acc.checked_add(f.ty.slots()?)),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => write!(f, "bool"),
            FieldType::Uint { bits } => write!(f, "uint{}", bits),
            FieldType::Int { bits } => write!(f, "int{}", bits),
            FieldType::Address => write!(f, "address"),
            FieldType::Bytes32 => write!(f, "bytes32"),
            FieldType::Mapping => write!(f, "mapping"),
            FieldType::DynamicArray => write!(f, "array"),
            FieldType::FixedArray { element, len } => write!(f, "{}[{}]", element, len),
            FieldType::Struct { fields } => {
                write!(f, "struct {{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A named, typed field in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub ty: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}
