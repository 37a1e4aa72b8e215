// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoded attribute values and typed accessors.
//!
//! `required_*` accessors fail with [`Error::MissingAttribute`] when the
//! attribute is absent or `$`, and with [`Error::InvalidAttribute`] when it
//! has the wrong shape. `optional_*` accessors return `None` instead.

use crate::error::{Error, Result};
use crate::parser::Token;
use crate::schema::IfcType;

/// IFC entity attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    EntityRef(u32),
    String(String),
    Integer(i64),
    Float(f64),
    /// Enum value without the surrounding dots
    Enum(String),
    List(Vec<AttributeValue>),
    /// Typed select value, e.g. `IFCPARAMETERVALUE(0.)`
    Typed(String, Vec<AttributeValue>),
    Null,
    Derived,
}

impl AttributeValue {
    pub fn from_token(token: &Token) -> Self {
        match token {
            Token::EntityRef(id) => AttributeValue::EntityRef(*id),
            Token::String(s) => AttributeValue::String(s.replace("''", "'")),
            Token::Integer(i) => AttributeValue::Integer(*i),
            Token::Float(f) => AttributeValue::Float(*f),
            Token::Enum(e) => AttributeValue::Enum(e.to_string()),
            Token::List(items) => {
                AttributeValue::List(items.iter().map(Self::from_token).collect())
            }
            Token::TypedValue(type_name, args) => AttributeValue::Typed(
                type_name.to_string(),
                args.iter().map(Self::from_token).collect(),
            ),
            Token::Null => AttributeValue::Null,
            Token::Derived => AttributeValue::Derived,
        }
    }

    #[inline]
    pub fn as_entity_ref(&self) -> Option<u32> {
        match self {
            AttributeValue::EntityRef(id) => Some(*id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            AttributeValue::Typed(_, args) if args.len() == 1 => args[0].as_string(),
            _ => None,
        }
    }

    #[inline]
    pub fn as_enum(&self) -> Option<&str> {
        match self {
            AttributeValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value, unwrapping single-argument typed values
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Typed(_, args) if args.len() == 1 => args[0].as_float(),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            AttributeValue::Typed(_, args) if args.len() == 1 => args[0].as_int(),
            _ => None,
        }
    }

    /// STEP LOGICAL/BOOLEAN: `.T.` and `.F.`; `.U.` yields `None`
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Enum(e) => match e.as_str() {
                "T" | "TRUE" => Some(true),
                "F" | "FALSE" => Some(false),
                _ => None,
            },
            AttributeValue::Typed(_, args) if args.len() == 1 => args[0].as_bool(),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Type keyword and arguments of a typed select value
    #[inline]
    pub fn as_typed(&self) -> Option<(&str, &[AttributeValue])> {
        match self {
            AttributeValue::Typed(name, args) => Some((name, args)),
            _ => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null | AttributeValue::Derived)
    }
}

/// Decoded IFC entity with attributes
#[derive(Debug, Clone)]
pub struct DecodedEntity {
    pub id: u32,
    pub ifc_type: IfcType,
    /// Type keyword as written in the file
    pub step_name: String,
    pub attributes: Vec<AttributeValue>,
}

impl DecodedEntity {
    pub fn new(
        id: u32,
        ifc_type: IfcType,
        step_name: impl Into<String>,
        attributes: Vec<AttributeValue>,
    ) -> Self {
        Self {
            id,
            ifc_type,
            step_name: step_name.into(),
            attributes,
        }
    }

    /// Attribute by index; `$` and `*` are reported as absent
    #[inline]
    pub fn get(&self, index: usize) -> Option<&AttributeValue> {
        self.attributes.get(index).filter(|value| !value.is_null())
    }

    /// `IsSubTypeOf(handle, declared)`
    #[inline]
    pub fn is_subtype_of(&self, declared: IfcType) -> bool {
        self.ifc_type.is_subtype_of(declared)
    }

    fn missing(&self, name: &'static str) -> Error {
        Error::MissingAttribute {
            id: self.id,
            type_name: self.ifc_type.name(),
            name,
        }
    }

    fn invalid(&self, name: &'static str, expected: &'static str) -> Error {
        Error::InvalidAttribute {
            id: self.id,
            type_name: self.ifc_type.name(),
            name,
            expected,
        }
    }

    fn required(&self, index: usize, name: &'static str) -> Result<&AttributeValue> {
        self.get(index).ok_or_else(|| self.missing(name))
    }

    fn required_list(&self, index: usize, name: &'static str) -> Result<&[AttributeValue]> {
        self.required(index, name)?
            .as_list()
            .ok_or_else(|| self.invalid(name, "a list"))
    }

    pub fn required_ref(&self, index: usize, name: &'static str) -> Result<u32> {
        self.required(index, name)?
            .as_entity_ref()
            .ok_or_else(|| self.invalid(name, "an entity reference"))
    }

    pub fn optional_ref(&self, index: usize) -> Option<u32> {
        self.get(index).and_then(|v| v.as_entity_ref())
    }

    /// Aggregate of entity references
    pub fn required_refs(&self, index: usize, name: &'static str) -> Result<Vec<u32>> {
        self.required_list(index, name)?
            .iter()
            .map(|v| {
                v.as_entity_ref()
                    .ok_or_else(|| self.invalid(name, "a list of entity references"))
            })
            .collect()
    }

    /// Aggregate of entity references, empty when absent
    pub fn optional_refs(&self, index: usize) -> Vec<u32> {
        self.get(index)
            .and_then(|v| v.as_list())
            .map(|items| items.iter().filter_map(|v| v.as_entity_ref()).collect())
            .unwrap_or_default()
    }

    /// Nested aggregate of entity references, e.g. B-spline control points
    pub fn required_ref_lists(&self, index: usize, name: &'static str) -> Result<Vec<Vec<u32>>> {
        self.required_list(index, name)?
            .iter()
            .map(|row| {
                row.as_list()
                    .and_then(|items| items.iter().map(|v| v.as_entity_ref()).collect())
                    .ok_or_else(|| self.invalid(name, "a nested list of entity references"))
            })
            .collect()
    }

    pub fn required_float(&self, index: usize, name: &'static str) -> Result<f64> {
        self.required(index, name)?
            .as_float()
            .ok_or_else(|| self.invalid(name, "a number"))
    }

    pub fn optional_float(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(|v| v.as_float())
    }

    pub fn required_floats(&self, index: usize, name: &'static str) -> Result<Vec<f64>> {
        self.required_list(index, name)?
            .iter()
            .map(|v| v.as_float().ok_or_else(|| self.invalid(name, "a list of numbers")))
            .collect()
    }

    pub fn optional_floats(&self, index: usize) -> Option<Vec<f64>> {
        self.get(index)
            .and_then(|v| v.as_list())
            .and_then(|items| items.iter().map(|v| v.as_float()).collect())
    }

    /// Nested numeric aggregate, e.g. a coordinate list
    pub fn required_float_lists(&self, index: usize, name: &'static str) -> Result<Vec<Vec<f64>>> {
        self.required_list(index, name)?
            .iter()
            .map(|row| {
                row.as_list()
                    .and_then(|items| items.iter().map(|v| v.as_float()).collect())
                    .ok_or_else(|| self.invalid(name, "a nested list of numbers"))
            })
            .collect()
    }

    pub fn required_ints(&self, index: usize, name: &'static str) -> Result<Vec<i64>> {
        self.required_list(index, name)?
            .iter()
            .map(|v| v.as_int().ok_or_else(|| self.invalid(name, "a list of integers")))
            .collect()
    }

    pub fn optional_ints(&self, index: usize) -> Option<Vec<i64>> {
        self.get(index)
            .and_then(|v| v.as_list())
            .and_then(|items| items.iter().map(|v| v.as_int()).collect())
    }

    pub fn required_int_lists(&self, index: usize, name: &'static str) -> Result<Vec<Vec<i64>>> {
        self.required_list(index, name)?
            .iter()
            .map(|row| {
                row.as_list()
                    .and_then(|items| items.iter().map(|v| v.as_int()).collect())
                    .ok_or_else(|| self.invalid(name, "a nested list of integers"))
            })
            .collect()
    }

    pub fn optional_int(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(|v| v.as_int())
    }

    pub fn required_bool(&self, index: usize, name: &'static str) -> Result<bool> {
        self.required(index, name)?
            .as_bool()
            .ok_or_else(|| self.invalid(name, "a boolean"))
    }

    pub fn optional_bool(&self, index: usize) -> Option<bool> {
        self.get(index).and_then(|v| v.as_bool())
    }

    pub fn required_enum(&self, index: usize, name: &'static str) -> Result<&str> {
        self.required(index, name)?
            .as_enum()
            .ok_or_else(|| self.invalid(name, "an enumeration"))
    }

    pub fn optional_enum(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(|v| v.as_enum())
    }

    pub fn optional_string(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(|v| v.as_string())
    }

    /// Raw list attribute
    pub fn list(&self, index: usize) -> Option<&[AttributeValue]> {
        self.get(index).and_then(|v| v.as_list())
    }
}
