//! Field layouts and field values.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

fn default_base() -> u8 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerType {
    pub size: u8,
    #[serde(default)]
    pub signed: bool,
    #[serde(default = "default_base")]
    pub base: u8,
    /// Name of the clock class this integer holds cycles of.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_clock: Option<String>,
}

impl IntegerType {
    pub fn unsigned(size: u8) -> Self {
        Self {
            size,
            signed: false,
            base: 10,
            mapped_clock: None,
        }
    }

    pub fn signed(size: u8) -> Self {
        Self {
            signed: true,
            ..Self::unsigned(size)
        }
    }

    pub fn mapped_to(mut self, clock: &str) -> Self {
        self.mapped_clock = Some(clock.to_string());
        self
    }

    fn accepts(&self, value: &FieldValue) -> bool {
        match (value, self.signed) {
            (FieldValue::Unsigned(v), false) => self.size >= 64 || *v < (1u64 << self.size),
            (FieldValue::Signed(v), true) => {
                if self.size == 0 {
                    return *v == 0;
                }
                if self.size >= 64 {
                    return true;
                }
                let bound = 1i64 << (self.size - 1);
                *v >= -bound && *v < bound
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatType {
    pub exp_dig: u8,
    pub mant_dig: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructType {
    pub fields: Vec<StructField>,
}

impl StructType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.push(StructField {
            name: name.to_string(),
            ty,
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.ty)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldType> {
        self.fields
            .iter_mut()
            .find(|f| f.name == name)
            .map(|f| &mut f.ty)
    }

    /// Clock class mapped by the integer field `name`, if any.
    pub fn mapped_clock(&self, name: &str) -> Option<&str> {
        match self.field(name)? {
            FieldType::Integer(int) => int.mapped_clock.as_deref(),
            _ => None,
        }
    }

    /// Checks that `value` has exactly the fields of this layout, in order,
    /// with matching types.
    pub fn check(&self, value: &StructValue) -> Result<(), String> {
        if value.len() != self.fields.len() {
            return Err(format!(
                "expected {} fields, got {}",
                self.fields.len(),
                value.len()
            ));
        }

        for (field, (name, v)) in self.fields.iter().zip(value.iter()) {
            if field.name != *name {
                return Err(format!("expected field `{}`, got `{}`", field.name, name));
            }
            field
                .ty
                .check(v, value)
                .map_err(|e| format!("field `{}`: {}", name, e))?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum FieldType {
    Integer(IntegerType),
    Float(FloatType),
    String,
    Struct(StructType),
    Array {
        element: Box<FieldType>,
        length: usize,
    },
    /// Dynamically sized array; its length is the value of a sibling
    /// unsigned integer field.
    Sequence {
        element: Box<FieldType>,
        length_field: String,
    },
}

impl FieldType {
    pub fn uint(size: u8) -> Self {
        FieldType::Integer(IntegerType::unsigned(size))
    }

    pub fn int(size: u8) -> Self {
        FieldType::Integer(IntegerType::signed(size))
    }

    pub fn clock_uint(size: u8, clock: &str) -> Self {
        FieldType::Integer(IntegerType::unsigned(size).mapped_to(clock))
    }

    pub fn double() -> Self {
        FieldType::Float(FloatType {
            exp_dig: 11,
            mant_dig: 53,
        })
    }

    /// Checks `value` against this layout. `parent` is the enclosing
    /// structure, used to resolve sequence lengths.
    pub fn check(&self, value: &FieldValue, parent: &StructValue) -> Result<(), String> {
        match (self, value) {
            (FieldType::Integer(int), v) => {
                if int.accepts(v) {
                    Ok(())
                } else {
                    Err(format!("{} does not fit a {}-bit integer", v, int.size))
                }
            }
            (FieldType::Float(_), FieldValue::Float(_)) => Ok(()),
            (FieldType::String, FieldValue::String(_)) => Ok(()),
            (FieldType::Struct(st), FieldValue::Struct(sv)) => st.check(sv),
            (FieldType::Array { element, length }, FieldValue::Array(items)) => {
                if items.len() != *length {
                    return Err(format!("expected {} elements, got {}", length, items.len()));
                }
                items.iter().try_for_each(|i| element.check(i, parent))
            }
            (
                FieldType::Sequence {
                    element,
                    length_field,
                },
                FieldValue::Array(items),
            ) => {
                let expected = parent
                    .get(length_field)
                    .and_then(FieldValue::as_u64)
                    .ok_or_else(|| format!("length field `{}` is not set", length_field))?;
                if items.len() as u64 != expected {
                    return Err(format!(
                        "sequence length is {}, `{}` says {}",
                        items.len(),
                        length_field,
                        expected
                    ));
                }
                items.iter().try_for_each(|i| element.check(i, parent))
            }
            (_, v) => Err(format!("unexpected value {}", v)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    String(String),
    Struct(StructValue),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Unsigned(v) => Some(*v),
            FieldValue::Signed(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Unsigned(v) => write!(f, "{}", v),
            FieldValue::Signed(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => write!(f, "\"{}\"", s),
            FieldValue::Struct(s) => write!(f, "{}", s),
            FieldValue::Array(items) => {
                f.write_str("[ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(" ]")
            }
        }
    }
}

/// Ordered set of named field values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructValue {
    fields: Vec<(String, FieldValue)>,
}

impl StructValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields<I: IntoIterator<Item = (String, FieldValue)>>(fields: I) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn with(mut self, name: &str, value: FieldValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replaces the value of `name`, or appends it.
    pub fn set(&mut self, name: &str, value: FieldValue) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns a copy whose fields follow the order of `layout`. Fields
    /// unknown to the layout are kept at the end.
    pub fn ordered_as(&self, layout: &StructType) -> StructValue {
        let mut ordered: Vec<(String, FieldValue)> = layout
            .fields
            .iter()
            .filter_map(|f| self.get(&f.name).map(|v| (f.name.clone(), v.clone())))
            .collect();

        for (name, value) in &self.fields {
            if layout.field(name).is_none() {
                ordered.push((name.clone(), value.clone()));
            }
        }

        StructValue { fields: ordered }
    }
}

impl Display for StructValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{ ")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} = {}", name, value)?;
        }
        f.write_str(" }")
    }
}
