use std::collections::BTreeMap;
use std::fmt::Display;

/// A dynamically typed value produced by a decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Blob(Vec<u8>),
    /// `len` bits; `data` holds them big-endian, padded at the front to a
    /// whole byte.
    BitArray {
        len: u64,
        data: Vec<u8>,
    },
    FourCC([u8; 4]),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Choice {
        name: String,
        value: Box<Value>,
    },
}

impl Value {
    pub fn empty_struct() -> Self {
        Value::Struct(BTreeMap::new())
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            Value::Choice { value, .. } => value.as_int(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Blob contents as text, replacing invalid UTF-8.
    pub fn as_str_lossy(&self) -> Option<String> {
        self.as_blob()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Looks up a struct field. Returns `None` for non-structs.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_struct().and_then(|f| f.get(field))
    }

    /// Looks up a struct field, treating a present `Null` as absent.
    pub fn get_present(&self, field: &str) -> Option<&Value> {
        self.get(field).filter(|v| !v.is_null())
    }

    /// Follows a path of struct fields.
    pub fn path(&self, fields: &[&str]) -> Option<&Value> {
        fields.iter().try_fold(self, |value, field| value.get(field))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Blob(b) => write!(f, "{:?}", String::from_utf8_lossy(b)),
            Value::BitArray { len, data } => write!(f, "bits({len}, {data:02x?})"),
            Value::FourCC(c) => write!(f, "{:?}", String::from_utf8_lossy(c)),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Choice { name, value } => write!(f, "{{{name}: {value}}}"),
        }
    }
}
