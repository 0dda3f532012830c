use serde::{Deserialize, Serialize};

/// Field name that splices the decoded value of a parent type into a struct.
pub const PARENT_FIELD: &str = "__parent";

/// Integer bounds: values are encoded as `offset + <bits>` in the bit-packed
/// format. Serialized as `[offset, bits]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "(i64, u32)", into = "(i64, u32)")]
pub struct Bounds {
    pub offset: i64,
    pub bits: u32,
}

impl Bounds {
    pub const fn new(offset: i64, bits: u32) -> Self {
        Self { offset, bits }
    }
}

impl From<(i64, u32)> for Bounds {
    fn from((offset, bits): (i64, u32)) -> Self {
        Self { offset, bits }
    }
}

impl From<Bounds> for (i64, u32) {
    fn from(bounds: Bounds) -> Self {
        (bounds.offset, bounds.bits)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChoiceField {
    pub tag: i64,
    pub name: String,
    pub type_id: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StructField {
    pub name: String,
    pub type_id: usize,
    pub tag: i64,
}

impl StructField {
    pub fn new(name: &str, type_id: usize, tag: i64) -> Self {
        Self {
            name: name.to_string(),
            type_id,
            tag,
        }
    }

    pub fn is_parent(&self) -> bool {
        self.name == PARENT_FIELD
    }
}

/// One entry of a protocol's decode table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypeInfo {
    Array {
        bounds: Bounds,
        type_id: usize,
    },
    #[serde(rename = "bitarray")]
    BitArray {
        bounds: Bounds,
    },
    Blob {
        bounds: Bounds,
    },
    Bool,
    Choice {
        bounds: Bounds,
        fields: Vec<ChoiceField>,
    },
    #[serde(rename = "fourcc")]
    FourCC,
    Int {
        bounds: Bounds,
    },
    Null,
    Optional {
        type_id: usize,
    },
    Real32,
    Real64,
    Struct {
        fields: Vec<StructField>,
    },
}
