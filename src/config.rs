//! Attribute configuration descriptors
//!
//! These are read-only inputs to the encoders, readers and patch machinery.
//! Schemas are usually loaded from JSON.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{AttrError, Result};

/// Size of the optional hash key prefix on variable-length records
pub const HASH_KEY_LEN: usize = 8;

/// Default separator between items of a multi-value text input
pub const MULTI_VALUE_SEPARATOR: char = '\x1D';

/// Default per-document byte budget (64MB)
pub const DEFAULT_MAX_BYTES_PER_DOC: usize = 64 * 1024 * 1024;

/// Field identifier, unique within a schema
pub type FieldId = u32;

/// Attribute value type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
}

impl ValueType {
    /// Size in bytes of one item, or None for strings
    pub fn item_size(&self) -> Option<usize> {
        match self {
            ValueType::Int8 | ValueType::UInt8 => Some(1),
            ValueType::Int16 | ValueType::UInt16 => Some(2),
            ValueType::Int32 | ValueType::UInt32 | ValueType::Float => Some(4),
            ValueType::Int64 | ValueType::UInt64 | ValueType::Double => Some(8),
            ValueType::String => None,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, ValueType::String)
    }
}

fn default_max_bytes_per_doc() -> usize {
    DEFAULT_MAX_BYTES_PER_DOC
}

fn default_separator() -> char {
    MULTI_VALUE_SEPARATOR
}

/// Configuration of a single attribute
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeConfig {
    /// Attribute name
    pub name: String,
    /// Field identifier carried in patch values
    pub field_id: FieldId,
    /// Item type
    pub value_type: ValueType,
    /// Whether a document holds a sequence of items
    #[serde(default)]
    pub multi_value: bool,
    /// Prefix each encoded record with an 8-byte hash key
    #[serde(default)]
    pub hash_enabled: bool,
    /// Maximum encoded size of one document's value
    #[serde(default = "default_max_bytes_per_doc")]
    pub max_bytes_per_doc: usize,
    /// Item separator for text input
    #[serde(default = "default_separator")]
    pub separator: char,
}

impl AttributeConfig {
    /// Create a config with defaults for everything but name, id and type
    pub fn new(name: impl Into<String>, field_id: FieldId, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            field_id,
            value_type,
            multi_value: false,
            hash_enabled: false,
            max_bytes_per_doc: DEFAULT_MAX_BYTES_PER_DOC,
            separator: MULTI_VALUE_SEPARATOR,
        }
    }

    pub fn with_multi_value(mut self, multi_value: bool) -> Self {
        self.multi_value = multi_value;
        self
    }

    pub fn with_hash(mut self, hash_enabled: bool) -> Self {
        self.hash_enabled = hash_enabled;
        self
    }

    pub fn with_max_bytes_per_doc(mut self, max_bytes: usize) -> Self {
        self.max_bytes_per_doc = max_bytes;
        self
    }

    /// Fixed-length attributes store one raw item per document
    pub fn is_fixed_length(&self) -> bool {
        !self.multi_value && !self.value_type.is_string()
    }

    /// Encoded size of a fixed-length value
    pub fn fixed_length(&self) -> Option<usize> {
        if self.is_fixed_length() {
            self.value_type.item_size()
        } else {
            None
        }
    }

    /// Smallest encoded record: the fixed value, or an empty record's header
    pub fn min_record_len(&self) -> usize {
        match self.fixed_length() {
            Some(len) => len,
            None => {
                let hash = if self.hash_enabled { HASH_KEY_LEN } else { 0 };
                hash + 1
            }
        }
    }

    /// Check the config on its own, outside of a schema
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AttrError::InvalidRequest(
                "attribute name must not be empty".to_string(),
            ));
        }
        if self.is_fixed_length() && self.hash_enabled {
            return Err(AttrError::InvalidRequest(format!(
                "fixed-length attribute {} cannot enable hashing",
                self.name
            )));
        }
        if !self.is_fixed_length() && self.max_bytes_per_doc < self.min_record_len() {
            return Err(AttrError::InvalidRequest(format!(
                "attribute {}: max_bytes_per_doc {} is below the {}-byte empty record",
                self.name,
                self.max_bytes_per_doc,
                self.min_record_len()
            )));
        }
        Ok(())
    }
}

/// Several attributes co-encoded into one blob
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackAttributeConfig {
    /// Pack name
    pub name: String,
    /// Pack identifier
    pub pack_id: u32,
    /// Ordered sub-field configurations
    pub sub_fields: Vec<AttributeConfig>,
}

impl PackAttributeConfig {
    pub fn new(name: impl Into<String>, pack_id: u32, sub_fields: Vec<AttributeConfig>) -> Self {
        Self {
            name: name.into(),
            pack_id,
            sub_fields,
        }
    }

    /// Position of a sub-field by field id
    pub fn sub_field_index(&self, field_id: FieldId) -> Option<usize> {
        self.sub_fields.iter().position(|f| f.field_id == field_id)
    }

    /// Config under which whole pack values are stored: one single-string
    /// record per document, never truncated
    pub fn storage_config(&self) -> AttributeConfig {
        AttributeConfig::new(self.name.clone(), self.pack_id, ValueType::String)
            .with_max_bytes_per_doc(usize::MAX)
    }
}

/// All attribute descriptors of an index
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSchema {
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
    #[serde(default)]
    pub packs: Vec<PackAttributeConfig>,
}

impl AttributeSchema {
    /// Parse and validate a schema from JSON
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let schema: AttributeSchema = serde_json::from_slice(data)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Check names and field ids are unique across attributes and packs
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut ids = HashSet::new();

        let all_fields = self
            .attributes
            .iter()
            .chain(self.packs.iter().flat_map(|p| p.sub_fields.iter()));
        for field in all_fields {
            field.validate()?;
            if !names.insert(field.name.as_str()) {
                return Err(AttrError::InvalidRequest(format!(
                    "duplicate attribute name {}",
                    field.name
                )));
            }
            if !ids.insert(field.field_id) {
                return Err(AttrError::InvalidRequest(format!(
                    "duplicate field id {}",
                    field.field_id
                )));
            }
        }

        for pack in &self.packs {
            if pack.sub_fields.is_empty() {
                return Err(AttrError::InvalidRequest(format!(
                    "pack attribute {} has no sub-fields",
                    pack.name
                )));
            }
            if !names.insert(pack.name.as_str()) {
                return Err(AttrError::InvalidRequest(format!(
                    "duplicate attribute name {}",
                    pack.name
                )));
            }
        }
        Ok(())
    }

    /// Look up an attribute (top-level or pack sub-field) by name
    pub fn attribute(&self, name: &str) -> Option<&AttributeConfig> {
        self.attributes
            .iter()
            .chain(self.packs.iter().flat_map(|p| p.sub_fields.iter()))
            .find(|a| a.name == name)
    }

    pub fn pack(&self, name: &str) -> Option<&PackAttributeConfig> {
        self.packs.iter().find(|p| p.name == name)
    }
}

/// Segment id space of a sequence.
///
/// Realtime sequences allocate building ids from a disjoint range so they
/// never collide with ids produced by the offline build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentIdSpace {
    #[default]
    Offline,
    Online,
}

impl SegmentIdSpace {
    /// First segment id of the online space
    pub const ONLINE_START: u64 = 0x4000_0000;

    /// Starting id of this space
    pub fn start(&self) -> u64 {
        match self {
            SegmentIdSpace::Offline => 0,
            SegmentIdSpace::Online => Self::ONLINE_START,
        }
    }
}

/// Storage-level knobs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Id space for building segments
    #[serde(default)]
    pub id_space: SegmentIdSpace,
    /// Start offset tables at 64-bit width
    #[serde(default)]
    pub wide_offsets: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            id_space: SegmentIdSpace::Offline,
            wide_offsets: false,
        }
    }
}

impl StorageConfig {
    pub fn with_id_space(mut self, id_space: SegmentIdSpace) -> Self {
        self.id_space = id_space;
        self
    }

    pub fn with_wide_offsets(mut self, wide: bool) -> Self {
        self.wide_offsets = wide;
        self
    }
}
