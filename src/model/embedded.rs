//! Literal tabular data carried inside a plan.
//!
//! An embedded table is either materialized (rows in memory) or encoded as a
//! header plus row blocks. Blocks are base64 JSON, kept inline or stored
//! out-of-line in a [`BlockStore`](crate::cache::BlockStore). Encoded tables
//! are decoded lazily through a [`DecodeCache`](crate::cache::DecodeCache).

use serde::{Deserialize, Serialize};

use super::column::{ColumnRef, ColumnSelection};
use super::types::{DataType, Value};

/// One column of an embedded table's schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    pub data_type: DataType,
}

impl SchemaColumn {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Location of one encoded row block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockRef {
    /// Base64 text held in the plan itself.
    Inline(String),
    /// Key into a block store.
    Stored(String),
}

/// Block-fragmented encoded form of an embedded table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodedPayload {
    /// Base64 JSON of the schema and row count.
    pub header: String,
    pub blocks: Vec<BlockRef>,
    /// Hex SHA-256 over header and block contents; the decode cache key.
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddedData {
    Rows(Vec<Vec<Value>>),
    Encoded(EncodedPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedTable {
    pub schema: Vec<SchemaColumn>,
    pub data: EmbeddedData,
}

impl EmbeddedTable {
    pub fn from_rows(schema: Vec<SchemaColumn>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            schema,
            data: EmbeddedData::Rows(rows),
        }
    }

    pub fn is_encoded(&self) -> bool {
        matches!(self.data, EmbeddedData::Encoded(_))
    }

    /// Materialized rows, if the table is not encoded.
    pub fn rows(&self) -> Option<&[Vec<Value>]> {
        match &self.data {
            EmbeddedData::Rows(rows) => Some(rows),
            EmbeddedData::Encoded(_) => None,
        }
    }

    /// Index of the first materialized row whose width differs from the schema.
    pub fn ragged_row(&self) -> Option<usize> {
        self.rows()?
            .iter()
            .position(|row| row.len() != self.schema.len())
    }

    /// The projection an embedded leaf exposes by default.
    pub fn default_projection(&self, entity: &str) -> ColumnSelection {
        self.schema
            .iter()
            .map(|c| ColumnRef::qualified(entity, c.name.clone()).with_type(c.data_type))
            .collect()
    }
}
