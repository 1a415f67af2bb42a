//! Encoding and cached decoding of embedded tables.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::hash::hash_parts;
use super::{BlockStore, CacheError, CacheResult};
use crate::model::{BlockRef, EmbeddedData, EmbeddedTable, EncodedPayload, SchemaColumn, Value};

/// How much of a payload to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeMode {
    /// Schema and row count only.
    Metadata,
    /// Schema and every row.
    Full,
}

/// Decoded form of an encoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTable {
    pub schema: Vec<SchemaColumn>,
    pub row_count: usize,
    /// `None` when decoded in [`DecodeMode::Metadata`].
    pub rows: Option<Vec<Vec<Value>>>,
}

#[derive(Serialize, Deserialize)]
struct Header {
    schema: Vec<SchemaColumn>,
    row_count: usize,
}

fn encode_json<T: Serialize + ?Sized>(value: &T) -> CacheResult<String> {
    Ok(STANDARD.encode(serde_json::to_vec(value)?))
}

fn decode_json<T: for<'de> Deserialize<'de>>(text: &str) -> CacheResult<T> {
    let bytes = STANDARD.decode(text)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encode rows into a header plus blocks of `block_rows` rows.
///
/// With a store, blocks are written to it under `{digest}-{index}`;
/// without one they stay inline.
pub fn encode_rows(
    schema: &[SchemaColumn],
    rows: &[Vec<Value>],
    block_rows: usize,
    store: Option<&dyn BlockStore>,
) -> CacheResult<EncodedPayload> {
    let header = encode_json(&Header {
        schema: schema.to_vec(),
        row_count: rows.len(),
    })?;
    let blocks: Vec<String> = rows
        .chunks(block_rows.max(1))
        .map(|chunk| encode_json(chunk))
        .collect::<CacheResult<_>>()?;
    let digest = hash_parts(std::iter::once(header.as_str()).chain(blocks.iter().map(String::as_str)));

    let blocks = match store {
        Some(store) => blocks
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let key = format!("{}-{}", digest, i);
                store.put(&key, text.as_bytes())?;
                Ok(BlockRef::Stored(key))
            })
            .collect::<CacheResult<_>>()?,
        None => blocks.into_iter().map(BlockRef::Inline).collect(),
    };

    Ok(EncodedPayload {
        header,
        blocks,
        digest,
    })
}

/// Encode a materialized embedded table. Encoded tables are returned as is.
pub fn encode_table(
    table: &EmbeddedTable,
    block_rows: usize,
    store: Option<&dyn BlockStore>,
) -> CacheResult<EmbeddedTable> {
    match &table.data {
        EmbeddedData::Rows(rows) => Ok(EmbeddedTable {
            schema: table.schema.clone(),
            data: EmbeddedData::Encoded(encode_rows(&table.schema, rows, block_rows, store)?),
        }),
        EmbeddedData::Encoded(_) => Ok(table.clone()),
    }
}

/// Shared read-through cache of decoded payloads.
///
/// Safe for concurrent use. Two threads missing on the same key may both
/// decode; the results are identical and the last insert wins.
#[derive(Debug)]
pub struct DecodeCache {
    entries: DashMap<(String, DecodeMode), Arc<DecodedTable>>,
    enabled: bool,
}

impl Default for DecodeCache {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DecodeCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            enabled,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn cached(&self, digest: &str, mode: DecodeMode) -> Option<Arc<DecodedTable>> {
        let hit = |m: DecodeMode| {
            self.entries
                .get(&(digest.to_string(), m))
                .map(|e| Arc::clone(e.value()))
        };
        match mode {
            DecodeMode::Full => hit(DecodeMode::Full),
            // A full decode answers metadata requests too.
            DecodeMode::Metadata => hit(DecodeMode::Metadata).or_else(|| hit(DecodeMode::Full)),
        }
    }

    /// Decode `payload`, going through the cache.
    pub fn decode(
        &self,
        payload: &EncodedPayload,
        mode: DecodeMode,
        store: Option<&dyn BlockStore>,
    ) -> CacheResult<Arc<DecodedTable>> {
        if self.enabled {
            if let Some(hit) = self.cached(&payload.digest, mode) {
                tracing::trace!(digest = %payload.digest, ?mode, "decode cache hit");
                return Ok(hit);
            }
            tracing::trace!(digest = %payload.digest, ?mode, "decode cache miss");
        }

        let decoded = Arc::new(decode_payload(payload, mode, store)?);
        if self.enabled {
            self.entries
                .insert((payload.digest.clone(), mode), Arc::clone(&decoded));
        }
        Ok(decoded)
    }

    /// Rows of an embedded table, decoding if it is encoded.
    pub fn rows(
        &self,
        table: &EmbeddedTable,
        store: Option<&dyn BlockStore>,
    ) -> CacheResult<Vec<Vec<Value>>> {
        match &table.data {
            EmbeddedData::Rows(rows) => Ok(rows.clone()),
            EmbeddedData::Encoded(payload) => Ok(self
                .decode(payload, DecodeMode::Full, store)?
                .rows
                .clone()
                .unwrap_or_default()),
        }
    }
}

fn decode_payload(
    payload: &EncodedPayload,
    mode: DecodeMode,
    store: Option<&dyn BlockStore>,
) -> CacheResult<DecodedTable> {
    let header: Header = decode_json(&payload.header)?;
    if mode == DecodeMode::Metadata {
        return Ok(DecodedTable {
            schema: header.schema,
            row_count: header.row_count,
            rows: None,
        });
    }

    let texts: Vec<String> = payload
        .blocks
        .iter()
        .map(|block| match block {
            BlockRef::Inline(text) => Ok(text.clone()),
            BlockRef::Stored(key) => {
                let store = store.ok_or_else(|| CacheError::NoStore(key.clone()))?;
                String::from_utf8(store.get(key)?).map_err(|err| {
                    CacheError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
                })
            }
        })
        .collect::<CacheResult<_>>()?;

    let actual = hash_parts(
        std::iter::once(payload.header.as_str()).chain(texts.iter().map(String::as_str)),
    );
    if actual != payload.digest {
        return Err(CacheError::DigestMismatch {
            expected: payload.digest.clone(),
            actual,
        });
    }

    let mut rows = Vec::with_capacity(header.row_count);
    for text in &texts {
        let block: Vec<Vec<Value>> = decode_json(text)?;
        rows.extend(block);
    }
    Ok(DecodedTable {
        schema: header.schema,
        row_count: rows.len(),
        rows: Some(rows),
    })
}
