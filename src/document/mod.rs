//! Plan documents.
//!
//! A plan is written as a tree of [`Element`]s: one `plan` element holding
//! one element per node, tagged by node kind. Scalar fields are attributes;
//! structured sub-objects (projections, condition lists, aggregates) are
//! child elements whose text is their JSON form. The tree itself is stored
//! as JSON.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabula::document;
//!
//! let graph = document::read_file("plan.json")?;
//! document::write_file("copy.json", &graph)?;
//! ```

mod node;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PlanError, PlanResult};
use crate::graph::PlanGraph;

// ============================================================================
// Element tree
// ============================================================================

/// One element of a plan document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn set_attr(&mut self, key: &str, value: impl ToString) {
        self.attributes.insert(key.to_string(), value.to_string());
    }

    /// Set a boolean attribute, omitting it when false.
    pub fn set_flag(&mut self, key: &str, value: bool) {
        if value {
            self.set_attr(key, true);
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn required_attr(&self, key: &str) -> PlanResult<&str> {
        self.attr(key).ok_or_else(|| {
            PlanError::Document(format!("Missing required attribute '{}' in <{}>", key, self.tag))
        })
    }

    /// Parse an optional attribute.
    pub fn parse_attr<T: FromStr>(&self, key: &str) -> PlanResult<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        self.attr(key)
            .map(|raw| {
                raw.parse().map_err(|err: T::Err| {
                    PlanError::Document(format!(
                        "Invalid value for '{}' in <{}>: {}",
                        key, self.tag, err
                    ))
                })
            })
            .transpose()
    }

    pub fn flag(&self, key: &str) -> PlanResult<bool> {
        Ok(self.parse_attr(key)?.unwrap_or(false))
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Add a child whose text is the JSON form of `value`.
    pub fn push_json<T: Serialize>(&mut self, tag: &str, value: &T) -> PlanResult<()> {
        let mut child = Element::new(tag);
        child.text = Some(serde_json::to_string(value)?);
        self.push(child);
        Ok(())
    }

    /// Read a child written by [`push_json`](Self::push_json).
    pub fn json_child<T: DeserializeOwned>(&self, tag: &str) -> PlanResult<Option<T>> {
        let Some(child) = self.child(tag) else {
            return Ok(None);
        };
        let text = child.text.as_deref().unwrap_or("null");
        serde_json::from_str(text).map(Some).map_err(|err| {
            PlanError::Document(format!("Invalid <{}> in <{}>: {}", tag, self.tag, err))
        })
    }
}

// ============================================================================
// Serialization hooks
// ============================================================================

/// Conversion between a plan object and its document element.
pub trait DocumentNode: Sized {
    /// Tag naming the element this object writes.
    fn tag(&self) -> &'static str;

    fn write_attributes(&self, element: &mut Element);

    fn write_contents(&self, element: &mut Element) -> PlanResult<()>;

    /// Empty object of the kind `element` describes, before its attributes
    /// and contents are read.
    fn blank(element: &Element) -> PlanResult<Self>;

    fn parse_attributes(&mut self, element: &Element) -> PlanResult<()>;

    fn parse_contents(&mut self, element: &Element) -> PlanResult<()>;

    fn write(&self) -> PlanResult<Element> {
        let mut element = Element::new(self.tag());
        self.write_attributes(&mut element);
        self.write_contents(&mut element)?;
        Ok(element)
    }

    fn parse(element: &Element) -> PlanResult<Self> {
        let mut value = Self::blank(element)?;
        value.parse_attributes(element)?;
        value.parse_contents(element)?;
        Ok(value)
    }
}

// ============================================================================
// Text and files
// ============================================================================

pub fn to_json(graph: &PlanGraph) -> PlanResult<String> {
    Ok(serde_json::to_string_pretty(&graph.write()?)?)
}

pub fn from_json(text: &str) -> PlanResult<PlanGraph> {
    let element: Element = serde_json::from_str(text)?;
    PlanGraph::parse(&element)
}

/// Read a plan document from disk.
pub fn read_file(path: impl AsRef<Path>) -> PlanResult<PlanGraph> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|err| {
        PlanError::Document(format!("Failed to read {}: {}", path.display(), err))
    })?;
    from_json(&text)
}

/// Write a plan document to disk.
pub fn write_file(path: impl AsRef<Path>, graph: &PlanGraph) -> PlanResult<()> {
    fs::write(path, to_json(graph)?)?;
    Ok(())
}
