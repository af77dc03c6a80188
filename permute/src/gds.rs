//! The GDS-derived JSON wire format consumed and emitted by the engine.
//!
//! A library holds one or more structures; the first structure is the cell
//! being permuted. Elements are tagged by an `element` field and are either
//! `boundary` polygons (a closed five-point ring) or `text` labels.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{with_err_context, ErrorContext, ErrorSource, Result};
use crate::tech::LayerNum;

fn default_units() -> [f64; 2] {
    [0.001, 1e-9]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GdsLibrary {
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub version: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub timestamp: Value,
    pub name: String,
    #[serde(default = "default_units")]
    pub units: [f64; 2],
    pub structures: Vec<GdsStructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_layout_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GdsStructure {
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub timestamp: Value,
    pub elements: Vec<GdsElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "element", rename_all = "lowercase")]
pub enum GdsElement {
    Boundary(GdsBoundary),
    Text(GdsText),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GdsBoundary {
    pub layer: LayerNum,
    #[serde(default)]
    pub datatype: i16,
    pub xy: Vec<[i64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GdsText {
    pub layer: LayerNum,
    #[serde(default, alias = "texttype")]
    pub datatype: i16,
    pub xy: Vec<[i64; 2]>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation: Option<Value>,
}

impl GdsLibrary {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = with_err_context(std::fs::read_to_string(path), || {
            ErrorContext::ReadFile(path.to_path_buf())
        })?;
        with_err_context(Self::from_json_str(&data), || {
            ErrorContext::ReadFile(path.to_path_buf())
        })
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(self)?;
        with_err_context(std::fs::write(path, data), || {
            ErrorContext::CreateFile(path.to_path_buf())
        })
    }

    /// The structure holding the cell being permuted.
    pub fn top(&self) -> Result<&GdsStructure> {
        self.structures
            .first()
            .ok_or_else(|| ErrorSource::NoStructures.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "version": 600,
        "name": "LIB",
        "units": [0.001, 1e-9],
        "structures": [{
            "name": "INVx1",
            "elements": [
                {"element": "boundary", "layer": 20, "datatype": 0,
                 "xy": [[0, 0], [100, 0], [100, 20], [0, 20], [0, 0]]},
                {"element": "text", "layer": 20, "texttype": 0,
                 "xy": [[50, 10]], "text": "VDD", "presentation": 5}
            ]
        }]
    }"#;

    #[test]
    fn parses_boundaries_and_texts() {
        let lib = GdsLibrary::from_json_str(SAMPLE).unwrap();
        let top = lib.top().unwrap();
        assert_eq!(top.name, "INVx1");
        match &top.elements[0] {
            GdsElement::Boundary(b) => {
                assert_eq!(b.layer, 20);
                assert_eq!(b.xy.len(), 5);
            }
            other => panic!("expected boundary, found {other:?}"),
        }
        match &top.elements[1] {
            GdsElement::Text(t) => {
                assert_eq!(t.text, "VDD");
                assert_eq!(t.xy, vec![[50, 10]]);
            }
            other => panic!("expected text, found {other:?}"),
        }
        assert!(lib.base_layout_name.is_none());
    }

    #[test]
    fn empty_library_has_no_top() {
        let lib = GdsLibrary::from_json_str(r#"{"name": "L", "structures": []}"#).unwrap();
        assert!(matches!(
            lib.top().unwrap_err().source(),
            ErrorSource::NoStructures
        ));
    }
}
