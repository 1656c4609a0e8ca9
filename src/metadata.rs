use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node, ParsingOptions};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::domain::GZIP_SUFFIX;
use crate::error::BxhError;

pub const TEXT_KEY: &str = "#text";
pub const ATTRIBUTE_PREFIX: char = '@';

/// Parsed BXH document as a nested mapping.
///
/// Elements become objects keyed by child tag, attributes are stored under
/// `@name`, repeated children collapse into arrays and mixed text content is
/// kept under `#text`. A leaf element without attributes is a plain string.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataTree {
    root: Value,
}

impl MetadataTree {
    pub fn load(path: &Path) -> Result<Self, BxhError> {
        if !path.exists() {
            return Err(BxhError::NotFound(path.to_path_buf()));
        }
        let content =
            fs::read_to_string(path).map_err(|err| BxhError::Filesystem(err.to_string()))?;
        Self::parse(&content).map_err(|message| BxhError::MalformedMetadata {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(xml: &str) -> Result<Self, String> {
        let mut options = ParsingOptions::default();
        options.allow_dtd = true;
        let document =
            Document::parse_with_options(xml, options).map_err(|err| err.to_string())?;
        let root = document.root_element();
        let mut map = Map::new();
        map.insert(root.tag_name().name().to_string(), element_to_value(root));
        Ok(Self {
            root: Value::Object(map),
        })
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn probe<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        probe_value(&self.root, path)
    }

    pub fn text_at<S: AsRef<str>>(&self, path: &[S]) -> Option<&str> {
        self.probe(path).and_then(node_text)
    }

    pub fn description(&self) -> Result<&str, BxhError> {
        self.text_at(&["bxh", "acquisitiondata", "description"])
            .ok_or_else(|| BxhError::MissingElement("bxh/acquisitiondata/description".to_string()))
    }

    pub fn datarec(&self) -> Option<&Value> {
        let datarec = self.probe(&["bxh", "datarec"])?;
        match datarec {
            Value::Array(items) => items
                .iter()
                .find(|item| attribute(item, "type") == Some("image"))
                .or_else(|| items.first()),
            other => Some(other),
        }
    }

    pub fn image_filename(&self) -> Result<&str, BxhError> {
        self.datarec()
            .and_then(|datarec| datarec.get("filename"))
            .and_then(node_text)
            .ok_or_else(|| BxhError::MissingElement("bxh/datarec/filename".to_string()))
    }

    pub fn dimensions(&self) -> Vec<&Value> {
        self.datarec()
            .and_then(|datarec| datarec.get("dimension"))
            .map(as_list)
            .unwrap_or_default()
    }

    pub fn dimension_of_type(&self, kind: &str) -> Option<&Value> {
        self.dimensions()
            .into_iter()
            .find(|dimension| attribute(dimension, "type") == Some(kind))
    }
}

pub fn probe_value<'a, S: AsRef<str>>(root: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        let segment = segment.as_ref();
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn node_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(text) => Some(text.as_str()),
        Value::Object(map) => map.get(TEXT_KEY).and_then(Value::as_str),
        _ => None,
    }
}

pub fn attribute<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value
        .get(format!("{ATTRIBUTE_PREFIX}{name}"))
        .and_then(Value::as_str)
}

pub fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn element_to_value(node: Node<'_, '_>) -> Value {
    let mut map = Map::new();
    for attr in node.attributes() {
        map.insert(
            format!("{ATTRIBUTE_PREFIX}{}", attr.name()),
            Value::String(attr.value().to_string()),
        );
    }

    let mut text = String::new();
    for child in node.children() {
        if child.is_element() {
            let name = child.tag_name().name().to_string();
            let value = element_to_value(child);
            match map.get_mut(&name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(name, value);
                }
            }
        } else if child.is_text() {
            if let Some(chunk) = child.text() {
                text.push_str(chunk);
            }
        }
    }

    let text = text.trim();
    if map.is_empty() {
        if text.is_empty() {
            return Value::Null;
        }
        return Value::String(text.to_string());
    }
    if !text.is_empty() {
        map.insert(TEXT_KEY.to_string(), Value::String(text.to_string()));
    }
    Value::Object(map)
}

/// Location of the image payload a BXH file describes. When the literal file
/// is absent a `.gz` sibling is preferred; otherwise the literal path is
/// returned and the copy stage reports it.
pub fn resolve_image(tree: &MetadataTree, bxh_dir: &Path) -> Result<PathBuf, BxhError> {
    let literal = bxh_dir.join(tree.image_filename()?);
    if literal.exists() {
        return Ok(literal);
    }
    info!(path = %literal.display(), "image named in bxh not found, looking for gzip variant");
    let mut compressed = literal.clone().into_os_string();
    compressed.push(GZIP_SUFFIX);
    let compressed = PathBuf::from(compressed);
    if compressed.exists() {
        debug!(path = %compressed.display(), "found gzip variant of image");
        return Ok(compressed);
    }
    Ok(literal)
}
