use std::collections::BTreeMap;

use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::error::BxhError;
use crate::metadata::{MetadataTree, node_text};
use crate::templates::{DescriptorSpec, FieldStyle};

pub type FieldMap = BTreeMap<String, Value>;

pub fn extract(spec: &DescriptorSpec, tree: &MetadataTree) -> Result<FieldMap, BxhError> {
    let mut fields = FieldMap::new();
    for (name, field) in spec.iter() {
        let Some(raw) = tree.probe(&field.location) else {
            debug!(field = name, "field not found in bxh");
            continue;
        };
        let value = match &field.style {
            FieldStyle::String => Value::String(stringify(raw)),
            FieldStyle::Float => Value::Number(parse_float(name, raw)?),
            FieldStyle::Int => Value::Number(parse_int(name, raw)?),
            FieldStyle::Other(style) => {
                warn!(field = name, style = style.as_str(), "unknown BIDS style, using original value");
                raw.clone()
            }
        };
        fields.insert(name.to_string(), value);
    }
    Ok(fields)
}

pub fn stringify(value: &Value) -> String {
    match node_text(value) {
        Some(text) => text.to_string(),
        None => match value {
            Value::Null => String::new(),
            other => other.to_string(),
        },
    }
}

fn parse_float(name: &str, raw: &Value) -> Result<Number, BxhError> {
    let text = stringify(raw);
    text.trim()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| malformed(name, "float", &text))
}

fn parse_int(name: &str, raw: &Value) -> Result<Number, BxhError> {
    let text = stringify(raw);
    text.trim()
        .parse::<i64>()
        .map(Number::from)
        .map_err(|_| malformed(name, "int", &text))
}

fn malformed(field: &str, expected: &str, value: &str) -> BxhError {
    BxhError::MalformedField {
        field: field.to_string(),
        expected: expected.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::templates::FieldSpec;

    fn spec(entries: &[(&str, &[&str], &str)]) -> DescriptorSpec {
        entries
            .iter()
            .map(|(name, location, style)| {
                (
                    name.to_string(),
                    FieldSpec {
                        location: location.iter().map(|s| s.to_string()).collect(),
                        style: FieldStyle::from(style.to_string()),
                    },
                )
            })
            .collect()
    }

    fn tree() -> MetadataTree {
        MetadataTree::from_value(json!({
            "bxh": {
                "acquisitiondata": {
                    "tr": {"@units": "ms", "#text": "2000"},
                    "te": "30",
                    "flipangle": "ninety",
                    "scannermanufacturer": "GE",
                    "nslices": "34",
                    "extra": {"a": "1"}
                }
            }
        }))
    }

    #[test]
    fn coerces_declared_types() {
        let spec = spec(&[
            ("RepetitionTime", &["bxh", "acquisitiondata", "tr"], "float"),
            ("Manufacturer", &["bxh", "acquisitiondata", "scannermanufacturer"], "string"),
            ("NumberOfSlices", &["bxh", "acquisitiondata", "nslices"], "int"),
        ]);
        let fields = extract(&spec, &tree()).unwrap();
        assert_eq!(fields["RepetitionTime"], json!(2000.0));
        assert_eq!(fields["Manufacturer"], json!("GE"));
        assert_eq!(fields["NumberOfSlices"], json!(34));
    }

    #[test]
    fn missing_location_is_omitted() {
        let spec = spec(&[("InversionTime", &["bxh", "acquisitiondata", "ti"], "float")]);
        let fields = extract(&spec, &tree()).unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn non_numeric_float_is_malformed() {
        let spec = spec(&[("FlipAngle", &["bxh", "acquisitiondata", "flipangle"], "float")]);
        let err = extract(&spec, &tree()).unwrap_err();
        assert_matches!(err, BxhError::MalformedField { field, .. } if field == "FlipAngle");
    }

    #[test]
    fn unknown_style_copies_value_through() {
        let spec = spec(&[("Extra", &["bxh", "acquisitiondata", "extra"], "dict")]);
        let fields = extract(&spec, &tree()).unwrap();
        assert_eq!(fields["Extra"], json!({"a": "1"}));
    }
}
