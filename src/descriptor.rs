use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::Modality;
use crate::error::BxhError;
use crate::fields::{FieldMap, stringify};
use crate::metadata::{MetadataTree, as_list, node_text};
use crate::naming::OutputName;

/// Repetition times above this are taken to be in milliseconds.
pub const REPETITION_TIME_MS_THRESHOLD: f64 = 50.0;
/// Echo times above this are taken to be in milliseconds.
pub const ECHO_TIME_MS_THRESHOLD: f64 = 1.0;

const REPETITION_TIME: &str = "RepetitionTime";
const ECHO_TIME: &str = "EchoTime";

const DUAL_ECHO_LABELS: [&str; 3] = ["phasediff", "magnitude1", "magnitude2"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sidecar {
    #[serde(rename = "RepetitionTime", skip_serializing_if = "Option::is_none")]
    pub repetition_time: Option<f64>,
    #[serde(rename = "EchoTime", skip_serializing_if = "Option::is_none")]
    pub echo_time: Option<f64>,
    #[serde(rename = "EchoTime1", skip_serializing_if = "Option::is_none")]
    pub echo_time1: Option<f64>,
    #[serde(rename = "EchoTime2", skip_serializing_if = "Option::is_none")]
    pub echo_time2: Option<f64>,
    #[serde(rename = "TaskName", skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(rename = "SliceTiming", skip_serializing_if = "Option::is_none")]
    pub slice_timing: Option<Vec<f64>>,
    #[serde(flatten)]
    pub fields: FieldMap,
}

pub fn normalize_repetition_time(value: f64) -> f64 {
    if value > REPETITION_TIME_MS_THRESHOLD {
        info!(value, "repetition time greater than 50, assuming milliseconds");
        value / 1000.0
    } else {
        value
    }
}

pub fn normalize_echo_time(value: f64) -> f64 {
    if value > ECHO_TIME_MS_THRESHOLD {
        info!(value, "echo time greater than 1, assuming milliseconds");
        value / 1000.0
    } else {
        value
    }
}

/// Odd slice positions ascending, then even ones: `[1, 3, 2, 4]` for four slices.
pub fn interleaved_order(num_slices: usize) -> Vec<u32> {
    let positions = 1..=num_slices as u32;
    positions
        .clone()
        .filter(|slice| slice % 2 == 1)
        .chain(positions.filter(|slice| slice % 2 == 0))
        .collect()
}

pub fn slice_timing(repetition_time: f64, num_slices: usize, order: &[u32]) -> Vec<f64> {
    let factor = repetition_time / num_slices as f64;
    order
        .iter()
        .map(|slice| factor * f64::from(slice.saturating_sub(1)))
        .collect()
}

pub fn split_dual_echo(raw: &str) -> Result<(f64, f64), BxhError> {
    match parse_echo_values(raw)?.as_slice() {
        [first, second, ..] => Ok((normalize_echo_time(*first), normalize_echo_time(*second))),
        _ => Err(BxhError::MissingSecondEcho(raw.to_string())),
    }
}

pub fn task_name_from(output_name: &str) -> Option<String> {
    output_name
        .split('_')
        .find_map(|part| part.strip_prefix("task-"))
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gradients {
    pub bvals: String,
    pub bvecs: [String; 3],
}

impl Gradients {
    /// Reads the fourth dimension of the image record: its first datapoints
    /// list holds one direction triplet per volume, its second the b-values.
    pub fn from_tree(tree: &MetadataTree) -> Result<Self, BxhError> {
        let dimensions = tree.dimensions();
        let dimension = dimensions
            .get(3)
            .ok_or_else(|| BxhError::MissingElement("bxh/datarec/dimension[3]".to_string()))?;
        let datapoints = dimension
            .get("datapoints")
            .map(as_list)
            .unwrap_or_default();

        let bvals = datapoints
            .get(1)
            .and_then(|points| node_text(points))
            .ok_or_else(|| BxhError::MissingElement("dimension[3]/datapoints[1]".to_string()))?
            .trim()
            .to_string();

        let directions = datapoints
            .first()
            .and_then(|points| points.get("value"))
            .map(as_list)
            .ok_or_else(|| BxhError::MissingElement("dimension[3]/datapoints[0]/value".to_string()))?;

        let mut rows: [Vec<&str>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for direction in directions {
            let text = node_text(direction).unwrap_or_default();
            let components: Vec<&str> = text.split_whitespace().collect();
            let [x, y, z, ..] = components.as_slice() else {
                return Err(BxhError::MalformedField {
                    field: "bvec".to_string(),
                    expected: "x y z triplet".to_string(),
                    value: text.to_string(),
                });
            };
            rows[0].push(*x);
            rows[1].push(*y);
            rows[2].push(*z);
        }

        Ok(Self {
            bvals,
            bvecs: rows.map(|row| row.join(" ")),
        })
    }

    pub fn bvec_text(&self) -> String {
        self.bvecs.join("\n")
    }
}

pub fn synthesize(
    modality: Modality,
    label: &str,
    mut fields: FieldMap,
    tree: &MetadataTree,
    output: &OutputName,
) -> Result<Sidecar, BxhError> {
    let mut sidecar = Sidecar::default();
    match modality {
        Modality::Func => {
            let tr = take_number(&mut fields, REPETITION_TIME)?
                .map(normalize_repetition_time)
                .ok_or_else(|| BxhError::MissingField(REPETITION_TIME.to_string()))?;
            sidecar.repetition_time = Some(tr);
            sidecar.echo_time = take_number(&mut fields, ECHO_TIME)?.map(normalize_echo_time);
            sidecar.slice_timing = Some(func_slice_timing(tree, tr)?);
            sidecar.task_name = task_name_from(&output.name);
            if sidecar.task_name.is_none() {
                warn!(name = output.name.as_str(), "functional output name carries no task entity");
            }
        }
        Modality::Dwi => {
            sidecar.repetition_time =
                take_number(&mut fields, REPETITION_TIME)?.map(normalize_repetition_time);
            sidecar.echo_time = take_number(&mut fields, ECHO_TIME)?.map(normalize_echo_time);
        }
        Modality::Fmap => {
            sidecar.repetition_time =
                take_number(&mut fields, REPETITION_TIME)?.map(normalize_repetition_time);
            let dual_label = DUAL_ECHO_LABELS.contains(&label);
            match fields.remove(ECHO_TIME) {
                Some(raw) => {
                    let raw = stringify(&raw);
                    let values = parse_echo_values(&raw)?;
                    if values.len() >= 2 || dual_label {
                        let (first, second) = split_dual_echo(&raw)?;
                        sidecar.echo_time1 = Some(first);
                        sidecar.echo_time2 = Some(second);
                    } else {
                        sidecar.echo_time = values.first().copied().map(normalize_echo_time);
                    }
                }
                None if dual_label => return Err(BxhError::MissingSecondEcho(String::new())),
                None => {}
            }
        }
        Modality::Anat => {
            sidecar.echo_time = take_number(&mut fields, ECHO_TIME)?.map(normalize_echo_time);
        }
        Modality::Unsupported => {}
    }
    sidecar.fields = fields;
    Ok(sidecar)
}

fn func_slice_timing(tree: &MetadataTree, repetition_time: f64) -> Result<Vec<f64>, BxhError> {
    let dimension = tree
        .dimension_of_type("z")
        .ok_or_else(|| BxhError::MissingElement("bxh/datarec/dimension[@type=z]".to_string()))?;
    let size_text = dimension
        .get("size")
        .and_then(node_text)
        .ok_or_else(|| BxhError::MissingElement("dimension[@type=z]/size".to_string()))?;
    let num_slices: usize = size_text.trim().parse().map_err(|_| BxhError::MalformedField {
        field: "size".to_string(),
        expected: "int".to_string(),
        value: size_text.to_string(),
    })?;

    let order = match dimension.get("datapoints").and_then(node_text) {
        Some(text) => text
            .split_whitespace()
            .map(|slice| {
                slice.parse::<u32>().map_err(|_| BxhError::MalformedField {
                    field: "datapoints".to_string(),
                    expected: "int".to_string(),
                    value: slice.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => {
            info!(num_slices, "no slice order in bxh, assuming interleaved acquisition");
            interleaved_order(num_slices)
        }
    };
    Ok(slice_timing(repetition_time, num_slices, &order))
}

fn take_number(fields: &mut FieldMap, name: &str) -> Result<Option<f64>, BxhError> {
    let Some(value) = fields.remove(name) else {
        return Ok(None);
    };
    let number = match &value {
        Value::Number(number) => number.as_f64(),
        other => stringify(other).trim().parse().ok(),
    };
    number.map(Some).ok_or_else(|| BxhError::MalformedField {
        field: name.to_string(),
        expected: "float".to_string(),
        value: stringify(&value),
    })
}

fn parse_echo_values(raw: &str) -> Result<Vec<f64>, BxhError> {
    raw.split_whitespace()
        .map(|value| {
            value.parse::<f64>().map_err(|_| BxhError::MalformedField {
                field: ECHO_TIME.to_string(),
                expected: "float".to_string(),
                value: raw.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn approx(left: &[f64], right: &[f64]) {
        assert_eq!(left.len(), right.len());
        for (l, r) in left.iter().zip(right) {
            assert!((l - r).abs() < 1e-12, "{left:?} != {right:?}");
        }
    }

    fn output(name: &str) -> OutputName {
        OutputName {
            name: name.to_string(),
            prefix: String::new(),
            extension: ".nii.gz",
        }
    }

    #[test]
    fn unit_normalization_thresholds() {
        assert_eq!(normalize_repetition_time(2000.0), 2.0);
        assert_eq!(normalize_repetition_time(50.0), 50.0);
        assert_eq!(normalize_repetition_time(2.0), 2.0);
        assert_eq!(normalize_echo_time(30.0), 0.03);
        assert_eq!(normalize_echo_time(1.0), 1.0);
        assert_eq!(normalize_echo_time(0.03), 0.03);
    }

    #[test]
    fn slice_timing_from_explicit_order() {
        approx(&slice_timing(2.0, 4, &[1, 3, 2, 4]), &[0.0, 1.0, 0.5, 1.5]);
    }

    #[test]
    fn interleaved_is_odd_then_even() {
        assert_eq!(interleaved_order(4), vec![1, 3, 2, 4]);
        assert_eq!(interleaved_order(5), vec![1, 3, 5, 2, 4]);
        approx(
            &slice_timing(2.0, 4, &interleaved_order(4)),
            &slice_timing(2.0, 4, &[1, 3, 2, 4]),
        );
    }

    #[test]
    fn dual_echo_split_normalizes_each() {
        let (first, second) = split_dual_echo("0.005 0.0072").unwrap();
        assert_eq!((first, second), (0.005, 0.0072));
        let (first, second) = split_dual_echo("5 7.2").unwrap();
        assert!((first - 0.005).abs() < 1e-12);
        assert!((second - 0.0072).abs() < 1e-12);
        assert_matches!(split_dual_echo("5"), Err(BxhError::MissingSecondEcho(_)));
    }

    #[test]
    fn fmap_sidecar_replaces_combined_echo() {
        let tree = MetadataTree::from_value(json!({"bxh": {}}));
        let mut fields = FieldMap::new();
        fields.insert("EchoTime".to_string(), json!("5 7.2"));
        fields.insert("Manufacturer".to_string(), json!("GE"));
        let sidecar = synthesize(Modality::Fmap, "phasediff", fields, &tree, &output("x")).unwrap();
        let value = serde_json::to_value(&sidecar).unwrap();
        assert!(value.get("EchoTime").is_none());
        assert!((value["EchoTime2"].as_f64().unwrap() - 0.0072).abs() < 1e-12);
        assert_eq!(value["Manufacturer"], json!("GE"));
    }

    #[test]
    fn phasediff_with_single_echo_fails() {
        let tree = MetadataTree::from_value(json!({"bxh": {}}));
        let mut fields = FieldMap::new();
        fields.insert("EchoTime".to_string(), json!("5"));
        let err = synthesize(Modality::Fmap, "phasediff", fields, &tree, &output("x")).unwrap_err();
        assert_matches!(err, BxhError::MissingSecondEcho(_));
    }

    #[test]
    fn phasediff_without_echo_time_fails() {
        let tree = MetadataTree::from_value(json!({"bxh": {}}));
        let mut fields = FieldMap::new();
        fields.insert("RepetitionTime".to_string(), json!(700.0));
        let err = synthesize(Modality::Fmap, "magnitude1", fields, &tree, &output("x")).unwrap_err();
        assert_matches!(err, BxhError::MissingSecondEcho(_));
    }

    #[test]
    fn single_echo_fmap_without_echo_time_is_accepted() {
        let tree = MetadataTree::from_value(json!({"bxh": {}}));
        let sidecar =
            synthesize(Modality::Fmap, "fieldmap", FieldMap::new(), &tree, &output("x")).unwrap();
        assert_eq!(sidecar.echo_time, None);
        assert_eq!(sidecar.echo_time1, None);
    }

    #[test]
    fn func_sidecar_derives_task_and_timing() {
        let tree = MetadataTree::from_value(json!({
            "bxh": {"datarec": {"dimension": [
                {"@type": "x", "size": "64"},
                {"@type": "z", "size": "4"}
            ]}}
        }));
        let mut fields = FieldMap::new();
        fields.insert("RepetitionTime".to_string(), json!(2000.0));
        fields.insert("EchoTime".to_string(), json!(30.0));
        let sidecar = synthesize(
            Modality::Func,
            "bold",
            fields,
            &tree,
            &output("sub-01_task-rest_run-01_bold.nii.gz"),
        )
        .unwrap();
        assert_eq!(sidecar.repetition_time, Some(2.0));
        assert_eq!(sidecar.echo_time, Some(0.03));
        assert_eq!(sidecar.task_name.as_deref(), Some("rest"));
        approx(sidecar.slice_timing.as_deref().unwrap(), &[0.0, 1.0, 0.5, 1.5]);
    }

    #[test]
    fn func_without_repetition_time_fails() {
        let tree = MetadataTree::from_value(json!({"bxh": {}}));
        let err = synthesize(Modality::Func, "bold", FieldMap::new(), &tree, &output("x")).unwrap_err();
        assert_matches!(err, BxhError::MissingField(field) if field == "RepetitionTime");
    }

    #[test]
    fn gradient_rows_are_per_axis() {
        let tree = MetadataTree::from_value(json!({
            "bxh": {"datarec": {"dimension": [
                {"@type": "x"}, {"@type": "y"}, {"@type": "z"},
                {"@type": "t", "datapoints": [
                    {"@label": "diffusiondirection", "value": ["0 0 0", "0.1 0.2 0.3", "-0.5 0.5 0.0"]},
                    {"@label": "bvalues", "#text": "0 1000 1000"}
                ]}
            ]}}
        }));
        let gradients = Gradients::from_tree(&tree).unwrap();
        assert_eq!(gradients.bvals, "0 1000 1000");
        assert_eq!(gradients.bvecs, [
            "0 0.1 -0.5".to_string(),
            "0 0.2 0.5".to_string(),
            "0 0.3 0.0".to_string(),
        ]);
        assert_eq!(gradients.bvec_text(), "0 0.1 -0.5\n0 0.2 0.5\n0 0.3 0.0");
    }
}
