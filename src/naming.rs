use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use regex::Regex;
use tracing::{info, warn};

use crate::domain::{AcquisitionRecord, EntityKey};
use crate::error::BxhError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputName {
    pub name: String,
    pub prefix: String,
    pub extension: &'static str,
}

impl OutputName {
    pub fn stem(&self) -> &str {
        self.name
            .strip_suffix(self.extension)
            .unwrap_or(self.name.as_str())
    }

    pub fn sibling(&self, extension: &str) -> String {
        format!("{}{extension}", self.stem())
    }
}

pub fn build_name(record: &AcquisitionRecord) -> OutputName {
    let mut prefix = format!("sub-{}", record.subject_id);
    if !record.session_id.is_empty() {
        prefix.push_str(&format!("_ses-{}", record.session_id));
    }
    for (key, value) in record.entities.iter() {
        prefix.push_str(&format!("_{key}-{value}"));
    }
    let extension = record.output_extension();
    let name = format!("{prefix}_{}{extension}", record.bids_label);
    OutputName {
        name,
        prefix,
        extension,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedAcquisition {
    pub record: AcquisitionRecord,
    pub name: OutputName,
}

impl NamedAcquisition {
    pub fn new(record: AcquisitionRecord) -> Self {
        let name = build_name(&record);
        Self { record, name }
    }
}

pub fn tentative_names(records: Vec<AcquisitionRecord>) -> Vec<NamedAcquisition> {
    records
        .into_iter()
        .filter(|record| record.modality.is_supported())
        .map(NamedAcquisition::new)
        .collect()
}

/// Second naming pass over the whole session. Acquisitions sharing a name are
/// numbered `run-01`, `run-02`, ... in order of the sequence number at the end
/// of their source file name (enumeration order breaks ties).
pub fn resolve_collisions(
    tentative: Vec<NamedAcquisition>,
) -> Result<Vec<NamedAcquisition>, BxhError> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (position, named) in tentative.iter().enumerate() {
        groups
            .entry(named.name.stem().to_string())
            .or_default()
            .push(position);
    }

    let mut resolved: Vec<Option<NamedAcquisition>> = tentative.into_iter().map(Some).collect();
    for (name, mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        let carries_run = members.iter().any(|&position| {
            resolved[position]
                .as_ref()
                .is_some_and(|named| named.record.entities.contains(EntityKey::Run))
        });
        if carries_run {
            return Err(BxhError::SessionConfigConflict { name });
        }

        warn!(name = name.as_str(), count = members.len(), "output name collision, assigning run numbers");
        members.sort_by_key(|&position| {
            let record = resolved[position].as_ref().map(|named| &named.record);
            (
                record
                    .and_then(|record| source_sequence_number(&record.metadata_path))
                    .unwrap_or(u64::MAX),
                record.map(|record| record.index).unwrap_or(usize::MAX),
            )
        });
        for (run, position) in members.into_iter().enumerate() {
            if let Some(named) = resolved[position].take() {
                let mut record = named.record;
                record
                    .entities
                    .insert(EntityKey::Run, format!("{:02}", run + 1));
                let renamed = NamedAcquisition::new(record);
                info!(from = name.as_str(), to = renamed.name.name.as_str(), "renamed acquisition");
                resolved[position] = Some(renamed);
            }
        }
    }

    let resolved: Vec<NamedAcquisition> = resolved.into_iter().flatten().collect();
    let mut seen = HashSet::new();
    for named in &resolved {
        if !seen.insert(named.name.stem()) {
            return Err(BxhError::SessionConfigConflict {
                name: named.name.name.clone(),
            });
        }
    }
    Ok(resolved)
}

pub fn source_sequence_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_string_lossy();
    let pattern = Regex::new(r"(\d+)$").ok()?;
    pattern
        .captures(&stem)
        .and_then(|captures| captures.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}
