use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BxhError;

pub const GZIP_SUFFIX: &str = ".gz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Anat,
    Func,
    Dwi,
    Fmap,
    #[serde(rename = "notsupported", alias = "unsupported")]
    Unsupported,
}

impl Modality {
    pub fn directory(&self) -> Option<&'static str> {
        match self {
            Modality::Anat => Some("anat"),
            Modality::Func => Some("func"),
            Modality::Dwi => Some("dwi"),
            Modality::Fmap => Some("fmap"),
            Modality::Unsupported => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Modality::Unsupported)
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Anat => write!(f, "anat"),
            Modality::Func => write!(f, "func"),
            Modality::Dwi => write!(f, "dwi"),
            Modality::Fmap => write!(f, "fmap"),
            Modality::Unsupported => write!(f, "notsupported"),
        }
    }
}

impl FromStr for Modality {
    type Err = BxhError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "anat" => Ok(Modality::Anat),
            "func" => Ok(Modality::Func),
            "dwi" => Ok(Modality::Dwi),
            "fmap" => Ok(Modality::Fmap),
            "notsupported" | "unsupported" => Ok(Modality::Unsupported),
            _ => Err(BxhError::InvalidModality(value.to_string())),
        }
    }
}

/// BIDS filename entities this converter emits. Declaration order is the
/// canonical order in which they appear in a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKey {
    Task,
    Acq,
    Ce,
    Rec,
    Dir,
    Run,
    Echo,
    Mod,
}

impl EntityKey {
    pub const ALL: [EntityKey; 8] = [
        EntityKey::Task,
        EntityKey::Acq,
        EntityKey::Ce,
        EntityKey::Rec,
        EntityKey::Dir,
        EntityKey::Run,
        EntityKey::Echo,
        EntityKey::Mod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKey::Task => "task",
            EntityKey::Acq => "acq",
            EntityKey::Ce => "ce",
            EntityKey::Rec => "rec",
            EntityKey::Dir => "dir",
            EntityKey::Run => "run",
            EntityKey::Echo => "echo",
            EntityKey::Mod => "mod",
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKey {
    type Err = BxhError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EntityKey::ALL
            .into_iter()
            .find(|key| key.as_str() == value)
            .ok_or_else(|| BxhError::InvalidEntityKey(value.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Entities(BTreeMap<EntityKey, String>);

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: EntityKey, value: impl Into<String>) -> Option<String> {
        self.0.insert(key, value.into())
    }

    pub fn get(&self, key: EntityKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &str)> {
        self.0.iter().map(|(key, value)| (*key, value.as_str()))
    }

    pub fn merge_missing(&mut self, other: &Entities) {
        for (key, value) in other.iter() {
            self.0.entry(key).or_insert_with(|| value.to_string());
        }
    }
}

impl FromIterator<(EntityKey, String)> for Entities {
    fn from_iter<I: IntoIterator<Item = (EntityKey, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataId(String);

impl DataId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DataId {
    type Err = BxhError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let pattern = Regex::new(r"^\d{8}_\d{5}$")
            .map_err(|err| BxhError::InvalidDataId(err.to_string()))?;
        if !pattern.is_match(normalized) {
            return Err(BxhError::InvalidDataId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxFiles {
    pub events: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionRecord {
    pub index: usize,
    pub metadata_path: PathBuf,
    pub orig_image_path: PathBuf,
    pub modality: Modality,
    pub bids_label: String,
    pub subject_id: String,
    pub session_id: String,
    pub entities: Entities,
    pub aux_files: AuxFiles,
    pub gzip_output: bool,
}

impl AcquisitionRecord {
    pub fn image_is_compressed(&self) -> bool {
        has_gzip_suffix(&self.orig_image_path)
    }

    pub fn output_extension(&self) -> &'static str {
        if self.image_is_compressed() || self.gzip_output {
            ".nii.gz"
        } else {
            ".nii"
        }
    }
}

pub fn has_gzip_suffix(path: &Path) -> bool {
    path.to_string_lossy().ends_with(GZIP_SUFFIX)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn entity_iteration_is_canonical() {
        let mut entities = Entities::new();
        entities.insert(EntityKey::Run, "01");
        entities.insert(EntityKey::Task, "rest");
        entities.insert(EntityKey::Acq, "mb");
        let keys: Vec<_> = entities.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec![EntityKey::Task, EntityKey::Acq, EntityKey::Run]);
    }

    #[test]
    fn entity_key_rejects_unknown() {
        assert_eq!("dir".parse::<EntityKey>().unwrap(), EntityKey::Dir);
        assert_matches!("sub".parse::<EntityKey>(), Err(BxhError::InvalidEntityKey(_)));
    }

    #[test]
    fn parse_data_id() {
        let id: DataId = "20170912_12345".parse().unwrap();
        assert_eq!(id.as_str(), "20170912_12345");
        assert_matches!("2017_12345".parse::<DataId>(), Err(BxhError::InvalidDataId(_)));
    }

    #[test]
    fn modality_parses_legacy_unsupported() {
        assert_eq!("notsupported".parse::<Modality>().unwrap(), Modality::Unsupported);
        assert_eq!(Modality::Dwi.directory(), Some("dwi"));
        assert_eq!(Modality::Unsupported.directory(), None);
    }
}
