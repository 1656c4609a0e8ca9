use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::{DataId, EntityKey, Entities, Modality};
use crate::error::BxhError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LabelValue {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::Text(value) => write!(f, "{value}"),
            LabelValue::Number(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MatchEntry {
    #[serde(default)]
    pub task: Option<LabelValue>,
    #[serde(default)]
    pub acq: Option<LabelValue>,
    #[serde(default)]
    pub ce: Option<LabelValue>,
    #[serde(default)]
    pub rec: Option<LabelValue>,
    #[serde(default)]
    pub dir: Option<LabelValue>,
    #[serde(default)]
    pub run: Option<LabelValue>,
    #[serde(default)]
    pub echo: Option<LabelValue>,
    #[serde(default, rename = "mod")]
    pub modifier: Option<LabelValue>,
    #[serde(default)]
    pub tsv_file: Option<PathBuf>,
}

impl MatchEntry {
    pub fn entities(&self) -> Entities {
        [
            (EntityKey::Task, &self.task),
            (EntityKey::Acq, &self.acq),
            (EntityKey::Ce, &self.ce),
            (EntityKey::Rec, &self.rec),
            (EntityKey::Dir, &self.dir),
            (EntityKey::Run, &self.run),
            (EntityKey::Echo, &self.echo),
            (EntityKey::Mod, &self.modifier),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|value| (key, value.to_string())))
        .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub sub: LabelValue,
    #[serde(default)]
    pub ses: Option<LabelValue>,
    #[serde(default)]
    pub funcs: BTreeMap<String, MatchEntry>,
    #[serde(default)]
    pub anats: BTreeMap<String, MatchEntry>,
    #[serde(default)]
    pub dwis: BTreeMap<String, MatchEntry>,
    #[serde(default)]
    pub fmaps: BTreeMap<String, MatchEntry>,
}

impl SessionConfig {
    pub fn subject_id(&self) -> String {
        self.sub.to_string()
    }

    pub fn session_id(&self) -> String {
        self.ses
            .as_ref()
            .map(|ses| ses.to_string())
            .unwrap_or_default()
    }

    pub fn entries(&self, modality: Modality) -> Option<&BTreeMap<String, MatchEntry>> {
        match modality {
            Modality::Func => Some(&self.funcs),
            Modality::Anat => Some(&self.anats),
            Modality::Dwi => Some(&self.dwis),
            Modality::Fmap => Some(&self.fmaps),
            Modality::Unsupported => None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn session_file_name(data_id: &DataId) -> String {
        format!("bxh2bids_{data_id}.json")
    }

    pub fn resolve(ses_info_dir: &Path, data_id: &DataId) -> Result<SessionConfig, BxhError> {
        let path = ses_info_dir.join(Self::session_file_name(data_id));
        if !path.exists() {
            return Err(BxhError::MissingSessionConfig(path));
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<SessionConfig, BxhError> {
        let content =
            fs::read_to_string(path).map_err(|err| BxhError::Filesystem(err.to_string()))?;
        Self::parse(&content).map_err(|message| BxhError::ConfigParse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(content: &str) -> Result<SessionConfig, String> {
        serde_json::from_str(content).map_err(|err| err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub ses_info_dir: PathBuf,
}

impl ProjectLayout {
    pub fn from_project(proj_dir: &Path) -> Self {
        Self {
            source_dir: proj_dir.join("sourcedata"),
            target_dir: proj_dir.join("rawdata"),
            ses_info_dir: proj_dir.join("code").join("bxh2bids_ses_info"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_session_config() {
        let config = ConfigLoader::parse(
            r#"{
                "sub": 101,
                "ses": "day1",
                "funcs": {
                    "005_01": {"task": "rest", "run": 1},
                    "007_01": {"task": "faces", "run": "02", "tsv_file": "/events/faces.tsv"}
                },
                "anats": {"003": {"acq": "mprage"}}
            }"#,
        )
        .unwrap();

        assert_eq!(config.subject_id(), "101");
        assert_eq!(config.session_id(), "day1");
        let faces = &config.funcs["007_01"];
        assert_eq!(faces.entities().get(EntityKey::Run), Some("02"));
        assert_eq!(faces.tsv_file.as_deref(), Some(Path::new("/events/faces.tsv")));
        assert_eq!(config.funcs["005_01"].entities().get(EntityKey::Run), Some("1"));
        assert!(config.entries(Modality::Dwi).unwrap().is_empty());
    }

    #[test]
    fn missing_session_is_empty() {
        let config = ConfigLoader::parse(r#"{"sub": "01"}"#).unwrap();
        assert_eq!(config.session_id(), "");
    }

    #[test]
    fn project_layout_defaults() {
        let layout = ProjectLayout::from_project(Path::new("/study"));
        assert_eq!(layout.source_dir, Path::new("/study/sourcedata"));
        assert_eq!(layout.target_dir, Path::new("/study/rawdata"));
        assert_eq!(layout.ses_info_dir, Path::new("/study/code/bxh2bids_ses_info"));
    }
}
