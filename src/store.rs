use std::fs;
use std::io::{self, Write};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::domain::Modality;
use crate::error::BxhError;

pub const BIDS_VERSION: &str = "1.0.2";
pub const DATASET_DESCRIPTION: &str = "dataset_description.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetDescription {
    #[serde(rename = "BIDSVersion")]
    pub bids_version: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// Target BIDS dataset on disk. Nothing written through it ever replaces an
/// existing file.
#[derive(Debug, Clone)]
pub struct BidsLayout {
    root: Utf8PathBuf,
}

impl BidsLayout {
    pub fn new(root: &Path) -> Result<Self, BxhError> {
        let root = Utf8PathBuf::from_path_buf(root.to_path_buf())
            .map_err(|path| BxhError::Filesystem(format!("non UTF-8 path: {}", path.display())))?;
        Ok(Self { root })
    }

    pub fn ensure_root(&self) -> Result<(), BxhError> {
        if !self.root.as_std_path().is_dir() {
            return Err(BxhError::MissingTarget(self.root.clone().into_std_path_buf()));
        }
        Ok(())
    }

    pub fn modality_dir(&self, subject_id: &str, session_id: &str, modality: Modality) -> Utf8PathBuf {
        let mut dir = self.root.join(format!("sub-{subject_id}"));
        if !session_id.is_empty() {
            dir.push(format!("ses-{session_id}"));
        }
        if let Some(name) = modality.directory() {
            dir.push(name);
        }
        dir
    }

    pub fn dataset_description_path(&self) -> Utf8PathBuf {
        self.root.join(DATASET_DESCRIPTION)
    }

    pub fn study_name(&self) -> String {
        self.root.file_name().unwrap_or(self.root.as_str()).to_string()
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), BxhError> {
        if !path.as_std_path().exists() {
            info!(path = %path, "creating directory");
        }
        fs::create_dir_all(path.as_std_path()).map_err(|err| BxhError::Filesystem(err.to_string()))
    }

    pub fn write_new(path: &Utf8Path, content: &[u8]) -> Result<(), BxhError> {
        let mut tmp = Self::temp_beside(path)?;
        tmp.write_all(content)
            .map_err(|err| BxhError::Filesystem(err.to_string()))?;
        persist_new(tmp, path.as_std_path())
    }

    pub fn write_json_new<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), BxhError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| BxhError::Filesystem(err.to_string()))?;
        Self::write_new(path, &content)
    }

    pub fn copy_new(source: &Path, destination: &Utf8Path) -> Result<(), BxhError> {
        if !source.exists() {
            return Err(BxhError::NotFound(source.to_path_buf()));
        }
        let mut input =
            fs::File::open(source).map_err(|err| BxhError::Filesystem(err.to_string()))?;
        let mut tmp = Self::temp_beside(destination)?;
        io::copy(&mut input, &mut tmp).map_err(|err| BxhError::Filesystem(err.to_string()))?;
        persist_new(tmp, destination.as_std_path())
    }

    pub fn write_dataset_description(&self, name: Option<&str>) -> Result<bool, BxhError> {
        self.ensure_root()?;
        let path = self.dataset_description_path();
        if path.as_std_path().exists() {
            warn!(path = %path, "dataset description already exists");
            return Ok(false);
        }
        let description = DatasetDescription {
            bids_version: BIDS_VERSION.to_string(),
            name: name.map(str::to_string).unwrap_or_else(|| self.study_name()),
        };
        info!(path = %path, "writing dataset description");
        match Self::write_json_new(&path, &description) {
            Ok(()) => Ok(true),
            // another session wrote it first; content is the same
            Err(BxhError::OutputExists(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn temp_beside(path: &Utf8Path) -> Result<NamedTempFile, BxhError> {
        let dir = path.parent().unwrap_or(Utf8Path::new("."));
        NamedTempFile::new_in(dir.as_std_path()).map_err(|err| BxhError::Filesystem(err.to_string()))
    }
}

pub(crate) fn persist_new(tmp: NamedTempFile, path: &Path) -> Result<(), BxhError> {
    tmp.persist_noclobber(path).map_err(|err| {
        if err.error.kind() == io::ErrorKind::AlreadyExists {
            BxhError::OutputExists(path.to_path_buf())
        } else {
            BxhError::Filesystem(err.error.to_string())
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn modality_dir_with_and_without_session() {
        let layout = BidsLayout::new(Path::new("/bids/study")).unwrap();
        assert_eq!(
            layout.modality_dir("01", "2", Modality::Func),
            Utf8PathBuf::from("/bids/study/sub-01/ses-2/func")
        );
        assert_eq!(
            layout.modality_dir("01", "", Modality::Anat),
            Utf8PathBuf::from("/bids/study/sub-01/anat")
        );
        assert_eq!(layout.study_name(), "study");
    }

    #[test]
    fn write_new_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("a.json")).unwrap();
        BidsLayout::write_new(&path, b"first").unwrap();
        let err = BidsLayout::write_new(&path, b"second").unwrap_err();
        assert_matches!(err, BxhError::OutputExists(_));
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "first");
    }

    #[test]
    fn dataset_description_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("MyStudy");
        fs::create_dir(&root).unwrap();
        let layout = BidsLayout::new(&root).unwrap();
        assert!(layout.write_dataset_description(None).unwrap());
        assert!(!layout.write_dataset_description(None).unwrap());
        let content = fs::read_to_string(root.join(DATASET_DESCRIPTION)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["Name"], "MyStudy");
        assert_eq!(value["BIDSVersion"], BIDS_VERSION);
    }
}
