use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::Utf8Path;
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::info;

use crate::domain::{DataId, has_gzip_suffix};
use crate::error::BxhError;
use crate::store::{BidsLayout, persist_new};

pub const BXH_EXTENSION: &str = "bxh";
const SOURCE_DATA_DIR: &str = "Data";
const SOURCE_KIND_DIRS: [&str; 2] = ["Anat", "Func"];

pub fn find_bxh_files(source_study_dir: &Path, data_id: &DataId) -> Result<Vec<PathBuf>, BxhError> {
    let data_dir = source_study_dir.join(SOURCE_DATA_DIR);
    if !data_dir.is_dir() {
        return Err(BxhError::InvalidSourceLayout(source_study_dir.to_path_buf()));
    }

    let mut found = Vec::new();
    for kind in SOURCE_KIND_DIRS {
        let dir = data_dir.join(kind).join(data_id.as_str());
        if !dir.is_dir() {
            info!(dir = %dir.display(), "no {kind} data directory for session");
            continue;
        }
        let mut files = fs::read_dir(&dir)
            .map_err(|err| BxhError::Filesystem(format!("read {}: {err}", dir.display())))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|ext| ext.to_str()) == Some(BXH_EXTENSION)
            })
            .collect::<Vec<_>>();
        files.sort();
        for file in &files {
            info!(file = %file.display(), "found bxh file");
        }
        found.extend(files);
    }
    Ok(found)
}

pub fn copy_image(source: &Path, destination: &Utf8Path, gzip: bool) -> Result<(), BxhError> {
    if !gzip || has_gzip_suffix(source) {
        info!(from = %source.display(), to = %destination, "copying image");
        return BidsLayout::copy_new(source, destination);
    }
    if !source.exists() {
        return Err(BxhError::NotFound(source.to_path_buf()));
    }
    info!(from = %source.display(), to = %destination, "compressing image");
    let mut input = fs::File::open(source).map_err(|err| BxhError::Filesystem(err.to_string()))?;
    let tmp = BidsLayout::temp_beside(destination)?;
    let mut encoder = GzEncoder::new(tmp, Compression::default());
    io::copy(&mut input, &mut encoder).map_err(|err| BxhError::Filesystem(err.to_string()))?;
    let tmp = encoder
        .finish()
        .map_err(|err| BxhError::Filesystem(err.to_string()))?;
    persist_new(tmp, destination.as_std_path())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;
    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn finds_bxh_in_anat_and_func() {
        let dir = tempfile::tempdir().unwrap();
        let id: DataId = "20170912_12345".parse().unwrap();
        let anat = dir.path().join("Data/Anat/20170912_12345");
        let func = dir.path().join("Data/Func/20170912_12345");
        fs::create_dir_all(&anat).unwrap();
        fs::create_dir_all(&func).unwrap();
        fs::write(anat.join("series_003.bxh"), "").unwrap();
        fs::write(anat.join("series_003.nii.gz"), "").unwrap();
        fs::write(func.join("series_007.bxh"), "").unwrap();
        fs::write(func.join("series_005.bxh"), "").unwrap();

        let files = find_bxh_files(dir.path(), &id).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["series_003.bxh", "series_005.bxh", "series_007.bxh"]);
    }

    #[test]
    fn source_without_data_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let id: DataId = "20170912_12345".parse().unwrap();
        assert_matches!(find_bxh_files(dir.path(), &id), Err(BxhError::InvalidSourceLayout(_)));
    }

    #[test]
    fn gzip_copy_round_trips_payload() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("image.nii");
        fs::write(&source, b"nifti payload").unwrap();
        let destination = Utf8PathBuf::from_path_buf(dir.path().join("out.nii.gz")).unwrap();

        copy_image(&source, &destination, true).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(fs::File::open(destination.as_std_path()).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "nifti payload");
        assert_matches!(
            copy_image(&source, &destination, true),
            Err(BxhError::OutputExists(_))
        );
    }
}
