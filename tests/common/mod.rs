#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use bxh_bids::config::ProjectLayout;

pub const DATA_ID: &str = "20170912_12345";

/// Scratch project with the sourcedata/rawdata/code layout.
pub struct Study {
    pub dir: TempDir,
    pub layout: ProjectLayout,
}

impl Study {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let proj = dir.path().join("MyStudy");
        let layout = ProjectLayout::from_project(&proj);
        fs::create_dir_all(layout.source_dir.join("Data")).unwrap();
        fs::create_dir_all(&layout.target_dir).unwrap();
        fs::create_dir_all(&layout.ses_info_dir).unwrap();
        Self { dir, layout }
    }

    pub fn scan_dir(&self, data_id: &str, kind: &str) -> PathBuf {
        let dir = self.layout.source_dir.join("Data").join(kind).join(data_id);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Writes `{stem}.bxh` and the image it points at (`{stem}.nii`, or
    /// `{stem}.nii.gz` on disk when `gz_on_disk`).
    pub fn add_scan(
        &self,
        data_id: &str,
        kind: &str,
        stem: &str,
        description: &str,
        body: &str,
        gz_on_disk: bool,
    ) -> PathBuf {
        let dir = self.scan_dir(data_id, kind);
        let image = format!("{stem}.nii");
        let on_disk = if gz_on_disk {
            format!("{image}.gz")
        } else {
            image.clone()
        };
        fs::write(dir.join(on_disk), format!("payload of {stem}")).unwrap();
        let bxh_path = dir.join(format!("{stem}.bxh"));
        fs::write(&bxh_path, bxh(description, &image, body)).unwrap();
        bxh_path
    }

    pub fn write_session(&self, data_id: &str, json: &str) {
        fs::write(
            self.layout.ses_info_dir.join(format!("bxh2bids_{data_id}.json")),
            json,
        )
        .unwrap();
    }

    pub fn target(&self) -> &Path {
        &self.layout.target_dir
    }
}

pub fn bxh(description: &str, image: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<bxh xmlns="http://www.biac.duke.edu/bxh" xmlns:bxhschema="http://www.biac.duke.edu/bxh" version="1.0">
  <acquisitiondata>
    <description>{description}</description>
    <scannermanufacturer>GE MEDICAL SYSTEMS</scannermanufacturer>
    {body}
  </acquisitiondata>
  <datarec type="image">
    <filename>{image}</filename>
    <dimension type="x"><size>64</size></dimension>
    <dimension type="y"><size>64</size></dimension>
    <dimension type="z"><size>4</size><datapoints>1 3 2 4</datapoints></dimension>
    <dimension type="t"><size>3</size>
      <datapoints label="diffusiondirection">
        <value>0 0 0</value>
        <value>0.1 0.2 0.3</value>
        <value>-0.5 0.5 0.0</value>
      </datapoints>
      <datapoints label="bvalues">0 1000 1000</datapoints>
    </dimension>
  </datarec>
</bxh>
"#
    )
}

pub fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

pub fn approx_eq(value: &serde_json::Value, expected: f64) -> bool {
    value
        .as_f64()
        .is_some_and(|actual| (actual - expected).abs() < 1e-9)
}
