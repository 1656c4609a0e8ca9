use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ConfigLoader, ProjectLayout};
use crate::domain::DataId;
use crate::error::BxhError;
use crate::fs_util::find_bxh_files;
use crate::metadata::MetadataTree;
use crate::session::{ConvertOptions, SessionConverter, SessionReport};
use crate::store::BidsLayout;
use crate::templates::Templates;

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<SessionSuccess>,
    pub failed: Vec<SessionFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSuccess {
    pub data_id: String,
    pub report: SessionReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionFailure {
    pub data_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub data_id: String,
    pub known: Vec<DescriptionEntry>,
    pub unknown: Vec<DescriptionEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DescriptionEntry {
    pub file: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App {
    layout: ProjectLayout,
    templates: Templates,
    options: ConvertOptions,
}

impl App {
    pub fn new(layout: ProjectLayout, templates: Templates, options: ConvertOptions) -> Self {
        Self {
            layout,
            templates,
            options,
        }
    }

    pub fn convert(&self, data_ids: &[String], sink: &dyn ProgressSink) -> BatchReport {
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for raw in data_ids {
            sink.event(ProgressEvent {
                message: format!("phase=Convert; session {raw}"),
            });
            let result = raw
                .parse::<DataId>()
                .and_then(|data_id| self.convert_session(&data_id));
            match result {
                Ok(report) => {
                    info!(data_id = raw.as_str(), files = report.outputs.len(), "session converted");
                    succeeded.push(SessionSuccess {
                        data_id: raw.clone(),
                        report,
                    });
                }
                Err(err) => {
                    warn!(data_id = raw.as_str(), error = %err, "session failed to convert");
                    sink.event(ProgressEvent {
                        message: format!("phase=Convert; session {raw} failed: {err}"),
                    });
                    failed.push(SessionFailure {
                        data_id: raw.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        BatchReport { succeeded, failed }
    }

    pub fn convert_session(&self, data_id: &DataId) -> Result<SessionReport, BxhError> {
        info!(
            %data_id,
            source = %self.layout.source_dir.display(),
            target = %self.layout.target_dir.display(),
            "converting session"
        );
        let config = ConfigLoader::resolve(&self.layout.ses_info_dir, data_id)?;
        let files = find_bxh_files(&self.layout.source_dir, data_id)?;
        let target = BidsLayout::new(&self.layout.target_dir)?;
        SessionConverter::new(&self.templates, &target, self.options).convert(&files, &config)
    }

    pub fn check(&self, data_id: &DataId, sink: &dyn ProgressSink) -> Result<CheckResult, BxhError> {
        let files = find_bxh_files(&self.layout.source_dir, data_id)?;
        sink.event(ProgressEvent {
            message: format!("phase=Check; {} bxh files", files.len()),
        });

        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for file in files {
            let tree = MetadataTree::load(&file)?;
            let entry = DescriptionEntry {
                file: file.display().to_string(),
                description: tree.description()?.to_string(),
            };
            if self.templates.rules.contains(&entry.description) {
                known.push(entry);
            } else {
                warn!(file = entry.file.as_str(), description = entry.description.as_str(), "scan description not in modality rules");
                unknown.push(entry);
            }
        }
        Ok(CheckResult {
            data_id: data_id.to_string(),
            known,
            unknown,
        })
    }
}
