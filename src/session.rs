use std::collections::HashSet;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::classify::{Strategy, classify};
use crate::config::SessionConfig;
use crate::descriptor::{Gradients, Sidecar, synthesize};
use crate::domain::{AcquisitionRecord, AuxFiles, Modality};
use crate::error::BxhError;
use crate::fields::extract;
use crate::fs_util::copy_image;
use crate::matcher::match_acquisition;
use crate::metadata::{MetadataTree, resolve_image};
use crate::naming::{NamedAcquisition, resolve_collisions, tentative_names};
use crate::store::BidsLayout;
use crate::templates::Templates;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Start,
    Enumerated,
    Classified,
    Matched,
    Named,
    CollisionResolved,
    Converted,
    Done,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertOptions {
    pub automatic: bool,
    pub gzip: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub subject_id: String,
    pub session_id: String,
    pub outputs: Vec<OutputRecord>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputRecord {
    pub source: String,
    pub modality: String,
    pub files: Vec<String>,
}

struct Loaded {
    path: PathBuf,
    tree: MetadataTree,
    image: PathBuf,
    description: String,
}

struct PlannedOutput {
    named: NamedAcquisition,
    dir: Utf8PathBuf,
    sidecar: Sidecar,
    gradients: Option<Gradients>,
}

impl PlannedOutput {
    fn image_path(&self) -> Utf8PathBuf {
        self.dir.join(&self.named.name.name)
    }

    fn sidecar_path(&self) -> Utf8PathBuf {
        self.dir.join(self.named.name.sibling(".json"))
    }

    fn bval_path(&self) -> Utf8PathBuf {
        self.dir.join(self.named.name.sibling(".bval"))
    }

    fn bvec_path(&self) -> Utf8PathBuf {
        self.dir.join(self.named.name.sibling(".bvec"))
    }

    fn events_path(&self) -> Utf8PathBuf {
        self.dir
            .join(format!("{}_events.tsv", self.named.name.prefix))
    }

    fn destinations(&self) -> Vec<Utf8PathBuf> {
        let mut paths = vec![self.image_path(), self.sidecar_path()];
        if self.gradients.is_some() {
            paths.push(self.bval_path());
            paths.push(self.bvec_path());
        }
        if self.named.record.aux_files.events.is_some() {
            paths.push(self.events_path());
        }
        paths
    }
}

pub struct SessionConverter<'a> {
    templates: &'a Templates,
    layout: &'a BidsLayout,
    options: ConvertOptions,
}

impl<'a> SessionConverter<'a> {
    pub fn new(templates: &'a Templates, layout: &'a BidsLayout, options: ConvertOptions) -> Self {
        Self {
            templates,
            layout,
            options,
        }
    }

    pub fn convert(
        &self,
        metadata_files: &[PathBuf],
        config: &SessionConfig,
    ) -> Result<SessionReport, BxhError> {
        let mut phase = SessionPhase::Start;
        let result = self.run(metadata_files, config, &mut phase);
        if let Err(err) = &result {
            error!(?phase, error = %err, "session failed");
        }
        result
    }

    fn run(
        &self,
        metadata_files: &[PathBuf],
        config: &SessionConfig,
        phase: &mut SessionPhase,
    ) -> Result<SessionReport, BxhError> {
        self.layout.ensure_root()?;

        let loaded = metadata_files
            .iter()
            .map(|path| load(path))
            .collect::<Result<Vec<_>, _>>()?;
        advance(phase, SessionPhase::Enumerated);

        let strategy = if self.options.automatic {
            Strategy::Automatic
        } else {
            Strategy::Explicit(&self.templates.rules)
        };
        let classifications = loaded
            .iter()
            .map(|item| {
                info!(file = %item.path.display(), description = item.description.as_str(), "classifying");
                classify(strategy, &item.description)
            })
            .collect::<Result<Vec<_>, _>>()?;
        advance(phase, SessionPhase::Classified);

        let mut records = Vec::with_capacity(loaded.len());
        let mut skipped = Vec::new();
        for (index, (item, classification)) in loaded.iter().zip(classifications).enumerate() {
            if !classification.modality.is_supported() {
                info!(file = %item.path.display(), "scan type not supported, skipping");
                skipped.push(item.path.display().to_string());
                continue;
            }
            let mut entities = classification.entities;
            let mut aux_files = AuxFiles::default();
            let described = self.options.automatic && !entities.is_empty();
            if !described {
                let file_name = item
                    .image
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default();
                if let Some(matched) = match_acquisition(classification.modality, &file_name, config)? {
                    entities.merge_missing(&matched.entities);
                    aux_files.events = matched.events;
                }
            }
            records.push(AcquisitionRecord {
                index,
                metadata_path: item.path.clone(),
                orig_image_path: item.image.clone(),
                modality: classification.modality,
                bids_label: classification.label,
                subject_id: config.subject_id(),
                session_id: config.session_id(),
                entities,
                aux_files,
                gzip_output: self.options.gzip,
            });
        }
        advance(phase, SessionPhase::Matched);

        let tentative = tentative_names(records);
        advance(phase, SessionPhase::Named);
        let named = resolve_collisions(tentative)?;
        advance(phase, SessionPhase::CollisionResolved);

        let plans = named
            .into_iter()
            .map(|named| {
                let tree = &loaded[named.record.index].tree;
                self.plan(named, tree)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut planned = HashSet::new();
        for plan in &plans {
            for path in plan.destinations() {
                if path.as_std_path().exists() {
                    return Err(BxhError::OutputExists(path.into_std_path_buf()));
                }
                if !planned.insert(path.clone()) {
                    return Err(BxhError::SessionConfigConflict {
                        name: path.to_string(),
                    });
                }
            }
        }

        let mut outputs = Vec::with_capacity(plans.len());
        for plan in &plans {
            outputs.push(self.write(plan)?);
        }
        advance(phase, SessionPhase::Converted);

        self.layout.write_dataset_description(None)?;
        advance(phase, SessionPhase::Done);

        Ok(SessionReport {
            subject_id: config.subject_id(),
            session_id: config.session_id(),
            outputs,
            skipped,
        })
    }

    fn plan(&self, named: NamedAcquisition, tree: &MetadataTree) -> Result<PlannedOutput, BxhError> {
        let record = &named.record;
        let dir = self
            .layout
            .modality_dir(&record.subject_id, &record.session_id, record.modality);
        let spec = self
            .templates
            .descriptor_spec(record.modality)
            .ok_or_else(|| BxhError::InvalidModality(record.modality.to_string()))?;
        let fields = extract(spec, tree)?;
        let sidecar = synthesize(record.modality, &record.bids_label, fields, tree, &named.name)?;
        let gradients = match record.modality {
            Modality::Dwi => Some(Gradients::from_tree(tree)?),
            _ => None,
        };
        if let Some(events) = &record.aux_files.events {
            if !events.exists() {
                return Err(BxhError::MissingEventsFile(events.clone()));
            }
        }
        Ok(PlannedOutput {
            named,
            dir,
            sidecar,
            gradients,
        })
    }

    fn write(&self, plan: &PlannedOutput) -> Result<OutputRecord, BxhError> {
        let record = &plan.named.record;
        BidsLayout::ensure_dir(&plan.dir)?;

        let image = plan.image_path();
        copy_image(&record.orig_image_path, &image, record.gzip_output)?;
        let sidecar = plan.sidecar_path();
        info!(path = %sidecar, "writing sidecar");
        BidsLayout::write_json_new(&sidecar, &plan.sidecar)?;
        let mut files = vec![image.to_string(), sidecar.to_string()];

        if let Some(gradients) = &plan.gradients {
            let bval = plan.bval_path();
            let bvec = plan.bvec_path();
            BidsLayout::write_new(&bval, gradients.bvals.as_bytes())?;
            BidsLayout::write_new(&bvec, gradients.bvec_text().as_bytes())?;
            files.push(bval.to_string());
            files.push(bvec.to_string());
        }

        if let Some(events) = &record.aux_files.events {
            let destination = plan.events_path();
            info!(from = %events.display(), to = %destination, "copying events file");
            BidsLayout::copy_new(events, &destination)?;
            files.push(destination.to_string());
        }

        Ok(OutputRecord {
            source: record.metadata_path.display().to_string(),
            modality: record.modality.to_string(),
            files,
        })
    }
}

fn load(path: &Path) -> Result<Loaded, BxhError> {
    let tree = MetadataTree::load(path)?;
    let bxh_dir = path.parent().map(PathBuf::from).unwrap_or_default();
    let image = resolve_image(&tree, &bxh_dir)?;
    let description = tree.description()?.to_string();
    Ok(Loaded {
        path: path.to_path_buf(),
        tree,
        image,
        description,
    })
}

fn advance(phase: &mut SessionPhase, next: SessionPhase) {
    debug!(from = ?*phase, to = ?next, "session phase");
    *phase = next;
}
