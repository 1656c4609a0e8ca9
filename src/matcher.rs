use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::domain::{Entities, Modality};
use crate::error::BxhError;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchedEntry {
    pub token: String,
    pub entities: Entities,
    pub events: Option<PathBuf>,
}

/// Finds the single session entry whose key occurs in `image_file_name`.
///
/// More than one hit is always an error. No hit is an error for functional
/// scans only; other modalities proceed without entities.
pub fn match_acquisition(
    modality: Modality,
    image_file_name: &str,
    config: &SessionConfig,
) -> Result<Option<MatchedEntry>, BxhError> {
    let Some(entries) = config.entries(modality) else {
        return Ok(None);
    };

    let hits: Vec<_> = entries
        .iter()
        .filter(|(token, _)| image_file_name.contains(token.as_str()))
        .collect();

    match hits.as_slice() {
        [] if modality == Modality::Func => {
            Err(BxhError::UnmatchedFunctional(image_file_name.to_string()))
        }
        [] => {
            warn!(%modality, file = image_file_name, "no session entry matched, entities left unset");
            Ok(None)
        }
        [(token, entry)] => {
            info!(%modality, file = image_file_name, token = token.as_str(), "matched session entry");
            Ok(Some(MatchedEntry {
                token: token.to_string(),
                entities: entry.entities(),
                events: entry.tsv_file.clone(),
            }))
        }
        _ => Err(BxhError::AmbiguousMatch {
            file: image_file_name.to_string(),
            tokens: hits.iter().map(|(token, _)| token.to_string()).collect(),
        }),
    }
}
