use tracing::{debug, info, warn};

use crate::domain::{EntityKey, Entities, Modality};
use crate::error::BxhError;
use crate::templates::ModalityRules;

pub const DESCRIPTION_DELIMITER: char = '_';

const SURFACE_CORRECTED_MARKER: &str = "SC:";

#[derive(Debug, Clone, Copy)]
pub enum Strategy<'a> {
    Explicit(&'a ModalityRules),
    Automatic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub modality: Modality,
    pub label: String,
    pub entities: Entities,
}

impl Classification {
    pub fn unsupported(label: impl Into<String>) -> Self {
        Self {
            modality: Modality::Unsupported,
            label: label.into(),
            entities: Entities::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptionToken {
    Modality(Modality),
    Entity(EntityKey, String),
    Label(String),
    Ignored(String),
}

pub fn tokenize(description: &str) -> Result<Vec<DescriptionToken>, BxhError> {
    let parts: Vec<&str> = description
        .trim()
        .split(DESCRIPTION_DELIMITER)
        .filter(|part| !part.is_empty())
        .collect();
    let malformed = |reason: &str| BxhError::MalformedDescription {
        description: description.to_string(),
        reason: reason.to_string(),
    };
    let [first, interior @ .., last] = parts.as_slice() else {
        return Err(malformed("expected at least a modality and a label"));
    };

    let modality: Modality = first
        .parse()
        .map_err(|_| malformed(&format!("unknown modality token {first}")))?;

    let mut tokens = Vec::with_capacity(parts.len());
    tokens.push(DescriptionToken::Modality(modality));
    for part in interior {
        let token = match part.split_once('-') {
            Some((key, value)) if !value.is_empty() => match key.parse::<EntityKey>() {
                Ok(key) => DescriptionToken::Entity(key, value.to_string()),
                Err(_) => DescriptionToken::Ignored(part.to_string()),
            },
            _ => DescriptionToken::Ignored(part.to_string()),
        };
        tokens.push(token);
    }
    tokens.push(DescriptionToken::Label(last.to_string()));
    Ok(tokens)
}

pub fn classify(strategy: Strategy<'_>, description: &str) -> Result<Classification, BxhError> {
    match strategy {
        Strategy::Explicit(rules) => classify_explicit(rules, description),
        Strategy::Automatic => Ok(classify_automatic(description)),
    }
}

fn classify_explicit(rules: &ModalityRules, description: &str) -> Result<Classification, BxhError> {
    let rule = rules
        .get(description)
        .ok_or_else(|| BxhError::UnknownDescription(description.to_string()))?;
    let mut entities = Entities::new();
    if rule.modality == Modality::Anat && description.contains(SURFACE_CORRECTED_MARKER) {
        entities.insert(EntityKey::Rec, "SC");
    }
    info!(modality = %rule.modality, label = rule.label.as_str(), "classified scan");
    Ok(Classification {
        modality: rule.modality,
        label: rule.label.clone(),
        entities,
    })
}

fn classify_automatic(description: &str) -> Classification {
    let tokens = match tokenize(description) {
        Ok(tokens) => tokens,
        Err(err) => {
            warn!(description, error = %err, "skipping acquisition with unparseable description");
            return Classification::unsupported(description);
        }
    };

    let mut modality = Modality::Unsupported;
    let mut label = String::new();
    let mut entities = Entities::new();
    for token in tokens {
        match token {
            DescriptionToken::Modality(value) => modality = value,
            DescriptionToken::Entity(key, value) => {
                entities.insert(key, value);
            }
            DescriptionToken::Label(value) => label = value,
            DescriptionToken::Ignored(value) => {
                debug!(description, token = value.as_str(), "ignoring description token");
            }
        }
    }
    info!(%modality, label = label.as_str(), "classified scan from description");
    Classification {
        modality,
        label,
        entities,
    }
}
