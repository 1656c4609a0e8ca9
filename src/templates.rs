use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::domain::Modality;
use crate::error::BxhError;

pub const RULES_FILE: &str = "psd_types.json";

const EMBEDDED_RULES: &str = include_str!("../templates/psd_types.json");
const EMBEDDED_ANAT: &str = include_str!("../templates/anat_info_fields.json");
const EMBEDDED_FUNC: &str = include_str!("../templates/func_info_fields.json");
const EMBEDDED_DWI: &str = include_str!("../templates/dwi_info_fields.json");
const EMBEDDED_FMAP: &str = include_str!("../templates/fmap_info_fields.json");

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModalityRule {
    #[serde(rename = "type")]
    pub modality: Modality,
    pub label: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ModalityRules(BTreeMap<String, ModalityRule>);

impl ModalityRules {
    pub fn get(&self, description: &str) -> Option<&ModalityRule> {
        self.0.get(description)
    }

    pub fn contains(&self, description: &str) -> bool {
        self.0.contains_key(description)
    }
}

impl FromIterator<(String, ModalityRule)> for ModalityRules {
    fn from_iter<I: IntoIterator<Item = (String, ModalityRule)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum FieldStyle {
    String,
    Float,
    Int,
    Other(String),
}

impl From<String> for FieldStyle {
    fn from(value: String) -> Self {
        match value.as_str() {
            "string" => FieldStyle::String,
            "float" => FieldStyle::Float,
            "int" => FieldStyle::Int,
            _ => FieldStyle::Other(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldSpec {
    pub location: Vec<String>,
    #[serde(rename = "BIDSstyle")]
    pub style: FieldStyle,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct DescriptorSpec(BTreeMap<String, FieldSpec>);

impl DescriptorSpec {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.0.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.0.get(field)
    }
}

impl FromIterator<(String, FieldSpec)> for DescriptorSpec {
    fn from_iter<I: IntoIterator<Item = (String, FieldSpec)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
pub struct Templates {
    pub rules: ModalityRules,
    pub anat: DescriptorSpec,
    pub func: DescriptorSpec,
    pub dwi: DescriptorSpec,
    pub fmap: DescriptorSpec,
}

impl Templates {
    pub fn embedded() -> Result<Self, BxhError> {
        Ok(Self {
            rules: parse_embedded(RULES_FILE, EMBEDDED_RULES)?,
            anat: parse_embedded("anat_info_fields.json", EMBEDDED_ANAT)?,
            func: parse_embedded("func_info_fields.json", EMBEDDED_FUNC)?,
            dwi: parse_embedded("dwi_info_fields.json", EMBEDDED_DWI)?,
            fmap: parse_embedded("fmap_info_fields.json", EMBEDDED_FMAP)?,
        })
    }

    pub fn load_dir(dir: &Path) -> Result<Self, BxhError> {
        Ok(Self {
            rules: read_template(&dir.join(RULES_FILE))?,
            anat: read_template(&dir.join(spec_file_name(Modality::Anat)))?,
            func: read_template(&dir.join(spec_file_name(Modality::Func)))?,
            dwi: read_template(&dir.join(spec_file_name(Modality::Dwi)))?,
            fmap: read_template(&dir.join(spec_file_name(Modality::Fmap)))?,
        })
    }

    pub fn resolve(dir: Option<&Path>) -> Result<Self, BxhError> {
        match dir {
            Some(dir) => Self::load_dir(dir),
            None => Self::embedded(),
        }
    }

    pub fn descriptor_spec(&self, modality: Modality) -> Option<&DescriptorSpec> {
        match modality {
            Modality::Anat => Some(&self.anat),
            Modality::Func => Some(&self.func),
            Modality::Dwi => Some(&self.dwi),
            Modality::Fmap => Some(&self.fmap),
            Modality::Unsupported => None,
        }
    }
}

pub fn spec_file_name(modality: Modality) -> String {
    format!("{modality}_info_fields.json")
}

fn read_template<T: DeserializeOwned>(path: &Path) -> Result<T, BxhError> {
    if !path.exists() {
        return Err(BxhError::MissingTemplate(path.to_path_buf()));
    }
    let content =
        fs::read_to_string(path).map_err(|err| BxhError::Filesystem(err.to_string()))?;
    serde_json::from_str(&content).map_err(|err| BxhError::ConfigParse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn parse_embedded<T: DeserializeOwned>(name: &str, content: &str) -> Result<T, BxhError> {
    serde_json::from_str(content).map_err(|err| BxhError::ConfigParse {
        path: name.into(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn embedded_templates_parse() {
        let templates = Templates::embedded().unwrap();
        let rule = templates.rules.get("EPI Resting State").unwrap();
        assert_eq!(rule.modality, Modality::Func);
        assert_eq!(rule.label, "bold");
        let tr = templates.func.get("RepetitionTime").unwrap();
        assert_eq!(tr.style, FieldStyle::Float);
        assert_eq!(tr.location, vec!["bxh", "acquisitiondata", "tr"]);
        assert!(templates.descriptor_spec(Modality::Unsupported).is_none());
    }

    #[test]
    fn unknown_style_is_preserved() {
        let spec: FieldSpec =
            serde_json::from_str(r#"{"location": ["a"], "BIDSstyle": "list"}"#).unwrap();
        assert_eq!(spec.style, FieldStyle::Other("list".to_string()));
    }

    #[test]
    fn missing_template_dir_reports_path() {
        let err = Templates::load_dir(Path::new("/nonexistent/templates")).unwrap_err();
        assert_matches!(err, BxhError::MissingTemplate(path) if path.ends_with(RULES_FILE));
    }
}
