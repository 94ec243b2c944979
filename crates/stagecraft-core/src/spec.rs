//! The YAML build specification: build steps, their stages and the shared
//! templates stages pull provisioning steps from.
//!
//! Step variants are closed enums, so a document naming zero or several
//! variants for one step is rejected while it is being deserialized.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Specification {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<BuildStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<Template>,
}

impl Specification {
    pub fn from_yaml(input: &str) -> Result<Self, Error> {
        let spec: Self = serde_yaml::from_str(input)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Template names must be unique so that stage references are unambiguous.
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = BTreeSet::new();
        for template in &self.templates {
            if !seen.insert(template.name.as_str()) {
                return Err(Error::duplicate_template(&template.name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// One image target. Compiles to one build file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BuildStep {
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub purge: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cache: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub distroless: bool,
    /// Where the build context comes from; only the context collaborator reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_yaml::Value>,
}

impl BuildStep {
    pub fn display_name(&self) -> &str {
        self.metadata
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BaseImage {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl BaseImage {
    /// `image[:platform][:tag]`
    pub fn reference(&self) -> String {
        let mut reference = self.image.clone();
        for part in [&self.platform, &self.tag].into_iter().flatten() {
            if !part.is_empty() {
                reference.push(':');
                reference.push_str(part);
            }
        }
        reference
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default)]
    pub metadata: Metadata,
    pub base: BaseImage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "serde_yaml::with::singleton_map_recursive"
    )]
    pub cmd: Vec<BuildTemplateStep>,
}

impl Stage {
    pub fn display_name(&self) -> &str {
        self.metadata
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.base.image)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<BuildTemplateStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTemplateStep {
    Docker(DockerStep),
    Ansible(AnsibleStep),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DockerStep {
    /// Instructions written directly in the document, one per entry.
    Inline(Vec<String>),
    /// A Dockerfile fragment, relative to the build context directory.
    Path(PathBuf),
    /// A Dockerfile fragment fetched before compilation.
    Url(UrlSource),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSpec {
    Plain(String),
    Env(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnsibleStep {
    Local(LocalPlaybook),
    Galaxy(GalaxyRole),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPlaybook {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    pub playbook: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalaxyRole {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    pub role: String,
    #[serde(default = "default_requirements")]
    pub requirements: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook: Option<String>,
}

fn default_workspace() -> String {
    "/ansible".to_string()
}

fn default_requirements() -> String {
    "requirements.yml".to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}
