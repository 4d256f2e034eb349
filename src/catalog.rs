use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FlowError, FlowErrorLocation, Result};

/// Which array of the catalog an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Element,
    Step,
    Widget,
    Template,
    Executor,
}

/// A named alternative presentation of an element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantEntry {
    pub variant: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// One element/step/widget/executor definition of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<VariantEntry>,
    /// Display and descriptive metadata merged into matching instances.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl CatalogEntry {
    pub fn new(entry_type: impl Into<String>) -> Self {
        CatalogEntry {
            entry_type: entry_type.into(),
            resource_type: None,
            variant: None,
            variants: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// Entries without a declared kind are eligible for every kind.
    pub fn is_kind(&self, kind: ResourceKind) -> bool {
        self.resource_type.is_none_or(|k| k == kind)
    }

    pub fn variant_entry(&self, variant: &str) -> Option<&VariantEntry> {
        self.variants.iter().find(|v| v.variant == variant)
    }
}

/// Named placeholder declared by a template, substituted on instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacer {
    /// Placeholder name without braces, e.g. `LOGIN_VIEW`.
    pub placeholder: String,
    /// Prefix hint for the generated id.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Fixed substitution; when absent an id is generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Pre-authored bundle of steps used to seed a new flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateEntry {
    #[serde(rename = "type")]
    pub template_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<Value>,
    #[serde(default)]
    pub steps: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replacers: Vec<Replacer>,
}

/// Read-only reference data for one flow-builder session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub elements: Vec<CatalogEntry>,
    pub steps: Vec<CatalogEntry>,
    pub widgets: Vec<CatalogEntry>,
    pub templates: Vec<TemplateEntry>,
    pub executors: Vec<CatalogEntry>,
}

impl Resources {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::from_json_str_with_source(text, "<inline>", None)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| FlowError::Io {
            message: format!("failed to read {}: {e}", path.display()),
            location: FlowErrorLocation::at_path(path.display().to_string())
                .with_source_path(Some(path)),
        })?;
        Self::from_json_str_with_source(&text, path.display().to_string(), Some(path))
    }

    fn from_json_str_with_source(
        text: &str,
        source_label: impl Into<String>,
        source_path: Option<&Path>,
    ) -> Result<Self> {
        let source_label = source_label.into();
        serde_json::from_str(text).map_err(|e| FlowError::Json {
            message: format!("resources: {e}"),
            location: FlowErrorLocation::at_path_with_position(
                source_label,
                Some(e.line()),
                Some(e.column()),
            )
            .with_source_path(source_path),
        })
    }

    /// Entries eligible for `kind`, the kind's own array first.
    pub fn entries_for(&self, kind: ResourceKind) -> impl Iterator<Item = &CatalogEntry> {
        let lists: [&Vec<CatalogEntry>; 4] = match kind {
            ResourceKind::Step => [&self.steps, &self.elements, &self.widgets, &self.executors],
            ResourceKind::Widget => [&self.widgets, &self.elements, &self.steps, &self.executors],
            ResourceKind::Executor => [&self.executors, &self.steps, &self.elements, &self.widgets],
            ResourceKind::Element | ResourceKind::Template => {
                [&self.elements, &self.widgets, &self.steps, &self.executors]
            }
        };
        lists
            .into_iter()
            .flatten()
            .filter(move |entry| entry.is_kind(kind))
    }

    pub fn template(&self, template_type: &str) -> Option<&TemplateEntry> {
        self.templates
            .iter()
            .find(|t| t.template_type.eq_ignore_ascii_case(template_type))
    }
}
