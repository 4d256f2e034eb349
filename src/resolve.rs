//! Merge catalog display metadata into step and element instances.
//!
//! Catalog data is a low-priority source: it can only add keys an instance
//! does not already define, never replace or remove authored values.

use serde_json::{Map, Value};
use tracing::trace;

use crate::{
    catalog::{CatalogEntry, ResourceKind, Resources, VariantEntry},
    model::{Element, Step, StepCategory, value_type},
};

/// Keys that describe identity or structure and are never copied from the catalog.
const STRUCTURAL_KEYS: &[&str] = &[
    "id",
    "type",
    "variant",
    "variants",
    "resourceType",
    "components",
    "action",
];

/// A catalog entry matched for an instance, with the variant that selected it.
#[derive(Debug, Clone, Copy)]
pub struct CatalogMatch<'a> {
    pub entry: &'a CatalogEntry,
    pub variant: Option<&'a VariantEntry>,
}

impl CatalogMatch<'_> {
    /// Metadata to merge: variant values over the entry's own values.
    pub fn metadata(&self) -> Map<String, Value> {
        let mut source = self
            .variant
            .map(|v| v.metadata.clone())
            .unwrap_or_default();
        merge_missing(&mut source, &self.entry.metadata);
        source.retain(|key, _| !STRUCTURAL_KEYS.contains(&key.as_str()));
        source
    }
}

/// Find the first entry of `kind` whose type and variant match.
pub fn find_catalog_entry<'a>(
    resources: &'a Resources,
    kind: ResourceKind,
    instance_type: &str,
    variant: Option<&str>,
) -> Option<CatalogMatch<'a>> {
    resources
        .entries_for(kind)
        .filter(|entry| entry.entry_type.eq_ignore_ascii_case(instance_type))
        .find_map(|entry| match variant {
            Some(v) => {
                if let Some(variant_entry) = entry.variant_entry(v) {
                    Some(CatalogMatch {
                        entry,
                        variant: Some(variant_entry),
                    })
                } else if entry.variant.as_deref() == Some(v) {
                    Some(CatalogMatch {
                        entry,
                        variant: None,
                    })
                } else {
                    None
                }
            }
            None => entry.variant.is_none().then_some(CatalogMatch {
                entry,
                variant: None,
            }),
        })
}

/// Deep-merge `source` into `target`, keeping every value `target` already has.
pub fn merge_missing(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, incoming) in source {
        match target.get_mut(key) {
            None => {
                target.insert(key.clone(), incoming.clone());
            }
            Some(Value::Object(existing)) => {
                if let Value::Object(incoming_map) = incoming {
                    merge_missing(existing, incoming_map);
                }
            }
            Some(_) => {}
        }
    }
}

/// Resolve a list of element instances, recursing into nested `components`.
pub fn resolve_components(resources: &Resources, components: &[Value]) -> Vec<Value> {
    components
        .iter()
        .map(|component| resolve_value(resources, ResourceKind::Element, component))
        .collect()
}

fn resolve_value(resources: &Resources, kind: ResourceKind, value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let mut out = map.clone();

    if let Some(instance_type) = value_type(value) {
        let variant = map.get("variant").and_then(Value::as_str);
        match find_catalog_entry(resources, kind, instance_type, variant) {
            Some(found) => merge_missing(&mut out, &found.metadata()),
            None => trace!(instance_type, ?variant, "no catalog entry for instance"),
        }
    }

    if let Some(Value::Array(children)) = map.get("components") {
        out.insert(
            "components".to_string(),
            Value::Array(resolve_components(resources, children)),
        );
    }

    Value::Object(out)
}

/// Typed variant of [`resolve_components`]; elements that no longer fit the
/// typed shape after merging are returned as they were.
pub fn resolve_elements(resources: &Resources, elements: &[Element]) -> Vec<Element> {
    elements
        .iter()
        .map(|element| {
            serde_json::to_value(element)
                .ok()
                .map(|raw| resolve_value(resources, ResourceKind::Element, &raw))
                .and_then(|resolved| serde_json::from_value(resolved).ok())
                .unwrap_or_else(|| element.clone())
        })
        .collect()
}

/// Resolve a step's own metadata (into `data`) and its component tree.
pub fn resolve_step(resources: &Resources, step: &Step) -> Step {
    let mut resolved = step.clone();
    let variant = step.extra.get("variant").and_then(Value::as_str);

    if let Some(found) =
        find_catalog_entry(resources, ResourceKind::Step, step.step_type.as_str(), variant)
    {
        let mut metadata = found.metadata();
        if resolved.category.is_none()
            && let Some(category) = metadata
                .remove("category")
                .and_then(|c| serde_json::from_value::<StepCategory>(c).ok())
        {
            resolved.category = Some(category);
        }
        metadata.remove("category");
        merge_missing(&mut resolved.data.extra, &metadata);
    } else {
        trace!(step_id = %step.id, step_type = %step.step_type, "no catalog entry for step");
    }

    resolved.data.components = resolve_components(resources, &step.data.components);
    resolved
}

pub fn resolve_steps(resources: &Resources, steps: &[Step]) -> Vec<Step> {
    steps.iter().map(|step| resolve_step(resources, step)).collect()
}
