//! Turn a catalog template into concrete, resolved steps.

use std::collections::HashSet;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    catalog::{Replacer, Resources},
    id::{IdGenerator, collect_ids},
    model::Step,
    resolve::resolve_steps,
};

lazy_static! {
    static ref PLACEHOLDER_RE: Regex =
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}").unwrap();
}

/// Steps produced from one template, with the named substitutions applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TemplateInstance {
    pub template_type: String,
    pub display: Option<Value>,
    pub steps: Vec<Step>,
    pub substitutions: IndexMap<String, String>,
}

impl TemplateInstance {
    fn empty(template_type: &str) -> Self {
        TemplateInstance {
            template_type: template_type.to_string(),
            ..TemplateInstance::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Instantiate `template_type` from the catalog.
///
/// Placeholder ids are expanded first, then catalog metadata is merged into
/// every step, then the template's named replacers are substituted. An unknown
/// template, or one without steps, yields an empty instance.
pub fn instantiate_template(
    resources: &Resources,
    template_type: &str,
    id_gen: &mut IdGenerator,
) -> TemplateInstance {
    let Some(template) = resources.template(template_type) else {
        warn!(template_type, "template not found in catalog, starting with an empty flow");
        return TemplateInstance::empty(template_type);
    };
    if template.steps.is_empty() {
        warn!(template_type, "template has no steps, starting with an empty flow");
        return TemplateInstance::empty(template_type);
    }

    let raw = Value::Array(template.steps.clone());
    let mut reserved = HashSet::new();
    collect_ids(&raw, &mut reserved);
    let expanded = id_gen.generate_avoiding(&raw, &reserved);
    collect_ids(&expanded, &mut reserved);

    let steps = resolve_steps(resources, &parse_steps(&expanded));
    let substitutions = replacer_values(&template.replacers, id_gen, &reserved);
    let steps = if substitutions.is_empty() {
        steps
    } else {
        steps
            .iter()
            .map(|step| substitute_step(step, &substitutions))
            .collect()
    };

    debug!(
        template_type = %template.template_type,
        steps = steps.len(),
        replacers = substitutions.len(),
        "template instantiated"
    );
    TemplateInstance {
        template_type: template.template_type.clone(),
        display: template.display.clone(),
        steps,
        substitutions,
    }
}

fn parse_steps(value: &Value) -> Vec<Step> {
    value
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[])
        .iter()
        .filter_map(|raw| match serde_json::from_value::<Step>(raw.clone()) {
            Ok(step) => Some(step),
            Err(err) => {
                warn!(error = %err, "skipping malformed template step");
                None
            }
        })
        .collect()
}

/// Decide the substitution for each named replacer.
///
/// Names equal to the id matcher are left to the id generator. A repeated name
/// keeps its first substitution.
pub fn replacer_values(
    replacers: &[Replacer],
    id_gen: &mut IdGenerator,
    reserved: &HashSet<String>,
) -> IndexMap<String, String> {
    let mut out = IndexMap::new();
    for replacer in replacers {
        let name = replacer
            .placeholder
            .trim()
            .trim_start_matches("{{")
            .trim_end_matches("}}")
            .trim();
        if name.is_empty() || name == id_gen.matcher() || out.contains_key(name) {
            continue;
        }
        let value = match &replacer.value {
            Some(value) => value.clone(),
            None => id_gen.next_id(replacer.kind.as_deref(), reserved),
        };
        out.insert(name.to_string(), value);
    }
    out
}

/// Replace every `{{NAME}}` found in any string of `value` by its substitution.
/// Placeholders without a substitution are kept as written.
pub fn apply_replacers(value: &Value, substitutions: &IndexMap<String, String>) -> Value {
    match value {
        Value::String(s) if s.contains("{{") => Value::String(
            PLACEHOLDER_RE
                .replace_all(s, |caps: &Captures| {
                    substitutions
                        .get(&caps[1])
                        .cloned()
                        .unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| apply_replacers(item, substitutions))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), apply_replacers(item, substitutions)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn substitute_step(step: &Step, substitutions: &IndexMap<String, String>) -> Step {
    serde_json::to_value(step)
        .ok()
        .map(|raw| apply_replacers(&raw, substitutions))
        .and_then(|replaced| serde_json::from_value(replaced).ok())
        .unwrap_or_else(|| step.clone())
}
