use flow_composer::{
    catalog::{ResourceKind, Resources},
    model::{Element, Step, StepCategory},
    resolve::{find_catalog_entry, resolve_components, resolve_elements, resolve_step},
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn catalog() -> Resources {
    Resources::load_from_file("fixtures/resources.json").unwrap()
}

#[test]
fn own_values_win_and_missing_metadata_is_added() {
    let resources = Resources::from_json_str(
        r#"{ "elements": [ { "type": "TEXT_INPUT", "display": { "label": "Generic", "description": "d" } } ] }"#,
    )
    .unwrap();
    let resolved = resolve_components(
        &resources,
        &[json!({ "id": "username", "type": "TEXT_INPUT", "label": "Custom", "display": { "label": "Custom" } })],
    );
    assert_eq!(
        resolved[0],
        json!({
            "id": "username",
            "type": "TEXT_INPUT",
            "label": "Custom",
            "display": { "label": "Custom", "description": "d" }
        })
    );
}

#[test]
fn variant_matches_through_variants_array() {
    let resources = catalog();
    let resolved = resolve_components(
        &resources,
        &[json!({ "id": "go", "type": "ACTION", "variant": "PRIMARY" })],
    );
    assert_eq!(resolved[0]["display"]["label"], json!("Primary Button"));
    assert_eq!(resolved[0]["eventType"], json!("SUBMIT"));
    assert_eq!(resolved[0]["category"], json!("ACTION"));
    assert!(resolved[0].get("variants").is_none());
}

#[test]
fn variant_matches_top_level_variant_and_plain_matches_plain() {
    let resources = catalog();
    let resolved = resolve_components(
        &resources,
        &[
            json!({ "id": "h", "type": "TEXT", "variant": "HEADING_1" }),
            json!({ "id": "p", "type": "TEXT" }),
        ],
    );
    assert_eq!(resolved[0]["display"]["label"], json!("Heading 1"));
    assert_eq!(resolved[1]["display"]["label"], json!("Paragraph"));
    assert_eq!(resolved[1].get("variant"), None);
}

#[test]
fn unmatched_instances_are_returned_unchanged() {
    let resources = catalog();
    let unknown_type = json!({ "id": "x", "type": "CAPTCHA", "label": "Prove it" });
    let unknown_variant = json!({ "id": "y", "type": "ACTION", "variant": "GHOST" });
    let resolved = resolve_components(&resources, &[unknown_type.clone(), unknown_variant.clone()]);
    assert_eq!(resolved, vec![unknown_type, unknown_variant]);
}

#[test]
fn nested_components_resolve_independently() {
    let resources = catalog();
    let resolved = resolve_components(
        &resources,
        &[json!({
            "id": "form",
            "type": "BLOCK",
            "components": [
                { "id": "user", "type": "TEXT_INPUT" },
                { "id": "inner", "type": "BLOCK", "components": [ { "id": "pw", "type": "PASSWORD_INPUT" } ] }
            ]
        })],
    );
    let form = &resolved[0];
    assert_eq!(form["display"]["label"], json!("Form"));
    assert_eq!(form["components"][0]["placeholder"], json!("Enter a value"));
    assert_eq!(form["components"][1]["display"]["label"], json!("Form"));
    assert_eq!(
        form["components"][1]["components"][0]["display"]["label"],
        json!("Password")
    );
}

#[test]
fn empty_component_list_resolves_to_empty() {
    assert!(resolve_components(&catalog(), &[]).is_empty());
}

#[test]
fn step_entries_are_not_used_for_elements() {
    let resources = catalog();
    assert!(find_catalog_entry(&resources, ResourceKind::Element, "VIEW", None).is_none());
    assert!(find_catalog_entry(&resources, ResourceKind::Step, "VIEW", None).is_some());
}

#[test]
fn untyped_entries_are_eligible_for_any_kind() {
    let resources = Resources::from_json_str(
        r#"{ "steps": [ { "type": "CUSTOM_WIDGET", "display": { "label": "Ad hoc" } } ] }"#,
    )
    .unwrap();
    let found = find_catalog_entry(&resources, ResourceKind::Element, "CUSTOM_WIDGET", None);
    assert!(found.is_some());
}

#[test]
fn step_resolution_fills_category_and_data() {
    let resources = catalog();
    let step = Step::new("login", "VIEW").with_components(vec![
        json!({ "id": "user", "type": "TEXT_INPUT", "label": "Email" }),
    ]);
    let resolved = resolve_step(&resources, &step);

    assert_eq!(resolved.category, Some(StepCategory::Interface));
    assert_eq!(
        resolved.data.extra.get("display"),
        Some(&json!({ "label": "View", "description": "Screen shown to the user" }))
    );
    assert!(resolved.data.extra.get("category").is_none());
    assert_eq!(resolved.data.components[0]["label"], json!("Email"));
    assert_eq!(
        resolved.data.components[0]["display"]["label"],
        json!("Text Input")
    );
}

#[test]
fn authored_step_category_is_kept() {
    let resources = catalog();
    let mut step = Step::new("auth", "EXECUTION");
    step.category = Some(StepCategory::Decision);
    let resolved = resolve_step(&resources, &step);
    assert_eq!(resolved.category, Some(StepCategory::Decision));
}

#[test]
fn typed_elements_resolve_like_raw_ones() {
    let resources = catalog();
    let element: Element = serde_json::from_value(json!({
        "id": "go",
        "type": "ACTION",
        "variant": "SECONDARY",
        "label": "Back"
    }))
    .unwrap();
    let resolved = resolve_elements(&resources, &[element]);
    assert_eq!(resolved[0].category.as_deref(), Some("ACTION"));
    assert_eq!(resolved[0].properties.get("label"), Some(&json!("Back")));
    assert_eq!(
        resolved[0].properties.get("display"),
        Some(&json!({ "label": "Secondary Button" }))
    );
}
