use std::collections::HashSet;

use flow_composer::id::{IdGenerator, RandomSuffix, replace_placeholder_ids};
use pretty_assertions::assert_eq;
use regex::Regex;
use serde_json::{Value, json};

fn collect_ids(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("id") {
                out.push(id.clone());
            }
            map.values().for_each(|v| collect_ids(v, out));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_ids(v, out)),
        _ => {}
    }
}

#[test]
fn repeated_placeholders_get_distinct_typed_ids() {
    let buttons: Vec<Value> = (0..25)
        .map(|_| json!({ "id": "{{ID}}", "type": "button" }))
        .collect();
    let input = json!({ "components": buttons });

    let output = replace_placeholder_ids(&input, "ID");
    let mut ids = Vec::new();
    collect_ids(&output, &mut ids);

    let pattern = Regex::new(r"^button_.+$").unwrap();
    assert_eq!(ids.len(), 25);
    assert!(ids.iter().all(|id| pattern.is_match(id)), "{ids:?}");
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), 25);
}

#[test]
fn input_is_left_untouched_and_other_values_pass_through() {
    let input = json!({
        "id": "fixed",
        "type": "VIEW",
        "label": "{{ID}}",
        "components": [
            { "id": "{{ID}}", "type": "TEXT_INPUT", "required": true, "order": 2 },
            { "id": "{{ ID }}", "type": "ACTION" },
            { "id": "prefix-{{ID}}", "type": "ACTION" }
        ]
    });
    let snapshot = input.clone();

    let mut id_gen = IdGenerator::sequential();
    let output = id_gen.generate(&input);

    assert_eq!(input, snapshot);
    assert_eq!(output["id"], json!("fixed"));
    assert_eq!(output["label"], json!("{{ID}}"));
    assert_eq!(output["components"][0]["id"], json!("text_input_1"));
    assert_eq!(output["components"][0]["required"], json!(true));
    assert_eq!(output["components"][0]["order"], json!(2));
    assert_eq!(output["components"][1]["id"], json!("{{ ID }}"));
    assert_eq!(output["components"][2]["id"], json!("prefix-{{ID}}"));
}

#[test]
fn missing_type_uses_fallback_prefix() {
    let mut id_gen = IdGenerator::sequential().with_fallback_prefix("node");
    let output = id_gen.generate(&json!([{ "id": "{{ID}}" }]));
    assert_eq!(output[0]["id"], json!("node_1"));
}

#[test]
fn custom_matcher_only_replaces_its_own_placeholder() {
    let mut id_gen = IdGenerator::sequential().with_matcher("STEP_ID");
    let output = id_gen.generate(&json!([
        { "id": "{{STEP_ID}}", "type": "VIEW" },
        { "id": "{{ID}}", "type": "VIEW" }
    ]));
    assert_eq!(output[0]["id"], json!("view_1"));
    assert_eq!(output[1]["id"], json!("{{ID}}"));
}

#[test]
fn generate_avoiding_never_reuses_existing_ids() {
    let reserved: HashSet<String> = ["view_1", "view_2"].iter().map(|s| s.to_string()).collect();
    let mut id_gen = IdGenerator::sequential();
    let output = id_gen.generate_avoiding(&json!({ "id": "{{ID}}", "type": "VIEW" }), &reserved);
    assert_eq!(output["id"], json!("view_3"));
}

#[test]
fn one_generator_never_repeats_across_calls() {
    let mut id_gen = IdGenerator::random();
    let mut seen = HashSet::new();
    for _ in 0..50 {
        let out = id_gen.generate(&json!({ "id": "{{ID}}", "type": "ACTION" }));
        let id = out["id"].as_str().unwrap().to_string();
        assert!(id.starts_with("action_"));
        assert!(seen.insert(id));
    }
}

#[test]
fn short_suffixes_stay_unique_past_their_value_space() {
    let buttons: Vec<Value> = (0..40)
        .map(|_| json!({ "id": "{{ID}}", "type": "button" }))
        .collect();
    let mut id_gen = IdGenerator::new(Box::new(RandomSuffix::new(1)));
    let output = id_gen.generate(&json!(buttons));

    let mut ids = Vec::new();
    collect_ids(&output, &mut ids);
    let pattern = Regex::new(r"^button_.+$").unwrap();
    assert_eq!(ids.len(), 40);
    assert!(ids.iter().all(|id| pattern.is_match(id)), "{ids:?}");
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), 40);
}
