use std::sync::Arc;
use std::thread;

use cataguide_data::{
    DataError, DuplicatePolicy, Flattener, GuideConfig, LoadOptions, MergeRule,
};
use serde_json::{Value, json};

fn load(records: Vec<Value>) -> Flattener {
    Flattener::load(records, &LoadOptions::default()).unwrap()
}

fn corpus() -> Vec<Value> {
    vec![
        json!({"type": "GENERIC", "abstract": "base_tool", "weight": 100, "flags": ["x"],
               "armor": {"bash": 2, "cut": 2}, "volume": 4}),
        json!({"type": "TOOL", "id": "hammer", "copy-from": "base_tool", "hp": 20,
               "flags_add": ["y"], "relative": {"weight": 50, "armor": {"bash": 1}},
               "proportional": {"volume": 1.5}}),
        json!({"type": "TOOL", "id": ["sledge", "sledgehammer"], "copy-from": "hammer",
               "extend": {"flags": ["HEAVY"]}, "delete": {"flags": ["x"]},
               "proportional": {"weight": 2}}),
    ]
}

fn options() -> LoadOptions {
    GuideConfig::from_json(
        r#"{"load": {"merge_rules": {"flags_add": {"rule": "append", "into": "flags"}}}}"#,
    )
    .unwrap()
    .load
}

#[test]
fn flatten_is_idempotent_and_cached() {
    let flattener = Flattener::load(corpus(), &options()).unwrap();
    let first = flattener.get("item", "sledge").unwrap();
    let walked = flattener.stats().ancestors_walked;
    let second = flattener.get("item", "sledge").unwrap();
    assert_eq!(first, second);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(flattener.stats().ancestors_walked, walked);
    assert!(flattener.stats().cache_hits >= 1);
}

#[test]
fn directives_fold_down_the_chain_in_order() {
    let flattener = Flattener::load(corpus(), &options()).unwrap();
    let hammer = flattener.get("item", "hammer").unwrap();
    assert_eq!(hammer.fields["hp"], 20);
    assert_eq!(hammer.fields["flags"], json!(["x", "y"]));
    assert_eq!(hammer.fields["weight"], 150);
    assert_eq!(hammer.fields["armor"], json!({"bash": 3, "cut": 2}));
    assert_eq!(hammer.fields["volume"], 6);
    assert!(!hammer.fields.contains_key("flags_add"));
    assert!(!hammer.fields.contains_key("relative"));

    let sledge = flattener.get("item", "sledgehammer").unwrap();
    assert_eq!(sledge.id(), Some("sledge"));
    assert_eq!(sledge.type_name, "TOOL");
    assert_eq!(sledge.fields["flags"], json!(["y", "HEAVY"]));
    assert_eq!(sledge.fields["weight"], 300);
    assert_eq!(sledge.fields["hp"], 20);
    assert!(!sledge.fields.contains_key("copy-from"));
}

#[test]
fn without_a_cumulative_rule_the_child_field_is_plain_data() {
    let flattener = load(corpus());
    let hammer = flattener.get("item", "hammer").unwrap();
    assert_eq!(hammer.fields["flags"], json!(["x"]));
    assert_eq!(hammer.fields["flags_add"], json!(["y"]));
}

#[test]
fn by_type_lists_concrete_records_in_corpus_order() {
    let flattener = load(corpus());
    let ids: Vec<String> = flattener
        .by_type("item")
        .unwrap()
        .iter()
        .filter_map(|record| record.id().map(str::to_string))
        .collect();
    assert_eq!(ids, vec!["hammer", "sledge"]);
    assert!(flattener.by_type("MONSTER").unwrap().is_empty());
}

#[test]
fn cycles_fail_for_every_member() {
    let flattener = load(vec![
        json!({"type": "MONSTER", "id": "a", "copy-from": "b"}),
        json!({"type": "MONSTER", "id": "b", "copy-from": "c"}),
        json!({"type": "MONSTER", "id": "c", "copy-from": "a"}),
        json!({"type": "MONSTER", "id": "d", "copy-from": "a"}),
    ]);
    for id in ["a", "b", "c", "d"] {
        let err = flattener.get("MONSTER", id).unwrap_err();
        assert!(
            matches!(err, DataError::CyclicInheritance { ref kind, .. } if kind == "MONSTER"),
            "{id}: {err}"
        );
    }
    assert_eq!(flattener.validate().len(), 4);
    assert!(flattener.by_type("MONSTER").is_err());
}

#[test]
fn duplicate_policy_is_selectable() {
    let records = vec![
        json!({"type": "GENERIC", "id": "rock", "weight": 1}),
        json!({"type": "GENERIC", "id": "rock", "weight": 2}),
    ];
    let strict = LoadOptions {
        duplicate_policy: DuplicatePolicy::Strict,
        ..LoadOptions::default()
    };
    assert_eq!(
        Flattener::load(records.clone(), &strict).unwrap_err(),
        DataError::DuplicateId {
            kind: "item".to_string(),
            id: "rock".to_string()
        }
    );

    let lenient = load(records);
    assert_eq!(lenient.get("item", "rock").unwrap().fields["weight"], 2);
    assert_eq!(lenient.load_report().overridden, 1);
}

#[test]
fn union_rule_merges_without_duplicates() {
    let options = LoadOptions::default().with_merge_rule("tags", MergeRule::Union);
    let flattener = Flattener::load(
        vec![
            json!({"type": "MONSTER", "id": "zombie", "tags": ["undead", "slow"]}),
            json!({"type": "MONSTER", "id": "runner", "copy-from": "zombie", "tags": ["fast", "undead"]}),
        ],
        &options,
    )
    .unwrap();
    assert_eq!(
        flattener.get("MONSTER", "runner").unwrap().fields["tags"],
        json!(["undead", "slow", "fast"])
    );
}

#[test]
fn concurrent_readers_share_one_cache() {
    let flattener = Arc::new(Flattener::load(corpus(), &options()).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let flattener = Arc::clone(&flattener);
            thread::spawn(move || flattener.get("item", "sledge").unwrap())
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    for result in &results[1..] {
        assert_eq!(result, &results[0]);
    }
    assert_eq!(flattener.stats().cached, 3);
}
