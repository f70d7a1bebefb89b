mod common;

use std::sync::Arc;

use common::{group, rule};
use filtra::filterql::builder::SequentialIds;
use filtra::filterql::conversion;
use filtra::{Condition, Evaluator, FieldId, FilterCatalog, FilterGroup, FilterNode, Operator, TreeBuilder};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;

fn groups(tree: &FilterGroup) -> Vec<FilterGroup> {
    let mut out = vec![tree.clone()];
    for node in &tree.rules {
        if let FilterNode::Group(child) = node {
            out.extend(groups(child));
        }
    }
    out
}

/// Applies one random builder operation to a random group of `tree`.
fn step(builder: &TreeBuilder, tree: &FilterGroup, rng: &mut StdRng) -> FilterGroup {
    let target = groups(tree).choose(rng).cloned().unwrap();
    let fields: Vec<FieldId> = builder.catalog().fields().iter().map(|f| f.id.clone()).collect();
    let changed = match rng.gen_range(0..6) {
        0 | 1 => builder.add_rule(&target, Some(fields.choose(rng).unwrap())),
        2 => builder.add_rule(&target, None),
        3 => builder.add_group(&target),
        4 => target.toggle_condition(),
        _ => match target.rules.choose(rng) {
            Some(node) if rng.gen_bool(0.3) => target.remove_node(node.id()),
            Some(FilterNode::Rule(r)) => {
                let field = fields.choose(rng).unwrap();
                let mut edited = builder.set_rule_field(r, field);
                edited.value = Some(format!("v{}", rng.gen_range(0..100)));
                return tree.update_rule(&r.id, edited);
            }
            _ => target.clone(),
        },
    };
    tree.update_group(&target.id, changed)
}

#[test]
fn builder_ops_keep_ids_unique_and_round_trip() {
    let mut rng = StdRng::seed_from_u64(7);
    for ids in [TreeBuilder::new(FilterCatalog::builtin()), TreeBuilder::new(FilterCatalog::builtin()).with_ids(Arc::new(SequentialIds::starting_at(1)))] {
        let mut tree = ids.root();
        for _ in 0..200 {
            tree = step(&ids, &tree, &mut rng);

            let all = tree.node_ids();
            assert!(all.iter().all_unique(), "duplicate ids in {all:?}");
            assert!(all.contains(&&tree.id));

            let json = conversion::to_json(&tree);
            assert_eq!(conversion::from_json_with_depth(&json, 256).unwrap(), tree);
        }
    }
}

#[test]
fn builder_ops_do_not_touch_their_input() {
    let builder = TreeBuilder::new(FilterCatalog::builtin());
    let original = builder.add_group(&builder.add_rule(&builder.root(), Some(&"status".into())));
    let before = original.clone();

    let added = builder.add_rule(&original, Some(&"rating".into()));
    let grouped = builder.add_group(&original);
    let toggled = original.toggle_condition();
    let removed = original.remove_node(original.rules[0].id());

    assert_eq!(original, before);
    assert_eq!(added.rules.len(), 3);
    assert_eq!(grouped.rules.len(), 3);
    assert_eq!(toggled.condition, Condition::Or);
    assert_eq!(removed.rules.len(), 1);
}

#[test]
fn scenarios() {
    let catalog = FilterCatalog::builtin();
    let evaluator = Evaluator::new(&catalog);

    let active_and_rated =
        group("g", Condition::And, vec![rule("status", Operator::Equals, "active"), rule("rating", Operator::Gte, "4")]);
    assert!(evaluator.evaluate(&json!({"status": "active", "rating": 4.5}), &active_and_rated).unwrap());
    assert!(!evaluator.evaluate(&json!({"status": "inactive", "rating": 4.5}), &active_and_rated).unwrap());

    let pizza_or_restaurant =
        group("g", Condition::Or, vec![rule("name", Operator::Contains, "pizza"), rule("category", Operator::Equals, "Restaurante")]);
    assert!(evaluator.evaluate(&json!({"name": "Casa da Pizza", "category": "Loja"}), &pizza_or_restaurant).unwrap());

    let empty = group("g", Condition::Or, vec![]);
    for record in [json!({}), json!({"name": "x"}), json!({"rating": null})] {
        assert!(evaluator.evaluate(&record, &empty).unwrap());
    }
}
