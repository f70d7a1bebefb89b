mod common;

use common::{clients, group, now, remote_matches, rule};
use filtra::{Condition, Evaluator, FilterCatalog, FilterGroup, FilterNode, Operator, PredicateCompiler};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::Value;

/// Field, operator and a value pool whose remote and local semantics coincide on [`clients`].
const CHOICES: &[(&str, Operator, &[&str])] = &[
    ("name", Operator::Equals, &["casa da pizza", "padaria central", "nobody"]),
    ("name", Operator::NotEquals, &["casa da pizza", "loja do joão"]),
    ("name", Operator::Contains, &["pizza", "a", "joão"]),
    ("name", Operator::NotContains, &["pizza", "loja"]),
    ("name", Operator::StartsWith, &["pizz", "casa"]),
    ("name", Operator::EndsWith, &["central", "bella"]),
    ("name", Operator::IsEmpty, &[""]),
    ("email", Operator::IsNotEmpty, &[""]),
    ("status", Operator::Equals, &["Active", "Ganhos"]),
    ("status", Operator::NotEquals, &["Active"]),
    ("status", Operator::In, &["Active|Perdidos", "Inactive"]),
    ("status", Operator::NotIn, &["Active|Ganhos"]),
    ("status", Operator::IsEmpty, &[""]),
    ("rating", Operator::Gte, &["4", "3"]),
    ("rating", Operator::Lt, &["3", "4.5"]),
    ("rating", Operator::Equals, &["5", "2"]),
    ("rating", Operator::IsNotEmpty, &[""]),
    ("sales", Operator::Between, &["100|1200", "0|90"]),
    ("sales", Operator::NotEquals, &["1200"]),
    ("has_whatsapp", Operator::Equals, &["true", "não"]),
    ("has_whatsapp", Operator::NotEquals, &["sim"]),
    ("has_whatsapp", Operator::IsEmpty, &[""]),
    ("last_contact", Operator::LastDays, &["7", "0", "60"]),
    ("last_contact", Operator::NextDays, &["10"]),
    ("last_contact", Operator::Equals, &["2024-06-10", "2024-06-14T09:30:00Z"]),
    ("last_contact", Operator::NotEquals, &["2024-06-10"]),
    ("last_contact", Operator::Before, &["2024-06-10"]),
    ("last_contact", Operator::After, &["2024-06-10"]),
    ("last_contact", Operator::Between, &["2024-06-01|2024-06-14"]),
];

fn random_rule(rng: &mut StdRng, n: usize) -> FilterNode {
    let (field, operator, values) = CHOICES.choose(rng).unwrap();
    let value = values.choose(rng).unwrap();
    let mut node = rule(field, *operator, value);
    if let FilterNode::Rule(r) = &mut node {
        r.id = format!("r{n}").into();
    }
    node
}

fn random_tree(rng: &mut StdRng, depth: usize, counter: &mut usize) -> FilterGroup {
    *counter += 1;
    let id = format!("g{counter}");
    let condition = if rng.gen_bool(0.5) { Condition::And } else { Condition::Or };
    let children = rng.gen_range(0..=3);
    let rules = (0..children)
        .map(|_| {
            *counter += 1;
            if depth < 3 && rng.gen_bool(0.3) {
                FilterNode::Group(random_tree(rng, depth + 1, counter))
            } else {
                random_rule(rng, *counter)
            }
        })
        .collect();
    group(&id, condition, rules)
}

fn assert_aligned(tree: &FilterGroup, rows: &[Value]) {
    let catalog = FilterCatalog::builtin();
    let evaluator = Evaluator::new(&catalog).at(now());
    let compiled = PredicateCompiler::new(&catalog).at(now()).compile(tree).unwrap();
    assert!(compiled.skipped.is_empty(), "unexpected skips {:?}", compiled.skipped);
    for row in rows {
        let local = evaluator.evaluate(row, tree).unwrap();
        let remote = match &compiled.predicate {
            Some(predicate) => remote_matches(predicate, row),
            None => true,
        };
        assert_eq!(local, remote, "tree {tree:?}\nrow {row}\npredicate {:?}", compiled.predicate.as_ref().map(|p| p.to_string()));
    }
}

#[test]
fn every_single_rule_agrees() {
    let rows = clients();
    for (field, operator, values) in CHOICES {
        for value in *values {
            assert_aligned(&group("root", Condition::And, vec![rule(field, *operator, value)]), &rows);
        }
    }
}

#[test]
fn random_trees_agree() {
    let rows = clients();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..300 {
        let mut counter = 0;
        let tree = random_tree(&mut rng, 0, &mut counter);
        assert_aligned(&tree, &rows);
    }
}

#[test]
fn and_is_never_weakened_to_or() {
    let catalog = FilterCatalog::builtin();
    let tree = group("root", Condition::And, vec![rule("status", Operator::Equals, "Active"), rule("rating", Operator::Gte, "4")]);
    let compiled = PredicateCompiler::new(&catalog).compile(&tree).unwrap();
    let predicate = compiled.predicate.unwrap();
    assert_eq!(predicate.to_string(), "and(status.eq.Active,rating.gte.4)");
    assert_eq!(predicate.as_or_list(), None);

    let matching: Vec<_> = clients().into_iter().filter(|row| remote_matches(&predicate, row)).collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0]["name"], "casa da pizza");
}

#[test]
fn vacuous_subgroups_agree() {
    let rows = clients();
    let empty = FilterNode::Group(group("empty", Condition::And, vec![]));
    assert_aligned(&group("root", Condition::Or, vec![empty.clone(), rule("status", Operator::Equals, "Active")]), &rows);
    assert_aligned(&group("root", Condition::And, vec![empty, rule("status", Operator::Equals, "Active")]), &rows);
}
