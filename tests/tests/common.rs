use std::str::FromStr;

use chrono::{DateTime, Utc};
use filtra::filterql::selection::predicate::{Clause, RemoteOperator, RemotePredicate, RemoteValue};
use filtra::{Condition, FilterGroup, FilterNode, FilterRule, Operator};
use serde_json::{json, Value};
use tracing::Level;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() {
    // if LOG_LEVEL env var is set, use it
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        tracing_subscriber::fmt().with_max_level(Level::from_str(&level).unwrap()).with_test_writer().init();
    } else {
        tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init();
    }
}

/// Reference instant for every date window in these tests.
#[allow(unused)]
pub fn now() -> DateTime<Utc> { "2024-06-15T12:00:00Z".parse().unwrap() }

#[allow(unused)]
pub fn rule(field: &str, operator: Operator, value: &str) -> FilterNode {
    FilterNode::Rule(FilterRule { id: format!("{field}-{operator}-{value}").into(), field: field.into(), operator, value: Some(value.into()), field_name: None })
}

#[allow(unused)]
pub fn group(id: &str, condition: Condition, rules: Vec<FilterNode>) -> FilterGroup { FilterGroup { id: id.into(), condition, rules } }

/// A small client list. Text is lowercase and free of padding so that case-sensitive remote equality and the
/// local case-insensitive comparison agree.
#[allow(unused)]
pub fn clients() -> Vec<Value> {
    vec![
        json!({"name": "casa da pizza", "email": "contato@pizza.com", "status": "Active", "rating": 4.5, "sales": 1200,
               "has_whatsapp": true, "last_contact": "2024-06-14T09:30:00Z"}),
        json!({"name": "loja do joão", "email": "", "status": "Inactive", "rating": 2, "sales": 0,
               "has_whatsapp": false, "last_contact": "2024-05-02T18:00:00Z"}),
        json!({"name": "padaria central", "status": "Ganhos", "rating": 5, "has_whatsapp": true,
               "last_contact": "2024-06-10T00:00:00Z"}),
        json!({"name": "pizzaria bella", "email": "bella@pizza.com", "status": null, "rating": null, "sales": 350.75,
               "last_contact": "2024-06-15T11:59:59Z"}),
        json!({"name": "", "email": "anon@mail.com", "status": "Perdidos", "sales": 90, "has_whatsapp": false}),
        json!({"email": "sem.nome@mail.com", "status": "Active", "rating": 3.0, "sales": 1200,
               "last_contact": "2024-06-20T08:00:00Z"}),
    ]
}

/// Evaluates a compiled predicate against a JSON row the way the remote backend does: comparisons against a
/// missing or null column are unknown, and only a true result selects the row.
#[allow(unused)]
pub fn remote_matches(predicate: &RemotePredicate, row: &Value) -> bool { truth(predicate, row) == Some(true) }

fn truth(predicate: &RemotePredicate, row: &Value) -> Option<bool> {
    match predicate {
        RemotePredicate::Clause(clause) => clause_truth(clause, row),
        RemotePredicate::And(children) => {
            let results: Vec<_> = children.iter().map(|c| truth(c, row)).collect();
            if results.contains(&Some(false)) {
                Some(false)
            } else if results.iter().all(|r| *r == Some(true)) {
                Some(true)
            } else {
                None
            }
        }
        RemotePredicate::Or(children) => {
            let results: Vec<_> = children.iter().map(|c| truth(c, row)).collect();
            if results.contains(&Some(true)) {
                Some(true)
            } else if results.iter().all(|r| *r == Some(false)) {
                Some(false)
            } else {
                None
            }
        }
    }
}

fn clause_truth(clause: &Clause, row: &Value) -> Option<bool> {
    let actual = row.get(&clause.column).filter(|v| !v.is_null());
    let result = match (clause.operator, &clause.value) {
        (RemoteOperator::Is, RemoteValue::Null) => Some(actual.is_none()),
        (operator, value) => compare(actual?, operator, value),
    };
    result.map(|r| r != clause.negated)
}

fn compare(actual: &Value, operator: RemoteOperator, value: &RemoteValue) -> Option<bool> {
    match (operator, value) {
        (RemoteOperator::ILike, RemoteValue::Pattern(pattern)) => Some(like(&actual.as_str()?.to_lowercase(), &pattern.to_lowercase())),
        (RemoteOperator::In, RemoteValue::List(items)) => Some(items.iter().any(|item| equal(actual, item) == Some(true))),
        (RemoteOperator::Eq, RemoteValue::Literal(expected)) => equal(actual, expected),
        (RemoteOperator::Neq, RemoteValue::Literal(expected)) => equal(actual, expected).map(|eq| !eq),
        (op, RemoteValue::Literal(expected)) => {
            let ordering = order(actual, expected)?;
            Some(match op {
                RemoteOperator::Gt => ordering.is_gt(),
                RemoteOperator::Gte => ordering.is_ge(),
                RemoteOperator::Lt => ordering.is_lt(),
                RemoteOperator::Lte => ordering.is_le(),
                _ => return None,
            })
        }
        _ => None,
    }
}

fn equal(actual: &Value, expected: &str) -> Option<bool> {
    match actual {
        Value::Bool(b) => Some(b.to_string() == expected),
        Value::Number(_) => order(actual, expected).map(|o| o.is_eq()),
        Value::String(s) => match (DateTime::parse_from_rfc3339(s), DateTime::parse_from_rfc3339(expected)) {
            (Ok(a), Ok(b)) => Some(a == b),
            _ => Some(s == expected),
        },
        _ => None,
    }
}

fn order(actual: &Value, expected: &str) -> Option<std::cmp::Ordering> {
    match actual {
        Value::Number(n) => n.as_f64()?.partial_cmp(&expected.parse::<f64>().ok()?),
        Value::String(s) => {
            let (a, b) = (DateTime::parse_from_rfc3339(s).ok()?, DateTime::parse_from_rfc3339(expected).ok()?);
            Some(a.cmp(&b))
        }
        _ => None,
    }
}

/// LIKE matching with `%`, `_` and backslash escapes.
fn like(text: &str, pattern: &str) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Token {
        Any,
        One,
        Char(char),
    }
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '\\' => Token::Char(chars.next().unwrap_or('\\')),
            '%' => Token::Any,
            '_' => Token::One,
            c => Token::Char(c),
        });
    }
    fn matches(text: &[char], tokens: &[Token]) -> bool {
        match tokens.split_first() {
            None => text.is_empty(),
            Some((Token::Any, rest)) => (0..=text.len()).any(|i| matches(&text[i..], rest)),
            Some((Token::One, rest)) => !text.is_empty() && matches(&text[1..], rest),
            Some((Token::Char(c), rest)) => text.first() == Some(c) && matches(&text[1..], rest),
        }
    }
    let text: Vec<char> = text.chars().collect();
    matches(&text, &tokens)
}
