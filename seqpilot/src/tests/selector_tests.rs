//! Tests for text predicates and query parsing

use crate::selector::{DiscoveryQuery, MatchMode, Scope, TextPredicate};

#[test]
fn test_predicate_parsing() {
    assert_eq!(TextPredicate::from("exact:Next"), TextPredicate::exact("next"));
    assert_eq!(TextPredicate::from("PREFIX:Continue to"), TextPredicate::prefix("continue to"));
    assert_eq!(TextPredicate::from("text:Sequence"), TextPredicate::contains("sequence"));
    assert_eq!(TextPredicate::from("contains:Sequence"), TextPredicate::contains("sequence"));
    // bare phrases are exact
    assert_eq!(TextPredicate::from("Add"), TextPredicate::exact("add"));
}

#[test]
fn test_alternatives() {
    let predicate = TextPredicate::from("exact:next || prefix:continue to");
    assert!(predicate.matches("Next"));
    assert!(predicate.matches("  Continue   to review "));
    assert!(!predicate.matches("Next step"));
    assert_eq!(predicate.to_string(), "exact:next || prefix:continue to");
}

#[test]
fn test_matching_is_case_and_whitespace_insensitive() {
    assert!(TextPredicate::exact("Add to sequence").matches("ADD  TO\nSEQUENCE"));
    assert!(TextPredicate::contains("sequence").matches("Add to Sequence"));
    assert!(!TextPredicate::exact("add").matches("add to sequence"));
}

#[test]
fn test_relaxed_turns_exact_into_substring() {
    let relaxed = TextPredicate::any_exact(&["Edit", "Personalize"]).relaxed();
    assert!(relaxed.matches("Edit email"));
    assert!(relaxed.matches("Personalize step 1"));
}

#[test]
fn test_query_builders() {
    let query = DiscoveryQuery::from("exact:Add").deep().include_disabled();
    assert_eq!(query.mode, MatchMode::Deep);
    assert!(query.include_disabled);
    assert!(matches!(query.scope, Scope::OverlaysFirst));

    let modal = DiscoveryQuery::new(TextPredicate::exact("add")).in_modal("  Add To Sequence ");
    match modal.scope {
        Scope::Modal(name) => assert_eq!(name, "add to sequence"),
        other => panic!("unexpected scope {other:?}"),
    }
}
