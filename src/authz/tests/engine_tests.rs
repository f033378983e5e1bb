//! Decision engine tests
//!
//! Covers the evaluation protocol end to end:
//! Fetchers → Action filter → Matchers → Guard → Body → Justification

use proptest::prelude::*;
use rulebook_authz::{
    ActionScope, AuthorizationContext, AuthzError, FetchOutcome, FetcherDefinition, Parameters,
    Pattern, Policy, PolicyConfig, RuleDefinition, RuleReturn, StepStatus, Verdict, ALL_ACTIONS,
    DEFAULT_DENY,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn quiet() -> PolicyConfig {
    PolicyConfig {
        enable_audit: false,
        enable_metrics: false,
        ..PolicyConfig::default()
    }
}

fn role_policy() -> Policy {
    Policy::builder()
        .config(quiet())
        .rule(
            RuleDefinition::allow("admin", ActionScope::All)
                .subject(Pattern::field("role", Pattern::equals("admin"))),
        )
        .rule(
            RuleDefinition::allow("reader", ActionScope::one("read"))
                .subject(Pattern::field("role", Pattern::equals("reader"))),
        )
        .build()
        .unwrap()
}

// ============================================================================
// DEFAULT DENY
// ============================================================================

#[test]
fn test_empty_catalog_denies_everything() {
    let policy = Policy::builder().config(quiet()).build().unwrap();

    for action in ["read", "write", "delete", "all"] {
        let result = policy
            .authorize_default(json!({"id": "alice"}), json!({"id": "doc"}), action)
            .unwrap();

        assert_eq!(result.verdict, Verdict::Deny);
        assert_eq!(result.deciding_rule_id, DEFAULT_DENY);
        assert!(result.rule_parameters().is_empty());
    }
}

#[test]
fn test_wildcard_rule_allows_everything() {
    let policy = Policy::builder()
        .config(quiet())
        .rule(RuleDefinition::allow("everyone", ActionScope::All))
        .build()
        .unwrap();

    for (subject, object, action) in [
        (json!("alice"), json!("doc"), "read"),
        (json!({"id": 7}), json!(null), "delete"),
        (json!([1, 2]), json!({"nested": {"x": 1}}), "publish"),
    ] {
        let result = policy.authorize_default(subject, object, action).unwrap();
        assert_eq!(result.verdict, Verdict::Allow);
        assert_eq!(result.deciding_rule_id, "everyone");
    }
}

// ============================================================================
// SHORT-CIRCUIT AND ORDERING
// ============================================================================

#[test]
fn test_first_decisive_rule_short_circuits() {
    let r2_calls = Arc::new(AtomicUsize::new(0));
    let counter = r2_calls.clone();

    let policy = Policy::builder()
        .config(quiet())
        .rule(RuleDefinition::allow("r1", ActionScope::one("read")))
        .rule(RuleDefinition::new("r2", ActionScope::one("read"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            RuleReturn::Err
        }))
        .build()
        .unwrap();

    let result = policy.authorize_default("alice", "doc", "read").unwrap();

    assert_eq!(result.verdict, Verdict::Allow);
    assert_eq!(result.deciding_rule_id, "r1");
    assert_eq!(r2_calls.load(Ordering::SeqCst), 0, "R2 body must never run");
}

#[test]
fn test_next_falls_through_to_later_rule() {
    let policy = Policy::builder()
        .config(quiet())
        .rule(RuleDefinition::new("undecided", ActionScope::All, |_| RuleReturn::Next))
        .rule(RuleDefinition::new("declines", ActionScope::All, |_| RuleReturn::decline()))
        .rule(RuleDefinition::new("false", ActionScope::All, |_| false))
        .rule(RuleDefinition::deny("blocker", ActionScope::All))
        .build()
        .unwrap();

    let trace = policy
        .explain("alice", "doc", "read", AuthorizationContext::new())
        .unwrap();

    assert_eq!(trace.result.deciding_rule_id, "blocker");
    assert_eq!(trace.result.verdict, Verdict::Deny);
    assert_eq!(
        trace.invoked_rules(),
        vec!["undecided", "declines", "false", "blocker"]
    );
}

#[test]
fn test_decline_only_rules_end_in_default_deny() {
    let policy = Policy::builder()
        .config(quiet())
        .rule(RuleDefinition::new("declines", ActionScope::All, |_| {
            RuleReturn::ErrTagged(json!(DEFAULT_DENY), Parameters::new().with("ignored", true))
        }))
        .build()
        .unwrap();

    let result = policy.authorize_default("alice", "doc", "read").unwrap();
    assert!(result.is_default_deny());
    assert!(result.rule_parameters().is_empty());
}

// ============================================================================
// ACTION FILTERING
// ============================================================================

#[test]
fn test_action_set_never_fires_outside_set() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let policy = Policy::builder()
        .config(quiet())
        .rule(RuleDefinition::new(
            "read-write",
            ActionScope::set(["read", "write"]),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            },
        ))
        .build()
        .unwrap();

    let result = policy.authorize_default("alice", "doc", "delete").unwrap();
    assert!(result.is_default_deny());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let result = policy.authorize_default("alice", "doc", "write").unwrap();
    assert_eq!(result.deciding_rule_id, "read-write");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_action_set_with_wildcard_applies_to_all() {
    let policy = Policy::builder()
        .config(quiet())
        .rule(RuleDefinition::allow("mixed", ActionScope::set(["read", "all"])))
        .build()
        .unwrap();

    let result = policy.authorize_default("alice", "doc", "archive").unwrap();
    assert_eq!(result.deciding_rule_id, "mixed");
}

#[test]
fn test_single_all_scope_is_wildcard() {
    for scope in [
        ActionScope::one(ALL_ACTIONS),
        ActionScope::One(ALL_ACTIONS.to_string()),
    ] {
        let policy = Policy::builder()
            .config(quiet())
            .rule(RuleDefinition::allow("admin", scope))
            .build()
            .unwrap();

        for action in ["read", "write", "delete"] {
            let result = policy.authorize_default("root", "doc", action).unwrap();
            assert_eq!(result.verdict, Verdict::Allow);
            assert_eq!(result.deciding_rule_id, "admin");
        }
    }
}

#[test]
fn test_filtered_rules_reported_in_trace() {
    let trace = role_policy()
        .explain(json!({"role": "reader"}), "doc", "write", AuthorizationContext::new())
        .unwrap();

    assert_eq!(trace.rule_status("admin"), Some(StepStatus::MatchMiss));
    assert_eq!(trace.rule_status("reader"), Some(StepStatus::ActionFiltered));
    assert!(trace.result.is_default_deny());
}

// ============================================================================
// GUARDS AND BINDINGS
// ============================================================================

#[test]
fn test_guard_false_never_decides() {
    let body_calls = Arc::new(AtomicUsize::new(0));
    let counter = body_calls.clone();

    let policy = Policy::builder()
        .config(quiet())
        .rule(
            RuleDefinition::new("owner", ActionScope::All, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                RuleReturn::Ok
            })
            .subject(Pattern::field("id", Pattern::bind("user")))
            .object(Pattern::field("owner", Pattern::bind("owner")))
            .guard(|b| b.get("user") == b.get("owner")),
        )
        .build()
        .unwrap();

    let result = policy
        .authorize_default(json!({"id": "bob"}), json!({"owner": "alice"}), "edit")
        .unwrap();
    assert!(result.is_default_deny());
    assert_eq!(body_calls.load(Ordering::SeqCst), 0);

    let result = policy
        .authorize_default(json!({"id": "alice"}), json!({"owner": "alice"}), "edit")
        .unwrap();
    assert_eq!(result.deciding_rule_id, "owner");
    assert_eq!(body_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_bindings_from_all_slots_reach_body() {
    let policy = Policy::builder()
        .config(quiet())
        .rule(
            RuleDefinition::new("quota", ActionScope::one("upload"), |b| {
                let used = b.get_i64("used").unwrap_or(0);
                let limit = b.get_i64("limit").unwrap_or(0);
                if used < limit {
                    RuleReturn::OkWith(Parameters::new().with("remaining", limit - used))
                } else {
                    RuleReturn::ErrWith(
                        Parameters::new()
                            .with("reason", "quota exceeded")
                            .with("verb", b.get("verb").cloned().unwrap_or(Value::Null)),
                    )
                }
            })
            .subject(Pattern::field("used", Pattern::bind("used")))
            .action(Pattern::bind("verb"))
            .context(Pattern::field("limit", Pattern::bind("limit"))),
        )
        .build()
        .unwrap();

    let ok = policy
        .authorize(
            json!({"used": 3}),
            "file",
            "upload",
            AuthorizationContext::new().with("limit", 10),
        )
        .unwrap();
    assert_eq!(ok.verdict, Verdict::Allow);
    assert_eq!(ok.rule_parameters(), &[("remaining".to_string(), json!(7))]);

    let over = policy
        .authorize(
            json!({"used": 12}),
            "file",
            "upload",
            AuthorizationContext::new().with("limit", 10),
        )
        .unwrap();
    assert_eq!(over.verdict, Verdict::Deny);
    assert_eq!(over.deciding_rule_id, "quota");
    assert_eq!(over.parameters.get("verb"), Some(&json!("upload")));
}

#[test]
fn test_binding_collision_fails_at_build() {
    let result = Policy::builder()
        .rule(
            RuleDefinition::allow("clash", ActionScope::All)
                .subject(Pattern::field("id", Pattern::bind("id")))
                .object(Pattern::field("id", Pattern::bind("id"))),
        )
        .build();

    match result {
        Err(AuthzError::DuplicateBinding { definition, binding }) => {
            assert_eq!(definition, "clash");
            assert_eq!(binding, "id");
        }
        other => panic!("expected DuplicateBinding, got {:?}", other.map(|_| ())),
    }
}

// ============================================================================
// FETCHERS
// ============================================================================

#[test]
fn test_presupplied_attribute_bypasses_fetcher() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let counter = fetches.clone();

    let policy = Policy::builder()
        .config(quiet())
        .fetcher(FetcherDefinition::new("load_owner", "owner", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            FetchOutcome::value("from-database")
        }))
        .rule(
            RuleDefinition::allow("owner", ActionScope::All)
                .subject(Pattern::bind("user"))
                .context(Pattern::field("owner", Pattern::bind("owner")))
                .guard(|b| b.get("user") == b.get("owner")),
        )
        .build()
        .unwrap();

    let result = policy
        .authorize(
            "alice",
            "doc",
            "read",
            AuthorizationContext::new().with("owner", "alice"),
        )
        .unwrap();

    assert_eq!(fetches.load(Ordering::SeqCst), 0);
    assert_eq!(result.deciding_rule_id, "owner");
    assert_eq!(result.context(), Some(&json!({"owner": "alice"})));

    let result = policy.authorize_default("alice", "doc", "read").unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert!(result.is_default_deny());
    assert_eq!(result.context(), Some(&json!({"owner": "from-database"})));
}

#[test]
fn test_fetch_failure_aborts_before_rules() {
    let rule_calls = Arc::new(AtomicUsize::new(0));
    let counter = rule_calls.clone();

    let policy = Policy::builder()
        .config(quiet())
        .fetcher(FetcherDefinition::new("load_owner", "owner", |_| {
            Err::<Value, _>("connection refused")
        }))
        .rule(RuleDefinition::new("any", ActionScope::All, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }))
        .build()
        .unwrap();

    let err = policy.authorize_default("alice", "doc", "read").unwrap_err();

    match err {
        AuthzError::Fetch(failure) => {
            assert_eq!(failure.fetcher, "load_owner");
            assert_eq!(failure.attribute, "owner");
            assert_eq!(failure.reason, "connection refused");
        }
        other => panic!("expected fetch failure, got {}", other),
    }
    assert_eq!(rule_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_fetchers_chain_in_declaration_order() {
    let policy = Policy::builder()
        .config(quiet())
        .fetcher(
            FetcherDefinition::new("tenant", "tenant", |b| {
                FetchOutcome::value(b.get_str("email").and_then(|e| e.split('@').nth(1)).unwrap_or(""))
            })
            .subject(Pattern::field("email", Pattern::bind("email"))),
        )
        .fetcher(
            FetcherDefinition::new("plan", "plan", |b| {
                FetchOutcome::value(if b.get_str("tenant") == Some("acme.com") {
                    "enterprise"
                } else {
                    "free"
                })
            })
            .context(Pattern::field("tenant", Pattern::bind("tenant"))),
        )
        .rule(
            RuleDefinition::allow("enterprise-export", ActionScope::one("export"))
                .context(Pattern::field("plan", Pattern::equals("enterprise"))),
        )
        .build()
        .unwrap();

    let result = policy
        .authorize_default(json!({"email": "ann@acme.com"}), "report", "export")
        .unwrap();
    assert_eq!(result.deciding_rule_id, "enterprise-export");
    assert_eq!(
        result.context(),
        Some(&json!({"tenant": "acme.com", "plan": "enterprise"}))
    );

    let result = policy
        .authorize_default(json!({"email": "sam@example.org"}), "report", "export")
        .unwrap();
    assert!(result.is_default_deny());
}

// ============================================================================
// CONCRETE SCENARIO
// ============================================================================

#[test]
fn test_admin_reader_scenario() {
    let policy = role_policy();
    let obj = json!({"id": "doc-1"});

    let result = policy
        .authorize_default(json!({"role": "admin"}), obj.clone(), "write")
        .unwrap();
    assert_eq!(result.verdict, Verdict::Allow);
    assert_eq!(result.deciding_rule_id, "admin");

    let result = policy
        .authorize_default(json!({"role": "reader"}), obj.clone(), "write")
        .unwrap();
    assert_eq!(result.verdict, Verdict::Deny);
    assert_eq!(result.deciding_rule_id, DEFAULT_DENY);

    let result = policy
        .authorize_default(json!({"role": "reader"}), obj.clone(), "read")
        .unwrap();
    assert_eq!(result.verdict, Verdict::Allow);
    assert_eq!(result.deciding_rule_id, "reader");

    let keys: Vec<_> = result.parameters.keys().collect();
    assert_eq!(keys, vec!["subject", "object", "action", "context"]);
    assert_eq!(result.subject(), Some(&json!({"role": "reader"})));
    assert_eq!(result.object(), Some(&obj));
    assert_eq!(result.action(), Some("read"));
    assert_eq!(result.context(), Some(&json!({})));
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

proptest! {
    #[test]
    fn prop_empty_policy_always_default_denies(
        subject in "[a-z]{1,12}",
        object in "[a-z0-9:-]{1,16}",
        action in "[a-z_]{1,10}",
    ) {
        let policy = Policy::builder().config(quiet()).build().unwrap();
        let result = policy.authorize_default(subject, object, action).unwrap();

        prop_assert_eq!(result.verdict, Verdict::Deny);
        prop_assert_eq!(result.deciding_rule_id.as_str(), DEFAULT_DENY);
    }

    #[test]
    fn prop_scoped_rule_fires_only_for_its_actions(
        action in prop::sample::select(vec!["read", "write", "delete", "share", "archive"]),
    ) {
        let policy = Policy::builder()
            .config(quiet())
            .rule(RuleDefinition::allow("rw", ActionScope::set(["read", "write"])))
            .build()
            .unwrap();

        let result = policy.authorize_default("alice", "doc", action).unwrap();
        let expected = action == "read" || action == "write";

        prop_assert_eq!(result.is_allowed(), expected);
        prop_assert_eq!(result.is_default_deny(), !expected);
    }

    #[test]
    fn prop_presupplied_context_is_preserved(value in any::<i64>()) {
        let policy = Policy::builder()
            .config(quiet())
            .fetcher(FetcherDefinition::new("score", "score", |_| FetchOutcome::value(-1)))
            .build()
            .unwrap();

        let result = policy
            .authorize("alice", "doc", "read", AuthorizationContext::new().with("score", value))
            .unwrap();

        prop_assert_eq!(result.context(), Some(&json!({"score": value})));
    }

    #[test]
    fn prop_first_deciding_rule_wins(deciding in 0usize..6, allow in any::<bool>()) {
        let rules = (0..6).map(|i| {
            if i < deciding {
                RuleDefinition::new(format!("rule-{}", i), ActionScope::All, |_| RuleReturn::Next)
            } else if allow {
                RuleDefinition::allow(format!("rule-{}", i), ActionScope::All)
            } else {
                RuleDefinition::deny(format!("rule-{}", i), ActionScope::All)
            }
        });

        let policy = Policy::builder().config(quiet()).rules(rules).build().unwrap();
        let result = policy.authorize_default("alice", "doc", "read").unwrap();

        prop_assert_eq!(result.deciding_rule_id.as_str(), format!("rule-{}", deciding));
        prop_assert_eq!(result.is_allowed(), allow);
    }
}
