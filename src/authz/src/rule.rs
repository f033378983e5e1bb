//! Rule definitions, the rule catalog, and the evaluation loop

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::matcher::{Bindings, MatchInput, Matcher, MatcherSet};
use crate::outcome::{normalize, RuleOutcome, RuleReturn};
use crate::trace::{RuleStep, StepStatus};
use crate::types::{Parameters, Verdict, ALL_ACTIONS, DEFAULT_DENY};

/// Predicate over merged bindings
pub type Guard = Arc<dyn Fn(&Bindings) -> bool + Send + Sync>;

/// Rule body
pub type RuleBody = Arc<dyn Fn(&Bindings) -> RuleReturn + Send + Sync>;

pub(crate) fn always() -> Guard {
    Arc::new(|_| true)
}

/// Which actions a rule is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionScope {
    /// Every action
    All,
    /// Exactly one action
    One(String),
    /// Any of these actions; a set containing [`ALL_ACTIONS`] covers every action
    Set(BTreeSet<String>),
}

impl ActionScope {
    /// Scope to a single action; `"all"` is the wildcard
    pub fn one(action: impl Into<String>) -> Self {
        let action = action.into();
        if action == ALL_ACTIONS {
            ActionScope::All
        } else {
            ActionScope::One(action)
        }
    }

    /// Scope to any of `actions`
    pub fn set<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ActionScope::Set(actions.into_iter().map(Into::into).collect())
    }

    /// Whether a rule with this scope is considered for `action`
    pub fn applies_to(&self, action: &str) -> bool {
        match self {
            ActionScope::All => true,
            ActionScope::One(scoped) => scoped == ALL_ACTIONS || scoped == action,
            ActionScope::Set(scoped) => scoped.contains(ALL_ACTIONS) || scoped.contains(action),
        }
    }

    fn validate(&self, rule_id: &str) -> Result<()> {
        let empty_name = match self {
            ActionScope::All => false,
            ActionScope::One(action) => action.is_empty(),
            ActionScope::Set(actions) => {
                if actions.is_empty() {
                    return Err(AuthzError::InvalidPolicy(format!(
                        "Rule '{}' is scoped to an empty action set",
                        rule_id
                    )));
                }
                actions.iter().any(String::is_empty)
            }
        };

        if empty_name {
            return Err(AuthzError::InvalidPolicy(format!(
                "Rule '{}' is scoped to an empty action name",
                rule_id
            )));
        }
        Ok(())
    }
}

impl From<&str> for ActionScope {
    /// `"all"` is the wildcard, anything else a single action
    fn from(action: &str) -> Self {
        ActionScope::one(action)
    }
}

impl<const N: usize> From<[&str; N]> for ActionScope {
    fn from(actions: [&str; N]) -> Self {
        ActionScope::set(actions)
    }
}

/// One ordered decision unit: applicability (matchers + guard) and a body
#[derive(Clone)]
pub struct RuleDefinition {
    id: String,
    actions: ActionScope,
    matchers: MatcherSet,
    guard: Guard,
    body: RuleBody,
}

impl RuleDefinition {
    /// Rule with match-any matchers and an always-true guard
    pub fn new<F, R>(id: impl Into<String>, actions: impl Into<ActionScope>, body: F) -> Self
    where
        F: Fn(&Bindings) -> R + Send + Sync + 'static,
        R: Into<RuleReturn>,
    {
        Self {
            id: id.into(),
            actions: actions.into(),
            matchers: MatcherSet::any(),
            guard: always(),
            body: Arc::new(move |bindings| body(bindings).into()),
        }
    }

    /// Rule that allows whenever it applies
    pub fn allow(id: impl Into<String>, actions: impl Into<ActionScope>) -> Self {
        Self::new(id, actions, |_| RuleReturn::Ok)
    }

    /// Rule that denies whenever it applies
    pub fn deny(id: impl Into<String>, actions: impl Into<ActionScope>) -> Self {
        Self::new(id, actions, |_| RuleReturn::Err)
    }

    /// Set the subject matcher
    pub fn subject(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matchers.subject = Arc::new(matcher);
        self
    }

    /// Set the object matcher
    pub fn object(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matchers.object = Arc::new(matcher);
        self
    }

    /// Set the action matcher; it sees the action name as a JSON string
    pub fn action(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matchers.action = Arc::new(matcher);
        self
    }

    /// Set the context matcher
    pub fn context(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matchers.context = Arc::new(matcher);
        self
    }

    /// Extra predicate over the merged bindings, checked before the body
    pub fn guard<F>(mut self, guard: F) -> Self
    where
        F: Fn(&Bindings) -> bool + Send + Sync + 'static,
    {
        self.guard = Arc::new(guard);
        self
    }

    /// Rule id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Actions this rule is scoped to
    pub fn actions(&self) -> &ActionScope {
        &self.actions
    }

    /// Every binding name the four matchers may produce
    pub fn binding_names(&self) -> Vec<String> {
        self.matchers.binding_names()
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(AuthzError::InvalidPolicy("Rule id cannot be empty".to_string()));
        }
        if self.id == DEFAULT_DENY {
            return Err(AuthzError::InvalidPolicy(format!(
                "Rule id '{}' is reserved",
                DEFAULT_DENY
            )));
        }
        self.actions.validate(&self.id)?;
        self.matchers.validate(&self.id)
    }

    /// Matchers, then guard, then body. Exactly one outcome per call.
    pub(crate) fn evaluate(&self, input: &MatchInput<'_>) -> (RuleOutcome, StepStatus) {
        let Some(bindings) = self.matchers.apply(input) else {
            return (RuleOutcome::Next, StepStatus::MatchMiss);
        };

        if !(self.guard)(&bindings) {
            return (RuleOutcome::Next, StepStatus::GuardFalse);
        }

        let outcome = normalize((self.body)(&bindings));
        let status = match outcome.verdict() {
            Some(verdict) => StepStatus::Decided(verdict),
            None => StepStatus::Next,
        };
        (outcome, status)
    }
}

impl fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("id", &self.id)
            .field("actions", &self.actions)
            .field("matchers", &self.matchers)
            .finish_non_exhaustive()
    }
}

/// Decision reached by the evaluator, before the facade attaches the request
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecision {
    pub verdict: Verdict,
    pub rule_id: String,
    pub parameters: Parameters,
}

impl RuleDecision {
    fn default_deny() -> Self {
        Self {
            verdict: Verdict::Deny,
            rule_id: DEFAULT_DENY.to_string(),
            parameters: Parameters::new(),
        }
    }

    /// No rule decided
    pub fn is_default_deny(&self) -> bool {
        self.rule_id == DEFAULT_DENY
    }
}

/// Ordered, validated rule table; declaration order is evaluation order
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<RuleDefinition>,
}

impl RuleCatalog {
    /// Validate and freeze a rule table
    pub fn new(rules: Vec<RuleDefinition>) -> Result<Self> {
        let mut ids = HashSet::new();
        for rule in &rules {
            rule.validate()?;
            if !ids.insert(rule.id.as_str()) {
                return Err(AuthzError::DuplicateRuleId(rule.id.clone()));
            }
        }
        Ok(Self { rules })
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the catalog has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule ids in declaration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.id.as_str())
    }

    /// Rules scoped to `action`, in declaration order
    pub fn applicable<'a>(&'a self, action: &'a str) -> impl Iterator<Item = &'a RuleDefinition> + 'a {
        self.rules
            .iter()
            .filter(move |rule| rule.actions.applies_to(action))
    }

    /// Run the rule table, stopping at the first decision
    pub fn evaluate(
        &self,
        subject: &Value,
        object: &Value,
        action: &str,
        context: &Value,
    ) -> RuleDecision {
        self.evaluate_with(subject, object, action, context, |_| {})
    }

    /// Like [`evaluate`](Self::evaluate), reporting every rule visited
    pub fn evaluate_with<F>(
        &self,
        subject: &Value,
        object: &Value,
        action: &str,
        context: &Value,
        mut observe: F,
    ) -> RuleDecision
    where
        F: FnMut(RuleStep),
    {
        let action_value = Value::String(action.to_string());
        let input = MatchInput {
            subject,
            object,
            action: &action_value,
            context,
        };

        for rule in &self.rules {
            if !rule.actions.applies_to(action) {
                debug!(rule = %rule.id, action, "Rule not scoped to action, skipping");
                observe(RuleStep {
                    rule_id: rule.id.clone(),
                    status: StepStatus::ActionFiltered,
                });
                continue;
            }

            let (outcome, status) = rule.evaluate(&input);
            debug!(rule = %rule.id, ?status, "Rule evaluated");
            observe(RuleStep {
                rule_id: rule.id.clone(),
                status,
            });

            if let RuleOutcome::Decision { verdict, parameters } = outcome {
                return RuleDecision {
                    verdict,
                    rule_id: rule.id.clone(),
                    parameters,
                };
            }
        }

        debug!(action, "No rule decided, falling back to default deny");
        RuleDecision::default_deny()
    }
}
