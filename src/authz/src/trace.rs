//! Step-by-step explanation of one evaluation

use serde::{Deserialize, Serialize};

use crate::types::{AuthorizationResult, Verdict};

/// Why a rule did or did not decide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "verdict", rename_all = "snake_case")]
pub enum StepStatus {
    /// The rule is not scoped to the requested action
    ActionFiltered,
    /// A matcher rejected its candidate
    MatchMiss,
    /// Matchers accepted but the guard returned false
    GuardFalse,
    /// The body ran and produced no decision
    Next,
    /// The body ran and decided
    Decided(Verdict),
}

impl StepStatus {
    /// The rule body was invoked
    pub fn body_invoked(self) -> bool {
        matches!(self, StepStatus::Next | StepStatus::Decided(_))
    }
}

/// One rule visited by the evaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStep {
    pub rule_id: String,
    pub status: StepStatus,
}

/// What happened to one fetcher during context building
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// The attribute was already in the context; body not invoked
    AlreadyPresent,
    /// A matcher rejected its candidate
    MatchMiss,
    /// Matchers accepted but the guard returned false
    GuardFalse,
    /// The body ran and its value was stored
    Fetched,
    /// The body ran and reported failure
    Failed,
}

/// One fetcher visited by the context builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStep {
    pub fetcher_id: String,
    pub attribute: String,
    pub status: FetchStatus,
}

/// Result of [`Policy::explain`](crate::policy::Policy::explain)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTrace {
    /// Fetchers in declaration order
    pub fetches: Vec<FetchStep>,

    /// Rules visited, in declaration order, up to and including the deciding one
    pub rules: Vec<RuleStep>,

    /// Same result `authorize` returns
    pub result: AuthorizationResult,
}

impl EvaluationTrace {
    /// Ids of rules whose body actually ran
    pub fn invoked_rules(&self) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|step| step.status.body_invoked())
            .map(|step| step.rule_id.as_str())
            .collect()
    }

    /// Status of the named rule, if it was visited
    pub fn rule_status(&self, rule_id: &str) -> Option<StepStatus> {
        self.rules
            .iter()
            .find(|step| step.rule_id == rule_id)
            .map(|step| step.status)
    }

    /// Status of the named fetcher
    pub fn fetch_status(&self, fetcher_id: &str) -> Option<FetchStatus> {
        self.fetches
            .iter()
            .find(|step| step.fetcher_id == fetcher_id)
            .map(|step| step.status)
    }
}
