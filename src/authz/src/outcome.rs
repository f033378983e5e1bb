//! Rule and fetcher body results, and their normalization

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

use crate::types::{Parameters, Verdict, DEFAULT_DENY};

/// What a rule body may return
///
/// Bodies are free to answer in whichever shape reads best; the evaluator
/// only ever sees the [`RuleOutcome`] produced by [`normalize`].
#[derive(Debug, Clone, PartialEq)]
pub enum RuleReturn {
    /// No decision, try the next rule
    Next,

    /// `true` allows, `false` falls through
    Bool(bool),

    /// Allow without parameters
    Ok,

    /// Allow with parameters
    OkWith(Parameters),

    /// Allow with a tag (ignored) and parameters
    OkTagged(Value, Parameters),

    /// Deny without parameters
    Err,

    /// Deny with parameters
    ErrWith(Parameters),

    /// Deny with a tag and parameters; tagged with [`DEFAULT_DENY`] it
    /// declines instead of denying
    ErrTagged(Value, Parameters),
}

impl RuleReturn {
    /// Explicitly decline by impersonating the default deny
    pub fn decline() -> Self {
        RuleReturn::ErrTagged(Value::String(DEFAULT_DENY.to_string()), Parameters::new())
    }

    /// Allow with the given justification
    pub fn allow_with(parameters: impl Into<Parameters>) -> Self {
        RuleReturn::OkWith(parameters.into())
    }

    /// Deny with the given justification
    pub fn deny_with(parameters: impl Into<Parameters>) -> Self {
        RuleReturn::ErrWith(parameters.into())
    }
}

impl From<bool> for RuleReturn {
    fn from(value: bool) -> Self {
        RuleReturn::Bool(value)
    }
}

impl From<Verdict> for RuleReturn {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Allow => RuleReturn::Ok,
            Verdict::Deny => RuleReturn::Err,
        }
    }
}

impl From<RuleOutcome> for RuleReturn {
    fn from(outcome: RuleOutcome) -> Self {
        match outcome {
            RuleOutcome::Next => RuleReturn::Next,
            RuleOutcome::Decision {
                verdict: Verdict::Allow,
                parameters,
            } => RuleReturn::OkWith(parameters),
            RuleOutcome::Decision {
                verdict: Verdict::Deny,
                parameters,
            } => RuleReturn::ErrWith(parameters),
        }
    }
}

/// Canonical result of one rule invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuleOutcome {
    /// No decision
    Next,

    /// The rule decided
    Decision {
        verdict: Verdict,
        parameters: Parameters,
    },
}

impl RuleOutcome {
    /// Allow decision
    pub fn allow(parameters: Parameters) -> Self {
        RuleOutcome::Decision {
            verdict: Verdict::Allow,
            parameters,
        }
    }

    /// Deny decision
    pub fn deny(parameters: Parameters) -> Self {
        RuleOutcome::Decision {
            verdict: Verdict::Deny,
            parameters,
        }
    }

    /// Whether the rule decided
    pub fn is_decision(&self) -> bool {
        matches!(self, RuleOutcome::Decision { .. })
    }

    /// Verdict, if the rule decided
    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            RuleOutcome::Next => None,
            RuleOutcome::Decision { verdict, .. } => Some(*verdict),
        }
    }
}

impl From<RuleReturn> for RuleOutcome {
    fn from(value: RuleReturn) -> Self {
        normalize(value)
    }
}

/// Map a rule body's return value onto a [`RuleOutcome`]
pub fn normalize(value: RuleReturn) -> RuleOutcome {
    match value {
        RuleReturn::Next => RuleOutcome::Next,
        RuleReturn::Bool(true) => RuleOutcome::allow(Parameters::new()),
        RuleReturn::Bool(false) => RuleOutcome::Next,
        RuleReturn::Ok => RuleOutcome::allow(Parameters::new()),
        RuleReturn::OkWith(parameters) => RuleOutcome::allow(parameters),
        RuleReturn::OkTagged(_, parameters) => RuleOutcome::allow(parameters),
        RuleReturn::Err => RuleOutcome::deny(Parameters::new()),
        RuleReturn::ErrWith(parameters) => RuleOutcome::deny(parameters),
        RuleReturn::ErrTagged(tag, _) if tag.as_str() == Some(DEFAULT_DENY) => RuleOutcome::Next,
        RuleReturn::ErrTagged(_, parameters) => RuleOutcome::deny(parameters),
    }
}

/// What a fetcher body returns
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Store this value under the fetcher's attribute, as-is
    Value(Value),

    /// Abort context building
    Failure(String),
}

impl FetchOutcome {
    /// Store this value
    pub fn value(value: impl Into<Value>) -> Self {
        FetchOutcome::Value(value.into())
    }

    /// Abort with this reason
    pub fn failure(reason: impl Into<String>) -> Self {
        FetchOutcome::Failure(reason.into())
    }
}

impl From<Value> for FetchOutcome {
    fn from(value: Value) -> Self {
        FetchOutcome::Value(value)
    }
}

impl<V, E> From<std::result::Result<V, E>> for FetchOutcome
where
    V: Into<Value>,
    E: Display,
{
    fn from(result: std::result::Result<V, E>) -> Self {
        match result {
            Ok(value) => FetchOutcome::Value(value.into()),
            Err(e) => FetchOutcome::Failure(e.to_string()),
        }
    }
}
