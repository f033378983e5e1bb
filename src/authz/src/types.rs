//! Core authorization types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::error::Result;

/// Reserved rule id reported when no rule decides
pub const DEFAULT_DENY: &str = "default-deny";

/// Wildcard action identifier; a rule scoped to it applies to every action
pub const ALL_ACTIONS: &str = "all";

/// Parameter keys every result starts with, in this order
pub const RESERVED_PARAMETERS: [&str; 4] = ["subject", "object", "action", "context"];

/// Action being performed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action {
    /// Action name (read, write, delete, etc.)
    pub name: String,
}

impl Action {
    /// Create a new action
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Action name
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The action as seen by action matchers
    pub fn to_value(&self) -> Value {
        Value::String(self.name.clone())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Final verdict of an authorization call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Allow the action
    Allow,
    /// Deny the action
    Deny,
}

impl Verdict {
    /// Whether this is an allow
    pub fn is_allow(self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allow => f.write_str("ALLOW"),
            Verdict::Deny => f.write_str("DENY"),
        }
    }
}

/// Ordered key/value list attached to a decision
///
/// Keys are not required to be unique; lookups return the first entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Vec<(String, Value)>);

impl Parameters {
    /// Create an empty parameter list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry (builder form)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    /// Append an entry
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.push((key.into(), value.into()));
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries as a slice
    pub fn as_slice(&self) -> &[(String, Value)] {
        &self.0
    }

    /// Consume into the underlying entries
    pub fn into_inner(self) -> Vec<(String, Value)> {
        self.0
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Extend<(String, Value)> for Parameters {
    fn extend<I: IntoIterator<Item = (String, Value)>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Parameters {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Ambient attributes for one authorization call
///
/// Each call owns its own context; fetchers only ever add keys that are
/// absent, so the map grows monotonically during a build pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationContext(Map<String, Value>);

impl AuthorizationContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute (builder form)
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(attribute.into(), value.into());
        self
    }

    /// Look up an attribute
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.0.get(attribute)
    }

    /// Whether the attribute is set
    pub fn contains(&self, attribute: &str) -> bool {
        self.0.contains_key(attribute)
    }

    /// Store an attribute unless it is already present.
    ///
    /// Returns `false` (and leaves the existing value untouched) when the
    /// attribute was already set.
    pub fn insert_absent(&mut self, attribute: impl Into<String>, value: Value) -> bool {
        let attribute = attribute.into();
        if self.0.contains_key(&attribute) {
            return false;
        }
        self.0.insert(attribute, value);
        true
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the context is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Attribute names in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// The context as seen by context matchers
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Consume into a JSON object
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for AuthorizationContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<HashMap<String, Value>> for AuthorizationContext {
    fn from(map: HashMap<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for AuthorizationContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Justification returned by every successful `authorize` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    /// Unique decision identifier
    pub decision_id: String,

    /// Allow or deny
    pub verdict: Verdict,

    /// Rule that decided, or [`DEFAULT_DENY`]
    pub deciding_rule_id: String,

    /// `subject`, `object`, `action`, `context`, then rule-supplied entries
    pub parameters: Parameters,

    /// Decision timestamp
    pub timestamp: DateTime<Utc>,
}

impl AuthorizationResult {
    /// Assemble a result, prefixing the reserved entries before the rule's own
    pub fn new(
        verdict: Verdict,
        deciding_rule_id: impl Into<String>,
        subject: Value,
        object: Value,
        action: &Action,
        context: AuthorizationContext,
        rule_parameters: Parameters,
    ) -> Self {
        let mut parameters = Parameters::new()
            .with("subject", subject)
            .with("object", object)
            .with("action", action.to_value())
            .with("context", context.into_value());
        parameters.extend(rule_parameters);

        Self {
            decision_id: Uuid::new_v4().to_string(),
            verdict,
            deciding_rule_id: deciding_rule_id.into(),
            parameters,
            timestamp: Utc::now(),
        }
    }

    /// Whether access was granted
    pub fn is_allowed(&self) -> bool {
        self.verdict.is_allow()
    }

    /// No rule decided; the verdict is the fallback deny
    pub fn is_default_deny(&self) -> bool {
        self.deciding_rule_id == DEFAULT_DENY
    }

    /// Subject recorded in the justification
    pub fn subject(&self) -> Option<&Value> {
        self.parameters.get("subject")
    }

    /// Object recorded in the justification
    pub fn object(&self) -> Option<&Value> {
        self.parameters.get("object")
    }

    /// Action recorded in the justification
    pub fn action(&self) -> Option<&str> {
        self.parameters.get("action").and_then(Value::as_str)
    }

    /// Final context after fetchers ran
    pub fn context(&self) -> Option<&Value> {
        self.parameters.get("context")
    }

    /// Entries supplied by the deciding rule
    pub fn rule_parameters(&self) -> &[(String, Value)] {
        let slice = self.parameters.as_slice();
        &slice[RESERVED_PARAMETERS.len().min(slice.len())..]
    }

    /// Serialize for an audit log
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
