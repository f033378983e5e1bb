//! Structural matchers for subjects, objects, actions, and context
//!
//! A matcher either rejects a candidate or accepts it and extracts named
//! [`Bindings`] from its shape. Rules and fetchers carry one matcher per
//! slot ([`MatcherSet`]); a definition applies only when all four accept,
//! and the bindings of the four slots are merged before the guard and body
//! see them.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{AuthzError, Result};

/// Variables extracted by matchers, keyed by binding name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Bindings(BTreeMap<String, Value>);

impl Bindings {
    /// Create an empty binding set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding (builder form)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add or replace a binding
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up a binding
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Binding as a string slice, if it is a JSON string
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Binding as an integer, if it is a JSON integer
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    /// Binding as a bool, if it is a JSON bool
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// Whether `name` is bound
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bindings in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge another slot's bindings into this one.
    ///
    /// Names are disjoint for validated definitions, so order only matters
    /// for ad-hoc matchers that bind undeclared names.
    pub fn merge(&mut self, other: Bindings) {
        self.0.extend(other.0);
    }
}

/// Predicate plus extractor over one candidate value
pub trait Matcher: Send + Sync {
    /// `None` rejects the candidate; `Some` accepts it with bindings
    fn matches(&self, candidate: &Value) -> Option<Bindings>;

    /// Names this matcher may bind, checked for collisions at definition time
    fn binding_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Shared, type-erased matcher
pub type SharedMatcher = Arc<dyn Matcher>;

/// Compiled `*` wildcard pattern over strings
#[derive(Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    /// Compile a pattern such as `"*"`, `"admin:*"`, `"*:viewer"`, or `"doc-*-draft"`
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|e| {
            AuthzError::InvalidPolicy(format!("Invalid glob pattern '{}': {}", pattern, e))
        })?;

        Ok(Self { pattern, regex })
    }

    /// Whether `value` matches the whole pattern
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// The original glob text
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Glob").field(&self.pattern).finish()
    }
}

impl PartialEq for Glob {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

/// Structural pattern over JSON values
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Pattern {
    /// Accept anything, bind nothing
    #[default]
    Any,

    /// Accept anything and bind it under a name
    Bind(String),

    /// Accept only an equal value
    Eq(Value),

    /// Accept any of the listed values
    OneOf(Vec<Value>),

    /// Accept strings matching a wildcard pattern
    Glob(Glob),

    /// Accept objects containing every listed key, each matching its pattern.
    /// Extra keys are ignored.
    Object(Vec<(String, Pattern)>),

    /// Accept arrays of exactly this length, element-wise
    Array(Vec<Pattern>),

    /// Match the inner pattern and bind the whole candidate
    As(String, Box<Pattern>),
}

impl Pattern {
    /// Bind the whole candidate to `name`
    pub fn bind(name: impl Into<String>) -> Self {
        Pattern::Bind(name.into())
    }

    /// Accept only this exact value
    pub fn equals(value: impl Into<Value>) -> Self {
        Pattern::Eq(value.into())
    }

    /// Accept any of the listed values
    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Pattern::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Accept strings matching a `*`/`?` glob
    pub fn glob(pattern: impl Into<String>) -> Result<Self> {
        Ok(Pattern::Glob(Glob::new(pattern)?))
    }

    /// Object with the given required fields
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Pattern)>,
        K: Into<String>,
    {
        Pattern::Object(fields.into_iter().map(|(k, p)| (k.into(), p)).collect())
    }

    /// Object with a single required field
    pub fn field(key: impl Into<String>, pattern: Pattern) -> Self {
        Pattern::Object(vec![(key.into(), pattern)])
    }

    /// Array of exactly these items
    pub fn array(items: impl IntoIterator<Item = Pattern>) -> Self {
        Pattern::Array(items.into_iter().collect())
    }

    /// Bind the whole candidate under `name` when `self` matches
    pub fn bound_as(self, name: impl Into<String>) -> Self {
        Pattern::As(name.into(), Box::new(self))
    }

    fn match_into(&self, candidate: &Value, bindings: &mut Bindings) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Bind(name) => {
                bindings.insert(name.clone(), candidate.clone());
                true
            }
            Pattern::Eq(expected) => candidate == expected,
            Pattern::OneOf(options) => options.iter().any(|option| option == candidate),
            Pattern::Glob(glob) => candidate.as_str().is_some_and(|s| glob.is_match(s)),
            Pattern::Object(fields) => match candidate.as_object() {
                Some(map) => fields.iter().all(|(key, pattern)| {
                    map.get(key)
                        .is_some_and(|value| pattern.match_into(value, bindings))
                }),
                None => false,
            },
            Pattern::Array(items) => match candidate.as_array() {
                Some(values) if values.len() == items.len() => items
                    .iter()
                    .zip(values)
                    .all(|(pattern, value)| pattern.match_into(value, bindings)),
                _ => false,
            },
            Pattern::As(name, inner) => {
                if !inner.match_into(candidate, bindings) {
                    return false;
                }
                bindings.insert(name.clone(), candidate.clone());
                true
            }
        }
    }

    fn collect_names(&self, names: &mut Vec<String>) {
        match self {
            Pattern::Bind(name) => names.push(name.clone()),
            Pattern::Object(fields) => {
                for (_, pattern) in fields {
                    pattern.collect_names(names);
                }
            }
            Pattern::Array(items) => {
                for pattern in items {
                    pattern.collect_names(names);
                }
            }
            Pattern::As(name, inner) => {
                inner.collect_names(names);
                names.push(name.clone());
            }
            Pattern::Any | Pattern::Eq(_) | Pattern::OneOf(_) | Pattern::Glob(_) => {}
        }
    }
}

impl Matcher for Pattern {
    fn matches(&self, candidate: &Value) -> Option<Bindings> {
        let mut bindings = Bindings::new();
        self.match_into(candidate, &mut bindings).then_some(bindings)
    }

    fn binding_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }
}

type MatchFn = dyn Fn(&Value) -> Option<Bindings> + Send + Sync;

/// Closure-backed matcher for tests the [`Pattern`] enum cannot express
#[derive(Clone)]
pub struct FnMatcher {
    names: Vec<String>,
    func: Arc<MatchFn>,
}

impl FnMatcher {
    /// `names` must list every binding the closure may produce
    pub fn new<I, S, F>(names: I, func: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Value) -> Option<Bindings> + Send + Sync + 'static,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            func: Arc::new(func),
        }
    }

    /// Pure applicability test, binds nothing
    pub fn predicate<F>(func: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::new(Vec::<String>::new(), move |candidate| {
            func(candidate).then(Bindings::new)
        })
    }
}

impl fmt::Debug for FnMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMatcher")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl Matcher for FnMatcher {
    fn matches(&self, candidate: &Value) -> Option<Bindings> {
        (self.func)(candidate)
    }

    fn binding_names(&self) -> Vec<String> {
        self.names.clone()
    }
}

/// The candidates one rule or fetcher is tested against
#[derive(Debug, Clone, Copy)]
pub struct MatchInput<'a> {
    pub subject: &'a Value,
    pub object: &'a Value,
    pub action: &'a Value,
    pub context: &'a Value,
}

/// One matcher per slot, defaulting to match-any
#[derive(Clone)]
pub struct MatcherSet {
    pub(crate) subject: SharedMatcher,
    pub(crate) object: SharedMatcher,
    pub(crate) action: SharedMatcher,
    pub(crate) context: SharedMatcher,
}

impl MatcherSet {
    /// All four slots accept anything
    pub fn any() -> Self {
        let any: SharedMatcher = Arc::new(Pattern::Any);
        Self {
            subject: any.clone(),
            object: any.clone(),
            action: any.clone(),
            context: any,
        }
    }

    /// Run all four matchers; `None` as soon as one rejects
    pub fn apply(&self, input: &MatchInput<'_>) -> Option<Bindings> {
        let mut bindings = self.subject.matches(input.subject)?;
        bindings.merge(self.object.matches(input.object)?);
        bindings.merge(self.action.matches(input.action)?);
        bindings.merge(self.context.matches(input.context)?);
        Some(bindings)
    }

    /// Names bound across all four matchers
    pub fn binding_names(&self) -> Vec<String> {
        [&self.subject, &self.object, &self.action, &self.context]
            .iter()
            .flat_map(|matcher| matcher.binding_names())
            .collect()
    }

    /// Reject definitions that bind the same name twice
    pub(crate) fn validate(&self, definition: &str) -> Result<()> {
        let mut seen = HashSet::new();
        for name in self.binding_names() {
            if !seen.insert(name.clone()) {
                return Err(AuthzError::DuplicateBinding {
                    definition: definition.to_string(),
                    binding: name,
                });
            }
        }
        Ok(())
    }
}

impl Default for MatcherSet {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Debug for MatcherSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherSet")
            .field("bindings", &self.binding_names())
            .finish_non_exhaustive()
    }
}
