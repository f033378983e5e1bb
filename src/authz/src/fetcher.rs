//! Fetcher definitions and the context-building pass
//!
//! Fetchers lazily compute context attributes. The builder visits them in
//! declaration order; a fetcher whose attribute is already present is
//! skipped without invoking its body, so callers can pre-supply values to
//! bypass expensive lookups, and later fetchers can depend on attributes
//! produced by earlier ones.

use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AuthzError, FetchFailure, Result};
use crate::matcher::{Bindings, MatchInput, Matcher, MatcherSet};
use crate::outcome::FetchOutcome;
use crate::rule::{always, Guard};
use crate::trace::{FetchStatus, FetchStep};
use crate::types::{Action, AuthorizationContext};

/// Fetcher body
pub type FetchBody = Arc<dyn Fn(&Bindings) -> FetchOutcome + Send + Sync>;

/// Computes one context attribute when it is absent and the fetcher applies
#[derive(Clone)]
pub struct FetcherDefinition {
    id: String,
    attribute: String,
    matchers: MatcherSet,
    guard: Guard,
    body: FetchBody,
}

impl FetcherDefinition {
    /// Create a fetcher that stores its body's value under `attribute`
    pub fn new<F, R>(id: impl Into<String>, attribute: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Bindings) -> R + Send + Sync + 'static,
        R: Into<FetchOutcome>,
    {
        Self {
            id: id.into(),
            attribute: attribute.into(),
            matchers: MatcherSet::any(),
            guard: always(),
            body: Arc::new(move |bindings| body(bindings).into()),
        }
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

    /// Set the action matcher
    pub fn action(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matchers.action = Arc::new(matcher);
        self
    }

    /// Set the context matcher
    pub fn context(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matchers.context = Arc::new(matcher);
        self
    }

    /// Set the guard run after the matchers accept
    pub fn guard<F>(mut self, guard: F) -> Self
    where
        F: Fn(&Bindings) -> bool + Send + Sync + 'static,
    {
        self.guard = Arc::new(guard);
        self
    }

    /// Fetcher identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Context key this fetcher writes
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(AuthzError::InvalidPolicy("Fetcher id cannot be empty".to_string()));
        }
        if self.attribute.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "Fetcher '{}' has an empty target attribute",
                self.id
            )));
        }
        self.matchers.validate(&self.id)
    }
}

impl fmt::Debug for FetcherDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetcherDefinition")
            .field("id", &self.id)
            .field("attribute", &self.attribute)
            .field("matchers", &self.matchers)
            .finish_non_exhaustive()
    }
}

/// Ordered, validated fetcher table
#[derive(Debug, Clone, Default)]
pub struct FetcherCatalog {
    fetchers: Vec<FetcherDefinition>,
}

impl FetcherCatalog {
    /// Build a catalog, rejecting invalid or duplicate fetchers
    pub fn new(fetchers: Vec<FetcherDefinition>) -> Result<Self> {
        let mut ids = HashSet::new();
        for fetcher in &fetchers {
            fetcher.validate()?;
            if !ids.insert(fetcher.id.as_str()) {
                return Err(AuthzError::DuplicateFetcherId(fetcher.id.clone()));
            }
        }
        Ok(Self { fetchers })
    }

    /// Number of fetchers
    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    /// Whether the catalog has no fetchers
    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    /// Fetchers in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &FetcherDefinition> {
        self.fetchers.iter()
    }
}

/// Runs a [`FetcherCatalog`] over one request's context
#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder<'a> {
    catalog: &'a FetcherCatalog,
}

impl<'a> ContextBuilder<'a> {
    /// Create a builder over `catalog`
    pub fn new(catalog: &'a FetcherCatalog) -> Self {
        Self { catalog }
    }

    /// Fill in absent attributes; the first failing fetcher aborts the pass
    pub fn build(
        &self,
        subject: &Value,
        object: &Value,
        action: &Action,
        context: AuthorizationContext,
    ) -> std::result::Result<AuthorizationContext, FetchFailure> {
        self.build_with(subject, object, action, context, |_| {})
    }

    /// Like [`build`](Self::build), reporting every fetcher visited
    pub fn build_with<F>(
        &self,
        subject: &Value,
        object: &Value,
        action: &Action,
        mut context: AuthorizationContext,
        mut observe: F,
    ) -> std::result::Result<AuthorizationContext, FetchFailure>
    where
        F: FnMut(FetchStep),
    {
        let action_value = action.to_value();
        let mut snapshot = context.to_value();

        for fetcher in &self.catalog.fetchers {
            let mut report = |status| {
                observe(FetchStep {
                    fetcher_id: fetcher.id.clone(),
                    attribute: fetcher.attribute.clone(),
                    status,
                })
            };

            if context.contains(&fetcher.attribute) {
                debug!(fetcher = %fetcher.id, attribute = %fetcher.attribute, "Attribute already present, skipping fetcher");
                report(FetchStatus::AlreadyPresent);
                continue;
            }

            let input = MatchInput {
                subject,
                object,
                action: &action_value,
                context: &snapshot,
            };

            let Some(bindings) = fetcher.matchers.apply(&input) else {
                report(FetchStatus::MatchMiss);
                continue;
            };

            if !(fetcher.guard)(&bindings) {
                report(FetchStatus::GuardFalse);
                continue;
            }

            match (fetcher.body)(&bindings) {
                FetchOutcome::Value(value) => {
                    debug!(fetcher = %fetcher.id, attribute = %fetcher.attribute, "Fetched context attribute");
                    context.insert_absent(fetcher.attribute.clone(), value);
                    snapshot = context.to_value();
                    report(FetchStatus::Fetched);
                }
                FetchOutcome::Failure(reason) => {
                    warn!(fetcher = %fetcher.id, attribute = %fetcher.attribute, %reason, "Fetcher failed");
                    report(FetchStatus::Failed);
                    return Err(FetchFailure {
                        fetcher: fetcher.id.clone(),
                        attribute: fetcher.attribute.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(context)
    }
}
