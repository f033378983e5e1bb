//! Policy facade: context building, rule evaluation, and justification
//!
//! # Pipeline
//!
//! ```text
//! authorize(subject, object, action, context)
//!     → ContextBuilder (fetchers, declaration order)
//!     → RuleCatalog (action-filtered, first decision wins, default deny)
//!     → AuthorizationResult (subject, object, action, context, rule params)
//!     → [Audit sink] [Metrics]
//! ```

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditSink, TracingAuditSink};
use crate::config::PolicyConfig;
use crate::error::Result;
use crate::fetcher::{ContextBuilder, FetcherCatalog, FetcherDefinition};
use crate::metrics::{EngineMetrics, MetricsCollector};
use crate::rule::{RuleCatalog, RuleDefinition};
use crate::trace::{EvaluationTrace, FetchStep, RuleStep};
use crate::types::{Action, AuthorizationContext, AuthorizationResult};

/// Immutable rule and fetcher tables plus the ambient audit/metrics hooks.
///
/// Cloning is cheap and every clone shares the same catalogs, so one policy
/// can serve concurrent `authorize` calls from many threads.
#[derive(Clone)]
pub struct Policy {
    rules: Arc<RuleCatalog>,
    fetchers: Arc<FetcherCatalog>,
    config: PolicyConfig,
    audit: Option<Arc<dyn AuditSink>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Policy {
    /// Start building a policy
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::default()
    }

    /// Decide whether `subject` may perform `action` on `object`.
    ///
    /// Fails only when a fetcher reports failure, in which case no rule has
    /// run. Otherwise the result always carries a verdict, falling back to
    /// [`DEFAULT_DENY`](crate::types::DEFAULT_DENY) when no rule decides.
    pub fn authorize(
        &self,
        subject: impl Into<Value>,
        object: impl Into<Value>,
        action: impl Into<Action>,
        context: impl Into<AuthorizationContext>,
    ) -> Result<AuthorizationResult> {
        self.run(
            subject.into(),
            object.into(),
            action.into(),
            context.into(),
            |_| {},
            |_| {},
        )
    }

    /// [`authorize`](Self::authorize) with an empty initial context
    pub fn authorize_default(
        &self,
        subject: impl Into<Value>,
        object: impl Into<Value>,
        action: impl Into<Action>,
    ) -> Result<AuthorizationResult> {
        self.authorize(subject, object, action, AuthorizationContext::new())
    }

    /// Same evaluation as `authorize`, also returning every fetcher and rule
    /// step taken. The verdict is identical.
    pub fn explain(
        &self,
        subject: impl Into<Value>,
        object: impl Into<Value>,
        action: impl Into<Action>,
        context: impl Into<AuthorizationContext>,
    ) -> Result<EvaluationTrace> {
        let mut fetches = Vec::new();
        let mut rules = Vec::new();

        let result = self.run(
            subject.into(),
            object.into(),
            action.into(),
            context.into(),
            |step| fetches.push(step),
            |step| rules.push(step),
        )?;

        Ok(EvaluationTrace {
            fetches,
            rules,
            result,
        })
    }

    /// Rule table in evaluation order
    pub fn rules(&self) -> &RuleCatalog {
        &self.rules
    }

    /// Fetchers in evaluation order
    pub fn fetchers(&self) -> &FetcherCatalog {
        &self.fetchers
    }

    /// Active configuration
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Metrics snapshot, if metrics are enabled
    pub fn metrics(&self) -> Option<EngineMetrics> {
        self.metrics.as_ref().map(|metrics| metrics.snapshot())
    }

    fn run<F, R>(
        &self,
        subject: Value,
        object: Value,
        action: Action,
        context: AuthorizationContext,
        on_fetch: F,
        on_rule: R,
    ) -> Result<AuthorizationResult>
    where
        F: FnMut(FetchStep),
        R: FnMut(RuleStep),
    {
        let start = Instant::now();

        debug!(%action, supplied = context.len(), "Authorization request");

        let context = match ContextBuilder::new(&self.fetchers)
            .build_with(&subject, &object, &action, context, on_fetch)
        {
            Ok(context) => context,
            Err(failure) => {
                warn!(%action, error = %failure, "Context building failed, no rule evaluated");
                if let Some(metrics) = &self.metrics {
                    metrics.record_fetch_failure();
                    metrics.record_latency(start.elapsed());
                }
                return Err(failure.into());
            }
        };

        let context_value = context.to_value();
        let decision = self.rules.evaluate_with(
            &subject,
            &object,
            action.as_str(),
            &context_value,
            on_rule,
        );

        info!(
            "Decision: {} by rule '{}' for action '{}'",
            decision.verdict, decision.rule_id, action
        );

        let result = AuthorizationResult::new(
            decision.verdict,
            decision.rule_id,
            subject,
            object,
            &action,
            context,
            decision.parameters,
        );

        self.finalize(&result, start);
        Ok(result)
    }

    fn finalize(&self, result: &AuthorizationResult, start: Instant) {
        let latency = start.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.record_decision(result);
            metrics.record_latency(latency);
        }

        if let Some(audit) = &self.audit {
            let latency_us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
            audit.record(&AuditEntry::from_result(
                result,
                latency_us,
                self.config.include_context_in_audit,
            ));
        }
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("rules", &self.rules.ids().collect::<Vec<_>>())
            .field("fetchers", &self.fetchers.len())
            .field("config", &self.config)
            .field("audit", &self.audit.is_some())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

/// Collects rule and fetcher definitions in declaration order
#[derive(Default)]
pub struct PolicyBuilder {
    rules: Vec<RuleDefinition>,
    fetchers: Vec<FetcherDefinition>,
    config: PolicyConfig,
    audit: Option<Arc<dyn AuditSink>>,
}

impl PolicyBuilder {
    /// Append a rule
    pub fn rule(mut self, rule: RuleDefinition) -> Self {
        self.rules.push(rule);
        self
    }

    /// Append several rules
    pub fn rules(mut self, rules: impl IntoIterator<Item = RuleDefinition>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Append a fetcher
    pub fn fetcher(mut self, fetcher: FetcherDefinition) -> Self {
        self.fetchers.push(fetcher);
        self
    }

    /// Append several fetchers
    pub fn fetchers(mut self, fetchers: impl IntoIterator<Item = FetcherDefinition>) -> Self {
        self.fetchers.extend(fetchers);
        self
    }

    /// Replace the configuration
    pub fn config(mut self, config: PolicyConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default [`TracingAuditSink`]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Validate every definition and freeze the catalogs.
    ///
    /// Duplicate ids, binding collisions, and malformed definitions are
    /// reported here, never at call time.
    pub fn build(self) -> Result<Policy> {
        self.config.validate()?;

        let rules = RuleCatalog::new(self.rules)?;
        let fetchers = FetcherCatalog::new(self.fetchers)?;

        let audit = if self.config.enable_audit {
            Some(self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)))
        } else {
            None
        };

        let metrics = if self.config.enable_metrics {
            Some(Arc::new(MetricsCollector::with_capacity(
                self.config.metrics_sample_capacity,
            )))
        } else {
            None
        };

        info!(
            "Policy built with {} rules, {} fetchers, audit={}, metrics={}",
            rules.len(),
            fetchers.len(),
            audit.is_some(),
            metrics.is_some()
        );

        Ok(Policy {
            rules: Arc::new(rules),
            fetchers: Arc::new(fetchers),
            config: self.config,
            audit,
            metrics,
        })
    }
}
