//! # Rulebook Authorization Engine
//!
//! In-process authorization decisions from an ordered table of declarative
//! rules, with lazily fetched context and an auditable justification for
//! every verdict.
//!
//! ## Features
//!
//! - **Structural matchers** over subject, object, action, and context that
//!   extract named bindings for guards and bodies
//! - **Ordered, short-circuiting evaluation**: the first rule that decides wins,
//!   and nothing decided means a default deny
//! - **Lazy context fetchers** that only run when their attribute is absent
//! - **Self-contained justification**: verdict, deciding rule id, and an
//!   ordered parameter list ready for an audit log
//! - **Audit sink and metrics** hooks, configured through [`PolicyConfig`]
//!
//! ## Example
//!
//! ```rust
//! use rulebook_authz::{ActionScope, Pattern, Policy, RuleDefinition, Verdict};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = Policy::builder()
//!     .rule(
//!         RuleDefinition::allow("admin", ActionScope::All)
//!             .subject(Pattern::field("role", Pattern::equals("admin"))),
//!     )
//!     .rule(
//!         RuleDefinition::allow("reader", ActionScope::one("read"))
//!             .subject(Pattern::field("role", Pattern::equals("reader"))),
//!     )
//!     .build()?;
//!
//! let result = policy.authorize_default(json!({"role": "reader"}), json!("doc-1"), "read")?;
//! assert_eq!(result.verdict, Verdict::Allow);
//! assert_eq!(result.deciding_rule_id, "reader");
//!
//! let result = policy.authorize_default(json!({"role": "reader"}), json!("doc-1"), "write")?;
//! assert!(result.is_default_deny());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod matcher;
pub mod metrics;
pub mod outcome;
pub mod policy;
pub mod rule;
pub mod trace;
pub mod types;

// Re-export commonly used types
pub use audit::{AuditEntry, AuditSink, InMemoryAuditLog, TracingAuditSink};
pub use config::PolicyConfig;
pub use error::{AuthzError, FetchFailure, Result};
pub use fetcher::{ContextBuilder, FetcherCatalog, FetcherDefinition};
pub use matcher::{Bindings, FnMatcher, Glob, MatchInput, Matcher, MatcherSet, Pattern};
pub use metrics::{EngineMetrics, MetricsCollector};
pub use outcome::{normalize, FetchOutcome, RuleOutcome, RuleReturn};
pub use policy::{Policy, PolicyBuilder};
pub use rule::{ActionScope, RuleCatalog, RuleDecision, RuleDefinition};
pub use trace::{EvaluationTrace, FetchStatus, FetchStep, RuleStep, StepStatus};
pub use types::{
    Action, AuthorizationContext, AuthorizationResult, Parameters, Verdict, ALL_ACTIONS,
    DEFAULT_DENY,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
