//! Audit trail for authorization decisions
//!
//! Every decision the policy returns can be handed to an [`AuditSink`].
//! Entries are self-contained: verdict, deciding rule, and the ordered
//! parameter list, ready to be written as one JSON record.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Level};

use crate::types::{AuthorizationResult, Parameters, Verdict};

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Decision id of the result this entry records
    pub id: String,

    /// Decision timestamp
    pub timestamp: DateTime<Utc>,

    /// Decision result
    pub verdict: Verdict,

    /// Rule that made the decision
    pub deciding_rule_id: String,

    /// Action being performed
    pub action: String,

    /// Request latency in microseconds
    pub latency_us: u64,

    /// Result parameters, optionally without `context`
    pub parameters: Parameters,
}

impl AuditEntry {
    /// Build an entry from a result, dropping `context` unless `include_context`
    pub fn from_result(result: &AuthorizationResult, latency_us: u64, include_context: bool) -> Self {
        let parameters = if include_context {
            result.parameters.clone()
        } else {
            result
                .parameters
                .iter()
                .filter(|(key, _)| key != "context")
                .cloned()
                .collect()
        };

        Self {
            id: result.decision_id.clone(),
            timestamp: result.timestamp,
            verdict: result.verdict,
            deciding_rule_id: result.deciding_rule_id.clone(),
            action: result.action().unwrap_or_default().to_string(),
            latency_us,
            parameters,
        }
    }
}

/// `tracing` target audit events are emitted on
pub const AUDIT_TARGET: &str = "rulebook_authz::audit";

/// Destination for audit entries
pub trait AuditSink: Send + Sync {
    /// Store or emit one entry
    fn record(&self, entry: &AuditEntry);
}

/// Emits each entry as a structured `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry) {
        if !tracing::enabled!(target: AUDIT_TARGET, Level::INFO) {
            return;
        }

        let parameters = match serde_json::to_string(&entry.parameters) {
            Ok(parameters) => parameters,
            Err(e) => {
                warn!(
                    target: AUDIT_TARGET,
                    decision_id = %entry.id,
                    error = %e,
                    "Failed to serialize audit parameters"
                );
                String::new()
            }
        };

        info!(
            target: AUDIT_TARGET,
            decision_id = %entry.id,
            verdict = %entry.verdict,
            rule = %entry.deciding_rule_id,
            action = %entry.action,
            latency_us = entry.latency_us,
            %parameters,
            "Authorization decision"
        );
    }
}

/// In-memory audit buffer, mainly for tests and short-lived tools
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries in recording order
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    /// Number of recorded entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entries decided by `rule_id`
    pub fn by_rule(&self, rule_id: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.deciding_rule_id == rule_id)
            .cloned()
            .collect()
    }

    /// Entries with the given verdict
    pub fn by_verdict(&self, verdict: Verdict) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.verdict == verdict)
            .cloned()
            .collect()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, entry: &AuditEntry) {
        self.entries.write().push(entry.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, AuthorizationContext, DEFAULT_DENY};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::io;
    use std::sync::Arc;

    fn result(verdict: Verdict, rule: &str) -> AuthorizationResult {
        AuthorizationResult::new(
            verdict,
            rule,
            json!({"id": "alice"}),
            json!({"id": "doc-1"}),
            &Action::new("read"),
            AuthorizationContext::new().with("ssn", "redact-me"),
            Parameters::new(),
        )
    }

    #[test]
    fn test_entry_from_result() {
        let result = result(Verdict::Allow, "owner");
        let entry = AuditEntry::from_result(&result, 42, true);

        assert_eq!(entry.id, result.decision_id);
        assert_eq!(entry.action, "read");
        assert_eq!(entry.latency_us, 42);
        assert_eq!(entry.parameters, result.parameters);
    }

    #[test]
    fn test_entry_without_context() {
        let entry = AuditEntry::from_result(&result(Verdict::Allow, "owner"), 0, false);

        let keys: Vec<_> = entry.parameters.keys().collect();
        assert_eq!(keys, vec!["subject", "object", "action"]);
    }

    #[test]
    fn test_in_memory_log_queries() {
        let log = InMemoryAuditLog::new();
        assert!(log.is_empty());

        log.record(&AuditEntry::from_result(&result(Verdict::Allow, "owner"), 1, true));
        log.record(&AuditEntry::from_result(&result(Verdict::Deny, DEFAULT_DENY), 1, true));
        log.record(&AuditEntry::from_result(&result(Verdict::Allow, "admin"), 1, true));

        assert_eq!(log.len(), 3);
        assert_eq!(log.by_rule("owner").len(), 1);
        assert_eq!(log.by_verdict(Verdict::Allow).len(), 2);
        assert_eq!(log.by_verdict(Verdict::Deny)[0].deciding_rule_id, DEFAULT_DENY);

        log.clear();
        assert!(log.is_empty());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn record_with_level(level: Level) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let entry = AuditEntry::from_result(&result(Verdict::Deny, "locked"), 5, true);
        tracing::subscriber::with_default(subscriber, || TracingAuditSink.record(&entry));
        logs.text()
    }

    #[test]
    fn test_tracing_sink_emits_parameters() {
        let output = record_with_level(Level::INFO);

        assert!(output.contains("Authorization decision"));
        assert!(output.contains("locked"));
        assert!(output.contains("redact-me"));
    }

    #[test]
    fn test_tracing_sink_silent_when_info_disabled() {
        assert!(record_with_level(Level::WARN).is_empty());
    }

    #[test]
    fn test_tracing_sink_without_subscriber() {
        TracingAuditSink.record(&AuditEntry::from_result(&result(Verdict::Deny, "x"), 5, true));
    }
}
