use serde::{Deserialize, Serialize};

/// Severity levels for audit events.
/// Controls retention policies and log filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Access-control and data-integrity events: never auto-delete
    Critical,
    /// Ordinary record changes (default)
    #[default]
    Important,
    /// Noise events: aggressively trimmed (e.g., 7 days)
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Entities that can be published on the audit channel.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix in event names like "lead.assigned"
    fn entity_type() -> &'static str;

    /// Usually the entity's primary key
    fn subject_id(&self) -> i64;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
