//! Process role as reported by the leader-election service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Kind of process this instance runs as.
///
/// Built from a string; `"worker"` always becomes [`ProcessKind::Worker`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProcessKind {
    Worker,
    Other(OtherKind),
}

/// Name of a non-worker process kind. Only constructed through
/// `ProcessKind::from`, so it never holds `"worker"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OtherKind(String);

impl OtherKind {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ProcessKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Worker => "worker",
            Self::Other(kind) => kind.as_str(),
        }
    }
}

impl From<String> for ProcessKind {
    fn from(s: String) -> Self {
        if s == "worker" {
            Self::Worker
        } else {
            Self::Other(OtherKind(s))
        }
    }
}

impl From<&str> for ProcessKind {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<ProcessKind> for String {
    fn from(kind: ProcessKind) -> Self {
        kind.to_string()
    }
}

impl std::fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// This process's role in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSignature {
    pub kind: ProcessKind,
    pub is_leader: bool,
}

impl InstanceSignature {
    pub fn new(kind: impl Into<ProcessKind>, is_leader: bool) -> Self {
        Self {
            kind: kind.into(),
            is_leader,
        }
    }

    /// Only the elected leader among workers makes dispatch decisions.
    pub fn runs_scheduler(&self) -> bool {
        self.kind == ProcessKind::Worker && self.is_leader
    }
}

#[async_trait]
pub trait InstanceIdentity: Send + Sync {
    async fn instance_signature(&self) -> Result<InstanceSignature, SyncError>;
}

/// Fixed signature, for single-process deployments and tests.
#[derive(Debug, Clone)]
pub struct StaticInstance(pub InstanceSignature);

impl StaticInstance {
    pub fn leader() -> Self {
        Self(InstanceSignature::new(ProcessKind::Worker, true))
    }

    pub fn follower() -> Self {
        Self(InstanceSignature::new(ProcessKind::Worker, false))
    }
}

#[async_trait]
impl InstanceIdentity for StaticInstance {
    async fn instance_signature(&self) -> Result<InstanceSignature, SyncError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_leading_worker_schedules() {
        assert!(InstanceSignature::new("worker", true).runs_scheduler());
        assert!(!InstanceSignature::new("worker", false).runs_scheduler());
        assert!(!InstanceSignature::new("api", true).runs_scheduler());
    }

    #[test]
    fn worker_string_always_normalizes() {
        assert_eq!(ProcessKind::from("worker"), ProcessKind::Worker);
        assert_eq!(ProcessKind::from("worker".to_string()), ProcessKind::Worker);
        assert!(InstanceSignature::new(String::from("worker"), true).runs_scheduler());

        let api = ProcessKind::from("api");
        assert!(matches!(&api, ProcessKind::Other(kind) if kind.as_str() == "api"));
        assert_eq!(api.to_string(), "api");
        // Case-sensitive, like every other identity comparison.
        assert_ne!(ProcessKind::from("Worker"), ProcessKind::Worker);
    }

    #[test]
    fn kind_roundtrips_as_string() {
        let sig = InstanceSignature::new("api", false);
        let v = serde_json::to_value(&sig).unwrap();
        assert_eq!(v["kind"], "api");
        assert_eq!(v["isLeader"], false);

        let back: InstanceSignature =
            serde_json::from_value(serde_json::json!({ "kind": "worker", "isLeader": true }))
                .unwrap();
        assert_eq!(back.kind, ProcessKind::Worker);
    }
}
