use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::change::ChangeKind;

/// Wire body POSTed to the alert endpoint.
///
/// Built fresh for each dispatch and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    /// Identity of the reporting agent.
    pub agent_id: String,
    /// Absolute path, lossily converted for non-UTF-8 names.
    pub file_path: String,
    /// What happened to the file.
    pub change_type: ChangeKind,
    /// Digest from the baseline before the change; absent for ADDED.
    pub old_hash: Option<String>,
    /// Digest after the change; absent for REMOVED.
    pub new_hash: Option<String>,
}

/// File metadata POSTed to the inventory endpoint after an ADDED or
/// MODIFIED classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryPayload {
    /// Identity of the reporting agent.
    pub agent_id: String,
    /// Absolute path, lossily converted for non-UTF-8 names.
    pub path: String,
    /// Digest now stored in the baseline.
    pub hash: String,
    /// Byte length at hashing time.
    pub size: u64,
    /// Modification time, when the platform reports one.
    pub modified_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_collector_field_names() {
        let payload = AlertPayload {
            agent_id: "agent-1".into(),
            file_path: "/srv/a.txt".into(),
            change_type: ChangeKind::Removed,
            old_hash: Some("abc".into()),
            new_hash: None,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "agentId": "agent-1",
                "filePath": "/srv/a.txt",
                "changeType": "removed",
                "oldHash": "abc",
                "newHash": null,
            })
        );
    }

    #[test]
    fn inventory_uses_collector_field_names() {
        let payload = InventoryPayload {
            agent_id: "agent-1".into(),
            path: "/srv/a.txt".into(),
            hash: "abc".into(),
            size: 5,
            modified_at: None,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "agentId": "agent-1",
                "path": "/srv/a.txt",
                "hash": "abc",
                "size": 5,
                "modifiedAt": null,
            })
        );
    }
}
