//! Work-order metadata stamped onto every row of a freshly produced diff
//! log: who ran the diff, when, and under what team/story. The engine
//! itself has no notion of wall-clock time or operator identity — these
//! three fields are pure CLI-side bookkeeping, filled in once per run and
//! copied onto every row.

pub struct WorkOrder {
    pub dev_work_log_name: String,
    pub request_timestamp: String,
    pub work_team: String,
    pub developer_name: String,
    pub user_story: String,
}

impl WorkOrder {
    pub fn new(work_team: &str, developer_name: &str, user_story: &str) -> Self {
        WorkOrder {
            dev_work_log_name: generate_work_log_name(),
            request_timestamp: chrono::Utc::now().to_rfc3339(),
            work_team: work_team.to_string(),
            developer_name: developer_name.to_string(),
            user_story: user_story.to_string(),
        }
    }

    pub fn stamp(&self, rows: &mut [metatree_core::DiffRow]) {
        for row in rows {
            row.dev_work_log_name = self.dev_work_log_name.clone();
            row.request_timestamp = self.request_timestamp.clone();
            row.work_team = self.work_team.clone();
            row.developer_name = self.developer_name.clone();
            row.user_story = self.user_story.clone();
        }
    }
}

/// `WL-<timestamp>-<short-uuid>`, unique enough to distinguish two diff
/// runs against the same target without needing a shared sequence source.
fn generate_work_log_name() -> String {
    let ts = chrono::Utc::now().timestamp_millis();
    let short: String = uuid::Uuid::new_v4().to_string()[..8].to_string();
    format!("WL-{ts}-{short}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_every_row_identically() {
        let order = WorkOrder::new("TeamA", "Dev", "US-1");
        let mut rows = vec![
            metatree_core::DiffRow {
                dev_work_log_name: String::new(),
                request_timestamp: String::new(),
                work_team: String::new(),
                developer_name: String::new(),
                user_story: String::new(),
                merge_action: metatree_core::MergeAction::CreateItem,
                metadata: "CustomObject=Account".to_string(),
                path: "objects/Account/Account.object".to_string(),
                l1_key: String::new(),
                l2_key: String::new(),
                l3_key: String::new(),
                l4_key: String::new(),
                new_value: String::new(),
                old_values: vec![],
            },
            metatree_core::DiffRow {
                dev_work_log_name: String::new(),
                request_timestamp: String::new(),
                work_team: String::new(),
                developer_name: String::new(),
                user_story: String::new(),
                merge_action: metatree_core::MergeAction::UpdateItem,
                metadata: "CustomObject=Account".to_string(),
                path: "objects/Account/Account.object".to_string(),
                l1_key: String::new(),
                l2_key: String::new(),
                l3_key: String::new(),
                l4_key: String::new(),
                new_value: String::new(),
                old_values: vec![],
            },
        ];

        order.stamp(&mut rows);
        assert_eq!(rows[0].work_team, "TeamA");
        assert_eq!(rows[0].dev_work_log_name, rows[1].dev_work_log_name);
        assert!(rows[0].dev_work_log_name.starts_with("WL-"));
    }
}
