//! Best-effort batch operations.
//!
//! Every store accepts a heterogeneous list of create/update/delete
//! operations and applies each independently: a failed item is recorded in
//! the report and the batch continues. Nothing here is transactional.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// One operation in a batch, generic over the store's create and update
/// payload types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BatchOperation<C, U> {
    Create { payload: C },
    Update { id: Uuid, update: U },
    Delete { id: Uuid },
}

/// Outcome of one batch item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Position of the operation in the submitted batch
    pub index: usize,
    pub success: bool,
    /// Id the operation resolved to, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable machine code mirroring [`StoreError::code`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl BatchOutcome {
    pub fn ok(index: usize, id: Uuid) -> Self {
        Self {
            index,
            success: true,
            id: Some(id),
            error: None,
            code: None,
        }
    }

    pub fn failed(index: usize, id: Option<Uuid>, error: &StoreError) -> Self {
        Self {
            index,
            success: false,
            id,
            error: Some(error.to_string()),
            code: Some(error.code().to_string()),
        }
    }
}

/// Report for a whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: Vec<BatchOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len() - succeeded;
        Self {
            outcomes,
            succeeded,
            failed,
        }
    }

    /// Indexes of failed operations, for caller-side retry of the subset.
    pub fn failed_indexes(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| o.index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EntityKind;

    #[test]
    fn test_report_counts() {
        let id = Uuid::new_v4();
        let err = StoreError::not_found(EntityKind::Packet, id);
        let report = BatchReport::from_outcomes(vec![
            BatchOutcome::ok(0, id),
            BatchOutcome::failed(1, Some(id), &err),
            BatchOutcome::ok(2, Uuid::new_v4()),
        ]);

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_indexes(), vec![1]);
        assert_eq!(report.outcomes[1].code.as_deref(), Some("not_found"));
    }

    #[test]
    fn test_operation_wire_format() {
        let op: BatchOperation<String, String> = BatchOperation::Delete { id: Uuid::nil() };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains(r#""op":"delete""#));
    }
}
