//! Approval workflow models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Role of the human performing an approve/reject. Only admins and teachers
/// ever act as approvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApproverRole {
    Admin,
    Teacher,
}

impl ApproverRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApproverRole::Admin => "admin",
            ApproverRole::Teacher => "teacher",
        }
    }

    pub fn parse(s: &str) -> Option<ApproverRole> {
        match s {
            "admin" => Some(ApproverRole::Admin),
            "teacher" => Some(ApproverRole::Teacher),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalActionKind {
    Approve,
    Reject,
}

impl ApprovalActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalActionKind::Approve => "approve",
            ApprovalActionKind::Reject => "reject",
        }
    }

    pub fn parse(s: &str) -> Option<ApprovalActionKind> {
        match s {
            "approve" => Some(ApprovalActionKind::Approve),
            "reject" => Some(ApprovalActionKind::Reject),
            _ => None,
        }
    }
}

/// Append-only audit record. Exactly one row exists per successful
/// approve/reject transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApprovalAction {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub approver_id: Uuid,
    pub approver_role: ApproverRole,
    pub action: ApprovalActionKind,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// DTO for rejecting a profile. The reason is mandatory and ends up on both
/// the profile and the audit row.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RejectDto {
    #[validate(length(min = 1, message = "rejection reason must not be empty"))]
    pub reason: String,
}

/// Per-row failure inside a best-effort bulk approval.
#[derive(Debug, Serialize, ToSchema)]
pub struct BulkApprovalFailure {
    pub profile_id: Uuid,
    pub error: String,
}

/// Outcome of approve-all: each pending row transitions independently, so
/// the caller gets a success count and the failures, never all-or-nothing.
#[derive(Debug, Serialize, ToSchema)]
pub struct BulkApprovalOutcome {
    pub approved: usize,
    pub failures: Vec<BulkApprovalFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_dto_requires_reason() {
        let dto = RejectDto {
            reason: "".to_string(),
        };
        assert!(dto.validate().is_err());

        let dto = RejectDto {
            reason: "incomplete guardian info".to_string(),
        };
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn test_approver_role_round_trip() {
        assert_eq!(ApproverRole::parse("admin"), Some(ApproverRole::Admin));
        assert_eq!(ApproverRole::parse("teacher"), Some(ApproverRole::Teacher));
        assert_eq!(ApproverRole::parse("student"), None);
    }
}
