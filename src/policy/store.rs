//! Policy-gated store contract for profiles and the approval audit log.
//!
//! Every operation takes the calling [`Actor`]; implementations enforce the
//! shared rules in [`crate::policy::rules`] before touching a row. A policy
//! denial, a uniqueness conflict, and a plain database failure are distinct
//! errors; callers branch on them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::Actor;
use crate::modules::approvals::model::{
    ApprovalAction, ApprovalActionKind, ApproverRole,
};
use crate::modules::profiles::model::{ApprovalStatus, Profile, ProfileDetails, Role};
use crate::utils::pagination::PaginationParams;

/// Which uniqueness constraint a conflicting write hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    IdentityId,
    EnrollmentNo,
}

impl std::fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueKey::IdentityId => f.write_str("identity_id"),
            UniqueKey::EnrollmentNo => f.write_str("enrollment_no"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("access denied: {0}")]
    PolicyDenied(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(UniqueKey),

    #[error("database error")]
    Database(#[source] anyhow::Error),
}

/// New profile row. Status and the approval audit fields are set by the
/// provisioner (admins arrive pre-approved); everything else starts unset.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub identity_id: Uuid,
    pub role: Role,
    pub status: ApprovalStatus,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub details: ProfileDetails,
}

/// Result of an insert attempt under the `identity_id` uniqueness
/// constraint. A conflict is not an error: it means a concurrent or earlier
/// call already provisioned this identity.
#[derive(Debug)]
pub enum InsertOutcome {
    Created(Profile),
    AlreadyProvisioned(Profile),
}

/// Conditional status update. `expected` is the compare-and-swap key: the
/// write only applies if the row still carries that status, so the losing
/// writer of a concurrent approve/reject observes `PreconditionFailed`.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub expected: ApprovalStatus,
    pub new_status: ApprovalStatus,
    pub actor_identity: Uuid,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug)]
pub enum TransitionOutcome {
    Applied(Profile),
    PreconditionFailed,
    NotFound,
}

#[derive(Debug, Clone)]
pub struct NewApprovalAction {
    pub profile_id: Uuid,
    pub approver_id: Uuid,
    pub approver_role: ApproverRole,
    pub action: ApprovalActionKind,
    pub reason: Option<String>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert a profile, treating an `identity_id` conflict as "already
    /// provisioned, return the existing row". An `enrollment_no` conflict is
    /// surfaced as [`StoreError::UniqueViolation`].
    async fn insert_profile(
        &self,
        actor: &Actor,
        new: NewProfile,
    ) -> Result<InsertOutcome, StoreError>;

    async fn find_by_id(&self, actor: &Actor, id: Uuid) -> Result<Option<Profile>, StoreError>;

    async fn find_by_identity(
        &self,
        actor: &Actor,
        identity_id: Uuid,
    ) -> Result<Option<Profile>, StoreError>;

    /// List profiles in a status, scoped by the actor's visibility, oldest
    /// first. Returns the page plus the total row count in scope.
    async fn list_by_status(
        &self,
        actor: &Actor,
        status: ApprovalStatus,
        pagination: &PaginationParams,
    ) -> Result<(Vec<Profile>, i64), StoreError>;

    /// Count student profiles. Used by the legacy counting allocator.
    async fn count_students(&self, actor: &Actor) -> Result<i64, StoreError>;

    /// Atomically increment and return the enrollment sequence for a period
    /// (e.g. `"202608"`). Used by the sequence allocator.
    async fn next_enrollment_seq(&self, actor: &Actor, period: &str) -> Result<i64, StoreError>;

    /// Conditionally update the status field (see [`StatusTransition`]).
    async fn transition_status(
        &self,
        actor: &Actor,
        id: Uuid,
        transition: StatusTransition,
    ) -> Result<TransitionOutcome, StoreError>;

    /// Append one audit row.
    async fn append_action(
        &self,
        actor: &Actor,
        action: NewApprovalAction,
    ) -> Result<ApprovalAction, StoreError>;

    async fn list_actions(
        &self,
        actor: &Actor,
        profile_id: Uuid,
    ) -> Result<Vec<ApprovalAction>, StoreError>;
}
