//! In-memory policy-gated store for development and tests.
//!
//! Enforces the same row-level rules and uniqueness constraints as the
//! Postgres store. The `identity_id` constraint doubles as the provisioning
//! idempotency guard, exactly as in production.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{
    InsertOutcome, NewApprovalAction, NewProfile, ProfileStore, StatusTransition, StoreError,
    TransitionOutcome, UniqueKey,
};
use super::{Actor, ListScope, rules};
use crate::modules::approvals::model::ApprovalAction;
use crate::modules::profiles::model::{ApprovalStatus, Profile, Role};
use crate::utils::pagination::PaginationParams;

#[derive(Default)]
struct MemState {
    profiles: HashMap<Uuid, Profile>,
    by_identity: HashMap<Uuid, Uuid>,
    enrollment_nos: HashSet<String>,
    counters: HashMap<String, i64>,
    actions: Vec<ApprovalAction>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemState>,
    /// Artificial delay (ms) between reading the student count and
    /// returning it. Zero in production use; tests raise it to make the
    /// count-then-construct allocation race deterministic.
    count_latency_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryStore {
    pub fn set_count_latency(&self, latency: std::time::Duration) {
        self.count_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Total number of audit rows, across all profiles.
    pub async fn action_count(&self) -> usize {
        self.state.read().await.actions.len()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn insert_profile(
        &self,
        actor: &Actor,
        new: NewProfile,
    ) -> Result<InsertOutcome, StoreError> {
        rules::check_insert_profile(actor)?;

        let mut state = self.state.write().await;

        if let Some(existing_id) = state.by_identity.get(&new.identity_id) {
            let existing = state.profiles[existing_id].clone();
            return Ok(InsertOutcome::AlreadyProvisioned(existing));
        }

        if let Some(code) = details_enrollment_no(&new) {
            if state.enrollment_nos.contains(code) {
                return Err(StoreError::UniqueViolation(UniqueKey::EnrollmentNo));
            }
        }

        let now = Utc::now();
        let profile = Profile {
            id: Uuid::new_v4(),
            identity_id: new.identity_id,
            role: new.role,
            status: new.status,
            created_at: now,
            updated_at: now,
            approved_by: new.approved_by,
            approved_at: new.approved_at,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            details: new.details,
        };

        if let Some(code) = profile.enrollment_no() {
            state.enrollment_nos.insert(code.to_string());
        }
        state.by_identity.insert(profile.identity_id, profile.id);
        state.profiles.insert(profile.id, profile.clone());

        Ok(InsertOutcome::Created(profile))
    }

    async fn find_by_id(&self, actor: &Actor, id: Uuid) -> Result<Option<Profile>, StoreError> {
        let state = self.state.read().await;
        match state.profiles.get(&id) {
            None => Ok(None),
            Some(profile) => {
                rules::check_read_profile(actor, profile)?;
                Ok(Some(profile.clone()))
            }
        }
    }

    async fn find_by_identity(
        &self,
        actor: &Actor,
        identity_id: Uuid,
    ) -> Result<Option<Profile>, StoreError> {
        let state = self.state.read().await;
        match state.by_identity.get(&identity_id) {
            None => Ok(None),
            Some(id) => {
                let profile = &state.profiles[id];
                rules::check_read_profile(actor, profile)?;
                Ok(Some(profile.clone()))
            }
        }
    }

    async fn list_by_status(
        &self,
        actor: &Actor,
        status: ApprovalStatus,
        pagination: &PaginationParams,
    ) -> Result<(Vec<Profile>, i64), StoreError> {
        let scope = rules::list_scope(actor)?;

        let state = self.state.read().await;
        let mut rows: Vec<Profile> = state
            .profiles
            .values()
            .filter(|p| p.status == status)
            .filter(|p| match scope {
                ListScope::All => true,
                ListScope::StudentsOnly => p.role == Role::Student,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .collect();

        Ok((page, total))
    }

    async fn count_students(&self, actor: &Actor) -> Result<i64, StoreError> {
        rules::check_sequence_access(actor)?;

        let count = {
            let state = self.state.read().await;
            state
                .profiles
                .values()
                .filter(|p| p.role == Role::Student)
                .count() as i64
        };

        let latency = self.count_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(latency)).await;
        }

        Ok(count)
    }

    async fn next_enrollment_seq(&self, actor: &Actor, period: &str) -> Result<i64, StoreError> {
        rules::check_sequence_access(actor)?;

        let mut state = self.state.write().await;
        let counter = state.counters.entry(period.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn transition_status(
        &self,
        actor: &Actor,
        id: Uuid,
        transition: StatusTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut state = self.state.write().await;

        let Some(profile) = state.profiles.get_mut(&id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        rules::check_transition(actor, profile)?;

        if profile.status != transition.expected {
            return Ok(TransitionOutcome::PreconditionFailed);
        }

        profile.status = transition.new_status;
        profile.updated_at = transition.at;
        match transition.new_status {
            ApprovalStatus::Approved => {
                profile.approved_by = Some(transition.actor_identity);
                profile.approved_at = Some(transition.at);
            }
            ApprovalStatus::Rejected => {
                profile.rejected_by = Some(transition.actor_identity);
                profile.rejected_at = Some(transition.at);
                profile.rejection_reason = transition.reason;
            }
            ApprovalStatus::Pending => {}
        }

        Ok(TransitionOutcome::Applied(profile.clone()))
    }

    async fn append_action(
        &self,
        actor: &Actor,
        action: NewApprovalAction,
    ) -> Result<ApprovalAction, StoreError> {
        let mut state = self.state.write().await;

        let profile = state
            .profiles
            .get(&action.profile_id)
            .ok_or_else(|| StoreError::Database(anyhow::anyhow!("audit append for unknown profile")))?;
        rules::check_append_action(actor, profile)?;

        let row = ApprovalAction {
            id: Uuid::new_v4(),
            profile_id: action.profile_id,
            approver_id: action.approver_id,
            approver_role: action.approver_role,
            action: action.action,
            reason: action.reason,
            created_at: Utc::now(),
        };
        state.actions.push(row.clone());
        Ok(row)
    }

    async fn list_actions(
        &self,
        actor: &Actor,
        profile_id: Uuid,
    ) -> Result<Vec<ApprovalAction>, StoreError> {
        let state = self.state.read().await;
        if let Some(profile) = state.profiles.get(&profile_id) {
            rules::check_read_actions(actor, profile)?;
        }
        Ok(state
            .actions
            .iter()
            .filter(|a| a.profile_id == profile_id)
            .cloned()
            .collect())
    }
}

fn details_enrollment_no(new: &NewProfile) -> Option<&str> {
    match &new.details {
        crate::modules::profiles::model::ProfileDetails::Student(s) => Some(&s.enrollment_no),
        _ => None,
    }
}
