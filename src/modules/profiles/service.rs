//! Profile provisioning and lookups.

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::identity::model::{Identity, SignupMetadata};
use crate::metrics;
use crate::policy::Actor;
use crate::policy::store::{InsertOutcome, NewProfile, StoreError, UniqueKey};
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::pagination::{PaginationMeta, PaginationParams};

use super::model::{
    AdminDetails, ApprovalStatus, PaginatedProfilesResponse, Profile, ProfileDetails, Role,
    StudentDetails, TeacherDetails,
};

/// Builds and persists the role-specific profile exactly once per identity.
///
/// Idempotency rides on the store's `identity_id` uniqueness constraint: a
/// conflicting insert means some earlier or concurrent call already
/// provisioned this identity, and the existing row is returned instead.
pub struct ProfileProvisioner;

impl ProfileProvisioner {
    #[instrument(skip(state, identity, metadata), fields(identity_id = %identity.id, role = %metadata.role))]
    pub async fn provision(
        state: &AppState,
        identity: &Identity,
        metadata: &SignupMetadata,
    ) -> Result<Profile, AppError> {
        let new = Self::build_profile(state, identity.id, metadata).await;

        match state.store.insert_profile(&Actor::System, new).await {
            Ok(InsertOutcome::Created(profile)) => {
                metrics::track_profile_provisioned(profile.role.as_str());
                info!(profile_id = %profile.id, "profile provisioned");
                Ok(profile)
            }
            Ok(InsertOutcome::AlreadyProvisioned(profile)) => {
                info!(profile_id = %profile.id, "identity already provisioned; returning existing profile");
                Ok(profile)
            }
            Err(StoreError::UniqueViolation(UniqueKey::EnrollmentNo)) => {
                // One re-allocation attempt, then the collision surfaces.
                metrics::track_enrollment_reallocation();
                warn!("enrollment number collision; re-allocating once");

                let retry = Self::build_profile(state, identity.id, metadata).await;
                match state.store.insert_profile(&Actor::System, retry).await {
                    Ok(InsertOutcome::Created(profile)) => {
                        metrics::track_profile_provisioned(profile.role.as_str());
                        Ok(profile)
                    }
                    Ok(InsertOutcome::AlreadyProvisioned(profile)) => Ok(profile),
                    Err(StoreError::UniqueViolation(UniqueKey::EnrollmentNo)) => {
                        Err(AppError::allocation_conflict(
                            "enrollment number collision recurred after re-allocation",
                        ))
                    }
                    Err(err) => Err(Self::map_insert_failure(err)),
                }
            }
            Err(StoreError::UniqueViolation(UniqueKey::IdentityId)) => {
                // Backends that surface the constraint instead of answering
                // with the existing row: fetch it ourselves.
                state
                    .store
                    .find_by_identity(&Actor::System, identity.id)
                    .await?
                    .ok_or_else(|| {
                        AppError::provisioning("identity conflict without a readable profile")
                    })
            }
            Err(err) => Err(Self::map_insert_failure(err)),
        }
    }

    async fn build_profile(
        state: &AppState,
        identity_id: Uuid,
        metadata: &SignupMetadata,
    ) -> NewProfile {
        let (status, approved_by, approved_at) = match metadata.role {
            // Admins are auto-approved; a pending admin is never observed.
            Role::Admin => (
                ApprovalStatus::Approved,
                Some(identity_id),
                Some(Utc::now()),
            ),
            _ => (ApprovalStatus::Pending, None, None),
        };

        let details = match metadata.role {
            Role::Student => {
                let enrollment_no = state.allocator.allocate(state.store.as_ref()).await;
                let signup = metadata.student.as_ref();
                ProfileDetails::Student(StudentDetails {
                    enrollment_no,
                    class_level: signup.map(|s| s.class_level.clone()),
                    guardian_name: signup.map(|s| s.guardian_name.clone()),
                    guardian_phone: signup.map(|s| s.guardian_phone.clone()),
                    guardian_email: signup.and_then(|s| s.guardian_email.clone()),
                    subjects: signup.map(|s| s.subjects.clone()).unwrap_or_default(),
                    batches: signup.map(|s| s.batches.clone()).unwrap_or_default(),
                })
            }
            Role::Teacher => {
                let signup = metadata.teacher.as_ref();
                ProfileDetails::Teacher(TeacherDetails {
                    specialization: signup.map(|t| t.specialization.clone()).unwrap_or_default(),
                    experience_years: signup.and_then(|t| t.experience_years),
                })
            }
            Role::Admin => ProfileDetails::Admin(AdminDetails::default()),
        };

        NewProfile {
            identity_id,
            role: metadata.role,
            status,
            approved_by,
            approved_at,
            details,
        }
    }

    fn map_insert_failure(err: StoreError) -> AppError {
        match err {
            StoreError::PolicyDenied(msg) => AppError::PolicyDenied(msg),
            StoreError::UniqueViolation(key) => {
                AppError::provisioning(format!("unexpected uniqueness conflict on {key}"))
            }
            StoreError::Database(source) => {
                warn!(error = ?source, "profile insert failed");
                AppError::provisioning("profile insert failed")
            }
        }
    }
}

/// Read-side queries for profiles.
pub struct ProfileService;

impl ProfileService {
    #[instrument(skip(state, actor))]
    pub async fn get_profile(
        state: &AppState,
        actor: &Actor,
        id: Uuid,
    ) -> Result<Profile, AppError> {
        state
            .store
            .find_by_id(actor, id)
            .await?
            .ok_or_else(|| AppError::not_found("profile not found"))
    }

    #[instrument(skip(state, actor))]
    pub async fn get_own_profile(
        state: &AppState,
        actor: &Actor,
        identity_id: Uuid,
    ) -> Result<Option<Profile>, AppError> {
        Ok(state.store.find_by_identity(actor, identity_id).await?)
    }

    #[instrument(skip(state, actor, pagination))]
    pub async fn list_pending(
        state: &AppState,
        actor: &Actor,
        pagination: PaginationParams,
    ) -> Result<PaginatedProfilesResponse, AppError> {
        let (data, total) = state
            .store
            .list_by_status(actor, ApprovalStatus::Pending, &pagination)
            .await?;

        let limit = pagination.limit();
        let offset = pagination.offset();
        Ok(PaginatedProfilesResponse {
            data,
            meta: PaginationMeta {
                total,
                limit,
                offset: Some(offset),
                page: pagination.page(),
                has_more: offset + limit < total,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::email::EmailConfig;
    use crate::identity::local::{LocalIdentityProvider, LocalProviderConfig};
    use crate::identity::model::StudentSignup;
    use crate::modules::profiles::allocator::SequenceAllocator;
    use crate::policy::memory::MemoryStore;
    use std::sync::Arc;

    fn test_state() -> AppState {
        AppState::for_tests(
            Arc::new(MemoryStore::new()),
            Arc::new(LocalIdentityProvider::new(
                LocalProviderConfig {
                    bcrypt_cost: 4,
                    ..LocalProviderConfig::default()
                },
                EmailConfig::disabled(),
            )),
            Arc::new(SequenceAllocator),
        )
    }

    fn identity_with(metadata: &SignupMetadata) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            email_confirmed: true,
            metadata: metadata.to_value(),
        }
    }

    fn student_metadata() -> SignupMetadata {
        SignupMetadata {
            role: Role::Student,
            full_name: "Asha Rao".to_string(),
            student: Some(StudentSignup {
                class_level: "11".to_string(),
                guardian_name: "R Rao".to_string(),
                guardian_phone: "+15550100".to_string(),
                guardian_email: None,
                subjects: vec![],
                batches: vec![],
            }),
            teacher: None,
        }
    }

    #[tokio::test]
    async fn test_provision_student_starts_pending_with_code() {
        let state = test_state();
        let metadata = student_metadata();
        let identity = identity_with(&metadata);

        let profile = ProfileProvisioner::provision(&state, &identity, &metadata)
            .await
            .unwrap();
        assert_eq!(profile.status, ApprovalStatus::Pending);
        assert!(profile.enrollment_no().unwrap().starts_with("STU"));
        assert!(profile.approved_by.is_none());
    }

    #[tokio::test]
    async fn test_provision_twice_returns_same_profile() {
        let state = test_state();
        let metadata = student_metadata();
        let identity = identity_with(&metadata);

        let first = ProfileProvisioner::provision(&state, &identity, &metadata)
            .await
            .unwrap();
        let second = ProfileProvisioner::provision(&state, &identity, &metadata)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.enrollment_no(), second.enrollment_no());
    }

    #[tokio::test]
    async fn test_admin_is_auto_approved() {
        let state = test_state();
        let metadata = SignupMetadata {
            role: Role::Admin,
            full_name: "Root Admin".to_string(),
            student: None,
            teacher: None,
        };
        let identity = identity_with(&metadata);

        let profile = ProfileProvisioner::provision(&state, &identity, &metadata)
            .await
            .unwrap();
        assert_eq!(profile.status, ApprovalStatus::Approved);
        assert_eq!(profile.approved_by, Some(identity.id));
        assert!(profile.approved_at.is_some());
    }

    #[tokio::test]
    async fn test_provision_with_reduced_metadata_defaults_fields() {
        let state = test_state();
        let metadata = student_metadata().minimal();
        let identity = identity_with(&metadata);

        let profile = ProfileProvisioner::provision(&state, &identity, &metadata)
            .await
            .unwrap();
        match profile.details {
            ProfileDetails::Student(s) => {
                assert!(s.class_level.is_none());
                assert!(s.guardian_name.is_none());
                assert!(!s.enrollment_no.is_empty());
            }
            other => panic!("expected a student profile, got {other:?}"),
        }
    }
}
