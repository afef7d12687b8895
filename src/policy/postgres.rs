//! Postgres-backed policy-gated store.
//!
//! Row shape matches `migrations/`. The `identity_id` uniqueness constraint
//! carries the provisioning idempotency guarantee; `enrollment_no` has its
//! own constraint so an allocation collision is detectable as a distinct
//! conflict. Status transitions are conditional updates keyed on the
//! expected status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::store::{
    InsertOutcome, NewApprovalAction, NewProfile, ProfileStore, StatusTransition, StoreError,
    TransitionOutcome, UniqueKey,
};
use super::{Actor, ListScope, rules};
use crate::modules::approvals::model::{ApprovalAction, ApprovalActionKind, ApproverRole};
use crate::modules::profiles::model::{
    AdminDetails, ApprovalStatus, Profile, ProfileDetails, Role, StudentDetails, TeacherDetails,
};
use crate::utils::pagination::PaginationParams;

const PROFILE_COLUMNS: &str = "id, identity_id, role, status, created_at, updated_at, \
     approved_by, approved_at, rejected_by, rejected_at, rejection_reason, \
     enrollment_no, class_level, guardian_name, guardian_phone, guardian_email, \
     subjects, batches, specialization, experience_years";

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    identity_id: Uuid,
    role: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    approved_by: Option<Uuid>,
    approved_at: Option<DateTime<Utc>>,
    rejected_by: Option<Uuid>,
    rejected_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    enrollment_no: Option<String>,
    class_level: Option<String>,
    guardian_name: Option<String>,
    guardian_phone: Option<String>,
    guardian_email: Option<String>,
    subjects: Option<Vec<String>>,
    batches: Option<Vec<String>>,
    specialization: Option<String>,
    experience_years: Option<i32>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, StoreError> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| StoreError::Database(anyhow::anyhow!("unknown role {:?}", row.role)))?;
        let status = ApprovalStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Database(anyhow::anyhow!("unknown status {:?}", row.status))
        })?;

        let details = match role {
            Role::Student => ProfileDetails::Student(StudentDetails {
                enrollment_no: row.enrollment_no.ok_or_else(|| {
                    StoreError::Database(anyhow::anyhow!("student row without enrollment_no"))
                })?,
                class_level: row.class_level,
                guardian_name: row.guardian_name,
                guardian_phone: row.guardian_phone,
                guardian_email: row.guardian_email,
                subjects: row.subjects.unwrap_or_default(),
                batches: row.batches.unwrap_or_default(),
            }),
            Role::Teacher => ProfileDetails::Teacher(TeacherDetails {
                specialization: row.specialization.unwrap_or_default(),
                experience_years: row.experience_years,
            }),
            Role::Admin => ProfileDetails::Admin(AdminDetails::default()),
        };

        Ok(Profile {
            id: row.id,
            identity_id: row.identity_id,
            role,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            rejected_by: row.rejected_by,
            rejected_at: row.rejected_at,
            rejection_reason: row.rejection_reason,
            details,
        })
    }
}

fn action_from_row(row: &PgRow) -> Result<ApprovalAction, StoreError> {
    let approver_role: String = row.get("approver_role");
    let action: String = row.get("action");
    Ok(ApprovalAction {
        id: row.get("id"),
        profile_id: row.get("profile_id"),
        approver_id: row.get("approver_id"),
        approver_role: ApproverRole::parse(&approver_role).ok_or_else(|| {
            StoreError::Database(anyhow::anyhow!("unknown approver role {approver_role:?}"))
        })?,
        action: ApprovalActionKind::parse(&action).ok_or_else(|| {
            StoreError::Database(anyhow::anyhow!("unknown action {action:?}"))
        })?,
        reason: row.get("reason"),
        created_at: row.get("created_at"),
    })
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(anyhow::Error::from(err))
}

/// Distinguish which uniqueness constraint an insert hit, if any.
fn classify_unique_violation(err: &sqlx::Error) -> Option<UniqueKey> {
    let sqlx::Error::Database(db) = err else {
        return None;
    };
    if !db.is_unique_violation() {
        return None;
    }
    match db.constraint() {
        Some(name) if name.contains("enrollment_no") => Some(UniqueKey::EnrollmentNo),
        Some(name) if name.contains("identity_id") => Some(UniqueKey::IdentityId),
        _ => None,
    }
}

struct DetailColumns<'a> {
    enrollment_no: Option<&'a str>,
    class_level: Option<&'a str>,
    guardian_name: Option<&'a str>,
    guardian_phone: Option<&'a str>,
    guardian_email: Option<&'a str>,
    subjects: Vec<String>,
    batches: Vec<String>,
    specialization: Option<&'a str>,
    experience_years: Option<i32>,
}

fn detail_columns(details: &ProfileDetails) -> DetailColumns<'_> {
    let mut cols = DetailColumns {
        enrollment_no: None,
        class_level: None,
        guardian_name: None,
        guardian_phone: None,
        guardian_email: None,
        subjects: Vec::new(),
        batches: Vec::new(),
        specialization: None,
        experience_years: None,
    };
    match details {
        ProfileDetails::Student(s) => {
            cols.enrollment_no = Some(&s.enrollment_no);
            cols.class_level = s.class_level.as_deref();
            cols.guardian_name = s.guardian_name.as_deref();
            cols.guardian_phone = s.guardian_phone.as_deref();
            cols.guardian_email = s.guardian_email.as_deref();
            cols.subjects = s.subjects.clone();
            cols.batches = s.batches.clone();
        }
        ProfileDetails::Teacher(t) => {
            cols.specialization = Some(&t.specialization);
            cols.experience_years = t.experience_years;
        }
        ProfileDetails::Admin(_) => {}
    }
    cols
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn insert_profile(
        &self,
        actor: &Actor,
        new: NewProfile,
    ) -> Result<InsertOutcome, StoreError> {
        rules::check_insert_profile(actor)?;

        let cols = detail_columns(&new.details);
        let query = format!(
            "INSERT INTO profiles (identity_id, role, status, approved_by, approved_at, \
                 enrollment_no, class_level, guardian_name, guardian_phone, guardian_email, \
                 subjects, batches, specialization, experience_years) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (identity_id) DO NOTHING \
             RETURNING {PROFILE_COLUMNS}"
        );

        let inserted = sqlx::query_as::<_, ProfileRow>(&query)
            .bind(new.identity_id)
            .bind(new.role.as_str())
            .bind(new.status.as_str())
            .bind(new.approved_by)
            .bind(new.approved_at)
            .bind(cols.enrollment_no)
            .bind(cols.class_level)
            .bind(cols.guardian_name)
            .bind(cols.guardian_phone)
            .bind(cols.guardian_email)
            .bind(&cols.subjects)
            .bind(&cols.batches)
            .bind(cols.specialization)
            .bind(cols.experience_years)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match classify_unique_violation(&e) {
                Some(key) => StoreError::UniqueViolation(key),
                None => db_err(e),
            })?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome::Created(row.try_into()?));
        }

        // The identity_id conflict path: some earlier or concurrent call
        // already provisioned this identity.
        let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE identity_id = $1");
        let existing = sqlx::query_as::<_, ProfileRow>(&query)
            .bind(new.identity_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(InsertOutcome::AlreadyProvisioned(existing.try_into()?))
    }

    async fn find_by_id(&self, actor: &Actor, id: Uuid) -> Result<Option<Profile>, StoreError> {
        let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        let row = sqlx::query_as::<_, ProfileRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            None => Ok(None),
            Some(row) => {
                let profile: Profile = row.try_into()?;
                rules::check_read_profile(actor, &profile)?;
                Ok(Some(profile))
            }
        }
    }

    async fn find_by_identity(
        &self,
        actor: &Actor,
        identity_id: Uuid,
    ) -> Result<Option<Profile>, StoreError> {
        let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE identity_id = $1");
        let row = sqlx::query_as::<_, ProfileRow>(&query)
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            None => Ok(None),
            Some(row) => {
                let profile: Profile = row.try_into()?;
                rules::check_read_profile(actor, &profile)?;
                Ok(Some(profile))
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
        let role_filter = match scope {
            ListScope::All => "",
            ListScope::StudentsOnly => " AND role = 'student'",
        };

        let query = format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles \
             WHERE status = $1{role_filter} \
             ORDER BY created_at, id LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, ProfileRow>(&query)
            .bind(status.as_str())
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let count_query =
            format!("SELECT COUNT(*) FROM profiles WHERE status = $1{role_filter}");
        let total: i64 = sqlx::query_scalar(&count_query)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let profiles = rows
            .into_iter()
            .map(Profile::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((profiles, total))
    }

    async fn count_students(&self, actor: &Actor) -> Result<i64, StoreError> {
        rules::check_sequence_access(actor)?;

        sqlx::query_scalar("SELECT COUNT(*) FROM profiles WHERE role = 'student'")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn next_enrollment_seq(&self, actor: &Actor, period: &str) -> Result<i64, StoreError> {
        rules::check_sequence_access(actor)?;

        // Atomic upsert-increment; concurrent callers serialize on the row.
        sqlx::query_scalar(
            "INSERT INTO enrollment_counters (period, value) VALUES ($1, 1) \
             ON CONFLICT (period) DO UPDATE SET value = enrollment_counters.value + 1 \
             RETURNING value",
        )
        .bind(period)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn transition_status(
        &self,
        actor: &Actor,
        id: Uuid,
        transition: StatusTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        let Some(profile) = self.find_by_id(&Actor::System, id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        rules::check_transition(actor, &profile)?;

        let query = format!(
            "UPDATE profiles SET status = $1, updated_at = $2, \
                 approved_by = CASE WHEN $1 = 'approved' THEN $3 ELSE approved_by END, \
                 approved_at = CASE WHEN $1 = 'approved' THEN $2 ELSE approved_at END, \
                 rejected_by = CASE WHEN $1 = 'rejected' THEN $3 ELSE rejected_by END, \
                 rejected_at = CASE WHEN $1 = 'rejected' THEN $2 ELSE rejected_at END, \
                 rejection_reason = CASE WHEN $1 = 'rejected' THEN $4 ELSE rejection_reason END \
             WHERE id = $5 AND status = $6 \
             RETURNING {PROFILE_COLUMNS}"
        );

        let updated = sqlx::query_as::<_, ProfileRow>(&query)
            .bind(transition.new_status.as_str())
            .bind(transition.at)
            .bind(transition.actor_identity)
            .bind(transition.reason.as_deref())
            .bind(id)
            .bind(transition.expected.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match updated {
            Some(row) => Ok(TransitionOutcome::Applied(row.try_into()?)),
            // The row exists but no longer carries the expected status: a
            // concurrent writer won the conditional update.
            None => Ok(TransitionOutcome::PreconditionFailed),
        }
    }

    async fn append_action(
        &self,
        actor: &Actor,
        action: NewApprovalAction,
    ) -> Result<ApprovalAction, StoreError> {
        let Some(profile) = self.find_by_id(&Actor::System, action.profile_id).await? else {
            return Err(StoreError::Database(anyhow::anyhow!(
                "audit append for unknown profile"
            )));
        };
        rules::check_append_action(actor, &profile)?;

        let row = sqlx::query(
            "INSERT INTO approval_actions (profile_id, approver_id, approver_role, action, reason) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, profile_id, approver_id, approver_role, action, reason, created_at",
        )
        .bind(action.profile_id)
        .bind(action.approver_id)
        .bind(action.approver_role.as_str())
        .bind(action.action.as_str())
        .bind(action.reason.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        action_from_row(&row)
    }

    async fn list_actions(
        &self,
        actor: &Actor,
        profile_id: Uuid,
    ) -> Result<Vec<ApprovalAction>, StoreError> {
        if let Some(profile) = self.find_by_id(&Actor::System, profile_id).await? {
            rules::check_read_actions(actor, &profile)?;
        }

        let rows = sqlx::query(
            "SELECT id, profile_id, approver_id, approver_role, action, reason, created_at \
             FROM approval_actions WHERE profile_id = $1 ORDER BY created_at, id",
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(action_from_row).collect()
    }
}
