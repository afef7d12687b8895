//! Profile domain models.
//!
//! A [`Profile`] is the core's record for one registrant: a shared base
//! (identity link, approval status, audit fields) plus a role-specific
//! payload selected by the `role` discriminant. Exactly one profile exists
//! per identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Registrant role. Stored lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval workflow state. PENDING is initial for students and teachers;
/// admins are created APPROVED and never observed PENDING. APPROVED and
/// REJECTED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<ApprovalStatus> {
        match s {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role-specific profile payload. Serialized flattened into the profile so
/// the wire shape stays flat; the `role` field on the base discriminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ProfileDetails {
    Student(StudentDetails),
    Teacher(TeacherDetails),
    Admin(AdminDetails),
}

impl ProfileDetails {
    pub fn role(&self) -> Role {
        match self {
            ProfileDetails::Student(_) => Role::Student,
            ProfileDetails::Teacher(_) => Role::Teacher,
            ProfileDetails::Admin(_) => Role::Admin,
        }
    }
}

/// Student payload. `enrollment_no` is unique across all student profiles
/// and immutable once assigned. The guardian/class fields reflect whatever
/// survived the signup metadata round trip, so they are optional here even
/// though registration validation requires them up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StudentDetails {
    pub enrollment_no: String,
    pub class_level: Option<String>,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
    pub guardian_email: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub batches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TeacherDetails {
    pub specialization: String,
    pub experience_years: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AdminDetails {}

/// A registrant's profile.
///
/// Created once by the provisioner, mutated only by the approval state
/// machine, never hard-deleted by this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub role: Role,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    #[serde(flatten)]
    pub details: ProfileDetails,
}

impl Profile {
    pub fn enrollment_no(&self) -> Option<&str> {
        match &self.details {
            ProfileDetails::Student(s) => Some(&s.enrollment_no),
            _ => None,
        }
    }
}

/// Paginated response containing profiles.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedProfilesResponse {
    pub data: Vec<Profile>,
    pub meta: crate::utils::pagination::PaginationMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student_profile() -> Profile {
        Profile {
            id: Uuid::new_v4(),
            identity_id: Uuid::new_v4(),
            role: Role::Student,
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            details: ProfileDetails::Student(StudentDetails {
                enrollment_no: "STU2026080001".to_string(),
                class_level: Some("11".to_string()),
                guardian_name: Some("A Guardian".to_string()),
                guardian_phone: Some("+15550100".to_string()),
                guardian_email: None,
                subjects: vec!["physics".to_string()],
                batches: vec![],
            }),
        }
    }

    #[test]
    fn test_role_round_trip() {
        for role in [Role::Student, Role::Teacher, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!ApprovalStatus::Pending.is_terminal());
        assert!(ApprovalStatus::Approved.is_terminal());
        assert!(ApprovalStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_details_role_matches_discriminant() {
        let profile = student_profile();
        assert_eq!(profile.details.role(), profile.role);
        assert_eq!(profile.enrollment_no(), Some("STU2026080001"));
    }

    #[test]
    fn test_profile_serializes_flat() {
        let profile = student_profile();
        let value = serde_json::to_value(&profile).unwrap();
        // Role payload fields sit next to the base fields, not nested.
        assert_eq!(value["role"], "student");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["enrollment_no"], "STU2026080001");
        assert_eq!(value["class_level"], "11");
    }

    #[test]
    fn test_teacher_details_deserialize() {
        let profile = Profile {
            role: Role::Teacher,
            details: ProfileDetails::Teacher(TeacherDetails {
                specialization: "mathematics".to_string(),
                experience_years: Some(4),
            }),
            ..student_profile()
        };
        let json = serde_json::to_string(&profile).unwrap();
        let back: Profile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.details, profile.details);
    }
}
