//! Identity provider data models.
//!
//! An [`Identity`] is the account record owned by the external provider. The
//! core only ever reads it; credentials, token issuance, and email delivery
//! stay on the provider side. The role/attribute snapshot captured at signup
//! travels in the provider's metadata blob and is read back by the deferred
//! confirmation handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::modules::profiles::model::Role;

/// Account record as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub email_confirmed: bool,
    /// Opaque metadata blob captured at signup (role + role attributes).
    pub metadata: Value,
}

impl Identity {
    /// Decode the signup snapshot out of the metadata blob.
    pub fn signup_metadata(&self) -> Result<SignupMetadata, serde_json::Error> {
        serde_json::from_value(self.metadata.clone())
    }
}

/// Session issued by the provider when it grants access immediately at
/// signup (confirmation disabled) or after login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub expires_in: i64,
}

/// Result of account creation: the new identity, plus an active session
/// when the provider is configured to grant access without confirmation.
#[derive(Debug, Clone)]
pub struct CreateAccountOutcome {
    pub identity: Identity,
    pub session: Option<Session>,
}

/// Role and role-specific attributes captured at signup time, embedded into
/// the provider's metadata so deferred provisioning can rebuild the profile
/// without trusting anything client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignupMetadata {
    pub role: Role,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentSignup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher: Option<TeacherSignup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSignup {
    pub class_level: String,
    pub guardian_name: String,
    pub guardian_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub batches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherSignup {
    pub specialization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_years: Option<i32>,
}

impl SignupMetadata {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("signup metadata is always serializable")
    }

    /// The same snapshot with optional attributes stripped. Used when the
    /// provider rejects the full payload shape.
    pub fn without_optional(&self) -> SignupMetadata {
        SignupMetadata {
            role: self.role,
            full_name: self.full_name.clone(),
            student: self.student.as_ref().map(|s| StudentSignup {
                class_level: s.class_level.clone(),
                guardian_name: s.guardian_name.clone(),
                guardian_phone: s.guardian_phone.clone(),
                guardian_email: None,
                subjects: Vec::new(),
                batches: Vec::new(),
            }),
            teacher: self.teacher.as_ref().map(|t| TeacherSignup {
                specialization: t.specialization.clone(),
                experience_years: None,
            }),
        }
    }

    /// Role and name only. The last rung of the reduction ladder.
    pub fn minimal(&self) -> SignupMetadata {
        SignupMetadata {
            role: self.role,
            full_name: self.full_name.clone(),
            student: None,
            teacher: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_student_metadata() -> SignupMetadata {
        SignupMetadata {
            role: Role::Student,
            full_name: "Asha Rao".to_string(),
            student: Some(StudentSignup {
                class_level: "11".to_string(),
                guardian_name: "R Rao".to_string(),
                guardian_phone: "+15550100".to_string(),
                guardian_email: Some("guardian@example.com".to_string()),
                subjects: vec!["physics".to_string(), "chemistry".to_string()],
                batches: vec!["morning".to_string()],
            }),
            teacher: None,
        }
    }

    #[test]
    fn test_metadata_round_trip_through_blob() {
        let meta = full_student_metadata();
        let identity = Identity {
            id: Uuid::new_v4(),
            email: "asha@example.com".to_string(),
            email_confirmed: false,
            metadata: meta.to_value(),
        };
        assert_eq!(identity.signup_metadata().unwrap(), meta);
    }

    #[test]
    fn test_reduction_ladder_is_strictly_decreasing() {
        let full = full_student_metadata();
        let reduced = full.without_optional();
        let minimal = full.minimal();

        let size = |m: &SignupMetadata| m.to_value().to_string().len();
        assert!(size(&reduced) < size(&full));
        assert!(size(&minimal) < size(&reduced));

        // Required student attributes survive the first reduction.
        let student = reduced.student.unwrap();
        assert_eq!(student.guardian_name, "R Rao");
        assert!(student.guardian_email.is_none());
        assert!(student.subjects.is_empty());

        // Only role and name survive the last one.
        assert!(minimal.student.is_none());
        assert_eq!(minimal.role, Role::Student);
    }
}
