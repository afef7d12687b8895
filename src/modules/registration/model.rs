//! Registration request/response models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::identity::model::{SignupMetadata, StudentSignup, TeacherSignup};
use crate::modules::profiles::model::{Profile, Role};

/// Self-registration request. Role-specific blocks are required for the
/// matching role and ignored otherwise; the cross-field check lives in the
/// service so the error message can name the missing block.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterDto {
    pub role: Role,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(nested)]
    pub student: Option<StudentSignupDto>,
    #[validate(nested)]
    pub teacher: Option<TeacherSignupDto>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct StudentSignupDto {
    #[validate(length(min = 1, max = 10))]
    pub class_level: String,
    #[validate(length(min = 1, max = 100))]
    pub guardian_name: String,
    #[validate(length(min = 5, max = 20))]
    pub guardian_phone: String,
    #[validate(email)]
    pub guardian_email: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub batches: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TeacherSignupDto {
    #[validate(length(min = 1, max = 100))]
    pub specialization: String,
    #[validate(range(min = 0, max = 60))]
    pub experience_years: Option<i32>,
}

impl RegisterDto {
    /// The role/attribute snapshot embedded into the provider's metadata at
    /// signup, so deferred provisioning never trusts anything client-side.
    pub fn signup_metadata(&self) -> SignupMetadata {
        SignupMetadata {
            role: self.role,
            full_name: self.full_name.clone(),
            student: self.student.as_ref().map(|s| StudentSignup {
                class_level: s.class_level.clone(),
                guardian_name: s.guardian_name.clone(),
                guardian_phone: s.guardian_phone.clone(),
                guardian_email: s.guardian_email.clone(),
                subjects: s.subjects.clone(),
                batches: s.batches.clone(),
            }),
            teacher: self.teacher.as_ref().map(|t| TeacherSignup {
                specialization: t.specialization.clone(),
                experience_years: t.experience_years,
            }),
        }
    }
}

/// Structured registration outcome handed back to the caller.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegistrationResult {
    pub success: bool,
    pub message: String,
    pub requires_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment_no: Option<String>,
}

/// Query half of the provider's confirmation callback URL.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmQuery {
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub expires_in: i64,
    /// The caller's profile, when one has been provisioned already.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student_dto() -> RegisterDto {
        RegisterDto {
            role: Role::Student,
            full_name: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            password: "password123".to_string(),
            student: Some(StudentSignupDto {
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

    #[test]
    fn test_register_dto_valid() {
        assert!(student_dto().validate().is_ok());
    }

    #[test]
    fn test_register_dto_short_password() {
        let mut dto = student_dto();
        dto.password = "short".to_string();
        assert!(dto.validate().is_err());
    }

    #[test]
    fn test_register_dto_invalid_email() {
        let mut dto = student_dto();
        dto.email = "not-an-email".to_string();
        assert!(dto.validate().is_err());
    }

    #[test]
    fn test_nested_guardian_phone_validated() {
        let mut dto = student_dto();
        dto.student.as_mut().unwrap().guardian_phone = "123".to_string();
        assert!(dto.validate().is_err());
    }

    #[test]
    fn test_metadata_snapshot_carries_role_attributes() {
        let dto = student_dto();
        let metadata = dto.signup_metadata();
        assert_eq!(metadata.role, Role::Student);
        assert_eq!(metadata.student.unwrap().class_level, "11");
        assert!(metadata.teacher.is_none());
    }

    #[test]
    fn test_unknown_role_rejected_at_deserialization() {
        let json = r#"{"role":"superuser","full_name":"X","email":"x@example.com","password":"password123"}"#;
        assert!(serde_json::from_str::<RegisterDto>(json).is_err());
    }
}
