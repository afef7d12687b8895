use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::modules::approvals::model::{
    ApprovalAction, ApprovalActionKind, ApproverRole, BulkApprovalFailure, BulkApprovalOutcome,
    RejectDto,
};
use crate::modules::profiles::model::{
    AdminDetails, ApprovalStatus, PaginatedProfilesResponse, Profile, ProfileDetails, Role,
    StudentDetails, TeacherDetails,
};
use crate::modules::registration::controller::ErrorResponse;
use crate::modules::registration::model::{
    LoginRequest, LoginResponse, RegisterDto, RegistrationResult, StudentSignupDto,
    TeacherSignupDto,
};
use crate::utils::pagination::{PaginationMeta, PaginationParams};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::registration::controller::register,
        crate::modules::registration::controller::confirm,
        crate::modules::registration::controller::login,
        crate::modules::profiles::controller::get_own_profile,
        crate::modules::profiles::controller::list_pending,
        crate::modules::profiles::controller::get_profile,
        crate::modules::approvals::controller::approve_profile,
        crate::modules::approvals::controller::reject_profile,
        crate::modules::approvals::controller::approve_all,
        crate::modules::approvals::controller::list_actions,
    ),
    components(
        schemas(
            Role,
            ApprovalStatus,
            Profile,
            ProfileDetails,
            StudentDetails,
            TeacherDetails,
            AdminDetails,
            RegisterDto,
            StudentSignupDto,
            TeacherSignupDto,
            RegistrationResult,
            LoginRequest,
            LoginResponse,
            RejectDto,
            ApprovalAction,
            ApprovalActionKind,
            ApproverRole,
            BulkApprovalOutcome,
            BulkApprovalFailure,
            PaginatedProfilesResponse,
            PaginationMeta,
            PaginationParams,
            ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Registration", description = "Self-registration, email confirmation, and login"),
        (name = "Profiles", description = "Profile lookups and the pending queue"),
        (name = "Approvals", description = "Approve/reject workflow and audit trail")
    ),
    info(
        title = "Enrolldesk API",
        version = "0.1.0",
        description = "Registration-to-approval backend: self-registration through an external identity provider, idempotent profile provisioning, and a three-state approval workflow.",
        contact(
            name = "API Support",
            email = "support@enrolldesk.com"
        ),
        license(
            name = "MIT"
        )
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}
