pub mod approvals;
pub mod profiles;
pub mod registration;

pub use self::profiles::model::Profile;
pub use self::registration::model::RegistrationResult;
