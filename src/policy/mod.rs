//! Access policy layer.
//!
//! Every read and write against persisted profile/audit records goes through
//! a [`store::ProfileStore`] and is gated on the calling [`Actor`]. The
//! rules here are shared by every store implementation so Postgres and the
//! in-memory store make identical row-level decisions, and a denial is
//! always distinguishable from "not found".

pub mod memory;
pub mod postgres;
pub mod store;

use uuid::Uuid;

use crate::modules::approvals::model::ApproverRole;
use crate::modules::profiles::model::{Profile, Role};
use store::StoreError;

/// The caller on whose behalf a store operation runs.
#[derive(Debug, Clone)]
pub enum Actor {
    /// Core-internal work driven by provider-verified events (provisioning,
    /// enrollment sequencing). Not reachable from a request token.
    System,
    /// An authenticated identity that has no profile yet, or whose profile
    /// is still pending. May only see its own row.
    Registrant { identity_id: Uuid },
    /// Holder of an approved profile.
    Member {
        identity_id: Uuid,
        profile_id: Uuid,
        role: Role,
    },
}

impl Actor {
    pub fn identity_id(&self) -> Option<Uuid> {
        match self {
            Actor::System => None,
            Actor::Registrant { identity_id } | Actor::Member { identity_id, .. } => {
                Some(*identity_id)
            }
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Actor::Member { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Approver role, when the actor is allowed to act as one.
    pub fn approver_role(&self) -> Option<ApproverRole> {
        match self.role() {
            Some(Role::Admin) => Some(ApproverRole::Admin),
            Some(Role::Teacher) => Some(ApproverRole::Teacher),
            _ => None,
        }
    }
}

/// Row visibility filter for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    All,
    StudentsOnly,
}

/// Shared row-level rules. Store implementations call these; services never
/// re-implement them.
pub mod rules {
    use super::*;

    fn denied(msg: &str) -> StoreError {
        StoreError::PolicyDenied(msg.to_string())
    }

    /// Profiles are only ever inserted by the core itself, after the
    /// provider has verified the identity.
    pub fn check_insert_profile(actor: &Actor) -> Result<(), StoreError> {
        match actor {
            Actor::System => Ok(()),
            _ => Err(denied("profiles are provisioned by the system only")),
        }
    }

    pub fn can_read_profile(actor: &Actor, profile: &Profile) -> bool {
        match actor {
            Actor::System => true,
            Actor::Registrant { identity_id } => profile.identity_id == *identity_id,
            Actor::Member {
                identity_id, role, ..
            } => match role {
                Role::Admin => true,
                Role::Teacher => {
                    profile.role == Role::Student || profile.identity_id == *identity_id
                }
                Role::Student => profile.identity_id == *identity_id,
            },
        }
    }

    pub fn check_read_profile(actor: &Actor, profile: &Profile) -> Result<(), StoreError> {
        if can_read_profile(actor, profile) {
            Ok(())
        } else {
            Err(denied("not allowed to read this profile"))
        }
    }

    pub fn list_scope(actor: &Actor) -> Result<ListScope, StoreError> {
        match actor {
            Actor::System => Ok(ListScope::All),
            Actor::Member {
                role: Role::Admin, ..
            } => Ok(ListScope::All),
            Actor::Member {
                role: Role::Teacher,
                ..
            } => Ok(ListScope::StudentsOnly),
            _ => Err(denied("only approvers may list profiles")),
        }
    }

    /// Approval transitions: admins may transition any profile, teachers
    /// only student profiles. Nobody else, including the system actor;
    /// approvals are human decisions.
    pub fn check_transition(actor: &Actor, profile: &Profile) -> Result<(), StoreError> {
        match actor {
            Actor::Member {
                role: Role::Admin, ..
            } => Ok(()),
            Actor::Member {
                role: Role::Teacher,
                ..
            } => {
                if profile.role == Role::Student {
                    Ok(())
                } else {
                    Err(denied("teachers may only approve or reject student profiles"))
                }
            }
            _ => Err(denied("only admins and teachers may approve or reject")),
        }
    }

    pub fn check_append_action(actor: &Actor, profile: &Profile) -> Result<(), StoreError> {
        check_transition(actor, profile)
    }

    pub fn check_read_actions(actor: &Actor, profile: &Profile) -> Result<(), StoreError> {
        match actor {
            Actor::System => Ok(()),
            _ => check_transition(actor, profile),
        }
    }

    /// Enrollment counters are system-internal.
    pub fn check_sequence_access(actor: &Actor) -> Result<(), StoreError> {
        match actor {
            Actor::System => Ok(()),
            _ => Err(denied("enrollment sequencing is system-internal")),
        }
    }
}
