//! Permission decisions: role + ownership + privacy → permit/deny.
//!
//! The decider consumes a pre-computed access view of the entity and returns
//! the decision shape consumed by the API layer; action matrices beyond the
//! core rules live in the authorization layer.

use crate::store::models::{ContributionRole, UserRole};

/// Actions subject to permission decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Read,
    Update,
    Delete,
    Publish,
    AddExperiment,
    AddScoreSet,
    AddRole,
    AddBadge,
    ChangeRank,
    SetScores,
}

/// The requesting user's identity and system-wide roles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserContext {
    pub user_id: i64,
    pub active_roles: Vec<UserRole>,
}

impl UserContext {
    fn is_system_admin(&self) -> bool {
        self.active_roles.contains(&UserRole::Admin)
    }
}

/// Access-relevant view of an entity for one requesting user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityAccess {
    /// Whether the entity is private.
    pub private: bool,
    /// Whether the requesting user owns or contributes to the entity.
    pub owned_by_user: bool,
    /// The requesting user's roles on the entity, for collection-like
    /// entities.
    pub collection_roles: Vec<ContributionRole>,
}

/// The decision shape: permit/deny plus the HTTP translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionResponse {
    pub permitted: bool,
    pub http_status: u16,
    pub message: Option<String>,
}

impl PermissionResponse {
    fn permit() -> Self {
        Self {
            permitted: true,
            http_status: 200,
            message: None,
        }
    }

    fn deny(http_status: u16, message: &str) -> Self {
        Self {
            permitted: false,
            http_status,
            message: Some(message.to_owned()),
        }
    }
}

fn roles_permitted(held: &[ContributionRole], permitted: &[ContributionRole]) -> bool {
    held.iter().any(|role| permitted.contains(role))
}

/// Decide whether a user may perform an action on an entity.
///
/// System admins may perform any action. Anonymous users only read public
/// entities. Denials for private entities a user cannot see are 404 rather
/// than 403, so privacy is not leaked.
pub fn has_permission(
    user: Option<&UserContext>,
    entity: &EntityAccess,
    action: Action,
) -> PermissionResponse {
    if user.is_some_and(UserContext::is_system_admin) {
        return PermissionResponse::permit();
    }

    match action {
        Action::Read => handle_read(user, entity),
        Action::Update => handle_update(user, entity),
        Action::Delete => handle_delete(user, entity),
        Action::Publish => handle_owner_only(user, entity, "publish"),
        Action::AddExperiment => handle_contribution(user, entity, "add an experiment to"),
        Action::AddScoreSet => handle_contribution(user, entity, "add a score set to"),
        Action::SetScores => handle_contribution(user, entity, "set scores on"),
        Action::AddRole => handle_collection_admin(user, entity, "add a role to"),
        Action::AddBadge => {
            // Badges are system-curated; only admins reach this point.
            PermissionResponse::deny(403, "insufficient permissions to add a badge")
        }
        Action::ChangeRank => handle_owner_only(user, entity, "change the rank of"),
    }
}

fn hidden_or_forbidden(entity: &EntityAccess, message: &str) -> PermissionResponse {
    if entity.private {
        PermissionResponse::deny(404, "entity not found")
    } else {
        PermissionResponse::deny(403, message)
    }
}

fn handle_read(user: Option<&UserContext>, entity: &EntityAccess) -> PermissionResponse {
    if !entity.private {
        return PermissionResponse::permit();
    }
    let Some(_user) = user else {
        return PermissionResponse::deny(404, "entity not found");
    };
    if entity.owned_by_user
        || roles_permitted(
            &entity.collection_roles,
            &[
                ContributionRole::Admin,
                ContributionRole::Editor,
                ContributionRole::Viewer,
            ],
        )
    {
        return PermissionResponse::permit();
    }
    PermissionResponse::deny(404, "entity not found")
}

fn handle_update(user: Option<&UserContext>, entity: &EntityAccess) -> PermissionResponse {
    let Some(_user) = user else {
        return PermissionResponse::deny(401, "authentication required");
    };
    if entity.owned_by_user
        || roles_permitted(
            &entity.collection_roles,
            &[ContributionRole::Admin, ContributionRole::Editor],
        )
    {
        return PermissionResponse::permit();
    }
    hidden_or_forbidden(entity, "insufficient permissions to update this entity")
}

fn handle_delete(user: Option<&UserContext>, entity: &EntityAccess) -> PermissionResponse {
    let Some(_user) = user else {
        return PermissionResponse::deny(401, "authentication required");
    };
    let may_delete =
        entity.owned_by_user || roles_permitted(&entity.collection_roles, &[ContributionRole::Admin]);
    if !may_delete {
        return hidden_or_forbidden(entity, "insufficient permissions to delete this entity");
    }
    // Non-admin deletes are only allowed while the entity is private.
    if !entity.private {
        return PermissionResponse::deny(403, "published entities may not be deleted");
    }
    PermissionResponse::permit()
}

fn handle_owner_only(
    user: Option<&UserContext>,
    entity: &EntityAccess,
    verb: &str,
) -> PermissionResponse {
    let Some(_user) = user else {
        return PermissionResponse::deny(401, "authentication required");
    };
    if entity.owned_by_user {
        return PermissionResponse::permit();
    }
    hidden_or_forbidden(
        entity,
        &format!("insufficient permissions to {} this entity", verb),
    )
}

fn handle_contribution(
    user: Option<&UserContext>,
    entity: &EntityAccess,
    verb: &str,
) -> PermissionResponse {
    let Some(_user) = user else {
        return PermissionResponse::deny(401, "authentication required");
    };
    if entity.owned_by_user
        || roles_permitted(
            &entity.collection_roles,
            &[ContributionRole::Admin, ContributionRole::Editor],
        )
    {
        return PermissionResponse::permit();
    }
    hidden_or_forbidden(
        entity,
        &format!("insufficient permissions to {} this entity", verb),
    )
}

fn handle_collection_admin(
    user: Option<&UserContext>,
    entity: &EntityAccess,
    verb: &str,
) -> PermissionResponse {
    let Some(_user) = user else {
        return PermissionResponse::deny(401, "authentication required");
    };
    if roles_permitted(&entity.collection_roles, &[ContributionRole::Admin]) {
        return PermissionResponse::permit();
    }
    hidden_or_forbidden(
        entity,
        &format!("insufficient permissions to {} this entity", verb),
    )
}
