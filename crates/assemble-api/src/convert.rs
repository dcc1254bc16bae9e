use axum::http::StatusCode;
use tracing::error;
use uuid::Uuid;

use assemble_db::models::{ComponentRow, FriendRequestRow, ProfileRow, ProjectRow};
use assemble_types::api::{
    ComponentNode, ComponentResponse, FriendRequestResponse, ProjectResponse, UserSummary,
};

/// Stored ids are always v4 UUIDs. Anything else is corrupt data, logged and
/// reported as a server error.
fn parse_id(raw: &str, what: &str) -> Result<Uuid, StatusCode> {
    raw.parse().map_err(|e| {
        error!("Corrupt {} id '{}': {}", what, raw, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub(crate) fn user_summary(row: ProfileRow) -> Result<UserSummary, StatusCode> {
    Ok(UserSummary {
        user_id: parse_id(&row.user_id, "user")?,
        username: row.username,
        slug: row.slug,
    })
}

pub(crate) fn user_summaries(rows: Vec<ProfileRow>) -> Result<Vec<UserSummary>, StatusCode> {
    rows.into_iter().map(user_summary).collect()
}

pub(crate) fn friend_request(row: FriendRequestRow) -> Result<FriendRequestResponse, StatusCode> {
    Ok(FriendRequestResponse {
        id: parse_id(&row.id, "friend request")?,
        from: user_summary(row.from)?,
        to: user_summary(row.to)?,
        created_at: row.created_at,
    })
}

pub(crate) fn project(row: ProjectRow) -> Result<ProjectResponse, StatusCode> {
    Ok(ProjectResponse {
        id: parse_id(&row.id, "project")?,
        name: row.name,
        description: row.description,
        slug: row.slug,
        completed: row.completed,
        owner: user_summary(row.owner)?,
        created_at: row.created_at,
    })
}

pub(crate) fn component(row: ComponentRow) -> Result<ComponentResponse, StatusCode> {
    Ok(ComponentResponse {
        id: parse_id(&row.id, "component")?,
        project_id: parse_id(&row.project_id, "project")?,
        parent_id: row
            .parent_id
            .as_deref()
            .map(|p| parse_id(p, "component"))
            .transpose()?,
        name: row.name,
        slug: row.slug,
        completed: row.completed,
        created_at: row.created_at,
    })
}

pub(crate) fn component_node(
    (top, tasks): (ComponentRow, Vec<ComponentRow>),
) -> Result<ComponentNode, StatusCode> {
    Ok(ComponentNode {
        component: component(top)?,
        tasks: tasks.into_iter().map(component).collect::<Result<_, _>>()?,
    })
}
