//! Component and task endpoints. Edits run load, mutate and save in one store
//! transaction so the logged change always matches what was written.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use assemble_db::Database;
use assemble_db::components::TrackedComponent;
use assemble_db::models::ComponentRow;
use assemble_types::api::{
    Claims, ComponentResponse, CreateComponentRequest, UpdateComponentRequest,
};

use crate::auth::AppState;
use crate::convert;
use crate::error::{validate_name, with_db};

const MAX_COMPONENT_NAME: usize = 100;

/// Loads a component whose project the caller belongs to.
fn member_component(
    db: &Database,
    component_id: &str,
    user_id: &str,
) -> assemble_db::Result<Option<TrackedComponent>> {
    let Some(component) = db.load_component(component_id)? else {
        return Ok(None);
    };
    if !db.is_member(component.project_id(), user_id)? {
        return Ok(None);
    }
    Ok(Some(component))
}

fn create(
    db: &Database,
    project_id: &str,
    parent_id: Option<&str>,
    name: &str,
    actor: &str,
) -> assemble_db::Result<ComponentRow> {
    let id = Uuid::new_v4().to_string();
    let mut component = TrackedComponent::new(&id, project_id, parent_id, name);
    db.save_component(&mut component, actor)?;
    Ok(component.into_row())
}

/// POST /projects/{project_id}/components
pub async fn create_component(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateComponentRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = validate_name(&req.name, MAX_COMPONENT_NAME)?;
    let uid = claims.sub.to_string();

    let row = with_db(&state, move |db| {
        let pid = project_id.to_string();
        if !db.is_member(&pid, &uid)? {
            return Ok(None);
        }
        create(db, &pid, None, &name, &claims.username).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok((StatusCode::CREATED, Json(convert::component(row)?)))
}

/// POST /components/{component_id}/tasks: the parent must be a top-level
/// component; nesting under a task is rejected with 422.
pub async fn create_task(
    State(state): State<AppState>,
    Path(component_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateComponentRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = validate_name(&req.name, MAX_COMPONENT_NAME)?;
    let uid = claims.sub.to_string();

    let row = with_db(&state, move |db| {
        let Some(parent) = member_component(db, &component_id.to_string(), &uid)? else {
            return Ok(None);
        };
        create(db, parent.project_id(), Some(parent.id()), &name, &claims.username).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok((StatusCode::CREATED, Json(convert::component(row)?)))
}

/// PATCH /components/{component_id}: inline edit of name and/or completion.
pub async fn update_component(
    State(state): State<AppState>,
    Path(component_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateComponentRequest>,
) -> Result<Json<ComponentResponse>, StatusCode> {
    let name = req
        .name
        .as_deref()
        .map(|n| validate_name(n, MAX_COMPONENT_NAME))
        .transpose()?;
    let completed = req.completed;
    let uid = claims.sub.to_string();

    let (row, _) = with_db(&state, move |db| {
        db.edit_component(&component_id.to_string(), &uid, &claims.username, |component| {
            if let Some(name) = name {
                component.set_name(name);
            }
            if let Some(completed) = completed {
                component.set_completed(completed);
            }
        })
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(convert::component(row)?))
}

/// POST /components/{component_id}/finish: flips the completion flag.
pub async fn finish_component(
    State(state): State<AppState>,
    Path(component_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ComponentResponse>, StatusCode> {
    let uid = claims.sub.to_string();

    let (row, _) = with_db(&state, move |db| {
        db.edit_component(
            &component_id.to_string(),
            &uid,
            &claims.username,
            TrackedComponent::toggle_completed,
        )
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(convert::component(row)?))
}

/// DELETE /components/{component_id}: removes the component and its tasks.
pub async fn delete_component(
    State(state): State<AppState>,
    Path(component_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, StatusCode> {
    let uid = claims.sub.to_string();

    with_db(&state, move |db| {
        let Some(component) = member_component(db, &component_id.to_string(), &uid)? else {
            return Ok(None);
        };
        db.delete_component(component, &claims.username).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(StatusCode::NO_CONTENT)
}
