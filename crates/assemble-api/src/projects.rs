use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use assemble_db::Database;
use assemble_db::models::{ComponentRow, ProfileRow, ProjectRow};
use assemble_db::projects::ProjectChanges;
use assemble_types::api::{
    AddMemberRequest, Claims, CreateProjectRequest, HistoryResponse, ProjectDetailResponse,
    ProjectResponse, UpdateProjectRequest, UserSummary,
};

use crate::auth::AppState;
use crate::convert;
use crate::error::{validate_name, with_db};

const MAX_PROJECT_NAME: usize = 60;
const MAX_DESCRIPTION: usize = 400;

fn validate_description(raw: &str) -> Result<String, StatusCode> {
    let description = raw.trim();
    if description.chars().count() > MAX_DESCRIPTION {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(description.to_string())
}

/// Loads a project the caller belongs to. Non-members get `None`, which
/// handlers turn into 404 so project ids don't leak.
pub(crate) fn member_project(
    db: &Database,
    project_id: &str,
    user_id: &str,
) -> assemble_db::Result<Option<ProjectRow>> {
    if !db.is_member(project_id, user_id)? {
        return Ok(None);
    }
    db.get_project(project_id)
}

/// GET /projects
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ProjectResponse>>, StatusCode> {
    let uid = claims.sub.to_string();
    let rows = with_db(&state, move |db| db.projects_for_member(&uid)).await?;
    Ok(Json(rows.into_iter().map(convert::project).collect::<Result<_, _>>()?))
}

/// POST /projects: the caller becomes owner and first member.
pub async fn create_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = validate_name(&req.name, MAX_PROJECT_NAME)?;
    let description = validate_description(&req.description)?;

    let project_id = Uuid::new_v4().to_string();
    let uid = claims.sub.to_string();
    let row = with_db(&state, move |db| {
        db.create_project(&project_id, &uid, &name, &description)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(convert::project(row)?)))
}

/// GET /projects/{project_id}
pub async fn project_detail(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ProjectDetailResponse>, StatusCode> {
    let uid = claims.sub.to_string();
    let detail = with_db(&state, move |db| {
        let Some(project) = member_project(db, &project_id.to_string(), &uid)? else {
            return Ok(None);
        };
        load_detail(db, project).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    detail_response(detail).map(Json)
}

/// GET /projects/by-slug/{slug}
pub async fn project_detail_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ProjectDetailResponse>, StatusCode> {
    let uid = claims.sub.to_string();
    let detail = with_db(&state, move |db| {
        let Some(project) = db.get_project_by_slug(&slug)? else {
            return Ok(None);
        };
        if !db.is_member(&project.id, &uid)? {
            return Ok(None);
        }
        load_detail(db, project).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    detail_response(detail).map(Json)
}

type ComponentTree = Vec<(ComponentRow, Vec<ComponentRow>)>;

fn load_detail(
    db: &Database,
    project: ProjectRow,
) -> assemble_db::Result<(ProjectRow, Vec<ProfileRow>, ComponentTree)> {
    let members = db.project_members(&project.id)?;
    let tree = db.component_tree(&project.id)?;
    Ok((project, members, tree))
}

fn detail_response(
    (project, members, tree): (ProjectRow, Vec<ProfileRow>, ComponentTree),
) -> Result<ProjectDetailResponse, StatusCode> {
    Ok(ProjectDetailResponse {
        project: convert::project(project)?,
        members: convert::user_summaries(members)?,
        components: tree
            .into_iter()
            .map(convert::component_node)
            .collect::<Result<_, _>>()?,
    })
}

/// PATCH /projects/{project_id}: any member may edit; the slug never changes.
pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>, StatusCode> {
    let name = req
        .name
        .as_deref()
        .map(|n| validate_name(n, MAX_PROJECT_NAME))
        .transpose()?;
    let description = req.description.as_deref().map(validate_description).transpose()?;
    let completed = req.completed;

    let uid = claims.sub.to_string();
    let updated = with_db(&state, move |db| {
        let pid = project_id.to_string();
        if member_project(db, &pid, &uid)?.is_none() {
            return Ok(None);
        }
        let changes = ProjectChanges {
            name: name.as_deref(),
            description: description.as_deref(),
            completed,
        };
        db.update_project(&pid, &changes).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(convert::project(updated)?))
}

/// DELETE /projects/{project_id}: owner only.
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, StatusCode> {
    let uid = claims.sub.to_string();
    let pid = project_id.to_string();
    let project = with_db(&state, move |db| member_project(db, &pid, &uid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    if project.owner.user_id != claims.sub.to_string() {
        return Err(StatusCode::FORBIDDEN);
    }

    with_db(&state, move |db| db.delete_project(&project.id)).await?;

    info!("{} deleted project {}", claims.username, project_id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /projects/{project_id}/members: owner invites a friend.
pub async fn add_member(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let uid = claims.sub.to_string();
    let pid = project_id.to_string();
    let project = with_db(&state, move |db| member_project(db, &pid, &uid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    if project.owner.user_id != claims.sub.to_string() {
        return Err(StatusCode::FORBIDDEN);
    }

    let members = with_db(&state, move |db| {
        let Some(user) = db.get_profile_by_username(&req.username)? else {
            return Ok(None);
        };
        db.add_project_member(&project.id, &user.user_id)?;
        db.project_members(&project.id).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    let members: Vec<UserSummary> = convert::user_summaries(members)?;
    Ok((StatusCode::CREATED, Json(members)))
}

/// GET /projects/{project_id}/history: rendered activity feed, newest first.
pub async fn project_history(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    let uid = claims.sub.to_string();
    let entries = with_db(&state, move |db| {
        let pid = project_id.to_string();
        if !db.is_member(&pid, &uid)? {
            return Ok(None);
        }
        db.render_feed(&pid).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(HistoryResponse {
        project_id,
        entries,
    }))
}
