pub mod auth;
pub mod components;
mod convert;
mod error;
pub mod middleware;
pub mod profiles;
pub mod projects;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};

pub use auth::{AppState, AppStateInner};

/// Builds every route. Everything except `/auth/*` and `/health` sits behind
/// bearer-token auth.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/profile", get(profiles::own_profile).patch(profiles::update_profile))
        .route("/profiles/{slug}", get(profiles::view_profile))
        .route("/users/search", get(profiles::search_users))
        .route("/friend-requests", post(profiles::send_friend_request))
        .route("/friend-requests/{request_id}/accept", post(profiles::accept_friend_request))
        .route("/friend-requests/{request_id}", delete(profiles::delete_friend_request))
        .route("/projects", get(projects::list_projects).post(projects::create_project))
        .route("/projects/by-slug/{slug}", get(projects::project_detail_by_slug))
        .route(
            "/projects/{project_id}",
            get(projects::project_detail)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/projects/{project_id}/members", post(projects::add_member))
        .route("/projects/{project_id}/history", get(projects::project_history))
        .route("/projects/{project_id}/components", post(components::create_component))
        .route("/components/{component_id}/tasks", post(components::create_task))
        .route(
            "/components/{component_id}",
            patch(components::update_component).delete(components::delete_component),
        )
        .route("/components/{component_id}/finish", post(components::finish_component))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// GET /health: liveness check (no auth).
pub async fn health() -> &'static str {
    "ok"
}
