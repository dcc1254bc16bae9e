use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::FeedEntry;

// -- JWT Claims --

/// Claims carried in every bearer token. `username` doubles as the actor
/// name written into the activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Profiles & friends --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: Uuid,
    pub username: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestResponse {
    pub id: Uuid,
    pub from: UserSummary,
    pub to: UserSummary,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user: UserSummary,
    pub bio: String,
    pub friends: Vec<UserSummary>,
    /// Only populated when viewing your own profile.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incoming_requests: Vec<FriendRequestResponse>,
    pub is_friend: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub bio: String,
}

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendFriendRequest {
    /// Profile slug of the recipient.
    pub to: String,
}

// -- Projects --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMemberRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub slug: String,
    pub completed: bool,
    pub owner: UserSummary,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectDetailResponse {
    #[serde(flatten)]
    pub project: ProjectResponse,
    pub members: Vec<UserSummary>,
    pub components: Vec<ComponentNode>,
}

// -- Components & tasks --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateComponentRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateComponentRequest {
    pub name: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub completed: bool,
    pub created_at: String,
}

/// A top-level component together with its tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentNode {
    #[serde(flatten)]
    pub component: ComponentResponse,
    pub tasks: Vec<ComponentResponse>,
}

// -- History --

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub project_id: Uuid,
    pub entries: Vec<FeedEntry>,
}
