//! Database row types. These map directly to SQLite rows and stay distinct
//! from the assemble-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRow {
    pub user_id: String,
    pub username: String,
    pub slug: String,
    pub bio: String,
}

#[derive(Debug, Clone)]
pub struct FriendRequestRow {
    pub id: String,
    pub from: ProfileRow,
    pub to: ProfileRow,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub slug: String,
    pub completed: bool,
    pub owner: ProfileRow,
    pub created_at: String,
}

/// A component (`parent_id == None`) or a task under one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRow {
    pub id: String,
    pub project_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub completed: bool,
    pub created_at: String,
}

impl ComponentRow {
    pub fn is_task(&self) -> bool {
        self.parent_id.is_some()
    }
}
