use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;

use crate::friends::query_are_friends;
use crate::models::{ProfileRow, ProjectRow};
use crate::slug::{SlugTable, unique_slug};
use crate::users::{PROFILE_SELECT, profile_from_row};
use crate::{Database, Result, StoreError};

const PROJECT_SELECT: &str = "
    SELECT pr.id, pr.name, pr.description, pr.slug, pr.completed, pr.created_at,
           u.id, u.username, p.slug, p.bio
    FROM projects pr
    JOIN users u ON u.id = pr.owner_id
    JOIN profiles p ON p.user_id = u.id";

/// Field changes for `update_project`. `None` leaves a field untouched; the
/// slug is never changed.
#[derive(Debug, Default)]
pub struct ProjectChanges<'a> {
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub completed: Option<bool>,
}

impl Database {
    /// Creates a project owned by `owner_id`. The owner is inserted as the
    /// first member in the same transaction.
    pub fn create_project(
        &self,
        id: &str,
        owner_id: &str,
        name: &str,
        description: &str,
    ) -> Result<ProjectRow> {
        let project = self.with_conn_mut(|conn| {
            let slug = unique_slug(conn, SlugTable::Projects, name)?;
            conn.execute(
                "INSERT INTO projects (id, name, description, slug, owner_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, name, description, &slug, owner_id),
            )?;
            conn.execute(
                "INSERT INTO project_members (project_id, user_id) VALUES (?1, ?2)",
                (id, owner_id),
            )?;
            query_project(conn, id)?.ok_or(StoreError::NotFound("project"))
        })?;

        info!("Project '{}' ({}) created by {}", project.name, project.slug, project.owner.username);
        Ok(project)
    }

    pub fn get_project(&self, id: &str) -> Result<Option<ProjectRow>> {
        self.with_conn(|conn| query_project(conn, id))
    }

    pub fn get_project_by_slug(&self, slug: &str) -> Result<Option<ProjectRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE pr.slug = ?1", PROJECT_SELECT);
            Ok(conn.query_row(&sql, [slug], project_from_row).optional()?)
        })
    }

    /// Projects `user_id` belongs to, oldest first.
    pub fn projects_for_member(&self, user_id: &str) -> Result<Vec<ProjectRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} JOIN project_members m ON m.project_id = pr.id
                 WHERE m.user_id = ?1
                 ORDER BY pr.created_at, pr.rowid",
                PROJECT_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], project_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_member(&self, project_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| query_is_member(conn, project_id, user_id))
    }

    pub fn project_members(&self, project_id: &str) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} JOIN project_members m ON m.user_id = u.id
                 WHERE m.project_id = ?1
                 ORDER BY u.username",
                PROFILE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([project_id], |row| profile_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_project(&self, id: &str, changes: &ProjectChanges<'_>) -> Result<ProjectRow> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE projects
                 SET name = COALESCE(?2, name),
                     description = COALESCE(?3, description),
                     completed = COALESCE(?4, completed)
                 WHERE id = ?1",
                rusqlite::params![id, changes.name, changes.description, changes.completed],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("project"));
            }
            query_project(conn, id)?.ok_or(StoreError::NotFound("project"))
        })
    }

    /// The owner invites one of their friends into the project.
    pub fn add_project_member(&self, project_id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let owner_id: String = conn
                .query_row(
                    "SELECT owner_id FROM projects WHERE id = ?1",
                    [project_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(StoreError::NotFound("project"))?;

            if !query_are_friends(conn, &owner_id, user_id)? {
                return Err(StoreError::Invalid(
                    "only friends of the owner can be added".into(),
                ));
            }

            conn.execute(
                "INSERT INTO project_members (project_id, user_id) VALUES (?1, ?2)",
                (project_id, user_id),
            )
            .map_err(|e| StoreError::conflict_on_unique(e, "membership"))?;
            Ok(())
        })
    }

    /// Deletes the project. Members, components and activity go with it.
    pub fn delete_project(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM projects WHERE id = ?1", [id])?;
            if removed == 0 {
                return Err(StoreError::NotFound("project"));
            }
            Ok(())
        })?;

        info!("Project {} deleted", id);
        Ok(())
    }
}

pub(crate) fn query_project(conn: &Connection, id: &str) -> Result<Option<ProjectRow>> {
    let sql = format!("{} WHERE pr.id = ?1", PROJECT_SELECT);
    Ok(conn.query_row(&sql, [id], project_from_row).optional()?)
}

pub(crate) fn query_is_member(conn: &Connection, project_id: &str, user_id: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM project_members WHERE project_id = ?1 AND user_id = ?2)",
        (project_id, user_id),
        |row| row.get(0),
    )?)
}

pub(crate) fn project_exists(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?)
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        slug: row.get(3)?,
        completed: row.get(4)?,
        created_at: row.get(5)?,
        owner: profile_from_row(row, 6)?,
    })
}
