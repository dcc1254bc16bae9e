use rusqlite::{Connection, OptionalExtension, Row};

use crate::models::{ProfileRow, UserRow};
use crate::slug::{SlugTable, unique_slug};
use crate::{Database, Result, StoreError};

/// Select list shared by every profile query. Columns: id, username, slug, bio.
pub(crate) const PROFILE_SELECT: &str =
    "SELECT u.id, u.username, p.slug, p.bio FROM users u JOIN profiles p ON p.user_id = u.id";

/// Reads a profile starting at column `offset`.
pub(crate) fn profile_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        user_id: row.get(offset)?,
        username: row.get(offset + 1)?,
        slug: row.get(offset + 2)?,
        bio: row.get(offset + 3)?,
    })
}

impl Database {
    // -- Users --

    /// Creates the user and its profile in one transaction.
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<ProfileRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )
            .map_err(|e| StoreError::conflict_on_unique(e, "username"))?;

            let slug = unique_slug(conn, SlugTable::Profiles, username)?;
            conn.execute(
                "INSERT INTO profiles (user_id, slug) VALUES (?1, ?2)",
                (id, &slug),
            )?;

            Ok(ProfileRow {
                user_id: id.to_string(),
                username: username.to_string(),
                slug,
                bio: String::new(),
            })
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Profiles --

    pub fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile_by_user(conn, user_id))
    }

    pub fn get_profile_by_username(&self, username: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE u.username = ?1", PROFILE_SELECT);
            Ok(conn
                .query_row(&sql, [username], |row| profile_from_row(row, 0))
                .optional()?)
        })
    }

    pub fn get_profile_by_slug(&self, slug: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE p.slug = ?1", PROFILE_SELECT);
            Ok(conn
                .query_row(&sql, [slug], |row| profile_from_row(row, 0))
                .optional()?)
        })
    }

    pub fn update_bio(&self, user_id: &str, bio: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE profiles SET bio = ?1 WHERE user_id = ?2",
                (bio, user_id),
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("profile"));
            }
            Ok(())
        })
    }

    /// Case-insensitive substring match on username, excluding `exclude_user`.
    pub fn search_profiles(
        &self,
        fragment: &str,
        exclude_user: &str,
        limit: u32,
    ) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE instr(lower(u.username), lower(?1)) > 0 AND u.id != ?2
                 ORDER BY u.username LIMIT ?3",
                PROFILE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![fragment, exclude_user, limit], |row| {
                    profile_from_row(row, 0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, created_at FROM users WHERE {} = ?1",
        column
    );
    let row = conn
        .query_row(&sql, [value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

pub(crate) fn query_profile_by_user(conn: &Connection, user_id: &str) -> Result<Option<ProfileRow>> {
    let sql = format!("{} WHERE u.id = ?1", PROFILE_SELECT);
    Ok(conn
        .query_row(&sql, [user_id], |row| profile_from_row(row, 0))
        .optional()?)
}
