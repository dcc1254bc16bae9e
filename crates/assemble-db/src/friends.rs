use rusqlite::{Connection, OptionalExtension};

use crate::models::{FriendRequestRow, ProfileRow};
use crate::users::{PROFILE_SELECT, profile_from_row};
use crate::{Database, Result, StoreError};

const REQUEST_SELECT: &str = "
    SELECT r.id, r.created_at,
           fu.id, fu.username, fp.slug, fp.bio,
           tu.id, tu.username, tp.slug, tp.bio
    FROM friend_requests r
    JOIN users fu ON fu.id = r.from_user
    JOIN profiles fp ON fp.user_id = fu.id
    JOIN users tu ON tu.id = r.to_user
    JOIN profiles tp ON tp.user_id = tu.id";

impl Database {
    pub fn are_friends(&self, a: &str, b: &str) -> Result<bool> {
        self.with_conn(|conn| query_are_friends(conn, a, b))
    }

    pub fn list_friends(&self, user_id: &str) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} JOIN friendships f ON f.friend_id = u.id WHERE f.user_id = ?1 ORDER BY u.username",
                PROFILE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| profile_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Sends a request from `from_user` to `to_user`.
    ///
    /// Rejects self-requests, requests to existing friends and duplicates.
    pub fn send_friend_request(&self, id: &str, from_user: &str, to_user: &str) -> Result<()> {
        if from_user == to_user {
            return Err(StoreError::Invalid("cannot befriend yourself".into()));
        }

        self.with_conn_mut(|conn| {
            if query_are_friends(conn, from_user, to_user)? {
                return Err(StoreError::Conflict("already friends".into()));
            }
            conn.execute(
                "INSERT INTO friend_requests (id, from_user, to_user) VALUES (?1, ?2, ?3)",
                (id, from_user, to_user),
            )
            .map_err(|e| StoreError::conflict_on_unique(e, "friend request"))?;
            Ok(())
        })
    }

    pub fn get_friend_request(&self, id: &str) -> Result<Option<FriendRequestRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE r.id = ?1", REQUEST_SELECT);
            Ok(conn.query_row(&sql, [id], request_from_row).optional()?)
        })
    }

    pub fn incoming_friend_requests(&self, user_id: &str) -> Result<Vec<FriendRequestRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE r.to_user = ?1 ORDER BY r.created_at DESC, r.rowid DESC",
                REQUEST_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], request_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// `to_user` accepts the pending request from `from_user`. The friendship
    /// is stored in both directions and any request between the pair is
    /// cleared.
    pub fn accept_friend_request(&self, to_user: &str, from_user: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let pending = conn
                .query_row(
                    "SELECT id FROM friend_requests WHERE from_user = ?1 AND to_user = ?2",
                    (from_user, to_user),
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            if pending.is_none() {
                return Err(StoreError::NotFound("friend request"));
            }

            conn.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id) VALUES (?1, ?2), (?2, ?1)",
                (from_user, to_user),
            )?;
            conn.execute(
                "DELETE FROM friend_requests
                 WHERE (from_user = ?1 AND to_user = ?2) OR (from_user = ?2 AND to_user = ?1)",
                (from_user, to_user),
            )?;
            Ok(())
        })
    }

    /// Deletes a request. Only the sender or the recipient may do so; anyone
    /// else gets `NotFound`.
    pub fn delete_friend_request(&self, id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM friend_requests WHERE id = ?1 AND (from_user = ?2 OR to_user = ?2)",
                (id, user_id),
            )?;
            if removed == 0 {
                return Err(StoreError::NotFound("friend request"));
            }
            Ok(())
        })
    }
}

pub(crate) fn query_are_friends(conn: &Connection, a: &str, b: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM friendships WHERE user_id = ?1 AND friend_id = ?2)",
        (a, b),
        |row| row.get(0),
    )?)
}

fn request_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendRequestRow> {
    Ok(FriendRequestRow {
        id: row.get(0)?,
        created_at: row.get(1)?,
        from: profile_from_row(row, 2)?,
        to: profile_from_row(row, 6)?,
    })
}
