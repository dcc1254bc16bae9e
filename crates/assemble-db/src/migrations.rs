use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, projects, components)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE profiles (
                user_id     TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                slug        TEXT NOT NULL UNIQUE,
                bio         TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE friendships (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                friend_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (user_id, friend_id),
                CHECK (user_id != friend_id)
            );

            CREATE TABLE friend_requests (
                id          TEXT PRIMARY KEY,
                from_user   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                to_user     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (from_user, to_user),
                CHECK (from_user != to_user)
            );

            CREATE TABLE projects (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                slug        TEXT NOT NULL UNIQUE,
                completed   INTEGER NOT NULL DEFAULT 0,
                owner_id    TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE project_members (
                project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (project_id, user_id)
            );

            CREATE TABLE components (
                id          TEXT PRIMARY KEY,
                project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                parent_id   TEXT REFERENCES components(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                slug        TEXT NOT NULL UNIQUE,
                completed   INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_components_project ON components(project_id);
            CREATE INDEX idx_components_parent ON components(parent_id);

            CREATE TABLE activity (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id      TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                event_kind      TEXT NOT NULL
                    CHECK (event_kind IN ('created', 'edited', 'deleted', 'completed', 'uncompleted')),
                subject_before  TEXT NOT NULL DEFAULT '',
                subject_after   TEXT NOT NULL DEFAULT '',
                actor           TEXT NOT NULL,
                occurred_at     TEXT NOT NULL
            );

            CREATE INDEX idx_activity_project
                ON activity(project_id, occurred_at, id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
