//! Project activity log.
//!
//! Every create, rename, completion toggle and delete of a component or task
//! appends one immutable row to `activity`. Rows are only ever removed by the
//! cascade when their project is deleted, so the feed can be read without
//! coordinating with writers.
//!
//! The `record_*` functions take a plain `&Connection` so that callers can
//! append the history row inside the same transaction as the data change.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::{debug, error};

use assemble_types::models::{ActivityKind, FeedEntry};

use crate::projects::project_exists;
use crate::{Database, Result, StoreError};

/// Display format for feed timestamps, e.g. `Mar 24, 2020, 15:14`.
pub const FEED_TIME_FORMAT: &str = "%b %-d, %Y, %H:%M";

/// A stored history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub id: i64,
    pub project_id: String,
    pub kind: ActivityKind,
    pub subject_before: String,
    pub subject_after: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn render(&self) -> String {
        match self.kind {
            ActivityKind::Created => {
                format!("'{}' was created by {}.", self.subject_after, self.actor)
            }
            ActivityKind::Edited => format!(
                "'{}' was edited to '{}' by {}.",
                self.subject_before, self.subject_after, self.actor
            ),
            ActivityKind::Deleted => {
                format!("'{}' was deleted by {}.", self.subject_before, self.actor)
            }
            // stored pre-rendered, see `completion_phrase`
            ActivityKind::Completed | ActivityKind::Uncompleted => self.subject_before.clone(),
        }
    }

    pub fn to_feed_entry(&self) -> FeedEntry {
        FeedEntry {
            text: self.render(),
            timestamp: self.occurred_at,
            display_time: self.occurred_at.format(FEED_TIME_FORMAT).to_string(),
        }
    }
}

/// A project's history, newest first. Iterating renders each entry on the
/// fly; the feed itself holds no cursor, so it can be walked any number of
/// times.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    records: Vec<ActivityRecord>,
}

impl Feed {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ActivityRecord] {
        &self.records
    }

    pub fn entries(&self) -> impl Iterator<Item = FeedEntry> + '_ {
        self.records.iter().map(ActivityRecord::to_feed_entry)
    }
}

/// A history row about to be written.
#[derive(Debug)]
pub struct NewActivity<'a> {
    pub project_id: &'a str,
    pub kind: ActivityKind,
    pub subject_before: &'a str,
    pub subject_after: &'a str,
    pub actor: &'a str,
    pub occurred_at: DateTime<Utc>,
}

/// Phrase stored in `subject_before` for completion toggles.
pub fn completion_phrase(entity_name: &str, actor: &str, completed: bool) -> String {
    let state = if completed { "complete" } else { "incomplete" };
    format!("'{}' was marked as {} by {}.", entity_name, state, actor)
}

/// Appends one row and returns its id. Fails with `NotFound` when the
/// project does not exist.
pub fn append(conn: &Connection, activity: &NewActivity<'_>) -> Result<i64> {
    if !project_exists(conn, activity.project_id)? {
        return Err(StoreError::NotFound("project"));
    }

    conn.execute(
        "INSERT INTO activity (project_id, event_kind, subject_before, subject_after, actor, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            activity.project_id,
            activity.kind.as_str(),
            activity.subject_before,
            activity.subject_after,
            activity.actor,
            encode_timestamp(activity.occurred_at),
        ),
    )?;
    let id = conn.last_insert_rowid();

    debug!(
        "Activity #{} on project {}: {} by {}",
        id, activity.project_id, activity.kind, activity.actor
    );
    Ok(id)
}

pub fn record_created(
    conn: &Connection,
    actor: &str,
    project_id: &str,
    entity_name: &str,
) -> Result<i64> {
    append(
        conn,
        &NewActivity {
            project_id,
            kind: ActivityKind::Created,
            subject_before: "",
            subject_after: entity_name,
            actor,
            occurred_at: Utc::now(),
        },
    )
}

/// Callers only invoke this when the name actually changed.
pub fn record_edited(
    conn: &Connection,
    actor: &str,
    project_id: &str,
    old_name: &str,
    new_name: &str,
) -> Result<i64> {
    append(
        conn,
        &NewActivity {
            project_id,
            kind: ActivityKind::Edited,
            subject_before: old_name,
            subject_after: new_name,
            actor,
            occurred_at: Utc::now(),
        },
    )
}

pub fn record_completion_toggled(
    conn: &Connection,
    actor: &str,
    project_id: &str,
    entity_name: &str,
    new_state: bool,
) -> Result<i64> {
    let phrase = completion_phrase(entity_name, actor, new_state);
    append(
        conn,
        &NewActivity {
            project_id,
            kind: ActivityKind::for_completion(new_state),
            subject_before: &phrase,
            subject_after: "",
            actor,
            occurred_at: Utc::now(),
        },
    )
}

/// Must run before the entity row is removed.
pub fn record_deleted(
    conn: &Connection,
    actor: &str,
    project_id: &str,
    entity_name: &str,
) -> Result<i64> {
    append(
        conn,
        &NewActivity {
            project_id,
            kind: ActivityKind::Deleted,
            subject_before: entity_name,
            subject_after: "",
            actor,
            occurred_at: Utc::now(),
        },
    )
}

/// Loads a project's records, newest first. Equal timestamps fall back to
/// the row id so the most recently written record wins the tie.
pub fn load_feed(conn: &Connection, project_id: &str) -> Result<Feed> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, event_kind, subject_before, subject_after, actor, occurred_at
         FROM activity
         WHERE project_id = ?1
         ORDER BY occurred_at DESC, id DESC",
    )?;

    let raw = stmt
        .query_map([project_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut records = Vec::with_capacity(raw.len());
    for (id, project_id, kind, subject_before, subject_after, actor, occurred_at) in raw {
        let kind = kind.parse::<ActivityKind>().map_err(|e| {
            error!("Activity #{} has an unrecognized event kind: {}", id, e);
            StoreError::Corrupt {
                table: "activity",
                id: id.to_string(),
                reason: e.to_string(),
            }
        })?;
        let occurred_at = decode_timestamp(&occurred_at).map_err(|e| {
            error!("Activity #{} has an unreadable timestamp '{}': {}", id, occurred_at, e);
            StoreError::Corrupt {
                table: "activity",
                id: id.to_string(),
                reason: e.to_string(),
            }
        })?;
        records.push(ActivityRecord {
            id,
            project_id,
            kind,
            subject_before,
            subject_after,
            actor,
            occurred_at,
        });
    }

    Ok(Feed { records })
}

/// Fixed-width UTC text so that lexical order in SQLite is time order.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}

impl Database {
    pub fn record_created(&self, actor: &str, project_id: &str, entity_name: &str) -> Result<i64> {
        self.with_conn_mut(|conn| record_created(conn, actor, project_id, entity_name))
    }

    pub fn record_edited(
        &self,
        actor: &str,
        project_id: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| record_edited(conn, actor, project_id, old_name, new_name))
    }

    pub fn record_completion_toggled(
        &self,
        actor: &str,
        project_id: &str,
        entity_name: &str,
        new_state: bool,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            record_completion_toggled(conn, actor, project_id, entity_name, new_state)
        })
    }

    pub fn record_deleted(&self, actor: &str, project_id: &str, entity_name: &str) -> Result<i64> {
        self.with_conn_mut(|conn| record_deleted(conn, actor, project_id, entity_name))
    }

    pub fn append_activity(&self, activity: &NewActivity<'_>) -> Result<i64> {
        self.with_conn_mut(|conn| append(conn, activity))
    }

    pub fn activity_feed(&self, project_id: &str) -> Result<Feed> {
        self.with_conn(|conn| load_feed(conn, project_id))
    }

    /// Rendered history for a project, newest first.
    pub fn render_feed(&self, project_id: &str) -> Result<Vec<FeedEntry>> {
        Ok(self.activity_feed(project_id)?.entries().collect())
    }

    pub fn activity_count(&self, project_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM activity WHERE project_id = ?1",
                [project_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use chrono::TimeZone;

    fn texts(db: &Database, project_id: &str) -> Vec<String> {
        db.render_feed(project_id)
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect()
    }

    #[test]
    fn edited_template() {
        let db = test_support::db();
        let alice = test_support::user(&db, "alice");
        let project = test_support::project(&db, &alice, "P");

        db.record_edited("alice", &project.id, "Design doc", "Design document")
            .unwrap();

        assert_eq!(
            texts(&db, &project.id),
            vec!["'Design doc' was edited to 'Design document' by alice."]
        );
    }

    #[test]
    fn every_kind_renders() {
        let db = test_support::db();
        let alice = test_support::user(&db, "alice");
        let project = test_support::project(&db, &alice, "P");

        db.record_created("alice", &project.id, "Draft spec").unwrap();
        db.record_completion_toggled("alice", &project.id, "Draft spec", true)
            .unwrap();
        db.record_completion_toggled("bob", &project.id, "Draft spec", false)
            .unwrap();
        db.record_deleted("bob", &project.id, "Draft spec").unwrap();

        let mut rendered = texts(&db, &project.id);
        rendered.sort();
        assert_eq!(
            rendered,
            vec![
                "'Draft spec' was created by alice.",
                "'Draft spec' was deleted by bob.",
                "'Draft spec' was marked as complete by alice.",
                "'Draft spec' was marked as incomplete by bob.",
            ]
        );
    }

    #[test]
    fn stored_fields_match_kind() {
        let db = test_support::db();
        let alice = test_support::user(&db, "alice");
        let project = test_support::project(&db, &alice, "P");

        db.record_created("alice", &project.id, "A").unwrap();
        db.record_deleted("alice", &project.id, "B").unwrap();
        db.record_completion_toggled("alice", &project.id, "C", true)
            .unwrap();

        let feed = db.activity_feed(&project.id).unwrap();
        let by_kind = |kind| {
            feed.records()
                .iter()
                .find(|r| r.kind == kind)
                .cloned()
                .unwrap()
        };

        let created = by_kind(ActivityKind::Created);
        assert_eq!((created.subject_before.as_str(), created.subject_after.as_str()), ("", "A"));

        let deleted = by_kind(ActivityKind::Deleted);
        assert_eq!((deleted.subject_before.as_str(), deleted.subject_after.as_str()), ("B", ""));

        let completed = by_kind(ActivityKind::Completed);
        assert_eq!(completed.subject_before, "'C' was marked as complete by alice.");
        assert_eq!(completed.subject_after, "");
    }

    #[test]
    fn empty_project_has_empty_feed() {
        let db = test_support::db();
        let alice = test_support::user(&db, "alice");
        let project = test_support::project(&db, &alice, "P");

        let feed = db.activity_feed(&project.id).unwrap();
        assert!(feed.is_empty());
        assert_eq!(feed.entries().count(), 0);
    }

    #[test]
    fn missing_project_is_rejected() {
        let db = test_support::db();
        let err = db.record_created("alice", "no-such-project", "X").unwrap_err();
        assert!(matches!(err, StoreError::NotFound("project")));
    }

    #[test]
    fn feed_is_newest_first_with_id_tiebreak() {
        let db = test_support::db();
        let alice = test_support::user(&db, "alice");
        let project = test_support::project(&db, &alice, "P");

        let early = Utc.with_ymd_and_hms(2020, 3, 24, 15, 14, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2020, 3, 24, 15, 20, 0).unwrap();
        let at = |name: &'static str, occurred_at| NewActivity {
            project_id: &project.id,
            kind: ActivityKind::Created,
            subject_before: "",
            subject_after: name,
            actor: "alice",
            occurred_at,
        };

        let a = db.append_activity(&at("late", late)).unwrap();
        let b = db.append_activity(&at("tie-1", early)).unwrap();
        let c = db.append_activity(&at("tie-2", early)).unwrap();

        let feed = db.activity_feed(&project.id).unwrap();
        let ids: Vec<i64> = feed.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, c, b]);

        let entries: Vec<FeedEntry> = feed.entries().collect();
        assert!(entries.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert_eq!(entries[1].text, "'tie-2' was created by alice.");
        assert_eq!(entries[2].display_time, "Mar 24, 2020, 15:14");
    }

    #[test]
    fn feed_can_be_walked_twice() {
        let db = test_support::db();
        let alice = test_support::user(&db, "alice");
        let project = test_support::project(&db, &alice, "P");
        db.record_created("alice", &project.id, "A").unwrap();
        db.record_created("alice", &project.id, "B").unwrap();

        let feed = db.activity_feed(&project.id).unwrap();
        let first: Vec<_> = feed.entries().collect();
        let second: Vec<_> = feed.entries().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn project_delete_cascades_history() {
        let db = test_support::db();
        let alice = test_support::user(&db, "alice");
        let project = test_support::project(&db, &alice, "P");
        db.record_created("alice", &project.id, "A").unwrap();
        assert_eq!(db.activity_count(&project.id).unwrap(), 1);

        db.delete_project(&project.id).unwrap();
        assert_eq!(db.activity_count(&project.id).unwrap(), 0);
    }

    #[test]
    fn timestamps_round_trip_through_text() {
        let ts = Utc.with_ymd_and_hms(2020, 3, 19, 21, 27, 5).unwrap();
        let encoded = encode_timestamp(ts);
        assert_eq!(encoded, "2020-03-19T21:27:05.000000Z");
        assert_eq!(decode_timestamp(&encoded).unwrap(), ts);
    }

    #[test]
    fn unknown_stored_kind_is_corrupt() {
        let db = test_support::db();
        let alice = test_support::user(&db, "alice");
        let project = test_support::project(&db, &alice, "P");
        db.record_created("alice", &project.id, "Spec").unwrap();

        db.with_conn(|conn| {
            conn.pragma_update(None, "ignore_check_constraints", "ON")?;
            conn.execute(
                "INSERT INTO activity (project_id, event_kind, subject_before, subject_after, actor, occurred_at)
                 VALUES (?1, 'renamed', 'Spec', 'Plan', 'alice', ?2)",
                (&project.id, encode_timestamp(Utc::now())),
            )?;
            conn.pragma_update(None, "ignore_check_constraints", "OFF")?;
            Ok(())
        })
        .unwrap();

        let err = db.activity_feed(&project.id).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { table: "activity", .. }));
        assert!(db.render_feed(&project.id).is_err());
    }

    #[test]
    fn check_constraint_rejects_unknown_kind() {
        let db = test_support::db();
        let alice = test_support::user(&db, "alice");
        let project = test_support::project(&db, &alice, "P");

        let inserted = db.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT INTO activity (project_id, event_kind, subject_before, subject_after, actor, occurred_at)
                 VALUES (?1, 'renamed', '', '', 'alice', ?2)",
                (&project.id, encode_timestamp(Utc::now())),
            )?)
        });
        assert!(inserted.is_err());
        assert_eq!(db.activity_count(&project.id).unwrap(), 0);
    }

    #[test]
    fn history_only_grows() {
        use crate::components::TrackedComponent;

        let db = test_support::db();
        let alice = test_support::user(&db, "alice");
        let project = test_support::project(&db, &alice, "P");

        let mut counts = vec![db.activity_count(&project.id).unwrap()];
        let mut component = TrackedComponent::new("c1", &project.id, None, "Backend");
        db.save_component(&mut component, "alice").unwrap();
        counts.push(db.activity_count(&project.id).unwrap());

        let mut task = TrackedComponent::new("t1", &project.id, Some("c1"), "Schema");
        db.save_component(&mut task, "alice").unwrap();
        counts.push(db.activity_count(&project.id).unwrap());

        component.set_name("Server");
        db.save_component(&mut component, "alice").unwrap();
        counts.push(db.activity_count(&project.id).unwrap());

        task.toggle_completed();
        db.save_component(&mut task, "alice").unwrap();
        counts.push(db.activity_count(&project.id).unwrap());

        db.delete_component(component, "alice").unwrap();
        counts.push(db.activity_count(&project.id).unwrap());

        assert_eq!(counts, vec![0, 1, 2, 3, 4, 6]);

        let feed = db.activity_feed(&project.id).unwrap();
        let mut ids: Vec<i64> = feed.records().iter().map(|r| r.id).collect();
        ids.reverse();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
