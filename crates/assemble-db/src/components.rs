//! Components and tasks, with snapshot-compare-on-save history capture.
//!
//! A component is loaded into a [`TrackedComponent`], which remembers the
//! name and completion flag it had when it was read. [`Database::save_component`]
//! diffs the current values against that snapshot, writes the row and the
//! matching activity record in one transaction, and then refreshes the
//! snapshot. There is no field-only update path, so no change can bypass the
//! comparison.

use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;

use assemble_types::models::ActivityKind;

use crate::activity;
use crate::models::ComponentRow;
use crate::projects::{project_exists, query_is_member};
use crate::slug::{SlugTable, unique_slug};
use crate::{Database, Result, StoreError};

const COMPONENT_SELECT: &str =
    "SELECT id, project_id, parent_id, name, slug, completed, created_at FROM components";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    name: String,
    completed: bool,
}

/// What a save will write to the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    Created,
    Renamed { from: String, to: String },
    Completion(bool),
    Unchanged,
}

impl PendingChange {
    pub fn kind(&self) -> Option<ActivityKind> {
        match self {
            Self::Created => Some(ActivityKind::Created),
            Self::Renamed { .. } => Some(ActivityKind::Edited),
            Self::Completion(done) => Some(ActivityKind::for_completion(*done)),
            Self::Unchanged => None,
        }
    }
}

/// A component row plus the state it had when last read or saved.
#[derive(Debug, Clone)]
pub struct TrackedComponent {
    row: ComponentRow,
    snapshot: Option<Snapshot>,
}

impl TrackedComponent {
    /// An unsaved component. `parent_id` makes it a task.
    pub fn new(id: &str, project_id: &str, parent_id: Option<&str>, name: &str) -> Self {
        Self {
            row: ComponentRow {
                id: id.to_string(),
                project_id: project_id.to_string(),
                parent_id: parent_id.map(str::to_string),
                name: name.to_string(),
                slug: String::new(),
                completed: false,
                created_at: String::new(),
            },
            snapshot: None,
        }
    }

    fn loaded(row: ComponentRow) -> Self {
        let snapshot = Some(Snapshot {
            name: row.name.clone(),
            completed: row.completed,
        });
        Self { row, snapshot }
    }

    pub fn row(&self) -> &ComponentRow {
        &self.row
    }

    pub fn into_row(self) -> ComponentRow {
        self.row
    }

    pub fn id(&self) -> &str {
        &self.row.id
    }

    pub fn project_id(&self) -> &str {
        &self.row.project_id
    }

    pub fn name(&self) -> &str {
        &self.row.name
    }

    pub fn completed(&self) -> bool {
        self.row.completed
    }

    pub fn is_new(&self) -> bool {
        self.snapshot.is_none()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.row.name = name.into();
    }

    pub fn set_completed(&mut self, completed: bool) {
        self.row.completed = completed;
    }

    pub fn toggle_completed(&mut self) {
        self.row.completed = !self.row.completed;
    }

    /// A rename takes precedence over a completion change made in the same
    /// edit; only one record is written per save.
    pub fn pending_change(&self) -> PendingChange {
        match &self.snapshot {
            None => PendingChange::Created,
            Some(prev) if prev.name != self.row.name => PendingChange::Renamed {
                from: prev.name.clone(),
                to: self.row.name.clone(),
            },
            Some(prev) if prev.completed != self.row.completed => {
                PendingChange::Completion(self.row.completed)
            }
            Some(_) => PendingChange::Unchanged,
        }
    }

    fn refresh_snapshot(&mut self) {
        self.snapshot = Some(Snapshot {
            name: self.row.name.clone(),
            completed: self.row.completed,
        });
    }
}

impl Database {
    pub fn load_component(&self, id: &str) -> Result<Option<TrackedComponent>> {
        self.with_conn(|conn| Ok(query_component(conn, id)?.map(TrackedComponent::loaded)))
    }

    /// Persists `component` and appends the matching activity record.
    ///
    /// New components are inserted (after checking the parent) and logged as
    /// created. Existing ones are updated and logged as edited or toggled
    /// when the snapshot differs. The update only applies while the stored
    /// row still matches the snapshot; if someone else changed it first the
    /// save fails with `Conflict` and nothing is written. Returns the kind of
    /// record written, if any.
    pub fn save_component(
        &self,
        component: &mut TrackedComponent,
        actor: &str,
    ) -> Result<Option<ActivityKind>> {
        let change = component.pending_change();
        let (slug, created_at) = self.with_conn_mut(|conn| persist(conn, &*component, &change, actor))?;

        if change == PendingChange::Created {
            info!(
                "{} '{}' created in project {} by {}",
                if component.row.is_task() { "Task" } else { "Component" },
                component.row.name,
                component.row.project_id,
                actor
            );
        }

        component.row.slug = slug;
        component.row.created_at = created_at;
        component.refresh_snapshot();
        Ok(change.kind())
    }

    /// Loads, edits and saves a component inside one transaction, so the
    /// diff is always taken against the row as currently stored.
    ///
    /// Returns `None` when the component doesn't exist or `member_id` isn't
    /// a member of its project.
    pub fn edit_component<F>(
        &self,
        id: &str,
        member_id: &str,
        actor: &str,
        edit: F,
    ) -> Result<Option<(ComponentRow, Option<ActivityKind>)>>
    where
        F: FnOnce(&mut TrackedComponent),
    {
        let edited = self.with_conn_mut(|conn| {
            let Some(row) = query_component(conn, id)? else {
                return Ok(None);
            };
            if !query_is_member(conn, &row.project_id, member_id)? {
                return Ok(None);
            }

            let mut component = TrackedComponent::loaded(row);
            edit(&mut component);
            let change = component.pending_change();
            persist(conn, &component, &change, actor)?;
            Ok(Some((component, change)))
        })?;

        Ok(edited.map(|(mut component, change)| {
            component.refresh_snapshot();
            (component.into_row(), change.kind())
        }))
    }

    /// Deletes a component and its tasks. A `deleted` record is written for
    /// every task and then for the component itself, before any row is
    /// removed. Names are taken from the rows as stored at delete time.
    /// Returns how many rows were deleted.
    pub fn delete_component(&self, component: TrackedComponent, actor: &str) -> Result<usize> {
        let id = component.into_row().id;

        let (removed, name, project_id) = self.with_conn_mut(|conn| {
            let row = query_component(conn, &id)?.ok_or(StoreError::NotFound("component"))?;
            let children = query_children(conn, &row.id)?;
            for child in &children {
                activity::record_deleted(conn, actor, &row.project_id, &child.name)?;
            }
            activity::record_deleted(conn, actor, &row.project_id, &row.name)?;

            let deleted = conn.execute("DELETE FROM components WHERE id = ?1", [&row.id])?;
            Ok((children.len() + deleted, row.name, row.project_id))
        })?;

        info!("'{}' deleted from project {} by {}", name, project_id, actor);
        Ok(removed)
    }

    /// Every component and task of a project in creation order.
    pub fn components_for_project(&self, project_id: &str) -> Result<Vec<ComponentRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE project_id = ?1 ORDER BY created_at, rowid",
                COMPONENT_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([project_id], component_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Top-level components, each paired with its tasks.
    pub fn component_tree(&self, project_id: &str) -> Result<Vec<(ComponentRow, Vec<ComponentRow>)>> {
        let rows = self.components_for_project(project_id)?;
        let (tops, tasks): (Vec<_>, Vec<_>) = rows.into_iter().partition(|r| !r.is_task());

        let mut tree: Vec<(ComponentRow, Vec<ComponentRow>)> =
            tops.into_iter().map(|top| (top, Vec::new())).collect();
        for task in tasks {
            if let Some((_, children)) = tree
                .iter_mut()
                .find(|(top, _)| task.parent_id.as_deref() == Some(top.id.as_str()))
            {
                children.push(task);
            }
        }
        Ok(tree)
    }
}

/// Writes the row change and its activity record on `conn`. Returns the
/// stored (slug, created_at).
fn persist(
    conn: &Connection,
    component: &TrackedComponent,
    change: &PendingChange,
    actor: &str,
) -> Result<(String, String)> {
    let row = &component.row;
    let Some(prev) = &component.snapshot else {
        let inserted = insert_component(conn, row)?;
        activity::record_created(conn, actor, &row.project_id, &row.name)?;
        return Ok(inserted);
    };

    let changed = conn.execute(
        "UPDATE components SET name = ?1, completed = ?2
         WHERE id = ?3 AND name = ?4 AND completed = ?5",
        (&row.name, row.completed, &row.id, &prev.name, prev.completed),
    )?;
    if changed == 0 {
        return Err(match query_component(conn, &row.id)? {
            Some(_) => StoreError::Conflict(format!("component {} was changed since it was loaded", row.id)),
            None => StoreError::NotFound("component"),
        });
    }

    match change {
        PendingChange::Renamed { from, to } => {
            activity::record_edited(conn, actor, &row.project_id, from, to)?;
        }
        PendingChange::Completion(done) => {
            activity::record_completion_toggled(conn, actor, &row.project_id, &row.name, *done)?;
        }
        PendingChange::Created | PendingChange::Unchanged => {}
    }
    Ok((row.slug.clone(), row.created_at.clone()))
}

/// Validates the parent, assigns a slug and inserts. Returns (slug, created_at).
fn insert_component(conn: &Connection, row: &ComponentRow) -> Result<(String, String)> {
    if !project_exists(conn, &row.project_id)? {
        return Err(StoreError::NotFound("project"));
    }

    if let Some(parent_id) = &row.parent_id {
        let parent = query_component(conn, parent_id)?.ok_or(StoreError::NotFound("parent component"))?;
        if parent.project_id != row.project_id {
            return Err(StoreError::InvalidParent("parent belongs to another project"));
        }
        if parent.is_task() {
            return Err(StoreError::InvalidParent("tasks cannot have sub-tasks"));
        }
    }

    let slug = unique_slug(conn, SlugTable::Components, &row.name)?;
    let created_at: String = conn
        .query_row(
            "INSERT INTO components (id, project_id, parent_id, name, slug, completed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING created_at",
            rusqlite::params![
                &row.id,
                &row.project_id,
                &row.parent_id,
                &row.name,
                &slug,
                row.completed
            ],
            |r| r.get(0),
        )
        .map_err(|e| StoreError::conflict_on_unique(e, "component"))?;

    Ok((slug, created_at))
}

fn query_component(conn: &Connection, id: &str) -> Result<Option<ComponentRow>> {
    let sql = format!("{} WHERE id = ?1", COMPONENT_SELECT);
    Ok(conn.query_row(&sql, [id], component_from_row).optional()?)
}

fn query_children(conn: &Connection, parent_id: &str) -> Result<Vec<ComponentRow>> {
    let sql = format!("{} WHERE parent_id = ?1 ORDER BY created_at, rowid", COMPONENT_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([parent_id], component_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn component_from_row(row: &Row<'_>) -> rusqlite::Result<ComponentRow> {
    Ok(ComponentRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        slug: row.get(4)?,
        completed: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectRow;
    use crate::test_support;

    fn setup() -> (Database, ProjectRow) {
        let db = test_support::db();
        let alice = test_support::user(&db, "alice");
        let project = test_support::project(&db, &alice, "P");
        (db, project)
    }

    fn create(db: &Database, project: &ProjectRow, parent: Option<&str>, name: &str) -> TrackedComponent {
        let id = uuid::Uuid::new_v4().to_string();
        let mut component = TrackedComponent::new(&id, &project.id, parent, name);
        db.save_component(&mut component, "alice").unwrap();
        component
    }

    fn texts(db: &Database, project: &ProjectRow) -> Vec<String> {
        db.render_feed(&project.id)
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect()
    }

    #[test]
    fn creation_logs_exactly_once() {
        let (db, project) = setup();
        let component = create(&db, &project, None, "Draft spec");

        assert!(!component.is_new());
        assert_eq!(component.row().slug, "draft-spec");
        assert_eq!(texts(&db, &project), vec!["'Draft spec' was created by alice."]);
    }

    #[test]
    fn second_save_without_changes_logs_nothing() {
        let (db, project) = setup();
        let mut component = create(&db, &project, None, "Draft spec");

        component.set_name("Final spec");
        let first = db.save_component(&mut component, "alice").unwrap();
        let second = db.save_component(&mut component, "alice").unwrap();

        assert_eq!(first, Some(ActivityKind::Edited));
        assert_eq!(second, None);
        assert_eq!(db.activity_count(&project.id).unwrap(), 2);
    }

    #[test]
    fn edit_then_delete_feed() {
        let (db, project) = setup();
        let mut component = create(&db, &project, None, "Draft spec");

        component.set_name("Final spec");
        db.save_component(&mut component, "alice").unwrap();

        let reloaded = db.load_component(component.id()).unwrap().unwrap();
        db.delete_component(reloaded, "bob").unwrap();

        assert_eq!(
            texts(&db, &project),
            vec![
                "'Final spec' was deleted by bob.",
                "'Draft spec' was edited to 'Final spec' by alice.",
                "'Draft spec' was created by alice.",
            ]
        );
        assert!(db.load_component(component.id()).unwrap().is_none());
    }

    #[test]
    fn toggling_twice_adds_two_records() {
        let (db, project) = setup();
        let mut component = create(&db, &project, None, "Final spec");
        let before = db.activity_count(&project.id).unwrap();

        component.toggle_completed();
        assert_eq!(
            db.save_component(&mut component, "alice").unwrap(),
            Some(ActivityKind::Completed)
        );
        component.toggle_completed();
        assert_eq!(
            db.save_component(&mut component, "alice").unwrap(),
            Some(ActivityKind::Uncompleted)
        );

        assert_eq!(db.activity_count(&project.id).unwrap(), before + 2);
        let feed = texts(&db, &project);
        assert_eq!(feed[0], "'Final spec' was marked as incomplete by alice.");
        assert_eq!(feed[1], "'Final spec' was marked as complete by alice.");
    }

    #[test]
    fn rename_wins_over_completion_in_one_save() {
        let (db, project) = setup();
        let mut component = create(&db, &project, None, "A");

        component.set_name("B");
        component.set_completed(true);
        assert_eq!(
            db.save_component(&mut component, "alice").unwrap(),
            Some(ActivityKind::Edited)
        );

        let stored = db.load_component(component.id()).unwrap().unwrap();
        assert!(stored.completed());
        assert_eq!(stored.name(), "B");
    }

    #[test]
    fn tasks_nest_one_level_only() {
        let (db, project) = setup();
        let component = create(&db, &project, None, "Backend");
        let task = create(&db, &project, Some(component.id()), "Write schema");
        assert_eq!(task.row().parent_id.as_deref(), Some(component.id()));

        let mut nested = TrackedComponent::new("nested", &project.id, Some(task.id()), "Too deep");
        let err = db.save_component(&mut nested, "alice").unwrap_err();
        assert!(matches!(err, StoreError::InvalidParent(_)));
        assert!(nested.is_new());
        assert!(db.load_component("nested").unwrap().is_none());
    }

    #[test]
    fn parent_must_share_the_project() {
        let (db, project) = setup();
        let owner = db.get_profile(&project.owner.user_id).unwrap().unwrap();
        let other = test_support::project(&db, &owner, "Other");
        let component = create(&db, &project, None, "Backend");

        let mut task = TrackedComponent::new("t", &other.id, Some(component.id()), "Stray");
        let err = db.save_component(&mut task, "alice").unwrap_err();
        assert!(matches!(err, StoreError::InvalidParent(_)));
        assert_eq!(db.activity_count(&other.id).unwrap(), 0);
    }

    #[test]
    fn missing_project_writes_nothing() {
        let (db, _) = setup();
        let mut component = TrackedComponent::new("c", "ghost", None, "Orphan");
        let err = db.save_component(&mut component, "alice").unwrap_err();
        assert!(matches!(err, StoreError::NotFound("project")));
    }

    #[test]
    fn deleting_a_component_logs_its_tasks() {
        let (db, project) = setup();
        let component = create(&db, &project, None, "Backend");
        create(&db, &project, Some(component.id()), "Schema");
        create(&db, &project, Some(component.id()), "Queries");

        let removed = db.delete_component(component, "bob").unwrap();
        assert_eq!(removed, 3);
        assert!(db.components_for_project(&project.id).unwrap().is_empty());

        let feed = texts(&db, &project);
        assert_eq!(feed[0], "'Backend' was deleted by bob.");
        let mut tasks = vec![feed[1].clone(), feed[2].clone()];
        tasks.sort();
        assert_eq!(
            tasks,
            vec!["'Queries' was deleted by bob.", "'Schema' was deleted by bob."]
        );
    }

    #[test]
    fn tree_groups_tasks_under_components() {
        let (db, project) = setup();
        let backend = create(&db, &project, None, "Backend");
        let frontend = create(&db, &project, None, "Frontend");
        create(&db, &project, Some(backend.id()), "Schema");
        create(&db, &project, Some(frontend.id()), "Layout");
        create(&db, &project, Some(backend.id()), "Queries");

        let tree = db.component_tree(&project.id).unwrap();
        let shape: Vec<(String, Vec<String>)> = tree
            .into_iter()
            .map(|(top, tasks)| (top.name, tasks.into_iter().map(|t| t.name).collect()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("Backend".to_string(), vec!["Schema".to_string(), "Queries".to_string()]),
                ("Frontend".to_string(), vec!["Layout".to_string()]),
            ]
        );
    }

    #[test]
    fn stale_component_cannot_be_saved() {
        let (db, project) = setup();
        let component = create(&db, &project, None, "Gone soon");
        let mut stale = db.load_component(component.id()).unwrap().unwrap();
        db.delete_component(component, "alice").unwrap();

        stale.set_name("Renamed");
        let err = db.save_component(&mut stale, "alice").unwrap_err();
        assert!(matches!(err, StoreError::NotFound("component")));
    }

    #[test]
    fn interleaved_saves_keep_data_and_history_in_step() {
        let (db, project) = setup();
        let component = create(&db, &project, None, "A");
        let mut first = db.load_component(component.id()).unwrap().unwrap();
        let mut second = db.load_component(component.id()).unwrap().unwrap();

        first.set_name("B");
        assert_eq!(
            db.save_component(&mut first, "alice").unwrap(),
            Some(ActivityKind::Edited)
        );

        second.set_completed(true);
        let err = db.save_component(&mut second, "bob").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let stored = db.load_component(component.id()).unwrap().unwrap();
        assert_eq!(stored.name(), "B");
        assert!(!stored.completed());
        assert_eq!(
            texts(&db, &project),
            vec!["'A' was edited to 'B' by alice.", "'A' was created by alice."]
        );
    }

    #[test]
    fn stale_duplicate_completion_is_rejected() {
        let (db, project) = setup();
        let component = create(&db, &project, None, "Spec");
        let mut first = db.load_component(component.id()).unwrap().unwrap();
        let mut second = db.load_component(component.id()).unwrap().unwrap();

        first.set_completed(true);
        db.save_component(&mut first, "alice").unwrap();
        second.set_completed(true);
        assert!(matches!(
            db.save_component(&mut second, "bob").unwrap_err(),
            StoreError::Conflict(_)
        ));

        assert_eq!(
            texts(&db, &project),
            vec!["'Spec' was marked as complete by alice.", "'Spec' was created by alice."]
        );
    }

    #[test]
    fn edit_diffs_against_the_stored_row() {
        let (db, project) = setup();
        let component = create(&db, &project, None, "Spec");
        let member = project.owner.user_id.clone();

        let (row, kind) = db
            .edit_component(component.id(), &member, "alice", |c| c.set_completed(true))
            .unwrap()
            .unwrap();
        assert!(row.completed);
        assert_eq!(kind, Some(ActivityKind::Completed));

        // The same request again finds nothing to change
        let (_, kind) = db
            .edit_component(component.id(), &member, "bob", |c| c.set_completed(true))
            .unwrap()
            .unwrap();
        assert_eq!(kind, None);

        let (row, kind) = db
            .edit_component(component.id(), &member, "bob", TrackedComponent::toggle_completed)
            .unwrap()
            .unwrap();
        assert!(!row.completed);
        assert_eq!(kind, Some(ActivityKind::Uncompleted));
        assert_eq!(db.activity_count(&project.id).unwrap(), 3);
    }

    #[test]
    fn edit_is_limited_to_members() {
        let (db, project) = setup();
        let component = create(&db, &project, None, "Spec");
        let outsider = test_support::user(&db, "mallory");

        let edited = db
            .edit_component(component.id(), &outsider.user_id, "mallory", |c| c.set_name("Mine"))
            .unwrap();
        assert!(edited.is_none());
        assert!(
            db.edit_component("missing", &project.owner.user_id, "alice", |c| c.set_name("X"))
                .unwrap()
                .is_none()
        );
        assert_eq!(db.load_component(component.id()).unwrap().unwrap().name(), "Spec");
    }

    #[test]
    fn delete_logs_the_stored_name() {
        let (db, project) = setup();
        let component = create(&db, &project, None, "Old");
        let stale = db.load_component(component.id()).unwrap().unwrap();
        db.edit_component(component.id(), &project.owner.user_id, "alice", |c| c.set_name("New"))
            .unwrap();

        db.delete_component(stale, "bob").unwrap();
        assert_eq!(texts(&db, &project)[0], "'New' was deleted by bob.");
    }
}
