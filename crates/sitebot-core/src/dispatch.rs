//! The action dispatcher.
//!
//! Maps each [`Action`] onto store operations. Section edits capture a
//! pre-image in [`History`] before writing; adds to ordered collections get
//! the next `sort_order`; by-name and by-title lookups must match exactly one
//! row. After any successful mutation the rendering layer is asked to
//! revalidate and a snapshot job is queued on the mirror outbox. Neither side
//! effect can fail the dispatch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::action::{Action, Fields};
use crate::collection::Collection;
use crate::error::{Result, SiteError};
use crate::history::History;
use crate::mirror::{MirrorJob, MirrorOutbox};
use crate::revalidate::{spawn_revalidate, Revalidator};
use crate::slug::slugify;
use crate::store::{row_id, select_single, Filter, Query, Row, Store};

// ---------------------------------------------------------------------------
// ActionResult
// ---------------------------------------------------------------------------

/// The `{success, result}` / `{success: false, error}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// The human-readable message of a successful result, if any.
    pub fn message(&self) -> Option<&str> {
        self.result.as_ref()?.get("message")?.as_str()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    store: Arc<dyn Store>,
    history: History,
    outbox: Option<MirrorOutbox>,
    revalidator: Option<Arc<dyn Revalidator>>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, history_retention: usize) -> Self {
        Self {
            history: History::new(store.clone(), history_retention),
            store,
            outbox: None,
            revalidator: None,
        }
    }

    pub fn with_outbox(mut self, outbox: MirrorOutbox) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn with_revalidator(mut self, revalidator: Arc<dyn Revalidator>) -> Self {
        self.revalidator = Some(revalidator);
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn revalidator(&self) -> Option<&Arc<dyn Revalidator>> {
        self.revalidator.as_ref()
    }

    /// Parse and run an untyped action. Every failure, including an
    /// unrecognised tag, comes back as a failed result.
    pub async fn execute_value(&self, value: Value) -> ActionResult {
        match Action::from_value(value) {
            Ok(action) => self.execute(&action).await,
            Err(e) => ActionResult::failed(e.to_string()),
        }
    }

    pub async fn execute(&self, action: &Action) -> ActionResult {
        match self.run(action).await {
            Ok(result) => ActionResult::ok(result),
            Err(e) => ActionResult::failed(e.to_string()),
        }
    }

    /// Apply `action` and fire the post-mutation side effects.
    pub async fn run(&self, action: &Action) -> Result<Value> {
        let result = match self.apply(action).await {
            Ok(result) => result,
            Err(e) => {
                warn!(action = action.tag(), error = %e, "action failed");
                return Err(e);
            }
        };
        info!(action = action.tag(), "action applied");

        if action.is_mutation() {
            if let Some(revalidator) = &self.revalidator {
                spawn_revalidate(revalidator.clone());
            }
            if let (Some(outbox), Some(collection)) = (&self.outbox, action.mirrored_collection()) {
                outbox.submit(MirrorJob {
                    collection,
                    message: action.commit_message(),
                });
            }
        }
        Ok(result)
    }

    async fn apply(&self, action: &Action) -> Result<Value> {
        match action {
            Action::UpdateSection { section, content } => {
                self.update_section(section, content.clone()).await
            }
            Action::UpdateSectionField {
                section,
                field,
                value,
            } => self.update_section_field(section, field, value.clone()).await,

            Action::AddTeamMember {
                name,
                role,
                image_url,
            } => {
                let mut row = Row::new();
                row.insert("name".into(), json!(name));
                row.insert("role".into(), json!(role));
                put_opt(&mut row, "image_url", image_url);
                let added = self.insert_ordered(Collection::TeamMembers, row).await?;
                Ok(added_result(format!("Added team member '{name}'."), added))
            }
            Action::UpdateTeamMember { name, updates } => {
                self.update_by_name(Collection::TeamMembers, "name", name, updates)
                    .await
            }
            Action::RemoveTeamMember { name } => {
                self.remove_by_name(Collection::TeamMembers, "name", name)
                    .await
            }

            Action::AddGalleryImage { src, alt, caption } => {
                let mut row = Row::new();
                row.insert("src".into(), json!(src));
                put_opt(&mut row, "alt", alt);
                put_opt(&mut row, "caption", caption);
                let added = self.insert_ordered(Collection::GalleryImages, row).await?;
                Ok(added_result("Added gallery image.".to_string(), added))
            }
            Action::RemoveGalleryImage { caption } => {
                self.remove_by_name(Collection::GalleryImages, "caption", caption)
                    .await
            }

            Action::AddProgram {
                title,
                description,
                tags,
                image_url,
                image_alt,
            } => {
                let mut row = Row::new();
                row.insert("title".into(), json!(title));
                put_opt(&mut row, "description", description);
                if let Some(tags) = tags {
                    row.insert("tags".into(), json!(tags));
                }
                put_opt(&mut row, "image_url", image_url);
                put_opt(&mut row, "image_alt", image_alt);
                let added = self.insert_ordered(Collection::Programs, row).await?;
                Ok(added_result(format!("Added program '{title}'."), added))
            }
            Action::UpdateProgram { title, updates } => {
                self.update_by_name(Collection::Programs, "title", title, updates)
                    .await
            }
            Action::RemoveProgram { title } => {
                self.remove_by_name(Collection::Programs, "title", title)
                    .await
            }

            Action::AddEvent { event } => {
                let mut row = event.clone();
                row.remove("id");
                let title = event.get("title").and_then(Value::as_str).unwrap_or("");
                row.insert("slug".into(), json!(slugify(title)));
                let added = self.insert_ordered(Collection::Events, row).await?;
                let slug = added.get("slug").cloned().unwrap_or(Value::Null);
                Ok(added_result(
                    format!("Added event '{title}' ({}).", slug.as_str().unwrap_or("")),
                    added,
                ))
            }
            Action::UpdateEvent { slug, updates } => {
                let table = Collection::Events.table();
                let target =
                    select_single(self.store.as_ref(), table, vec![Filter::eq("slug", slug.as_str())])
                        .await?;
                let updated = self.patch_by_id(table, &target, sanitize(updates)).await?;
                Ok(json!({
                    "message": format!("Updated event '{slug}'."),
                    "record": updated,
                }))
            }

            Action::UpdateStat {
                label,
                value,
                suffix,
                prefix,
            } => {
                let table = Collection::Stats.table();
                let target = select_single(
                    self.store.as_ref(),
                    table,
                    vec![Filter::ilike("label", label.as_str())],
                )
                .await?;
                let mut patch = Row::new();
                patch.insert("value".into(), value.clone());
                put_opt(&mut patch, "suffix", suffix);
                put_opt(&mut patch, "prefix", prefix);
                let updated = self.patch_by_id(table, &target, patch).await?;
                Ok(json!({
                    "message": format!("Updated stat '{label}' to {value}."),
                    "record": updated,
                }))
            }

            Action::AddInitiative { title, detail } => {
                let mut row = Row::new();
                row.insert("title".into(), json!(title));
                put_opt(&mut row, "detail", detail);
                let added = self.insert_ordered(Collection::Initiatives, row).await?;
                Ok(added_result(format!("Added initiative '{title}'."), added))
            }
            Action::RemoveInitiative { title } => {
                self.remove_by_name(Collection::Initiatives, "title", title)
                    .await
            }

            Action::Undo => {
                let outcome = self.history.undo().await?;
                Ok(json!({ "message": outcome.message() }))
            }
            Action::GetStatus => self.status().await,
        }
    }

    // -----------------------------------------------------------------------
    // Section content
    // -----------------------------------------------------------------------

    async fn find_section(&self, section: &str) -> Result<Option<Row>> {
        let table = Collection::SiteContent.table();
        let query = Query::new().filter(Filter::eq("section", section));
        let mut rows = self.store.select(table, &query).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            matched => Err(SiteError::ExpectedSingleRow {
                table: table.to_string(),
                matched,
            }),
        }
    }

    /// Replace a section's content, creating the section if it is new. Only
    /// an existing section has a pre-image to record.
    async fn update_section(&self, section: &str, content: Value) -> Result<Value> {
        let table = Collection::SiteContent.table();
        let mut patch = Row::new();
        patch.insert("content".into(), content);

        let record = match self.find_section(section).await? {
            Some(existing) => {
                self.history
                    .record(table, row_id(&existing), &existing)
                    .await?;
                self.patch_by_id(table, &existing, patch).await?
            }
            None => {
                patch.insert("section".into(), json!(section));
                Value::Object(self.store.insert(table, patch).await?)
            }
        };
        Ok(json!({
            "message": format!("Updated section '{section}'."),
            "record": record,
        }))
    }

    /// Merge one field into a section's content object.
    async fn update_section_field(&self, section: &str, field: &str, value: Value) -> Result<Value> {
        let table = Collection::SiteContent.table();
        let existing = self
            .find_section(section)
            .await?
            .ok_or_else(|| SiteError::ExpectedSingleRow {
                table: table.to_string(),
                matched: 0,
            })?;

        let mut content = match existing.get("content") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        content.insert(field.to_string(), value);

        self.history
            .record(table, row_id(&existing), &existing)
            .await?;
        let mut patch = Row::new();
        patch.insert("content".into(), Value::Object(content));
        let record = self.patch_by_id(table, &existing, patch).await?;
        Ok(json!({
            "message": format!("Updated '{field}' in section '{section}'."),
            "record": record,
        }))
    }

    // -----------------------------------------------------------------------
    // Ordered collections
    // -----------------------------------------------------------------------

    /// One more than the current maximum `sort_order`, or 1 when empty.
    pub async fn next_sort_order(&self, collection: Collection) -> Result<i64> {
        let query = Query::new().order_desc("sort_order").limit(1);
        let top = self.store.select(collection.table(), &query).await?;
        let max = top
            .first()
            .and_then(|row| row.get("sort_order"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn insert_ordered(&self, collection: Collection, mut row: Row) -> Result<Row> {
        let sort_order = self.next_sort_order(collection).await?;
        row.insert("sort_order".into(), json!(sort_order));
        self.store.insert(collection.table(), row).await
    }

    // -----------------------------------------------------------------------
    // By-name lookups
    // -----------------------------------------------------------------------

    async fn update_by_name(
        &self,
        collection: Collection,
        column: &str,
        name: &str,
        updates: &Fields,
    ) -> Result<Value> {
        let table = collection.table();
        let target =
            select_single(self.store.as_ref(), table, vec![Filter::ilike(column, name)]).await?;
        let record = self.patch_by_id(table, &target, sanitize(updates)).await?;
        Ok(json!({
            "message": format!("Updated '{name}' in {table}."),
            "record": record,
        }))
    }

    async fn remove_by_name(&self, collection: Collection, column: &str, name: &str) -> Result<Value> {
        let table = collection.table();
        let target =
            select_single(self.store.as_ref(), table, vec![Filter::ilike(column, name)]).await?;
        self.store
            .delete(table, &[Filter::Eq("id".into(), row_id(&target))])
            .await?;
        Ok(json!({ "message": format!("Removed '{name}' from {table}.") }))
    }

    async fn patch_by_id(&self, table: &str, target: &Row, patch: Row) -> Result<Value> {
        let mut updated = self
            .store
            .update(table, &[Filter::Eq("id".into(), row_id(target))], patch)
            .await?;
        Ok(updated.pop().map(Value::Object).unwrap_or(Value::Null))
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub async fn status(&self) -> Result<Value> {
        let mut counts = Map::new();
        let mut lines = Vec::new();
        for collection in Collection::STATUS {
            let n = self.store.count(collection.table()).await?;
            counts.insert(collection.table().to_string(), json!(n));
            lines.push(format!("{}: {n}", collection.table()));
        }
        Ok(json!({
            "message": lines.join("\n"),
            "counts": counts,
        }))
    }
}

fn put_opt(row: &mut Row, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        row.insert(key.to_string(), json!(v));
    }
}

/// Caller-supplied updates may not move a row to another id.
fn sanitize(updates: &Fields) -> Row {
    let mut patch = updates.clone();
    patch.remove("id");
    patch
}

fn added_result(message: String, row: Row) -> Value {
    json!({ "message": message, "record": Value::Object(row) })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{spawn_outbox, MirrorReport, SnapshotMirror};
    use crate::repo::{MemoryRepository, Repository};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    async fn setup() -> (Arc<MemoryStore>, Dispatcher) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(
                "site_content",
                row(json!({"section": "hero", "content": {"heading": "Old", "subheading": "Keep"}})),
            )
            .await
            .unwrap();
        let dispatcher = Dispatcher::new(store.clone(), 50);
        (store, dispatcher)
    }

    fn field_update(value: &str) -> Action {
        Action::UpdateSectionField {
            section: "hero".into(),
            field: "heading".into(),
            value: json!(value),
        }
    }

    #[tokio::test]
    async fn sort_order_starts_at_one_and_follows_max() {
        let (store, d) = setup().await;
        assert_eq!(d.next_sort_order(Collection::Programs).await.unwrap(), 1);

        for n in [3, 7, 5] {
            store
                .insert("programs", row(json!({"title": format!("p{n}"), "sort_order": n})))
                .await
                .unwrap();
        }
        let res = d
            .execute(&Action::AddProgram {
                title: "Tutoring".into(),
                description: None,
                tags: Some(vec!["kids".into()]),
                image_url: None,
                image_alt: None,
            })
            .await;
        assert!(res.success, "{res:?}");
        let added = store
            .rows("programs")
            .into_iter()
            .find(|r| r["title"] == "Tutoring")
            .unwrap();
        assert_eq!(added["sort_order"], json!(8));
        assert_eq!(added["tags"], json!(["kids"]));
    }

    #[tokio::test]
    async fn field_update_then_undo_restores_heading() {
        let (store, d) = setup().await;
        let res = d.execute(&field_update("X")).await;
        assert!(res.success, "{res:?}");
        let hero = &store.rows("site_content")[0];
        assert_eq!(hero["content"]["heading"], "X");
        assert_eq!(hero["content"]["subheading"], "Keep");
        assert_eq!(d.history().len().await.unwrap(), 1);

        let res = d.execute(&Action::Undo).await;
        assert!(res.success);
        assert!(res.message().unwrap().contains("hero"));
        assert_eq!(store.rows("site_content")[0]["content"]["heading"], "Old");
        assert_eq!(d.history().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn undo_on_empty_history_succeeds_without_writes() {
        let (store, d) = setup().await;
        let before = store.mutation_count();
        let res = d.execute(&Action::Undo).await;
        assert!(res.success);
        assert_eq!(res.message(), Some("Nothing to undo."));
        assert_eq!(store.mutation_count(), before);
    }

    #[tokio::test]
    async fn sixty_edits_leave_fifty_history_entries() {
        let (_store, d) = setup().await;
        for n in 0..60 {
            let res = d.execute(&field_update(&format!("v{n}"))).await;
            assert!(res.success);
        }
        assert_eq!(d.history().len().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn unknown_tag_is_a_reported_failure() {
        let (_store, d) = setup().await;
        let res = d
            .execute_value(json!({"action": "launch_rocket"}))
            .await;
        assert!(!res.success);
        assert!(res.error.unwrap().contains("launch_rocket"));
    }

    #[tokio::test]
    async fn whole_section_replace_records_history_and_creates_new_sections() {
        let (store, d) = setup().await;
        d.execute(&Action::UpdateSection {
            section: "hero".into(),
            content: json!({"heading": "Fresh"}),
        })
        .await;
        assert_eq!(store.rows("site_content")[0]["content"], json!({"heading": "Fresh"}));
        assert_eq!(d.history().len().await.unwrap(), 1);

        let res = d
            .execute(&Action::UpdateSection {
                section: "footer".into(),
                content: json!({"note": "hi"}),
            })
            .await;
        assert!(res.success);
        assert_eq!(store.rows("site_content").len(), 2);
        // Nothing existed before, so nothing to undo for the new section.
        assert_eq!(d.history().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn member_edits_never_touch_history() {
        let (_store, d) = setup().await;
        d.execute(&Action::AddTeamMember {
            name: "Ana Ruiz".into(),
            role: "Director".into(),
            image_url: None,
        })
        .await;
        let res = d
            .execute(&Action::UpdateTeamMember {
                name: "ana ruiz".into(),
                updates: row(json!({"role": "Chair"})),
            })
            .await;
        assert!(res.success, "{res:?}");
        assert_eq!(d.history().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ambiguous_name_fails_without_mutating() {
        let (store, d) = setup().await;
        for name in ["Sam", "sam"] {
            store
                .insert("team_members", row(json!({"name": name, "sort_order": 1})))
                .await
                .unwrap();
        }
        let before = store.mutation_count();
        let res = d
            .execute(&Action::RemoveTeamMember { name: "SAM".into() })
            .await;
        assert!(!res.success);
        assert!(res.error.unwrap().contains("matched 2"));
        assert_eq!(store.mutation_count(), before);

        let res = d
            .execute(&Action::RemoveProgram {
                title: "Nope".into(),
            })
            .await;
        assert!(res.error.unwrap().contains("matched 0"));
    }

    #[tokio::test]
    async fn update_stat_only_sets_present_affixes() {
        let (store, d) = setup().await;
        store
            .insert(
                "stats",
                row(json!({"label": "Volunteers", "value": 10, "suffix": "+"})),
            )
            .await
            .unwrap();
        let res = d
            .execute(&Action::UpdateStat {
                label: "volunteers".into(),
                value: json!(120),
                suffix: None,
                prefix: Some("~".into()),
            })
            .await;
        assert!(res.success, "{res:?}");
        let stat = &store.rows("stats")[0];
        assert_eq!(stat["value"], json!(120));
        assert_eq!(stat["suffix"], "+");
        assert_eq!(stat["prefix"], "~");
    }

    #[tokio::test]
    async fn add_event_derives_slug() {
        let (store, d) = setup().await;
        let res = d
            .execute(&Action::AddEvent {
                event: row(json!({"title": "Spring Gala!!", "date": "2026-04-01"})),
            })
            .await;
        assert!(res.success);
        let event = &store.rows("events")[0];
        assert_eq!(event["slug"], "spring-gala");
        assert_eq!(event["sort_order"], json!(1));

        let res = d
            .execute(&Action::UpdateEvent {
                slug: "spring-gala".into(),
                updates: row(json!({"location": "Town Hall"})),
            })
            .await;
        assert!(res.success);
        assert_eq!(store.rows("events")[0]["location"], "Town Hall");
    }

    #[tokio::test]
    async fn status_counts_each_collection() {
        let (_store, d) = setup().await;
        let res = d.execute(&Action::GetStatus).await;
        let counts = &res.result.unwrap()["counts"];
        assert_eq!(counts["site_content"], json!(1));
        assert_eq!(counts["events"], json!(0));
        assert_eq!(counts.as_object().unwrap().len(), Collection::STATUS.len());
    }

    #[tokio::test]
    async fn successful_mutation_is_mirrored() {
        let (store, d) = setup().await;
        let repo = Arc::new(MemoryRepository::new());
        let mirror = Arc::new(SnapshotMirror::new(store.clone(), repo.clone()));
        let (outbox, worker) = spawn_outbox(mirror, 0);
        let d = d.with_outbox(outbox);

        d.execute(&Action::AddInitiative {
            title: "Food Drive".into(),
            detail: None,
        })
        .await;
        // Failed actions queue nothing.
        d.execute(&Action::RemoveInitiative {
            title: "Missing".into(),
        })
        .await;
        drop(d);

        assert_eq!(
            worker.finish().await,
            MirrorReport {
                committed: 1,
                failed: 0
            }
        );
        let body = repo.head_file("content/initiatives.json").unwrap();
        assert!(String::from_utf8(body).unwrap().contains("Food Drive"));
        let commits = repo.list_commits(None, 1).await.unwrap();
        assert_eq!(commits[0].message, "sitebot: add_initiative Food Drive");
    }

    #[tokio::test]
    async fn mirror_failure_does_not_fail_dispatch() {
        let (store, d) = setup().await;
        let repo = Arc::new(MemoryRepository::new());
        repo.fail_writes_after(0);
        let mirror = Arc::new(SnapshotMirror::new(store.clone(), repo.clone()));
        let (outbox, worker) = spawn_outbox(mirror, 1);
        let d = d.with_outbox(outbox);

        let res = d.execute(&field_update("Y")).await;
        assert!(res.success);
        assert_eq!(store.rows("site_content")[0]["content"]["heading"], "Y");
        drop(d);
        assert_eq!(worker.finish().await.failed, 1);
    }

    struct RecordingRevalidator(mpsc::UnboundedSender<Vec<String>>);

    #[async_trait]
    impl Revalidator for RecordingRevalidator {
        async fn revalidate(&self, paths: &[&str]) -> Result<()> {
            let _ = self.0.send(paths.iter().map(|p| p.to_string()).collect());
            Ok(())
        }
        async fn trigger_deploy(&self) -> Result<bool> {
            Ok(false)
        }
        fn deploys(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn mutation_signals_revalidation_but_status_does_not() {
        let (_store, d) = setup().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let d = d.with_revalidator(Arc::new(RecordingRevalidator(tx)));

        d.execute(&Action::GetStatus).await;
        d.execute(&field_update("Z")).await;

        let paths = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paths, vec!["/".to_string(), "/events".to_string()]);
        assert!(rx.try_recv().is_err());
    }
}
