//! Per-user annotation session: the navigation state machine wired to a
//! [`RecordStore`].
//!
//! Every operation reloads the store and recomputes the user's visible list
//! before acting, so concurrent claims by other annotators are picked up
//! immediately. The session itself only remembers where the user is (the
//! current record id and index) and whether a move is waiting on an
//! unsaved-changes decision.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::assets::AssetResolver;
use crate::claim::{ensure_claimed, ClaimResult};
use crate::dirty;
use crate::error::CoreError;
use crate::navigation::{
    progress_label, resolve_position, target_index, BoundaryPolicy, ConfirmChoice, Direction,
    NavState, PendingMove,
};
use crate::record::{compute_score, AnnotationRecord, EditedValues, RecordSet, UpsertRequest};
use crate::schema::FieldSchema;
use crate::store::{RecordStore, StoreError};
use crate::types::{RecordId, UserId};
use crate::visibility::{visible_ids, VisibilitySummary};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Shared collaborators of every session.
#[derive(Clone)]
pub struct SessionContext {
    pub store: Arc<dyn RecordStore>,
    pub schema: Arc<FieldSchema>,
    pub assets: Arc<dyn AssetResolver>,
    pub boundary: BoundaryPolicy,
}

// ---------------------------------------------------------------------------
// RecordView
// ---------------------------------------------------------------------------

/// What the UI renders after any session operation.
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub state: NavState,
    /// `None` when nothing is visible to the user.
    pub id: Option<RecordId>,
    pub index: usize,
    pub total: usize,
    pub progress: String,
    pub annotated: bool,
    pub record: Option<AnnotationRecord>,
    /// Field key to display text, for every schema field.
    pub display: BTreeMap<String, String>,
    /// Error checkbox per flaggable field.
    pub flags: BTreeMap<String, bool>,
    pub asset_path: Option<String>,
    pub summary: VisibilitySummary,
    /// Fields the user changed, when a move awaits confirmation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
}

/// Build the form values the UI shows for `record`.
pub fn display_values(schema: &FieldSchema, record: &AnnotationRecord) -> EditedValues {
    EditedValues {
        fields: schema
            .fields
            .iter()
            .map(|spec| (spec.key.clone(), spec.load(&record.fields).display()))
            .collect(),
        flags: schema
            .flaggable()
            .map(|spec| {
                let flagged = record.field_flags.get(&spec.key).copied().unwrap_or(false);
                (spec.key.clone(), flagged)
            })
            .collect(),
    }
}

/// Turn the form values into a store write: only interactive fields are
/// written, flags only for flaggable fields, and the score is recomputed.
pub fn build_upsert(schema: &FieldSchema, id: &str, edits: &EditedValues, user: &str) -> UpsertRequest {
    let fields = schema
        .interactive()
        .map(|spec| {
            let text = edits.fields.get(&spec.key).map(String::as_str).unwrap_or("");
            (spec.key.clone(), spec.parse_display(text).to_json())
        })
        .collect();
    let field_flags: BTreeMap<String, bool> = schema
        .flaggable()
        .map(|spec| (spec.key.clone(), edits.flags.get(&spec.key).copied().unwrap_or(false)))
        .collect();
    let score = compute_score(&field_flags);
    UpsertRequest {
        id: id.to_string(),
        fields,
        field_flags,
        score,
        owner: user.to_string(),
    }
}

// ---------------------------------------------------------------------------
// AnnotationSession
// ---------------------------------------------------------------------------

/// How often opening a record reloads after losing its claim to another
/// user before giving up with a conflict.
const CLAIM_ATTEMPTS: usize = 3;

pub struct AnnotationSession {
    ctx: SessionContext,
    user: UserId,
    state: NavState,
    /// The record last shown to the user.
    current_id: Option<RecordId>,
}

/// A fresh snapshot plus the user's visible ids in it.
struct Snapshot {
    records: RecordSet,
    visible: Vec<RecordId>,
}

impl AnnotationSession {
    pub fn new(ctx: SessionContext, user: impl Into<UserId>) -> Self {
        Self {
            ctx,
            user: user.into(),
            state: NavState::default(),
            current_id: None,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn state(&self) -> &NavState {
        &self.state
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    /// Show the current record, claiming it if unowned.
    ///
    /// Allowed in both states; a pending confirmation is kept.
    pub async fn view(&mut self) -> Result<RecordView, CoreError> {
        let snap = self.snapshot().await?;
        let position = self.position(&snap.visible);
        let pending = match &self.state {
            NavState::ConfirmingDiscard { pending, .. } => Some(pending.clone()),
            NavState::Viewing { .. } => None,
        };
        let mut view = self.open(snap, position).await?;
        if let (Some(pending), true) = (pending, view.id.is_some()) {
            self.state = NavState::ConfirmingDiscard {
                index: view.index,
                pending,
            };
            view.state = self.state.clone();
        }
        Ok(view)
    }

    /// Persist the form values for the current record and stay on it.
    pub async fn save(&mut self, edits: &EditedValues) -> Result<RecordView, CoreError> {
        self.state.require_viewing("save")?;
        let snap = self.snapshot().await?;
        let id = self
            .open_record_id(&snap)
            .ok_or_else(|| CoreError::Conflict("No record is available to save".into()))?;

        self.persist(&id, edits).await?;

        let snap = self.snapshot().await?;
        let position = resolve_position(&snap.visible, Some(&id), self.state.index());
        self.open(snap, position).await
    }

    /// Step to the next or previous visible record. Unsaved edits put the
    /// session into the confirmation state instead of moving.
    pub async fn navigate(
        &mut self,
        direction: Direction,
        edits: &EditedValues,
    ) -> Result<RecordView, CoreError> {
        self.state.require_viewing("navigate")?;
        self.request_move(PendingMove::Step { direction }, edits).await
    }

    /// Jump to a visible record by id, with the same unsaved-changes check as
    /// [`Self::navigate`].
    pub async fn goto(&mut self, id: &str, edits: &EditedValues) -> Result<RecordView, CoreError> {
        self.state.require_viewing("jump")?;
        self.request_move(PendingMove::Goto { id: id.to_string() }, edits)
            .await
    }

    /// Resolve a pending move.
    pub async fn confirm(
        &mut self,
        choice: ConfirmChoice,
        edits: &EditedValues,
    ) -> Result<RecordView, CoreError> {
        let (index, pending) = self.state.require_confirming()?;

        if choice == ConfirmChoice::Cancel {
            tracing::debug!(user = %self.user, "Navigation cancelled, edits kept");
            self.state = NavState::Viewing { index };
            return self.view().await;
        }

        let snap = self.snapshot().await?;

        if choice == ConfirmChoice::SaveAndContinue {
            if let Some(id) = self.open_record_id(&snap) {
                self.persist(&id, edits).await?;
            }
        } else {
            tracing::info!(
                user = %self.user,
                record_id = ?self.current_id,
                "Unsaved changes discarded"
            );
        }

        self.state = NavState::Viewing { index };
        let snap = if choice == ConfirmChoice::SaveAndContinue {
            self.snapshot().await?
        } else {
            snap
        };
        let position = self.position(&snap.visible);
        let target = match position {
            Some(pos) => Some(target_index(&snap.visible, pos, &pending, self.ctx.boundary)?),
            None => None,
        };
        self.open(snap, target).await
    }

    // -- internals --------------------------------------------------------

    async fn snapshot(&self) -> Result<Snapshot, CoreError> {
        let report = self.ctx.store.load_all().await?;
        let visible = visible_ids(&report.records, Some(&self.user));
        Ok(Snapshot {
            records: report.records,
            visible,
        })
    }

    fn position(&self, visible: &[RecordId]) -> Option<usize> {
        resolve_position(visible, self.current_id.as_deref(), self.state.index())
    }

    /// The record the user has open: the last one shown, or the one at the
    /// remembered index when nothing was shown yet.
    fn open_record_id(&self, snap: &Snapshot) -> Option<RecordId> {
        self.current_id
            .clone()
            .or_else(|| self.position(&snap.visible).map(|pos| snap.visible[pos].clone()))
    }

    async fn request_move(
        &mut self,
        pending: PendingMove,
        edits: &EditedValues,
    ) -> Result<RecordView, CoreError> {
        let snap = self.snapshot().await?;
        let Some(position) = self.position(&snap.visible) else {
            return self.open(snap, None).await;
        };
        let target = target_index(&snap.visible, position, &pending, self.ctx.boundary)?;

        // Nothing was shown yet, so there is nothing to lose.
        if self.current_id.is_some() {
            let current = self.record_at(&snap, position)?;
            if dirty::is_modified(&self.ctx.schema, current, edits) {
                let changed: Vec<String> = dirty::changed_fields(&self.ctx.schema, current, edits)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                tracing::info!(
                    user = %self.user,
                    record_id = %current.id,
                    changed = ?changed,
                    "Unsaved changes, awaiting confirmation"
                );
                self.state = NavState::ConfirmingDiscard {
                    index: position,
                    pending,
                };
                let mut view = self.render(current.clone(), position, &snap);
                view.changed_fields = changed;
                return Ok(view);
            }
        }

        tracing::debug!(user = %self.user, from = position, to = target, "Navigating");
        self.open(snap, Some(target)).await
    }

    fn record_at<'s>(&self, snap: &'s Snapshot, position: usize) -> Result<&'s AnnotationRecord, CoreError> {
        let id = &snap.visible[position];
        snap.records
            .get(id)
            .ok_or_else(|| CoreError::Internal(format!("visible record '{id}' missing from snapshot")))
    }

    /// Move to `position`, claim the record there and render it. `None`
    /// renders the empty view.
    ///
    /// When another user claims the record first, the visible list is
    /// reloaded and the record that now sits at `position` is opened instead.
    async fn open(&mut self, mut snap: Snapshot, mut position: Option<usize>) -> Result<RecordView, CoreError> {
        for _ in 0..CLAIM_ATTEMPTS {
            let Some(pos) = position else {
                self.state = NavState::Viewing { index: 0 };
                self.current_id = None;
                return Ok(self.empty_view(&snap));
            };

            let record = self.record_at(&snap, pos)?.clone();
            match ensure_claimed(self.ctx.store.as_ref(), record, &self.user).await? {
                ClaimResult::Owned(record) => {
                    self.current_id = Some(record.id.clone());
                    self.state = NavState::Viewing { index: pos };
                    return Ok(self.render(record, pos, &snap));
                }
                ClaimResult::Lost { .. } => {
                    snap = self.snapshot().await?;
                    position = match snap.visible.len() {
                        0 => None,
                        len => Some(pos.min(len - 1)),
                    };
                }
            }
        }

        tracing::warn!(user = %self.user, attempts = CLAIM_ATTEMPTS, "Gave up opening a record under concurrent claims");
        Err(CoreError::Conflict(
            "Records are being claimed by other annotators, please retry".into(),
        ))
    }

    async fn persist(&self, id: &str, edits: &EditedValues) -> Result<AnnotationRecord, CoreError> {
        let request = build_upsert(&self.ctx.schema, id, edits, &self.user);
        match self.ctx.store.upsert(request).await {
            Ok(saved) => {
                tracing::info!(
                    user = %self.user,
                    record_id = %saved.id,
                    score = saved.score,
                    "Annotation saved"
                );
                Ok(saved)
            }
            Err(StoreError::OwnershipConflict { id, owner }) => {
                tracing::error!(user = %self.user, record_id = %id, owner = %owner, "Save attempted on a record owned by another user");
                Err(CoreError::InvariantViolation(format!(
                    "record '{id}' is owned by '{owner}' and cannot be saved by '{}'",
                    self.user
                )))
            }
            Err(StoreError::NotFound(id)) => Err(CoreError::record_not_found(&id)),
            Err(e) => {
                tracing::error!(user = %self.user, record_id = %id, reason = e.reason(), error = %e, "Failed to save annotation");
                Err(e.into())
            }
        }
    }

    fn render(&self, record: AnnotationRecord, position: usize, snap: &Snapshot) -> RecordView {
        let values = display_values(&self.ctx.schema, &record);
        let asset_path = self
            .ctx
            .assets
            .resolve(&record)
            .map(|p| p.to_string_lossy().into_owned());
        RecordView {
            state: self.state.clone(),
            id: Some(record.id.clone()),
            index: position,
            total: snap.visible.len(),
            progress: progress_label(position, snap.visible.len()),
            annotated: record.annotated,
            display: values.fields,
            flags: values.flags,
            asset_path,
            summary: VisibilitySummary::compute(&snap.records, Some(&self.user)),
            changed_fields: Vec::new(),
            record: Some(record),
        }
    }

    fn empty_view(&self, snap: &Snapshot) -> RecordView {
        RecordView {
            state: self.state.clone(),
            id: None,
            index: 0,
            total: 0,
            progress: progress_label(0, 0),
            annotated: false,
            record: None,
            display: BTreeMap::new(),
            flags: BTreeMap::new(),
            asset_path: None,
            summary: VisibilitySummary::compute(&snap.records, Some(&self.user)),
            changed_fields: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// One session per user. Requests from the same user are serialized on the
/// session's mutex; different users only contend inside the store.
pub struct SessionRegistry {
    ctx: SessionContext,
    sessions: Mutex<HashMap<UserId, Arc<Mutex<AnnotationSession>>>>,
}

impl SessionRegistry {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// The user's session, created on first use.
    pub async fn session(&self, user: &str) -> Arc<Mutex<AnnotationSession>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(user.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(AnnotationSession::new(self.ctx.clone(), user))))
            .clone()
    }

    pub async fn active_users(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::NoAssets;
    use crate::record::{SCORE_CLEAN, SCORE_FLAGGED};
    use crate::store::memory::MemoryStore;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn ctx(store: Arc<MemoryStore>, boundary: BoundaryPolicy) -> SessionContext {
        SessionContext {
            store,
            schema: Arc::new(FieldSchema::object_attributes()),
            assets: Arc::new(NoAssets),
            boundary,
        }
    }

    fn three_records() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_records([
            AnnotationRecord::new("x").with_field("category", json!("")),
            AnnotationRecord::new("y").with_field("category", json!("lamp")),
            AnnotationRecord::new("z"),
        ]))
    }

    fn edited(view: &RecordView) -> EditedValues {
        EditedValues {
            fields: view.display.clone(),
            flags: view.flags.clone(),
        }
    }

    #[tokio::test]
    async fn viewing_claims_and_hides_from_others() {
        let store = three_records();
        let mut alice = AnnotationSession::new(ctx(store.clone(), BoundaryPolicy::Clamp), "alice");

        let view = alice.view().await.unwrap();
        assert_eq!(view.id.as_deref(), Some("x"));
        assert_eq!(store.get("x").await.owner, "alice");

        let snapshot = store.load_all().await.unwrap();
        assert!(!visible_ids(&snapshot.records, Some("bob")).contains(&"x".to_string()));
    }

    #[tokio::test]
    async fn repeated_view_is_idempotent() {
        let store = three_records();
        let mut alice = AnnotationSession::new(ctx(store.clone(), BoundaryPolicy::Clamp), "alice");
        let first = alice.view().await.unwrap();
        let second = alice.view().await.unwrap();
        assert_eq!(first.record, second.record);
    }

    #[tokio::test]
    async fn dirty_navigation_waits_and_discard_keeps_store() {
        let store = three_records();
        let mut alice = AnnotationSession::new(ctx(store.clone(), BoundaryPolicy::Clamp), "alice");
        let view = alice.view().await.unwrap();

        let mut edits = edited(&view);
        edits.fields.insert("category".into(), "chair".into());

        let pending = alice.navigate(Direction::Next, &edits).await.unwrap();
        assert!(pending.state.is_confirming());
        assert_eq!(pending.id.as_deref(), Some("x"));
        assert_eq!(pending.changed_fields, vec!["category"]);

        let moved = alice.confirm(ConfirmChoice::Discard, &edits).await.unwrap();
        assert_eq!(moved.id.as_deref(), Some("y"));
        assert_eq!(store.get("x").await.fields["category"], json!(""));
        assert!(!store.get("x").await.annotated);
    }

    #[tokio::test]
    async fn save_and_continue_persists_then_advances() {
        let store = three_records();
        let mut alice = AnnotationSession::new(ctx(store.clone(), BoundaryPolicy::Clamp), "alice");
        let view = alice.view().await.unwrap();

        let mut edits = edited(&view);
        edits.fields.insert("category".into(), "chair".into());
        alice.navigate(Direction::Next, &edits).await.unwrap();

        let moved = alice.confirm(ConfirmChoice::SaveAndContinue, &edits).await.unwrap();
        assert_eq!(moved.id.as_deref(), Some("y"));
        assert_eq!(moved.state, NavState::Viewing { index: 1 });

        let saved = store.get("x").await;
        assert_eq!(saved.fields["category"], json!("chair"));
        assert!(saved.annotated);
        assert_eq!(saved.owner, "alice");
    }

    #[tokio::test]
    async fn cancel_stays_on_the_record() {
        let store = three_records();
        let mut alice = AnnotationSession::new(ctx(store.clone(), BoundaryPolicy::Clamp), "alice");
        let view = alice.view().await.unwrap();
        let mut edits = edited(&view);
        edits.fields.insert("category".into(), "chair".into());
        alice.navigate(Direction::Next, &edits).await.unwrap();

        let back = alice.confirm(ConfirmChoice::Cancel, &edits).await.unwrap();
        assert_eq!(back.id.as_deref(), Some("x"));
        assert_eq!(back.state, NavState::Viewing { index: 0 });
        assert_eq!(store.get("x").await.fields["category"], json!(""));
    }

    #[tokio::test]
    async fn actions_are_refused_while_confirming() {
        let store = three_records();
        let mut alice = AnnotationSession::new(ctx(store.clone(), BoundaryPolicy::Clamp), "alice");
        let view = alice.view().await.unwrap();
        let mut edits = edited(&view);
        edits.fields.insert("category".into(), "chair".into());
        alice.navigate(Direction::Next, &edits).await.unwrap();

        assert_matches!(alice.save(&edits).await, Err(CoreError::Conflict(_)));
        assert_matches!(alice.navigate(Direction::Prev, &edits).await, Err(CoreError::Conflict(_)));
        assert_matches!(alice.goto("z", &edits).await, Err(CoreError::Conflict(_)));

        let still = alice.view().await.unwrap();
        assert!(still.state.is_confirming());
    }

    #[tokio::test]
    async fn confirm_without_pending_move_is_a_conflict() {
        let store = three_records();
        let mut alice = AnnotationSession::new(ctx(store, BoundaryPolicy::Clamp), "alice");
        assert_matches!(
            alice.confirm(ConfirmChoice::Discard, &EditedValues::default()).await,
            Err(CoreError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn flags_drive_the_score_on_every_save() {
        let store = three_records();
        let mut alice = AnnotationSession::new(ctx(store.clone(), BoundaryPolicy::Clamp), "alice");
        let view = alice.view().await.unwrap();

        let mut edits = edited(&view);
        edits.flags.insert("category".into(), true);
        edits.flags.insert("material".into(), true);
        let saved = alice.save(&edits).await.unwrap();
        assert_eq!(saved.record.as_ref().unwrap().score, SCORE_FLAGGED);
        assert_eq!(saved.id.as_deref(), Some("x"));

        edits.flags.insert("category".into(), false);
        edits.flags.insert("material".into(), false);
        let saved = alice.save(&edits).await.unwrap();
        assert_eq!(saved.record.as_ref().unwrap().score, SCORE_CLEAN);
        assert!(saved.annotated);
    }

    #[tokio::test]
    async fn clean_navigation_moves_immediately() {
        let store = three_records();
        let mut alice = AnnotationSession::new(ctx(store.clone(), BoundaryPolicy::Clamp), "alice");
        let view = alice.view().await.unwrap();
        let next = alice.navigate(Direction::Next, &edited(&view)).await.unwrap();
        assert_eq!(next.id.as_deref(), Some("y"));
        assert_eq!(next.progress, "2 / 3");
        assert_eq!(store.get("y").await.owner, "alice");
    }

    #[tokio::test]
    async fn clamp_and_wrap_at_the_last_record() {
        for (policy, expected) in [(BoundaryPolicy::Clamp, "z"), (BoundaryPolicy::Wrap, "x")] {
            let store = three_records();
            let mut alice = AnnotationSession::new(ctx(store, policy), "alice");
            let view = alice.view().await.unwrap();
            let view = alice.goto("z", &edited(&view)).await.unwrap();
            let view = alice.navigate(Direction::Next, &edited(&view)).await.unwrap();
            assert_eq!(view.id.as_deref(), Some(expected), "{policy:?}");
        }
    }

    #[tokio::test]
    async fn goto_checks_for_unsaved_edits() {
        let store = three_records();
        let mut alice = AnnotationSession::new(ctx(store.clone(), BoundaryPolicy::Clamp), "alice");
        let view = alice.view().await.unwrap();
        let mut edits = edited(&view);
        edits.fields.insert("material".into(), "oak".into());

        let pending = alice.goto("z", &edits).await.unwrap();
        assert_eq!(
            pending.state,
            NavState::ConfirmingDiscard {
                index: 0,
                pending: PendingMove::Goto { id: "z".into() }
            }
        );
        let moved = alice.confirm(ConfirmChoice::Discard, &edits).await.unwrap();
        assert_eq!(moved.id.as_deref(), Some("z"));
    }

    #[tokio::test]
    async fn goto_unknown_or_foreign_record_is_not_found() {
        let store = three_records();
        store.set_owner("z", "bob").await;
        let mut alice = AnnotationSession::new(ctx(store, BoundaryPolicy::Clamp), "alice");
        let view = alice.view().await.unwrap();
        assert_matches!(alice.goto("z", &edited(&view)).await, Err(CoreError::NotFound { .. }));
        assert_matches!(alice.goto("nope", &edited(&view)).await, Err(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn two_users_never_share_a_record() {
        let store = three_records();
        let mut alice = AnnotationSession::new(ctx(store.clone(), BoundaryPolicy::Clamp), "alice");
        let mut bob = AnnotationSession::new(ctx(store.clone(), BoundaryPolicy::Clamp), "bob");

        let a = alice.view().await.unwrap();
        let b = bob.view().await.unwrap();
        assert_eq!(a.id.as_deref(), Some("x"));
        assert_eq!(b.id.as_deref(), Some("y"));
        assert_eq!(b.summary, VisibilitySummary { visible: 2, others: 1 });

        let b = bob.navigate(Direction::Next, &edited(&b)).await.unwrap();
        assert_eq!(b.id.as_deref(), Some("z"));
        let a = alice.navigate(Direction::Next, &edited(&a)).await.unwrap();
        assert_eq!(a.id.as_deref(), Some("x"), "alice has nothing else left");
    }

    #[tokio::test]
    async fn empty_visible_list_renders_nothing() {
        let store = Arc::new(MemoryStore::with_records([AnnotationRecord::new("x")]));
        store.set_owner("x", "bob").await;
        let mut alice = AnnotationSession::new(ctx(store, BoundaryPolicy::Clamp), "alice");

        let view = alice.view().await.unwrap();
        assert!(view.id.is_none());
        assert_eq!(view.progress, "0 / 0");
        let view = alice.navigate(Direction::Next, &EditedValues::default()).await.unwrap();
        assert!(view.record.is_none());
        assert_matches!(alice.save(&EditedValues::default()).await, Err(CoreError::Conflict(_)));
    }

    /// Lets `rival` claim a record right before anyone else's claim lands.
    struct RacingStore {
        inner: MemoryStore,
        rival: &'static str,
        contested: Vec<&'static str>,
    }

    #[async_trait::async_trait]
    impl RecordStore for RacingStore {
        async fn load_all(&self) -> Result<crate::store::LoadReport, StoreError> {
            self.inner.load_all().await
        }
        async fn get_by_id(&self, id: &str) -> Result<Option<AnnotationRecord>, StoreError> {
            self.inner.get_by_id(id).await
        }
        async fn upsert(&self, save: UpsertRequest) -> Result<AnnotationRecord, StoreError> {
            self.inner.upsert(save).await
        }
        async fn claim(&self, id: &str, user: &str) -> Result<crate::store::ClaimOutcome, StoreError> {
            if user != self.rival && self.contested.contains(&id) {
                self.inner.claim(id, self.rival).await?;
            }
            self.inner.claim(id, user).await
        }
        async fn assign(&self, assignments: &[crate::store::Assignment]) -> Result<usize, StoreError> {
            self.inner.assign(assignments).await
        }
        async fn import(
            &self,
            records: Vec<AnnotationRecord>,
            mode: crate::store::ImportMode,
        ) -> Result<crate::store::ImportStats, StoreError> {
            self.inner.import(records, mode).await
        }
    }

    fn racing_ctx(contested: Vec<&'static str>) -> (Arc<RacingStore>, SessionContext) {
        let store = Arc::new(RacingStore {
            inner: MemoryStore::with_records([AnnotationRecord::new("x"), AnnotationRecord::new("y")]),
            rival: "alice",
            contested,
        });
        let ctx = SessionContext {
            store: store.clone(),
            schema: Arc::new(FieldSchema::object_attributes()),
            assets: Arc::new(NoAssets),
            boundary: BoundaryPolicy::Clamp,
        };
        (store, ctx)
    }

    #[tokio::test]
    async fn losing_a_claim_race_opens_the_next_free_record() {
        let (store, ctx) = racing_ctx(vec!["x"]);
        let mut bob = AnnotationSession::new(ctx, "bob");

        let view = bob.view().await.unwrap();
        assert_eq!(view.id.as_deref(), Some("y"));
        assert_eq!(view.index, 0);
        assert_eq!(view.total, 1);
        assert_eq!(bob.current_id(), Some("y"));
        assert_eq!(store.inner.get("x").await.owner, "alice");
        assert_eq!(store.inner.get("y").await.owner, "bob");
    }

    #[tokio::test]
    async fn losing_every_claim_race_leaves_an_empty_view() {
        let (store, ctx) = racing_ctx(vec!["x", "y"]);
        let mut bob = AnnotationSession::new(ctx, "bob");

        let view = bob.view().await.unwrap();
        assert!(view.id.is_none());
        assert_eq!(view.summary.others, 2);
        assert_eq!(store.inner.get("y").await.owner, "alice");
    }

    #[tokio::test]
    async fn save_after_foreign_takeover_is_an_invariant_violation() {
        let store = three_records();
        let mut alice = AnnotationSession::new(ctx(store.clone(), BoundaryPolicy::Clamp), "alice");
        let view = alice.view().await.unwrap();
        store.set_owner("x", "bob").await;
        assert_matches!(
            alice.save(&edited(&view)).await,
            Err(CoreError::InvariantViolation(_))
        );
        assert_eq!(store.get("x").await.owner, "bob");
        assert!(!store.get("x").await.annotated);
    }

    #[test]
    fn upsert_writes_only_interactive_fields_and_flaggable_flags() {
        let schema = FieldSchema::new(vec![
            crate::schema::FieldSpec::new("category", "Category", crate::schema::FieldKind::Text),
            crate::schema::FieldSpec::new("placement", "Placement", crate::schema::FieldKind::List),
            crate::schema::FieldSpec::new("status", "Status", crate::schema::FieldKind::Text).computed(),
        ])
        .unwrap();
        let mut edits = EditedValues::default();
        edits.fields.insert("category".into(), " chair ".into());
        edits.fields.insert("placement".into(), "floor, wall".into());
        edits.fields.insert("status".into(), "done".into());
        edits.flags.insert("status".into(), true);

        let req = build_upsert(&schema, "x", &edits, "alice");
        assert_eq!(req.fields.len(), 2);
        assert_eq!(req.fields["placement"], json!(["floor", "wall"]));
        assert!(!req.field_flags.contains_key("status"));
        assert_eq!(req.score, SCORE_CLEAN);
    }

    #[tokio::test]
    async fn registry_hands_out_one_session_per_user() {
        let registry = SessionRegistry::new(ctx(three_records(), BoundaryPolicy::Clamp));
        let a1 = registry.session("alice").await;
        let a2 = registry.session("alice").await;
        let _b = registry.session("bob").await;
        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(registry.active_users().await, 2);
        assert_eq!(a1.lock().await.user(), "alice");
    }
}
