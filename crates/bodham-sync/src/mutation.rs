use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bodham_gateway::GatewayError;
use bodham_types::Identified;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::store::{CollectionStore, Position};

/// What a mutation does to its entity. At most one of each kind may be
/// outstanding per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Like,
    Comment,
    Update,
    Delete,
    Moderate,
    Respond,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Moderate => "moderation",
            Self::Respond => "response",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type InFlight = Arc<Mutex<HashSet<(String, MutationKind)>>>;

/// Holds an (id, kind) slot; released on drop, whichever way the mutation ends.
struct InFlightGuard {
    set: InFlight,
    key: (String, MutationKind),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

/// Runs its undo step on drop unless disarmed, so a mutation future that is
/// dropped mid-request leaves no optimistic residue.
struct Rollback<F: FnOnce()> {
    undo: Option<F>,
}

impl<F: FnOnce()> Rollback<F> {
    fn new(undo: F) -> Self {
        Self { undo: Some(undo) }
    }

    fn disarm(mut self) {
        self.undo = None;
    }
}

impl<F: FnOnce()> Drop for Rollback<F> {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            undo();
        }
    }
}

/// Applies user mutations to a store optimistically and reconciles them with
/// the server's answer.
///
/// Every mutation follows the same law: snapshot, apply locally, call the
/// server, then keep (or overwrite with server truth) on success and undo
/// on failure.
///
/// Undo only reverses the failed mutation's own effect, so a different kind
/// confirmed on the same entity meanwhile survives. If a refresh replaced
/// the list while the request was out, the refreshed contents are already
/// server truth and nothing is undone.
pub struct MutationController<T> {
    store: CollectionStore<T>,
    in_flight: InFlight,
}

impl<T> Clone for MutationController<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<T: Identified + Clone> MutationController<T> {
    pub fn new(store: CollectionStore<T>) -> Self {
        Self {
            store,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn store(&self) -> &CollectionStore<T> {
        &self.store
    }

    pub fn is_in_flight(&self, id: &str, kind: MutationKind) -> bool {
        self.in_flight.lock().contains(&(id.to_string(), kind))
    }

    fn acquire(&self, id: &str, kind: MutationKind) -> Result<InFlightGuard, SyncError> {
        let key = (id.to_string(), kind);
        if !self.in_flight.lock().insert(key.clone()) {
            debug!(id, %kind, "mutation rejected, already in flight");
            return Err(SyncError::MutationInFlight {
                id: id.to_string(),
                kind,
            });
        }
        Ok(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            key,
        })
    }

    /// Edit an entity in place, then confirm with the server. A returned
    /// entity replaces the local one; `None` keeps the optimistic value.
    ///
    /// `revert` undoes `edit` on failure. It receives the entity as it is
    /// then and its value from before the mutation.
    pub async fn apply<E, V, Fut>(
        &self,
        id: &str,
        kind: MutationKind,
        edit: E,
        revert: V,
        confirm: Fut,
    ) -> Result<T, SyncError>
    where
        E: FnOnce(&mut T),
        V: FnOnce(&mut T, &T),
        Fut: Future<Output = Result<Option<T>, GatewayError>>,
    {
        let (entity, _) = self
            .apply_with(id, kind, edit, revert, confirm, |current, server: &Option<T>| {
                if let Some(server) = server {
                    *current = server.clone();
                }
            })
            .await?;
        Ok(entity)
    }

    /// Like [`apply`](Self::apply), but the server answer is an arbitrary
    /// `R` that `settle` folds into the entity. The answer is handed back
    /// alongside the settled entity.
    pub async fn apply_with<E, V, Fut, R, S>(
        &self,
        id: &str,
        kind: MutationKind,
        edit: E,
        revert: V,
        confirm: Fut,
        settle: S,
    ) -> Result<(T, R), SyncError>
    where
        E: FnOnce(&mut T),
        V: FnOnce(&mut T, &T),
        Fut: Future<Output = Result<R, GatewayError>>,
        S: FnOnce(&mut T, &R),
    {
        let _guard = self.acquire(id, kind)?;

        let snapshot = self.store.snapshot(id);
        let Some(before) = snapshot.value().cloned() else {
            return Err(SyncError::UnknownEntity { id: id.to_string() });
        };
        let generation = snapshot.generation();

        let Some(mut optimistic) = self.store.update_by_id(id, edit) else {
            return Err(SyncError::UnknownEntity { id: id.to_string() });
        };
        let store = &self.store;
        let rollback = Rollback::new(move || {
            if store.generation() != generation {
                debug!(id, %kind, "list refreshed while in flight, nothing to undo");
                return;
            }
            store.update_by_id(id, |current| revert(current, &before));
        });
        debug!(id, %kind, "optimistic mutation applied");

        match confirm.await {
            Ok(answer) => {
                rollback.disarm();
                let mut settle = Some(settle);
                let updated = self.store.update_by_id(id, |current| {
                    if let Some(settle) = settle.take() {
                        settle(current, &answer);
                    }
                });
                let settled = match updated {
                    Some(settled) => settled,
                    None => {
                        // Dropped from the list by a refresh while in flight.
                        if let Some(settle) = settle.take() {
                            settle(&mut optimistic, &answer);
                        }
                        optimistic
                    }
                };
                debug!(id, %kind, "mutation confirmed");
                Ok((settled, answer))
            }
            Err(source) => {
                drop(rollback);
                warn!(id, %kind, "mutation failed, rolled back: {}", source);
                Err(SyncError::MutationFailed {
                    id: id.to_string(),
                    kind,
                    source,
                })
            }
        }
    }

    /// Remove an entity optimistically. On failure it reappears at its
    /// original position, unless a refresh has since replaced the list.
    pub async fn remove<Fut>(&self, id: &str, kind: MutationKind, confirm: Fut) -> Result<T, SyncError>
    where
        Fut: Future<Output = Result<(), GatewayError>>,
    {
        let _guard = self.acquire(id, kind)?;

        let snapshot = self.store.snapshot(id);
        let Some(removed) = snapshot.value().cloned() else {
            return Err(SyncError::UnknownEntity { id: id.to_string() });
        };
        self.store.remove_by_id(id);
        let store = &self.store;
        let rollback = Rollback::new(move || {
            if store.generation() != snapshot.generation() {
                debug!(id, %kind, "list refreshed while in flight, nothing to restore");
                return;
            }
            store.restore(snapshot);
        });
        debug!(id, %kind, "optimistic removal applied");

        match confirm.await {
            Ok(()) => {
                rollback.disarm();
                debug!(id, %kind, "removal confirmed");
                Ok(removed)
            }
            Err(source) => {
                drop(rollback);
                warn!(id, %kind, "removal failed, restored: {}", source);
                Err(SyncError::MutationFailed {
                    id: id.to_string(),
                    kind,
                    source,
                })
            }
        }
    }

    /// Server-first create. Nothing is shown until the server confirms; the
    /// confirmed entity is inserted at `position` only if `admit` accepts it.
    pub async fn insert_confirmed<Fut, A>(
        &self,
        confirm: Fut,
        position: Position,
        admit: A,
    ) -> Result<T, SyncError>
    where
        Fut: Future<Output = Result<T, GatewayError>>,
        A: FnOnce(&T) -> bool,
    {
        let created = confirm.await?;
        if admit(&created) {
            self.store.upsert_at(created.clone(), position);
            debug!(id = created.id(), "created entity admitted");
        } else {
            debug!(id = created.id(), "created entity not admitted to this collection");
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;
    use crate::testing::{Item, ids};

    fn controller(ids: &[&str]) -> MutationController<Item> {
        let store = CollectionStore::new();
        store.replace_all(ids.iter().map(|id| Item::new(id, id)));
        MutationController::new(store)
    }

    fn server_down() -> GatewayError {
        GatewayError::Status {
            status: 503,
            message: Some("unavailable".into()),
        }
    }

    fn like(item: &mut Item) {
        item.liked = !item.liked;
        item.likes = if item.liked {
            item.likes + 1
        } else {
            item.likes.saturating_sub(1)
        };
    }

    fn unlike(item: &mut Item, _before: &Item) {
        like(item);
    }

    fn restore_body(item: &mut Item, before: &Item) {
        item.body = before.body.clone();
    }

    async fn wait_in_flight(ctl: &MutationController<Item>, id: &str, kind: MutationKind) {
        while !ctl.is_in_flight(id, kind) {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_like_shows_immediately_and_reverts_on_failure() {
        let ctl = controller(&["p1"]);
        ctl.store().update_by_id("p1", |i| i.likes = 3);
        let before = ctl.store().items();

        let (tx, rx) = oneshot::channel::<Result<Option<Item>, GatewayError>>();
        let task = {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                ctl.apply("p1", MutationKind::Like, like, unlike, async move { rx.await.unwrap() })
                    .await
            })
        };

        tokio::task::yield_now().await;
        while !ctl.is_in_flight("p1", MutationKind::Like) {
            tokio::task::yield_now().await;
        }
        let shown = ctl.store().find_by_id("p1").unwrap();
        assert_eq!((shown.likes, shown.liked), (4, true));

        tx.send(Err(server_down())).unwrap();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, SyncError::MutationFailed { kind: MutationKind::Like, .. }));
        assert_eq!(ctl.store().items(), before);
        assert!(!ctl.is_in_flight("p1", MutationKind::Like));
    }

    #[tokio::test]
    async fn test_server_entity_wins_on_success() {
        let ctl = controller(&["a", "b"]);
        let mut server = Item::new("b", "server body");
        server.likes = 10;

        let settled = ctl
            .apply("b", MutationKind::Update, |i| i.body = "local".into(), restore_body, async {
                Ok(Some(server.clone()))
            })
            .await
            .unwrap();

        assert_eq!(settled, server);
        assert_eq!(ids(&ctl.store().items()), vec!["a", "b"]);
        assert_eq!(ctl.store().find_by_id("b").unwrap().body, "server body");
    }

    #[tokio::test]
    async fn test_apply_with_returns_answer() {
        let ctl = controller(&["p1"]);
        let (item, count) = ctl
            .apply_with(
                "p1",
                MutationKind::Like,
                like,
                unlike,
                async { Ok::<_, GatewayError>(7u32) },
                |item: &mut Item, count: &u32| item.likes = *count,
            )
            .await
            .unwrap();
        assert_eq!(count, 7);
        assert_eq!(item.likes, 7);
        assert!(item.liked);
    }

    #[tokio::test]
    async fn test_second_same_kind_mutation_is_rejected() {
        let ctl = controller(&["p1"]);
        let (tx, rx) = oneshot::channel::<Result<Option<Item>, GatewayError>>();
        let first = {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                ctl.apply("p1", MutationKind::Like, like, unlike, async move { rx.await.unwrap() })
                    .await
            })
        };
        while !ctl.is_in_flight("p1", MutationKind::Like) {
            tokio::task::yield_now().await;
        }
        let after_first = ctl.store().items();

        let err = ctl
            .apply("p1", MutationKind::Like, like, unlike, async { Ok(None) })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MutationInFlight { .. }));
        assert_eq!(ctl.store().items(), after_first);

        // A different kind on the same entity is independent.
        ctl.apply(
            "p1",
            MutationKind::Update,
            |i| i.body = "edited".into(),
            restore_body,
            async { Ok(None) },
        )
        .await
        .unwrap();

        tx.send(Ok(None)).unwrap();
        let liked = first.await.unwrap().unwrap();
        assert!(liked.liked);
        assert_eq!(liked.body, "edited");
    }

    #[tokio::test]
    async fn test_failed_like_keeps_update_confirmed_meanwhile() {
        let ctl = controller(&["p1"]);
        let (tx, rx) = oneshot::channel::<Result<Option<Item>, GatewayError>>();
        let pending_like = {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                ctl.apply("p1", MutationKind::Like, like, unlike, async move { rx.await.unwrap() })
                    .await
            })
        };
        wait_in_flight(&ctl, "p1", MutationKind::Like).await;

        ctl.apply(
            "p1",
            MutationKind::Update,
            |i| i.body = "edited".into(),
            restore_body,
            async { Ok(None) },
        )
        .await
        .unwrap();

        tx.send(Err(server_down())).unwrap();
        assert!(pending_like.await.unwrap().is_err());

        let item = ctl.store().find_by_id("p1").unwrap();
        assert_eq!(item.body, "edited");
        assert_eq!((item.likes, item.liked), (0, false));
    }

    #[tokio::test]
    async fn test_failure_after_refresh_keeps_refreshed_contents() {
        let ctl = controller(&["a", "b"]);
        let (tx, rx) = oneshot::channel::<Result<Option<Item>, GatewayError>>();
        let pending_like = {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                ctl.apply("a", MutationKind::Like, like, unlike, async move { rx.await.unwrap() })
                    .await
            })
        };
        wait_in_flight(&ctl, "a", MutationKind::Like).await;

        let mut fresh = Item::new("a", "fresh");
        fresh.likes = 5;
        ctl.store().replace_all(vec![fresh.clone()]);

        tx.send(Err(server_down())).unwrap();
        assert!(pending_like.await.unwrap().is_err());
        assert_eq!(ctl.store().items(), vec![fresh]);
    }

    #[tokio::test]
    async fn test_failed_remove_does_not_resurrect_after_refresh() {
        let ctl = controller(&["a", "b"]);
        let (tx, rx) = oneshot::channel::<Result<(), GatewayError>>();
        let pending_delete = {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                ctl.remove("a", MutationKind::Delete, async move { rx.await.unwrap() })
                    .await
            })
        };
        wait_in_flight(&ctl, "a", MutationKind::Delete).await;

        ctl.store().replace_all(vec![Item::new("b", "b")]);

        tx.send(Err(server_down())).unwrap();
        assert!(pending_delete.await.unwrap().is_err());
        assert_eq!(ids(&ctl.store().items()), vec!["b"]);
    }

    #[tokio::test]
    async fn test_unknown_entity_fails_before_network() {
        let ctl = controller(&["a"]);
        let mut called = false;
        let err = ctl
            .apply("ghost", MutationKind::Update, |_| {}, |_, _| {}, async {
                called = true;
                Ok(None)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownEntity { .. }));
        assert!(!called);
        assert!(!ctl.is_in_flight("ghost", MutationKind::Update));
    }

    #[tokio::test]
    async fn test_remove_restores_position_on_failure() {
        let ctl = controller(&["a", "b", "c"]);
        let before = ctl.store().items();

        let err = ctl
            .remove("b", MutationKind::Delete, async { Err(server_down()) })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MutationFailed { .. }));
        assert_eq!(ctl.store().items(), before);

        let removed = ctl
            .remove("b", MutationKind::Delete, async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(removed.id, "b");
        assert_eq!(ids(&ctl.store().items()), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_dropped_mutation_rolls_back_and_releases() {
        let ctl = controller(&["a", "b"]);
        let before = ctl.store().items();

        let task = {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                ctl.remove("a", MutationKind::Delete, async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                })
                .await
            })
        };
        while !ctl.is_in_flight("a", MutationKind::Delete) {
            tokio::task::yield_now().await;
        }
        assert_eq!(ids(&ctl.store().items()), vec!["b"]);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(ctl.store().items(), before);
        assert!(!ctl.is_in_flight("a", MutationKind::Delete));
    }

    #[tokio::test]
    async fn test_insert_confirmed_respects_admission() {
        let ctl = controller(&["a"]);

        let err = ctl
            .insert_confirmed(async { Err(server_down()) }, Position::Front, |_| true)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Gateway(_)));
        assert_eq!(ctl.store().len(), 1);

        let pending = Item::new("new", "pending");
        let created = ctl
            .insert_confirmed(async { Ok(pending.clone()) }, Position::Front, |i| {
                i.body != "pending"
            })
            .await
            .unwrap();
        assert_eq!(created.id, "new");
        assert!(!ctl.store().contains("new"));

        ctl.insert_confirmed(async { Ok(Item::new("ok", "")) }, Position::Front, |_| true)
            .await
            .unwrap();
        assert_eq!(ids(&ctl.store().items()), vec!["ok", "a"]);
    }
}
