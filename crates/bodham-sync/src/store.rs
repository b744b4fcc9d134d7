use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bodham_types::Identified;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 64;

/// Change notifications for screens observing a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Replaced { len: usize },
    Upserted { id: String },
    Removed { id: String },
}

/// Where the collection stands with respect to its last server fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
    /// The last fetch failed; contents are whatever was there before.
    Failed(String),
}

/// Insertion point for an entity that is not yet present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Front,
    Back,
    /// Clamped to the current length.
    Index(usize),
}

/// An entity's pre-mutation state, used to roll back.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    id: String,
    entry: Option<(usize, T)>,
    generation: u64,
}

impl<T> Snapshot<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The captured value, if the entity existed when the snapshot was taken.
    pub fn value(&self) -> Option<&T> {
        self.entry.as_ref().map(|(_, v)| v)
    }

    /// The store generation the snapshot was taken in.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct Inner<T> {
    items: RwLock<Vec<T>>,
    /// Bumped by every wholesale replacement.
    generation: AtomicU64,
    state: RwLock<LoadState>,
    events: broadcast::Sender<StoreEvent>,
}

/// Ordered, id-unique collection of server entities.
///
/// Clones share the same underlying list. Locks are never held across an
/// await point.
pub struct CollectionStore<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CollectionStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Identified + Clone> Default for CollectionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Identified + Clone> CollectionStore<T> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                items: RwLock::new(Vec::new()),
                generation: AtomicU64::new(0),
                state: RwLock::new(LoadState::Idle),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Replace the whole list with server order. A repeated id keeps the
    /// position of its first occurrence and the payload of its last.
    pub fn replace_all(&self, items: impl IntoIterator<Item = T>) {
        let mut next: Vec<T> = Vec::new();
        for item in items {
            match next.iter().position(|e| e.id() == item.id()) {
                Some(i) => next[i] = item,
                None => next.push(item),
            }
        }
        let len = next.len();
        {
            let mut items = self.inner.items.write();
            *items = next;
            self.inner.generation.fetch_add(1, Ordering::Relaxed);
        }
        self.emit(StoreEvent::Replaced { len });
    }

    /// Replace in place if present, otherwise insert at the front.
    pub fn upsert(&self, item: T) {
        self.upsert_at(item, Position::Front);
    }

    /// Replace in place if present, otherwise insert at `position`.
    /// Returns the entity's index afterwards.
    pub fn upsert_at(&self, item: T, position: Position) -> usize {
        let id = item.id().to_string();
        let index = {
            let mut items = self.inner.items.write();
            match items.iter().position(|e| e.id() == id) {
                Some(i) => {
                    items[i] = item;
                    i
                }
                None => {
                    let at = match position {
                        Position::Front => 0,
                        Position::Back => items.len(),
                        Position::Index(i) => i.min(items.len()),
                    };
                    items.insert(at, item);
                    at
                }
            }
        };
        self.emit(StoreEvent::Upserted { id });
        index
    }

    /// Remove the entity with `id`, returning where it was. Absent ids are
    /// a no-op.
    pub fn remove_by_id(&self, id: &str) -> Option<(usize, T)> {
        let removed = {
            let mut items = self.inner.items.write();
            let i = items.iter().position(|e| e.id() == id)?;
            (i, items.remove(i))
        };
        self.emit(StoreEvent::Removed { id: id.to_string() });
        Some(removed)
    }

    pub fn find_by_id(&self, id: &str) -> Option<T> {
        self.inner.items.read().iter().find(|e| e.id() == id).cloned()
    }

    /// Index and value of the entity with `id`.
    pub fn entry(&self, id: &str) -> Option<(usize, T)> {
        let items = self.inner.items.read();
        items
            .iter()
            .position(|e| e.id() == id)
            .map(|i| (i, items[i].clone()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.items.read().iter().any(|e| e.id() == id)
    }

    pub fn items(&self) -> Vec<T> {
        self.inner.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    /// Entities matching `keep`, in collection order.
    pub fn filtered<P>(&self, keep: P) -> Vec<T>
    where
        P: Fn(&T) -> bool,
    {
        self.inner
            .items
            .read()
            .iter()
            .filter(|e| keep(e))
            .cloned()
            .collect()
    }

    /// Mutate one entity in place. Returns the updated value, or `None`
    /// when the id is absent.
    pub fn update_by_id<F>(&self, id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        let updated = {
            let mut items = self.inner.items.write();
            let item = items.iter_mut().find(|e| e.id() == id)?;
            f(item);
            item.clone()
        };
        self.emit(StoreEvent::Upserted { id: id.to_string() });
        Some(updated)
    }

    /// How many times the list has been replaced wholesale. A snapshot from
    /// an older generation predates the current server truth.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, id: &str) -> Snapshot<T> {
        let items = self.inner.items.read();
        let entry = items
            .iter()
            .position(|e| e.id() == id)
            .map(|i| (i, items[i].clone()));
        Snapshot {
            id: id.to_string(),
            entry,
            generation: self.inner.generation.load(Ordering::Relaxed),
        }
    }

    /// Put an entity back exactly as captured: same value, same index.
    /// A snapshot of an absent entity removes whatever now carries its id.
    pub fn restore(&self, snapshot: Snapshot<T>) {
        let Snapshot { id, entry, .. } = snapshot;
        let event = {
            let mut items = self.inner.items.write();
            let current = items.iter().position(|e| e.id() == id);
            match (entry, current) {
                (Some((index, value)), current) => {
                    if let Some(i) = current {
                        items.remove(i);
                    }
                    let at = index.min(items.len());
                    items.insert(at, value);
                    Some(StoreEvent::Upserted { id })
                }
                (None, Some(i)) => {
                    items.remove(i);
                    Some(StoreEvent::Removed { id })
                }
                (None, None) => None,
            }
        };
        if let Some(event) = event {
            self.emit(event);
        }
    }

    pub fn load_state(&self) -> LoadState {
        self.inner.state.read().clone()
    }

    pub(crate) fn set_load_state(&self, state: LoadState) {
        *self.inner.state.write() = state;
    }

    /// Fetch the full list and replace the contents with it.
    ///
    /// On failure the contents are left untouched and the state becomes
    /// `Failed`; the error is handed back to the caller.
    pub async fn refresh<F, E>(&self, fetch: F) -> Result<usize, E>
    where
        F: Future<Output = Result<Vec<T>, E>>,
        E: Display,
    {
        self.set_load_state(LoadState::Loading);
        match fetch.await {
            Ok(items) => {
                self.replace_all(items);
                self.set_load_state(LoadState::Ready);
                let len = self.len();
                debug!(len, "collection refreshed");
                Ok(len)
            }
            Err(e) => {
                warn!("collection refresh failed: {}", e);
                self.set_load_state(LoadState::Failed(e.to_string()));
                Err(e)
            }
        }
    }
}
