use bodham_gateway::Gateway;
use bodham_sync::{CollectionStore, MutationController, MutationKind, Position};
use bodham_types::api::JournalEntryRequest;
use bodham_types::models::JournalEntry;
use tracing::info;

use crate::error::ApiError;
use crate::session::{Session, non_blank};

const JOURNALS_PATH: &str = "journals/";

/// The signed-in user's private journal.
pub struct JournalService {
    gateway: Gateway,
    session: Session,
    entries: MutationController<JournalEntry>,
}

impl JournalService {
    pub fn new(gateway: Gateway, session: Session) -> Self {
        Self {
            gateway,
            session,
            entries: MutationController::new(CollectionStore::new()),
        }
    }

    pub fn store(&self) -> &CollectionStore<JournalEntry> {
        self.entries.store()
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.store().items()
    }

    fn owner(&self) -> [(&str, &str); 1] {
        [("user_id", self.session.user_id())]
    }

    pub async fn refresh(&self) -> Result<usize, ApiError> {
        let owner = self.owner();
        Ok(self
            .store()
            .refresh(self.gateway.get::<Vec<JournalEntry>>(JOURNALS_PATH, &owner))
            .await?)
    }

    pub async fn create(&self, mut entry: JournalEntryRequest) -> Result<JournalEntry, ApiError> {
        entry.content = non_blank(&entry.content, "Journal entry")?.to_string();
        let owner = self.owner();
        let created = self
            .entries
            .insert_confirmed(
                self.gateway.post(JOURNALS_PATH, &owner, &entry),
                Position::Front,
                |_| true,
            )
            .await?;
        info!(entry_id = %created.id, "journal entry created");
        Ok(created)
    }

    /// Content is always replaced; title and date only when given.
    pub async fn update(&self, id: &str, mut entry: JournalEntryRequest) -> Result<JournalEntry, ApiError> {
        entry.content = non_blank(&entry.content, "Journal entry")?.to_string();
        let path = format!("{JOURNALS_PATH}{id}");
        let owner = self.owner();
        let edit = |current: &mut JournalEntry| {
            current.content = entry.content.clone();
            if let Some(title) = &entry.title {
                current.title = Some(title.clone());
            }
            if let Some(date) = entry.date {
                current.date = date;
            }
        };
        let revert = |current: &mut JournalEntry, before: &JournalEntry| {
            current.content = before.content.clone();
            current.title = before.title.clone();
            current.date = before.date;
        };
        let confirm = async {
            self.gateway
                .put::<_, JournalEntry>(&path, &owner, &entry)
                .await
                .map(Some)
        };
        Ok(self.entries.apply(id, MutationKind::Update, edit, revert, confirm).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("{JOURNALS_PATH}{id}");
        let owner = self.owner();
        self.entries
            .remove(id, MutationKind::Delete, self.gateway.delete(&path, &owner))
            .await?;
        info!(entry_id = id, "journal entry deleted");
        Ok(())
    }

    /// Entries whose title or content contains `query`, ignoring case.
    /// A blank query matches everything.
    pub fn search(&self, query: &str) -> Vec<JournalEntry> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.entries();
        }
        self.store().filtered(|e| matches_query(e, &needle))
    }
}

fn matches_query(entry: &JournalEntry, needle: &str) -> bool {
    entry.content.to_lowercase().contains(needle)
        || entry
            .title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(needle))
}
