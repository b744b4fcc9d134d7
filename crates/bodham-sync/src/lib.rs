//! Client-side synchronization of server-backed collections: an id-keyed
//! store, optimistic mutations with rollback, and cancellable polling.

pub mod error;
pub mod mutation;
pub mod poller;
pub mod store;

pub use error::SyncError;
pub use mutation::{MutationController, MutationKind};
pub use poller::{PollHandle, Poller};
pub use store::{CollectionStore, LoadState, Position, Snapshot, StoreEvent};

#[cfg(test)]
pub(crate) mod testing {
    use bodham_types::Identified;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Item {
        pub id: String,
        pub body: String,
        pub likes: u32,
        pub liked: bool,
    }

    impl Item {
        pub fn new(id: &str, body: &str) -> Self {
            Self {
                id: id.to_string(),
                body: body.to_string(),
                likes: 0,
                liked: false,
            }
        }
    }

    impl Identified for Item {
        fn id(&self) -> &str {
            &self.id
        }
    }

    pub fn ids<T: Identified>(items: &[T]) -> Vec<&str> {
        items.iter().map(|i| i.id()).collect()
    }
}
