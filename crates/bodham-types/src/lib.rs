pub mod api;
pub mod models;
pub mod timestamp;

pub use models::Identified;
