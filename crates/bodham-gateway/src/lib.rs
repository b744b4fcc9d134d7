pub mod config;
pub mod error;
pub mod gateway;

pub use config::{ApiConfig, Environment};
pub use error::GatewayError;
pub use gateway::{Gateway, Method};
