//! dietsync-core: models, streak rules, and the engine that keeps a user's
//! settings, meals, and streak in sync between a local cache and a remote
//! per-user store.

pub mod cache;
pub mod db;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod models;
pub mod rules;
pub mod store;

pub use cache::LocalCache;
pub use engine::{EngineConfig, LoadReport, SyncEngine};
pub use error::SyncError;
pub use gateway::{Gateway, MemoryGateway};
pub use models::{Bundle, Meal, Settings, Streak, SyncKey, SyncValue};
