//! Circulation server
//!
//! Tracks a library's circulating inventory: books, members and the loans
//! binding them, keeping availability counters, loan states and member
//! eligibility consistent under concurrent borrows and returns.

use std::sync::Arc;

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<services::Services>,
    pub identity: Arc<dyn services::auth::Identity>,
}
