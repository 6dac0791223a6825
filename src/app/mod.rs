//! Application layer containing business logic and shared state.

pub mod service;
pub mod state;

pub use service::{DEFAULT_USERS_TABLE, UserService};
pub use state::AppState;
