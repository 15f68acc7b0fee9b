pub mod dashboard;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
