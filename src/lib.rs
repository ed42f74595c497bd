pub mod approval;
pub mod assistant;
pub mod commands;
pub mod docstore;
pub mod error;
pub mod goals;
pub mod helpers;
pub mod revenue;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;

pub use error::{CalendarError, CommandError};
pub use state::AppState;
