pub mod controller;

pub use controller::{SyncController, SyncPhase};
