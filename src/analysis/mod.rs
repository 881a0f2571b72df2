//! Reconciliation of stored forecasts against observations.
//!
//! Submodules:
//! - `window`: picks the recent forecast snapshots to compare.
//! - `reconcile`: pairs each forecast with the matching observation.

pub mod reconcile;
pub mod window;

pub use reconcile::reconcile;
pub use window::{select_window, select_window_keys};
