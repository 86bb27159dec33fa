//! Filter-and-collapse pipeline behind a headless controller.
//!
//! App shells (CLI, desktop) call methods on [`FilterController`] and
//! subscribe to its events; nothing here depends on a renderer.

pub mod controller;
pub mod state;

pub use controller::{
    ControllerError, FilterController, FilterStats, FilteredViewExport, VisibleSet,
};
pub use state::{
    CollapseSettings, CollapseState, FILTER_STATE_KEY, FilterState, FilterStateStore, GroupRecord,
};
