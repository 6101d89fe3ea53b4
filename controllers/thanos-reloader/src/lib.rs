//! Thanos Reloader
//!
//! Watches the ConfigMaps of one namespace and, whenever the one labelled
//! `name=thanos-rules` is created or changes, asks the Thanos ruler to reload
//! its rule files through its `/-/reload` endpoint.
//!
//! A change triggers ten reload signals, ten seconds apart. The signals are
//! best effort: failures are logged and never stop the watcher.
//!
//! # Modules
//!
//! - [`classifier`] - decides whether a ConfigMap change is relevant
//! - [`store`] - turns the raw watch stream into added/updated/deleted events
//! - [`watcher`] - dispatches events to the classifier and the reload queue
//! - [`trigger`] - the reload queue, its worker and the retry sequence
//! - [`state`] - observable controller state
//! - [`controller`] - wiring and lifecycle

pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod state;
pub mod store;
pub mod trigger;
pub mod watcher;
#[cfg(test)]
mod test_utils;

pub use classifier::{ChangeClassifier, Classification};
pub use controller::Controller;
pub use error::ControllerError;
pub use state::ControllerState;
