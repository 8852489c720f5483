#![warn(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod alerts;
pub mod buffer;
pub mod config;
pub mod dispatcher;
pub mod emitter;
pub mod endpoints;
pub mod error;
pub mod gateway;
pub mod health;
pub mod hubs;
pub mod ingestion;
pub mod meta_tracker;
pub mod metric_index;
pub mod model;
pub mod observability;
pub mod rules;
pub mod server;
pub mod stores;
