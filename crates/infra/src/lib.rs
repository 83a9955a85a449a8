//! Infrastructure layer: event store, command pipeline, projections, config.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod rental_service;
pub mod workers;
