//! Tiller server library.
//!
//! This library provides the core components of the Tiller session
//! supervision server: the per-session event log, the turn scheduler, the
//! subscriber hub, and the HTTP control surface.

pub mod adapter;
pub mod api;
pub mod bridge;
pub mod config;
pub mod events;
pub mod hub;
pub mod scheduler;
pub mod session;
pub mod workdir;
