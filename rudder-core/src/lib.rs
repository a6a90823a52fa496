//! Rudder Core
//!
//! Core library for reconciling declared infrastructure resources against a
//! remote control plane. Providers implement the lifecycle calls; the differ
//! and interpreter decide which calls to make and in what order.

pub mod differ;
pub mod effect;
pub mod interpreter;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
