//! Simulated pan/tilt unit: two independent actuators stepped toward their
//! targets at a fixed internal rate, driven by immediate commands or by
//! cancelable goals with progress feedback.

pub mod commands;
pub mod communication;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod models;
pub mod state_monitor;
