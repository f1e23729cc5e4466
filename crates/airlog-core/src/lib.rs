//! Hardware-independent control core for airlog
//!
//! This crate owns the operating state of the handheld air-quality logger:
//! the UI navigation state machine, the operating-mode controller, the
//! adaptive sleep scheduler, the telemetry ring log, calibration persistence
//! and the trend ring buffers. Everything is driven from a single control
//! loop ([`app::App::step`]).
//!
//! Peripherals are reached through the collaborator traits in
//! [`sensors`], [`storage`], [`connectivity`], [`display`] and [`platform`],
//! so the crate is `no_std` with `extern crate alloc` and builds both for the
//! device and for desktop hosts (simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod app;
pub mod config;
pub mod connectivity;
pub mod display;
pub mod error;
pub mod mode;
pub mod platform;
pub mod power;
pub mod sensors;
pub mod status;
pub mod storage;
pub mod trend;
pub mod ui;
pub mod wall_clock;

#[cfg(test)]
pub(crate) mod testing;
