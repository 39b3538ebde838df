//! Pomodoro and stopwatch activity tracking.
//!
//! A [`TimerActivity`](models::TimerActivity) is either a pomodoro or a
//! stopwatch. Transitions validate their preconditions, mutate the record in
//! memory and are persisted in one write by an [`ActivityStore`](store::ActivityStore).
//! Elapsed and remaining time are always computed from stored timestamps and
//! an injected [`Clock`](clock::Clock); nothing ticks in the background.

pub mod activity;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod pomodoro;
pub mod service;
pub mod stopwatch;
pub mod store;
pub mod watcher;

pub use error::{Result, TimerError};
