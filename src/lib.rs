//! Attempt Throttler - per-subject guard for abuse-prone actions
//!
//! This crate decides, from a short history of recent attempts, whether a
//! new attempt (a login, a PIN entry, a password reset) is currently
//! permitted. Attempts that land close together are counted inside a
//! sliding window; reaching the threshold escalates to a timed lockout.
//! All state is in-process and every time-sensitive call takes `now`
//! explicitly.

pub mod config;
pub mod error;
pub mod throttle;
