//! Intake: application intake wizard
//!
//! A multi-step registration wizard with schema-validated sections, a
//! local session cache that survives restarts, and a reviewer correction
//! loop secured by one-time codes.

pub mod cli;
pub mod core;
pub mod entities;
pub mod registration;
pub mod remote;
pub mod schema;
