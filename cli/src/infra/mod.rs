//! Infrastructure layer — concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the
//! provider REST client, ssh tunnel processes, record logs, configuration
//! sources, and signal handling.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod command_runner;
pub mod config;
pub mod digitalocean;
pub mod network;
pub mod proxychains;
pub mod record_log;
pub mod signals;
pub mod ssh;
