//! Command implementations

pub mod exec;
pub mod records;
pub mod up;
pub mod version;
