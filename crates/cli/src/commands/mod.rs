//! Subcommand implementations

pub mod agent;
pub mod collect;
pub mod device;
pub mod inspect;
pub mod predict;
pub mod progress;
pub mod scan;
pub mod train;
