//! Keepsake daemon plumbing: arguments, configuration layering, logging,
//! the destination lock and the run loop

pub mod args;
pub mod daemon;
pub mod locks;
pub mod logging;
pub mod settings;
