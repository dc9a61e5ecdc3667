//! Uncling companion core.
//!
//! Session gating (splash, sign-in, onboarding) for the client shell plus
//! the guided wellness features behind it.

pub mod app;
pub mod config;
pub mod features;
pub mod logging;
pub mod prompts;
pub mod providers;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{App, BootReport, Dashboard};
pub use config::Config;
