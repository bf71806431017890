#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub mod algorithm;
pub mod config;
pub mod navigation;
pub mod types;

pub use config::Config;
pub use navigation::{ControlFlags, MulticopterNavigation};
