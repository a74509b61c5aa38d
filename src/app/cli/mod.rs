//! Command line parsing and console output

pub mod args;
pub mod display;

pub use args::{Args, Command};
