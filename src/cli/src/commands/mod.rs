//! CLI subcommands.

pub mod config;
pub mod event;
pub mod health;
pub mod tree;
