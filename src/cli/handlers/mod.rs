// src/cli/handlers/mod.rs

// One module per top-level command.

pub mod api;
pub mod commons;
pub mod mobile;
pub mod service;
pub mod stack;
pub mod tenant;
pub mod test;
pub mod update;
