// src/core/mod.rs

pub mod config;
pub mod dependencies;
pub mod directory;
pub mod env_file;
pub mod options;
pub mod patcher;
pub mod pipeline;
pub mod template;
