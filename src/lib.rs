pub mod cli;
pub mod constants;
pub mod core;
pub mod errors;
pub mod system;
