//! # System Interaction Layer
//!
//! The boundary between the pipelines and the operating system's processes.
//!
//! ## Modules
//!
//! - **`executor`**: Spawns one-shot external commands with inherited stdio,
//!   handles `Ctrl+C` by killing the child, falls back to `cmd /C` on Windows
//!   and captures output when asked.
//! - **`stack`**: The stack lifecycle watcher. Launches a long-running
//!   orchestration process, streams its merged output through a readiness
//!   probe and settles on readiness, exit, timeout or cancellation. At most
//!   one session runs per stack name.

pub mod executor;
pub mod stack;
