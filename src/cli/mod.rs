// src/cli/mod.rs

use clap::Parser;

pub mod dispatcher;
pub mod handlers;

/// platgen: scaffolding and local-infrastructure orchestrator for the
/// multi-service platform.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
// Help is per command; `--help` is forwarded to the dispatcher like any flag.
#[command(disable_help_flag = true, disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// `<command> [<subcommand>] [args...] [--flag value]...`
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}
