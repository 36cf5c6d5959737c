// src/cli/handlers/mobile.rs

use super::commons::{self, HelpPage, Subtask};
use crate::{
    cli::dispatcher::CommandFuture,
    constants::MOBILE_DIR,
    core::{
        options::Options,
        pipeline::{Pipeline, StepFuture},
        template,
    },
    errors::TaskError,
    system::executor,
};
use colored::Colorize;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;

pub const DESCRIPTION: &str = "Scaffold a new mobile app project";

const COMMAND: &str = "mobile";

lazy_static! {
    static ref BUNDLE_ID_RE: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)+$")
        .expect("bundle id regex is valid");
}

static HELP: HelpPage = HelpPage {
    command: COMMAND,
    summary: "Creates a mobile app project under mobile/<name> from the `mobile` template and initialises a git repository in it.",
    usage: &["create <name> [--bundle-id <id>]"],
    flags: &[
        ("--bundle-id <id>", "Reverse-DNS bundle identifier (default: com.<stack>.<name>)"),
        ("--root <dir>", "Start the platform root search from <dir>"),
        ("--help", "Show this help"),
    ],
};

static SUBTASKS: &[Subtask] = &[Subtask {
    name: "create",
    pipeline: create,
}];

pub fn help() {
    HELP.print();
}

pub fn handle(options: Options) -> CommandFuture {
    Box::pin(async move {
        commons::run_subtask(COMMAND, SUBTASKS, help, options).await
    })
}

fn create() -> Pipeline {
    Pipeline::new("mobile create")
        .step("check dependencies", commons::require(&["git"]))
        .step("locate platform root", commons::enter_root)
        .step("validate app name", commons::take_name(COMMAND, "name", "mobile app"))
        .step("resolve bundle id", resolve_bundle_id)
        .step("scaffold app", scaffold)
        .step_async("initialise git repository", init_repository)
}

fn resolve_bundle_id(options: &mut Options) -> Result<(), TaskError> {
    let bundle_id = match options.get_str("bundle-id") {
        Some(id) => id,
        None => {
            let root = commons::root(options)?;
            let stack = commons::config(options)?.stack_name(&root);
            default_bundle_id(&stack, &options.require_str("name")?)
        }
    };
    if !BUNDLE_ID_RE.is_match(&bundle_id) {
        return Err(TaskError::usage(
            COMMAND,
            format!("'{bundle_id}' is not a reverse-DNS bundle id such as com.acme.app"),
        ));
    }
    options.set("bundle_id", bundle_id);
    Ok(())
}

fn scaffold(options: &mut Options) -> Result<(), TaskError> {
    let root = commons::root(options)?;
    let name = options.require_str("name")?;
    let dest = app_dir(options)?;
    let data = template::data([
        ("bundle_id", options.require_str("bundle_id")?),
        ("name", name),
    ]);

    let written = commons::template_store(options)?.scaffold_dir(COMMAND, &dest, &data)?;
    for path in written {
        println!("  {} {}", "created".green(), path.strip_prefix(&root).unwrap_or(&path).display());
    }
    Ok(())
}

fn init_repository(options: &mut Options) -> StepFuture<'_> {
    Box::pin(async move {
        let dir = app_dir(options)?;
        executor::execute_command("git init --quiet", &dir, &HashMap::new()).await?;
        println!("  {} git repository in {}", "initialised".green(), dir.display());
        Ok(())
    })
}

fn app_dir(options: &Options) -> Result<PathBuf, TaskError> {
    Ok(commons::root(options)?
        .join(MOBILE_DIR)
        .join(options.require_str("name")?))
}

/// `com.<stack>.<name>` with every character that is not allowed in a
/// segment dropped.
fn default_bundle_id(stack: &str, name: &str) -> String {
    let segment = |s: &str| -> String {
        let cleaned: String = s
            .to_lowercase()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        match cleaned.chars().next() {
            Some(c) if c.is_ascii_alphabetic() => cleaned,
            _ => format!("app{cleaned}"),
        }
    };
    format!("com.{}.{}", segment(stack), segment(name))
}
