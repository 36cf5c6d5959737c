// src/cli/handlers/stack.rs

use super::commons::{self, HelpPage, Subtask};
use crate::{
    cli::dispatcher::CommandFuture,
    constants::{COMPOSE_SOURCE_FILENAME, ENV_FILENAME},
    core::{
        env_file,
        options::Options,
        patcher::write_atomically,
        pipeline::{Pipeline, StepFuture},
        template::{self, TemplateData},
    },
    errors::TaskError,
    system::{
        executor,
        stack::{self, SessionConfig},
    },
};
use anyhow::Context;
use colored::Colorize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const DESCRIPTION: &str = "Build, start, stop and inspect the local container stack";

const COMMAND: &str = "stack";

static HELP: HelpPage = HelpPage {
    command: COMMAND,
    summary: "Drives the local docker compose stack. `up` returns once the database init container reports that its configuration is complete.",
    usage: &["build", "up [--verbose]", "down", "status"],
    flags: &[
        ("--verbose", "Mirror the container logs while waiting for readiness"),
        ("--root <dir>", "Start the platform root search from <dir>"),
        ("--help", "Show this help"),
    ],
};

static SUBTASKS: &[Subtask] = &[
    Subtask {
        name: "build",
        pipeline: build,
    },
    Subtask {
        name: "up",
        pipeline: up,
    },
    Subtask {
        name: "down",
        pipeline: down,
    },
    Subtask {
        name: "status",
        pipeline: status,
    },
];

pub fn help() {
    HELP.print();
}

pub fn handle(options: Options) -> CommandFuture {
    Box::pin(async move {
        commons::run_subtask(COMMAND, SUBTASKS, help, options).await
    })
}

fn build() -> Pipeline {
    Pipeline::new("stack build")
        .step("locate platform root", commons::enter_root)
        .step("render compose file", render_compose)
}

fn up() -> Pipeline {
    Pipeline::new("stack up")
        .step("check dependencies", commons::require(&["docker"]))
        .step("locate platform root", commons::enter_root)
        .step("render compose file", render_compose)
        .step_async("start containers", start_detached)
        .step_async("wait for readiness", wait_until_ready)
}

fn down() -> Pipeline {
    Pipeline::new("stack down")
        .step("check dependencies", commons::require(&["docker"]))
        .step("locate platform root", commons::enter_root)
        .step_async("stop containers", tear_down)
}

fn status() -> Pipeline {
    Pipeline::new("stack status")
        .step("check dependencies", commons::require(&["docker"]))
        .step("locate platform root", commons::enter_root)
        .step_async("list containers", list_containers)
}

/// Renders the compose file from its source with the `.env` values and the
/// stack name.
fn render_compose(options: &mut Options) -> Result<(), TaskError> {
    let root = commons::root(options)?;
    let config = commons::config(options)?;
    let source = root.join(COMPOSE_SOURCE_FILENAME);
    let content = fs::read_to_string(&source).map_err(|e| TaskError::io(&source, e))?;

    let rendered = template::render_str(&content, &compose_data(&root, &config.stack_name(&root)));
    let target = root.join(&config.stack.compose_file);
    write_atomically(&target, &rendered)?;
    println!("  {} {}", "rendered".green(), config.stack.compose_file);
    Ok(())
}

fn start_detached(options: &mut Options) -> StepFuture<'_> {
    Box::pin(async move {
        let root = commons::root(options)?;
        let line = compose_line(options, &["up", "-d"])?;
        executor::execute_command(&line, &root, &HashMap::new()).await?;
        Ok(())
    })
}

/// Follows the stack logs until the readiness markers show up.
fn wait_until_ready(options: &mut Options) -> StepFuture<'_> {
    Box::pin(async move {
        let mut session = session(options, &["logs", "--follow"])?;
        let config = commons::config(options)?;
        session.arm_marker = config.stack.arm_marker().map(str::to_string);
        session.ready_marker = config.stack.ready_marker.clone();
        session.timeout = config.stack.timeout();
        session.terminate_on_ready = true;
        session.echo = options.get_bool("verbose");

        println!(
            "  waiting up to {}s for '{}'...",
            session.timeout.as_secs(),
            session.ready_marker
        );
        stack::run_session(&session, interrupted()).await?;
        println!("  {} stack '{}' is ready", "✔".green(), session.stack);
        Ok(())
    })
}

/// Watches `docker compose down` and completes on its clean exit.
fn tear_down(options: &mut Options) -> StepFuture<'_> {
    Box::pin(async move {
        let mut session = session(options, &["down"])?;
        session.complete_on_clean_exit = true;
        session.echo = true;
        session.timeout = commons::config(options)?.stack.timeout();
        stack::run_session(&session, interrupted()).await
    })
}

fn list_containers(options: &mut Options) -> StepFuture<'_> {
    Box::pin(async move {
        let root = commons::root(options)?;
        let line = compose_line(options, &["ps"])?;
        executor::execute_command(&line, &root, &HashMap::new()).await?;
        Ok(())
    })
}

/// A session over `docker compose <args>` for this platform's stack. The
/// ready marker is empty, so only a clean exit completes it unless the caller
/// sets one.
fn session(options: &Options, args: &[&str]) -> Result<SessionConfig, TaskError> {
    let root = commons::root(options)?;
    let config = commons::config(options)?;
    let stack = config.stack_name(&root);
    Ok(SessionConfig {
        program: "docker".to_string(),
        args: compose_args(&stack, &config.stack.compose_file, args),
        cwd: root,
        env: HashMap::new(),
        arm_marker: None,
        ready_marker: String::new(),
        timeout: config.stack.timeout(),
        complete_on_clean_exit: false,
        terminate_on_ready: false,
        echo: false,
        stack,
    })
}

fn compose_line(options: &Options, args: &[&str]) -> Result<String, TaskError> {
    let root = commons::root(options)?;
    let config = commons::config(options)?;
    let argv = compose_args(&config.stack_name(&root), &config.stack.compose_file, args);
    let line = shlex::try_join(std::iter::once("docker").chain(argv.iter().map(String::as_str)))
        .context("Cannot quote the compose command line")?;
    Ok(line)
}

fn compose_args(stack: &str, compose_file: &str, args: &[&str]) -> Vec<String> {
    ["compose", "-p", stack, "-f", compose_file]
        .into_iter()
        .chain(args.iter().copied())
        .map(str::to_string)
        .collect()
}

fn compose_data(root: &Path, stack_name: &str) -> TemplateData {
    let mut data: TemplateData = env_file::read(&root.join(ENV_FILENAME)).into_iter().collect();
    data.entry("STACK_NAME".to_string())
        .or_insert_with(|| stack_name.to_string());
    data
}

/// Resolves on Ctrl+C. If the signal cannot be watched it never resolves.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
