// src/cli/handlers/test.rs

use super::commons::{self, HelpPage};
use crate::{
    cli::dispatcher::CommandFuture,
    constants::SERVICES_DIR,
    core::{
        options::Options,
        pipeline::{Pipeline, StepFuture},
        template,
    },
    errors::TaskError,
    system::executor::{self, ExecutionError},
};
use colored::Colorize;
use std::collections::HashMap;
use std::fs;

pub const DESCRIPTION: &str = "Run the test suite of one or every service";

const COMMAND: &str = "test";

static HELP: HelpPage = HelpPage {
    command: COMMAND,
    summary: "Runs the configured test command ([test] command in config/platgen.toml) for one service, or for every service under services/.",
    usage: &["[<service>]"],
    flags: &[
        ("--root <dir>", "Start the platform root search from <dir>"),
        ("--help", "Show this help"),
    ],
};

pub fn help() {
    HELP.print();
}

pub fn handle(mut options: Options) -> CommandFuture {
    Box::pin(async move {
        commons::present_usage(help, pipeline().run(&mut options).await)
    })
}

fn pipeline() -> Pipeline {
    Pipeline::new("test")
        .step("check dependencies", commons::require(&["docker"]))
        .step("locate platform root", commons::enter_root)
        .step("select services", select_services)
        .step_async("run tests", run_tests)
}

/// Stores the requested service, or every service directory in name order,
/// under `services`.
fn select_services(options: &mut Options) -> Result<(), TaskError> {
    let services_dir = commons::root(options)?.join(SERVICES_DIR);

    if let Some(raw) = options.shift() {
        let name = commons::validate_name("service", &raw)?;
        if !services_dir.join(&name).is_dir() {
            return Err(TaskError::InvalidInput(format!(
                "Service '{name}' does not exist in '{SERVICES_DIR}/'."
            )));
        }
        options.append("services", name);
        return Ok(());
    }

    let entries = fs::read_dir(&services_dir).map_err(|e| TaskError::io(&services_dir, e))?;
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    if names.is_empty() {
        return Err(TaskError::InvalidInput(format!(
            "No services found in '{SERVICES_DIR}/'."
        )));
    }
    for name in names {
        options.append("services", name);
    }
    Ok(())
}

/// Runs every selected suite, then fails if any of them failed. An
/// interruption stops immediately.
fn run_tests(options: &mut Options) -> StepFuture<'_> {
    Box::pin(async move {
        let root = commons::root(options)?;
        let command = commons::config(options)?.test.command;
        let mut failed = Vec::new();

        for service in options.get_list("services") {
            let line = template::render_str(&command, &template::data([("service", service.as_str())]));
            println!("\n{} {}", "testing".cyan().bold(), service);
            match executor::execute_command(&line, &root, &HashMap::new()).await {
                Ok(()) => println!("  {} {}", "passed".green(), service),
                Err(e @ ExecutionError::Interrupted(_)) => return Err(e.into()),
                Err(e) => {
                    log::debug!("Tests for '{}' failed: {}", service, e);
                    println!("  {} {}", "failed".red(), service);
                    failed.push(service);
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(TaskError::InvalidInput(format!(
                "Tests failed for: {}",
                failed.join(", ")
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::handlers::commons::fixtures;

    #[test]
    fn test_selects_all_services_sorted() {
        let platform = fixtures::platform();
        let root = platform.path();
        for name in ["orders", "auth", "billing"] {
            fs::create_dir_all(root.join(SERVICES_DIR).join(name)).unwrap();
        }
        fs::write(root.join(SERVICES_DIR).join("README.md"), "").unwrap();

        let mut options = fixtures::options_at(root, &[]);
        select_services(&mut options).unwrap();
        assert_eq!(options.get_list("services"), ["auth", "billing", "orders"]);

        let mut one = fixtures::options_at(root, &["billing"]);
        select_services(&mut one).unwrap();
        assert_eq!(one.get_list("services"), ["billing"]);

        let mut unknown = fixtures::options_at(root, &["payments"]);
        assert!(select_services(&mut unknown).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_every_suite_and_reports_failures() {
        let platform = fixtures::platform();
        let root = platform.path();
        fs::write(
            root.join("config/platgen.toml"),
            "[test]\ncommand = \"sh -c 'test [service] != broken'\"\n",
        )
        .unwrap();

        let mut options = fixtures::options_at(root, &[]);
        for name in ["auth", "broken", "orders"] {
            options.append("services", name);
        }
        let err = run_tests(&mut options).await.unwrap_err();
        assert_eq!(err.to_string(), "Tests failed for: broken");
    }
}
