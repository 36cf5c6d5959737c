// src/cli/handlers/update.rs

use super::commons::{self, HelpPage};
use crate::{
    cli::dispatcher::CommandFuture,
    core::{
        options::Options,
        pipeline::{Pipeline, StepFuture},
    },
    system::executor,
};
use colored::Colorize;
use std::collections::HashMap;

pub const DESCRIPTION: &str = "Update the platform checkout and its submodules";

const COMMAND: &str = "update";

static HELP: HelpPage = HelpPage {
    command: COMMAND,
    summary: "Fast-forwards the platform repository and brings every git submodule to the recorded commit.",
    usage: &["[--no-pull]"],
    flags: &[
        ("--no-pull", "Only update submodules"),
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
    Pipeline::new("update")
        .step("check dependencies", commons::require(&["git"]))
        .step("locate platform root", commons::enter_root)
        .step_async("pull latest changes", pull)
        .step_async("update submodules", update_submodules)
}

fn pull(options: &mut Options) -> StepFuture<'_> {
    Box::pin(async move {
        if options.get_bool("no-pull") {
            println!("  {}", "skipped (--no-pull)".dimmed());
            return Ok(());
        }
        let root = commons::root(options)?;
        executor::execute_command("git pull --ff-only", &root, &HashMap::new()).await?;
        Ok(())
    })
}

fn update_submodules(options: &mut Options) -> StepFuture<'_> {
    Box::pin(async move {
        let root = commons::root(options)?;
        executor::execute_command("git submodule update --init --recursive", &root, &HashMap::new())
            .await?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_order() {
        assert_eq!(
            pipeline().step_names(),
            [
                "check dependencies",
                "locate platform root",
                "pull latest changes",
                "update submodules"
            ]
        );
    }

    #[tokio::test]
    async fn test_no_pull_skips_without_running_git() {
        let mut options = Options::from_args(["--no-pull"]);
        pull(&mut options).await.unwrap();
    }
}
