// src/cli/handlers/commons.rs

// Shared helpers and pipeline steps used by several handlers.

use crate::{
    constants::{BIN_NAME, MAX_ROOT_HOPS},
    core::{
        config::PlatformConfig, dependencies, directory, options::Options, pipeline::Pipeline,
        template::TemplateStore,
    },
    errors::TaskError,
};
use colored::Colorize;
use dialoguer::{Confirm, Input, Password, theme::ColorfulTheme};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::IsTerminal;
use std::path::PathBuf;

lazy_static! {
    static ref NAME_RE: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("name regex is valid");
}

/// The help text of one command.
#[derive(Debug)]
pub struct HelpPage {
    pub command: &'static str,
    pub summary: &'static str,
    pub usage: &'static [&'static str],
    pub flags: &'static [(&'static str, &'static str)],
}

impl HelpPage {
    pub fn render(&self) -> String {
        let mut out = format!("{}\n\n{}\n", self.summary, "Usage:".yellow().bold());
        for line in self.usage {
            out.push_str(&format!("  {BIN_NAME} {} {line}\n", self.command));
        }
        if !self.flags.is_empty() {
            let width = self.flags.iter().map(|(f, _)| f.len()).max().unwrap_or(0);
            out.push_str(&format!("\n{}\n", "Flags:".yellow().bold()));
            for (flag, text) in self.flags {
                out.push_str(&format!("  {}  {text}\n", format!("{flag:<width$}").cyan()));
            }
        }
        out
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

/// A named subcommand and the pipeline it runs.
#[derive(Debug)]
pub struct Subtask {
    pub name: &'static str,
    pub pipeline: fn() -> Pipeline,
}

/// Shifts the subcommand from `options` and runs its pipeline.
///
/// A missing or unknown subcommand is a usage error; so is any usage error
/// raised by the pipeline. Either way the command help is printed first.
pub async fn run_subtask(
    command: &'static str,
    subtasks: &'static [Subtask],
    help: fn(),
    mut options: Options,
) -> Result<(), TaskError> {
    let outcome = match options.shift() {
        None => Err(TaskError::usage(command, "missing subcommand")),
        Some(name) => match subtasks.iter().find(|s| s.name == name) {
            Some(subtask) => {
                log::debug!("Running subtask '{} {}'.", command, subtask.name);
                let pipeline = (subtask.pipeline)();
                pipeline.run(&mut options).await
            }
            None => Err(TaskError::usage(
                command,
                format!("unknown subcommand '{name}'"),
            )),
        },
    };
    present_usage(help, outcome)
}

/// Prints the command help and the reason when `outcome` is a usage error.
pub fn present_usage(help: fn(), outcome: Result<(), TaskError>) -> Result<(), TaskError> {
    if let Err(TaskError::Usage { reason, .. }) = &outcome {
        help();
        eprintln!("\n{}: {}", "Usage error".yellow().bold(), reason);
    }
    outcome
}

// --- Common Steps ---

/// A step that fails unless every tool resolves on `PATH`.
pub fn require(
    tools: &'static [&'static str],
) -> impl Fn(&mut Options) -> Result<(), TaskError> + Send + Sync + 'static {
    move |_: &mut Options| dependencies::ensure_available(tools)
}

/// Finds the platform root (from `--root` or the working directory), enters
/// it and records it under `root`.
pub fn enter_root(options: &mut Options) -> Result<(), TaskError> {
    let root = match options.get_str("root") {
        Some(start) => directory::enter_project_root_from(&PathBuf::from(start), MAX_ROOT_HOPS)?,
        None => directory::enter_project_root()?,
    };
    println!("  platform root: {}", root.display().to_string().dimmed());
    options.set("root", root.to_string_lossy().into_owned());
    Ok(())
}

/// A step that consumes the next positional as a `kind` name, validates it
/// and stores it under `key`.
pub fn take_name(
    command: &'static str,
    key: &'static str,
    kind: &'static str,
) -> impl Fn(&mut Options) -> Result<(), TaskError> + Send + Sync + 'static {
    move |options: &mut Options| {
        let raw = options.shift_required(command, kind)?;
        let name = validate_name(kind, &raw)?;
        options.set(key, name);
        Ok(())
    }
}

// --- Accessors ---

pub fn root(options: &Options) -> Result<PathBuf, TaskError> {
    options.require_str("root").map(PathBuf::from)
}

pub fn config(options: &Options) -> Result<PlatformConfig, TaskError> {
    Ok(PlatformConfig::load(&root(options)?)?)
}

pub fn template_store(options: &Options) -> Result<TemplateStore, TaskError> {
    let root = root(options)?;
    let config = PlatformConfig::load(&root)?;
    Ok(TemplateStore::new(config.templates_dir(&root)?))
}

// --- Validation ---

/// Validates a service, mobile app or route owner name.
/// Returns the trimmed name; prints a warning for names docker will rewrite.
pub fn validate_name(kind: &str, raw_name: &str) -> Result<String, TaskError> {
    let name = raw_name.trim();

    if name.is_empty() {
        return Err(TaskError::InvalidInput(format!("The {kind} name cannot be empty.")));
    }
    if name.contains(char::is_whitespace) {
        return Err(TaskError::InvalidInput(format!(
            "The {kind} name '{name}' cannot contain whitespace."
        )));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(TaskError::InvalidInput(format!(
            "The {kind} name '{name}' cannot contain path separators."
        )));
    }
    if !NAME_RE.is_match(name) {
        return Err(TaskError::InvalidInput(format!(
            "The {kind} name '{name}' must start with a letter and contain only letters, digits, '-' or '_'."
        )));
    }

    if name.chars().any(char::is_uppercase) {
        println!(
            "{}",
            format!(
                "Warning: The {kind} name '{name}' contains uppercase letters. Container names will be lowercased."
            )
            .yellow()
        );
    }
    Ok(name.to_string())
}

/// `billing-api` → `BILLING_API`.
pub fn env_key(name: &str) -> String {
    name.to_uppercase().replace('-', "_")
}

// --- Prompts ---

/// Prompts are only shown when stdin is a terminal.
pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal()
}

pub fn prompt_text(prompt: &str, default: Option<String>) -> Result<String, TaskError> {
    let theme = ColorfulTheme::default();
    let mut input = Input::<String>::with_theme(&theme).with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default);
    }
    Ok(input.interact_text()?)
}

pub fn prompt_password(prompt: &str) -> Result<String, TaskError> {
    Ok(Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .with_confirmation("Repeat password", "Passwords do not match.")
        .interact()?)
}

pub fn confirm(prompt: &str) -> Result<bool, TaskError> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(true)
        .interact()?)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static HELP_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_help() {
        HELP_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn greeting() -> Pipeline {
        Pipeline::new("demo greet").step("greet", |options: &mut Options| {
            let who = options.shift_required("demo", "who")?;
            options.set("greeted", who);
            Ok(())
        })
    }

    static SUBTASKS: &[Subtask] = &[Subtask {
        name: "greet",
        pipeline: greeting,
    }];

    #[tokio::test]
    async fn test_run_subtask_routes_and_reports_usage() {
        let before = HELP_CALLS.load(Ordering::SeqCst);

        let ok = run_subtask("demo", SUBTASKS, counting_help, Options::from_args(["greet", "ana"])).await;
        assert!(ok.is_ok());

        for argv in [vec![], vec!["wave"], vec!["greet"]] {
            let err = run_subtask("demo", SUBTASKS, counting_help, Options::from_args(argv))
                .await
                .unwrap_err();
            assert!(err.is_handled(), "expected a usage error, got {err}");
        }
        assert_eq!(HELP_CALLS.load(Ordering::SeqCst) - before, 3);
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("service", "  billing-api ").unwrap(), "billing-api");
        assert!(validate_name("service", "").is_err());
        assert!(validate_name("service", "two words").is_err());
        assert!(validate_name("service", "../etc").is_err());
        assert!(validate_name("service", "9lives").is_err());
        assert!(validate_name("service", "Billing").is_ok());
    }

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("billing-api"), "BILLING_API");
        assert_eq!(env_key("auth"), "AUTH");
    }

    #[test]
    fn test_help_page_lists_usage_and_flags() {
        colored::control::set_override(false);
        let page = HelpPage {
            command: "demo",
            summary: "Demo command.",
            usage: &["greet <who>"],
            flags: &[("--loud", "Shout"), ("--help", "Show this help")],
        };
        let text = page.render();
        assert!(text.contains("platgen demo greet <who>"));
        assert!(text.contains("  --loud  Shout\n"));
    }
}
