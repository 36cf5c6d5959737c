// src/cli/dispatcher.rs

use crate::{
    cli::handlers,
    constants::BIN_NAME,
    core::options::Options,
    errors::TaskError,
};
use colored::Colorize;
use std::collections::BTreeMap;
use std::{future::Future, pin::Pin};

// --- Command Definition and Registry ---

/// The future returned by a command. It owns its `Options`.
pub type CommandFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;

/// A top-level command: its name, a one-line description for the listing, a
/// help printer, and the handler that runs it.
#[derive(Debug)]
pub struct CommandDefinition {
    pub name: &'static str,
    pub short_description: &'static str,
    pub help: fn(),
    pub handler: fn(Options) -> CommandFuture,
}

/// The single source of truth for all commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "api",
        short_description: handlers::api::DESCRIPTION,
        help: handlers::api::help,
        handler: handlers::api::handle,
    },
    CommandDefinition {
        name: "mobile",
        short_description: handlers::mobile::DESCRIPTION,
        help: handlers::mobile::help,
        handler: handlers::mobile::handle,
    },
    CommandDefinition {
        name: "service",
        short_description: handlers::service::DESCRIPTION,
        help: handlers::service::help,
        handler: handlers::service::handle,
    },
    CommandDefinition {
        name: "stack",
        short_description: handlers::stack::DESCRIPTION,
        help: handlers::stack::help,
        handler: handlers::stack::handle,
    },
    CommandDefinition {
        name: "tenant",
        short_description: handlers::tenant::DESCRIPTION,
        help: handlers::tenant::help,
        handler: handlers::tenant::handle,
    },
    CommandDefinition {
        name: "test",
        short_description: handlers::test::DESCRIPTION,
        help: handlers::test::help,
        handler: handlers::test::handle,
    },
    CommandDefinition {
        name: "update",
        short_description: handlers::update::DESCRIPTION,
        help: handlers::update::help,
        handler: handlers::update::handle,
    },
];

/// Name → command lookup built once from a definition table.
#[derive(Debug)]
pub struct Registry {
    commands: BTreeMap<&'static str, &'static CommandDefinition>,
}

impl Registry {
    /// Indexes `definitions` in order. A repeated name replaces the earlier
    /// entry.
    pub fn new(definitions: &'static [CommandDefinition]) -> Self {
        let mut commands = BTreeMap::new();
        for definition in definitions {
            if commands.insert(definition.name, definition).is_some() {
                log::warn!(
                    "Command '{}' is registered more than once; the last definition wins.",
                    definition.name
                );
            }
        }
        Self { commands }
    }

    pub fn builtin() -> Self {
        Self::new(COMMAND_REGISTRY)
    }

    pub fn get(&self, name: &str) -> Option<&'static CommandDefinition> {
        self.commands.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    /// Every command with its short description, names padded to the longest.
    pub fn listing(&self) -> String {
        let width = self.commands.keys().map(|n| n.len()).max().unwrap_or(0);
        let mut out = format!("Usage: {BIN_NAME} <command> [<subcommand>] [args...] [--flag value]...\n\nCommands:\n");
        for (name, definition) in &self.commands {
            out.push_str(&format!(
                "  {}  {}\n",
                format!("{name:<width$}").cyan(),
                definition.short_description
            ));
        }
        out
    }
}

/// The settled result of one invocation.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The command ran to completion.
    Completed(&'static str),
    /// No known command was given; the listing was shown.
    Listed,
    /// `<command> --help`; the command's help page was shown.
    Helped(&'static str),
    Failed(TaskError),
}

impl DispatchOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed(_) | Self::Listed | Self::Helped(_) => 0,
            Self::Failed(e) if e.is_interrupted() => 130,
            Self::Failed(_) => 1,
        }
    }

    /// Prints the completion marker or the error. Usage errors and
    /// interruptions were already presented and stay silent.
    pub fn report(&self) {
        match self {
            Self::Completed(name) => println!("\n{} {}", "✔".green().bold(), format!("{name} done").green()),
            Self::Listed | Self::Helped(_) => {}
            Self::Failed(e) if e.is_handled() || e.is_interrupted() => {
                log::debug!("Suppressed already-presented error: {}", e);
            }
            Self::Failed(e) => eprintln!("\n{}: {}", "Error".red().bold(), e),
        }
    }
}

/// Routes `args` to the command named by the first positional token.
pub async fn dispatch(args: Vec<String>) -> DispatchOutcome {
    dispatch_with(&Registry::builtin(), args).await
}

pub async fn dispatch_with(registry: &Registry, args: Vec<String>) -> DispatchOutcome {
    log::debug!("Dispatching args: {:?}", args);
    let mut options = Options::from_args(args);

    let Some(command) = options.shift().and_then(|name| {
        let found = registry.get(&name);
        if found.is_none() {
            log::debug!("'{}' is not a registered command.", name);
        }
        found
    }) else {
        print!("{}", registry.listing());
        return DispatchOutcome::Listed;
    };

    if options.wants_help() {
        (command.help)();
        return DispatchOutcome::Helped(command.name);
    }

    log::debug!("Running command '{}'.", command.name);
    match (command.handler)(options).await {
        Ok(()) => DispatchOutcome::Completed(command.name),
        Err(e) => DispatchOutcome::Failed(e),
    }
}
