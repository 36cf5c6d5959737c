// src/cli/handlers/service.rs

use super::commons::{self, HelpPage, Subtask};
use crate::{
    cli::dispatcher::CommandFuture,
    constants::{
        COMPOSE_SERVICE_TAG, COMPOSE_SOURCE_FILENAME, DEFAULT_SERVICE_PORT, ENV_FILENAME,
        NGINX_CONFIG_FILENAME, NGINX_DIR, NGINX_UPSTREAM_TAG, SERVICES_DIR,
    },
    core::{
        env_file,
        options::Options,
        patcher::{self, PatchDescriptor},
        pipeline::Pipeline,
        template,
    },
    errors::TaskError,
};
use colored::Colorize;

pub const DESCRIPTION: &str = "Scaffold a new backend service";

const COMMAND: &str = "service";

static HELP: HelpPage = HelpPage {
    command: COMMAND,
    summary: "Creates a backend service from the `service` template, registers it in the compose source and the nginx config, and assigns it a port in .env.",
    usage: &["create <name> [--port <port>]"],
    flags: &[
        ("--port <port>", "Port to expose (default: next free *_PORT in .env)"),
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
    Pipeline::new("service create")
        .step("check dependencies", commons::require(&["docker"]))
        .step("locate platform root", commons::enter_root)
        .step("validate service name", commons::take_name(COMMAND, "name", "service"))
        .step("check service is new", ensure_new)
        .step("choose port", choose_port)
        .step("scaffold service", scaffold)
        .step("register service", register)
        .step("update .env", update_env)
}

fn ensure_new(options: &mut Options) -> Result<(), TaskError> {
    let name = options.require_str("name")?;
    let root = commons::root(options)?;
    if root.join(SERVICES_DIR).join(&name).exists() {
        return Err(TaskError::InvalidInput(format!(
            "Service '{name}' already exists in '{SERVICES_DIR}/'."
        )));
    }
    let key = port_key(&name);
    if env_file::lookup(&root.join(ENV_FILENAME), &key).is_some() {
        return Err(TaskError::InvalidInput(format!(
            "'{key}' is already set in {ENV_FILENAME}; remove it or pick another name."
        )));
    }
    Ok(())
}

/// Uses `--port` when given, otherwise one above the highest `*_PORT` in
/// `.env`.
fn choose_port(options: &mut Options) -> Result<(), TaskError> {
    let root = commons::root(options)?;
    let taken = used_ports(&env_file::read(&root.join(ENV_FILENAME)));

    let port = match options.get_str("port") {
        Some(raw) => {
            let port: u16 = raw.parse().ok().filter(|p| *p > 0).ok_or_else(|| {
                TaskError::usage(COMMAND, format!("'{raw}' is not a valid port"))
            })?;
            if taken.contains(&port) {
                return Err(TaskError::InvalidInput(format!(
                    "Port {port} is already assigned in {ENV_FILENAME}."
                )));
            }
            port
        }
        None => next_free_port(&taken)?,
    };

    log::debug!("Service port: {}", port);
    options.set("port", port);
    Ok(())
}

fn scaffold(options: &mut Options) -> Result<(), TaskError> {
    let root = commons::root(options)?;
    let name = options.require_str("name")?;
    let store = commons::template_store(options)?;
    let dest = root.join(SERVICES_DIR).join(&name);

    let written = store.scaffold_dir(COMMAND, &dest, &template_data(options)?)?;
    for path in written {
        let shown = path.strip_prefix(&root).unwrap_or(&path);
        println!("  {} {}", "created".green(), shown.display());
    }
    Ok(())
}

fn register(options: &mut Options) -> Result<(), TaskError> {
    let root = commons::root(options)?;
    let name = options.require_str("name")?;
    let data = template_data(options)?;
    let store = commons::template_store(options)?;

    let patches = [
        PatchDescriptor {
            file: root.join(COMPOSE_SOURCE_FILENAME),
            tag: COMPOSE_SERVICE_TAG.to_string(),
            template: "patches/compose-service.yml".to_string(),
            data: data.clone(),
            log: format!("{COMPOSE_SOURCE_FILENAME}: service '{name}'"),
        },
        PatchDescriptor {
            file: root.join(NGINX_DIR).join(NGINX_CONFIG_FILENAME),
            tag: NGINX_UPSTREAM_TAG.to_string(),
            template: "patches/nginx-upstream.conf".to_string(),
            data,
            log: format!("{NGINX_DIR}/{NGINX_CONFIG_FILENAME}: upstream '{name}'"),
        },
    ];
    patcher::apply_all(&patches, &store)
}

fn update_env(options: &mut Options) -> Result<(), TaskError> {
    let root = commons::root(options)?;
    let name = options.require_str("name")?;
    let port = options.require_str("port")?;
    let key = port_key(&name);
    env_file::update(&root.join(ENV_FILENAME), &[(key.clone(), port.clone())])?;
    println!("  {} {} ({key}={port})", "updated".green(), ENV_FILENAME);
    Ok(())
}

fn template_data(options: &Options) -> Result<template::TemplateData, TaskError> {
    let name = options.require_str("name")?;
    Ok(template::data([
        ("KEY", commons::env_key(&name)),
        ("port", options.require_str("port")?),
        ("name", name),
    ]))
}

fn port_key(name: &str) -> String {
    format!("{}_PORT", commons::env_key(name))
}

fn used_ports(env: &[(String, String)]) -> Vec<u16> {
    env.iter()
        .filter(|(key, _)| key.ends_with("_PORT"))
        .filter_map(|(_, value)| value.trim().parse().ok())
        .collect()
}

fn next_free_port(taken: &[u16]) -> Result<u16, TaskError> {
    match taken.iter().max() {
        None => Ok(DEFAULT_SERVICE_PORT),
        Some(highest) => highest.checked_add(1).ok_or_else(|| {
            TaskError::InvalidInput("No free port above the ones in .env; pass --port.".to_string())
        }),
    }
}
