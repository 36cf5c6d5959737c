// src/cli/handlers/api.rs

use super::commons::{self, HelpPage, Subtask};
use crate::{
    cli::dispatcher::CommandFuture,
    constants::{ROUTES_DIR, ROUTE_INDEX_TAG, SERVICES_DIR},
    core::{
        options::Options,
        patcher::{self, PatchDescriptor},
        pipeline::Pipeline,
        template,
    },
    errors::TaskError,
};
use colored::Colorize;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;

pub const DESCRIPTION: &str = "Add an API route to a service";

const COMMAND: &str = "api";
const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

lazy_static! {
    static ref ROUTE_RE: Regex =
        Regex::new(r"^/([A-Za-z0-9_:.-]+(/[A-Za-z0-9_:.-]+)*)?$").expect("route regex is valid");
}

static HELP: HelpPage = HelpPage {
    command: COMMAND,
    summary: "Renders a route handler from the `api/route` template into a service and registers it in the service's route index.",
    usage: &["create <service> <route> [--method <method>]"],
    flags: &[
        ("--method <method>", "GET, POST, PUT, PATCH or DELETE (default: GET)"),
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
    Pipeline::new("api create")
        .step("locate platform root", commons::enter_root)
        .step("validate service name", commons::take_name(COMMAND, "service", "service"))
        .step("parse route", parse_route)
        .step("check service exists", ensure_service)
        .step("render route", render_route)
        .step("register route", register_route)
}

fn parse_route(options: &mut Options) -> Result<(), TaskError> {
    let route = options.shift_required(COMMAND, "route")?;
    if !ROUTE_RE.is_match(&route) {
        return Err(TaskError::usage(
            COMMAND,
            format!("'{route}' is not a route path such as /users/:id"),
        ));
    }

    let method = options
        .get_str("method")
        .unwrap_or_else(|| "GET".to_string())
        .to_uppercase();
    if !METHODS.contains(&method.as_str()) {
        return Err(TaskError::usage(
            COMMAND,
            format!("unsupported method '{method}'"),
        ));
    }

    options.set("slug", slug(&method, &route));
    options.set("route", route);
    options.set("method", method);
    Ok(())
}

fn ensure_service(options: &mut Options) -> Result<(), TaskError> {
    let dir = routes_dir(options)?;
    if !dir.is_dir() {
        return Err(TaskError::InvalidInput(format!(
            "Service '{}' has no '{ROUTES_DIR}' directory. Create it with `service create` first.",
            options.require_str("service")?
        )));
    }
    Ok(())
}

fn render_route(options: &mut Options) -> Result<(), TaskError> {
    let extension = commons::config(options)?.api.route_extension;
    let store = commons::template_store(options)?;
    let dest = routes_dir(options)?.join(format!("{}.{extension}", options.require_str("slug")?));

    store.render_to(&format!("api/route.{extension}"), &dest, &template_data(options)?)?;
    let root = commons::root(options)?;
    println!(
        "  {} {}",
        "created".green(),
        dest.strip_prefix(&root).unwrap_or(&dest).display()
    );
    Ok(())
}

fn register_route(options: &mut Options) -> Result<(), TaskError> {
    let extension = commons::config(options)?.api.route_extension;
    let store = commons::template_store(options)?;
    let index = format!("index.{extension}");

    let patch = PatchDescriptor {
        file: routes_dir(options)?.join(&index),
        tag: ROUTE_INDEX_TAG.to_string(),
        template: format!("patches/route-index.{extension}"),
        data: template_data(options)?,
        log: format!(
            "{}/{ROUTES_DIR}/{index}: {} {}",
            options.require_str("service")?,
            options.require_str("method")?,
            options.require_str("route")?
        ),
    };
    patcher::apply_all(&[patch], &store)
}

fn routes_dir(options: &Options) -> Result<PathBuf, TaskError> {
    Ok(commons::root(options)?
        .join(SERVICES_DIR)
        .join(options.require_str("service")?)
        .join(ROUTES_DIR))
}

fn template_data(options: &Options) -> Result<template::TemplateData, TaskError> {
    let method = options.require_str("method")?;
    Ok(template::data([
        ("service", options.require_str("service")?),
        ("route", options.require_str("route")?),
        ("slug", options.require_str("slug")?),
        ("method_lower", method.to_lowercase()),
        ("method", method),
    ]))
}

/// `GET /users/:id` → `get-users-id`.
fn slug(method: &str, route: &str) -> String {
    let parts: Vec<String> = route
        .split('/')
        .map(|segment| {
            segment
                .trim_start_matches(':')
                .to_lowercase()
                .replace(['.', '_'], "-")
        })
        .filter(|segment| !segment.is_empty())
        .collect();
    let path = if parts.is_empty() { "index".to_string() } else { parts.join("-") };
    format!("{}-{path}", method.to_lowercase())
}
