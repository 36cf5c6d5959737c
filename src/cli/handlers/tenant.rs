// src/cli/handlers/tenant.rs

use super::commons::{self, HelpPage, Subtask};
use crate::{
    cli::dispatcher::CommandFuture,
    constants::{DATA_DIR, SITE_USER_SEED_FILENAME, SITE_USER_TAG, TENANT_SEED_FILENAME, TENANT_TAG},
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
use uuid::Uuid;

pub const DESCRIPTION: &str = "Seed a new tenant and its first site user";

const COMMAND: &str = "tenant";
const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^@\s']+@[^@\s']+\.[^@\s']+$").expect("email regex is valid");
}

static HELP: HelpPage = HelpPage {
    command: COMMAND,
    summary: "Adds a tenant and its administrator account to the database seed files. Missing values are asked for interactively.",
    usage: &["create <name> [--email <email>] [--password <password>] [--yes]"],
    flags: &[
        ("--email <email>", "Email of the tenant's first site user"),
        ("--password <password>", "Password of the first site user"),
        ("--yes", "Do not ask for confirmation"),
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
    Pipeline::new("tenant create")
        .step("locate platform root", commons::enter_root)
        .step("collect tenant details", collect)
        .step("confirm", confirm)
        .step("generate credentials", generate_credentials)
        .step("patch seed data", patch_seeds)
}

/// Fills `tenant_name`, `email` and `password` from arguments, prompting for
/// whatever is missing when running in a terminal.
fn collect(options: &mut Options) -> Result<(), TaskError> {
    let interactive = commons::is_interactive();

    let name = match options.shift() {
        Some(name) => name,
        None if interactive => commons::prompt_text("Tenant name", None)?,
        None => return Err(TaskError::usage(COMMAND, "missing <name> argument")),
    };
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(TaskError::InvalidInput("The tenant name cannot be empty.".to_string()));
    }

    let email = match options.get_str("email") {
        Some(email) => email,
        None if interactive => commons::prompt_text("Admin email", None)?,
        None => return Err(TaskError::usage(COMMAND, "missing --email")),
    };
    validate_email(&email)?;

    let password = match options.get_str("password") {
        Some(password) => password,
        None if interactive => commons::prompt_password("Admin password")?,
        None => return Err(TaskError::usage(COMMAND, "missing --password")),
    };
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(TaskError::InvalidInput(format!(
            "The password must be at least {MIN_PASSWORD_LEN} characters long."
        )));
    }

    options.set("tenant_name", name);
    options.set("email", email.trim());
    options.set("password", password);
    Ok(())
}

fn confirm(options: &mut Options) -> Result<(), TaskError> {
    if options.get_bool("yes") || !commons::is_interactive() {
        return Ok(());
    }
    let prompt = format!(
        "Create tenant '{}' with admin '{}'?",
        options.require_str("tenant_name")?,
        options.require_str("email")?
    );
    if commons::confirm(&prompt)? {
        Ok(())
    } else {
        Err(TaskError::InvalidInput("Tenant creation aborted.".to_string()))
    }
}

fn generate_credentials(options: &mut Options) -> Result<(), TaskError> {
    let password = options.require_str("password")?;
    let salt = Uuid::new_v4().simple().to_string();

    options.set("tenant_id", Uuid::new_v4().to_string());
    options.set("user_id", Uuid::new_v4().to_string());
    options.set("password_hash", hash_password(&password, &salt));
    Ok(())
}

fn patch_seeds(options: &mut Options) -> Result<(), TaskError> {
    let data_dir = commons::root(options)?.join(DATA_DIR);
    let store = commons::template_store(options)?;
    let tenant_name = options.require_str("tenant_name")?;
    let data = template::data([
        ("tenant_id", options.require_str("tenant_id")?),
        ("tenant_name", sql_escape(&tenant_name)),
        ("tenant_slug", slug(&tenant_name)),
        ("user_id", options.require_str("user_id")?),
        ("email", sql_escape(&options.require_str("email")?)),
        ("password_hash", options.require_str("password_hash")?),
    ]);

    let patches = [
        PatchDescriptor {
            file: data_dir.join(TENANT_SEED_FILENAME),
            tag: TENANT_TAG.to_string(),
            template: "patches/tenant.sql".to_string(),
            data: data.clone(),
            log: format!("{DATA_DIR}/{TENANT_SEED_FILENAME}: tenant '{tenant_name}'"),
        },
        PatchDescriptor {
            file: data_dir.join(SITE_USER_SEED_FILENAME),
            tag: SITE_USER_TAG.to_string(),
            template: "patches/site-user.sql".to_string(),
            data,
            log: format!("{DATA_DIR}/{SITE_USER_SEED_FILENAME}: admin user"),
        },
    ];
    patcher::apply_all(&patches, &store)?;
    println!("  tenant id: {}", options.require_str("tenant_id")?.cyan());
    Ok(())
}

fn validate_email(email: &str) -> Result<(), TaskError> {
    if EMAIL_RE.is_match(email.trim()) {
        Ok(())
    } else {
        Err(TaskError::InvalidInput(format!("'{email}' is not a valid email address.")))
    }
}

/// Salted digest stored as `blake3$<salt>$<hex>`.
fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("blake3${salt}${}", hasher.finalize().to_hex())
}

fn sql_escape(value: &str) -> String {
    value.replace('\'', "''")
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::handlers::commons::fixtures;
    use std::fs;

    #[test]
    fn test_hash_password_is_salted_and_stable() {
        let a = hash_password("correct horse", "salt1");
        assert_eq!(a, hash_password("correct horse", "salt1"));
        assert_ne!(a, hash_password("correct horse", "salt2"));
        assert!(a.starts_with("blake3$salt1$"));
        assert_eq!(a.len(), "blake3$salt1$".len() + 64);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(sql_escape("O'Brien"), "O''Brien");
        assert_eq!(slug("Acme Corp. (EU)"), "acme-corp-eu");
        assert!(validate_email("admin@acme.io").is_ok());
        assert!(validate_email("admin").is_err());
    }

    #[test]
    fn test_create_patches_both_seed_files() {
        let platform = fixtures::platform();
        let root = platform.path();
        let mut options = fixtures::options_at(
            root,
            &["O'Neil Labs", "--email", "admin@oneil.io", "--password", "s3cret-pass", "--yes"],
        );

        collect(&mut options).unwrap();
        confirm(&mut options).unwrap();
        generate_credentials(&mut options).unwrap();
        patch_seeds(&mut options).unwrap();

        let tenant_id = options.require_str("tenant_id").unwrap();
        let tenants = fs::read_to_string(root.join("data").join(TENANT_SEED_FILENAME)).unwrap();
        assert_eq!(
            tenants,
            format!("-- tenants\n{TENANT_TAG}\nINSERT INTO tenants (id, name) VALUES ('{tenant_id}', 'O''Neil Labs');\n")
        );

        let users = fs::read_to_string(root.join("data").join(SITE_USER_SEED_FILENAME)).unwrap();
        let lines: Vec<&str> = users.lines().collect();
        assert_eq!(lines[1], SITE_USER_TAG);
        assert!(lines[2].contains(&format!("'{tenant_id}', 'admin@oneil.io', 'blake3$")));
        assert!(!users.contains("s3cret-pass"));
    }

    #[test]
    fn test_short_password_is_rejected() {
        let platform = fixtures::platform();
        let mut options = fixtures::options_at(
            platform.path(),
            &["Acme", "--email", "a@acme.io", "--password", "short"],
        );
        assert!(matches!(collect(&mut options), Err(TaskError::InvalidInput(_))));
    }
}
