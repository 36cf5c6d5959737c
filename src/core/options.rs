// src/core/options.rs

use crate::errors::TaskError;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

/// Flags that never take a value, even when followed by a positional.
const SWITCHES: &[&str] = &["help", "yes", "no-pull", "verbose"];

/// The mutable context threaded through one pipeline invocation.
///
/// It holds the parsed `--flag` values, a queue of positional arguments that
/// steps consume from the front, and intermediate results written by earlier
/// steps for later ones. An `Options` value is owned by exactly one command
/// invocation and is never shared.
#[derive(Debug, Default, Clone)]
pub struct Options {
    values: BTreeMap<String, Value>,
    positionals: VecDeque<String>,
}

impl Options {
    /// Parses a raw argument list.
    ///
    /// `--key value` and `--key=value` set a string, a bare `--flag` (followed by
    /// another flag or nothing, or listed in `SWITCHES`) sets `true`, `--` ends
    /// flag parsing, and everything else is queued as positional.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut options = Self::default();
        let mut iter = args.into_iter().map(Into::into).peekable();
        let mut only_positionals = false;

        while let Some(arg) = iter.next() {
            if only_positionals {
                options.positionals.push_back(arg);
                continue;
            }
            if arg == "--" {
                only_positionals = true;
                continue;
            }
            let Some(flag) = arg.strip_prefix("--").filter(|f| !f.is_empty()) else {
                options.positionals.push_back(arg);
                continue;
            };

            if let Some((key, value)) = flag.split_once('=') {
                options.set(key, value);
                continue;
            }

            let takes_value = !SWITCHES.contains(&flag)
                && iter.peek().is_some_and(|next| !next.starts_with("--"));
            match iter.next_if(|_| takes_value) {
                Some(value) => options.set(flag, value),
                None => options.set(flag, true),
            }
        }
        options
    }

    /// Removes and returns the next positional argument.
    pub fn shift(&mut self) -> Option<String> {
        self.positionals.pop_front()
    }

    /// Like `shift`, but a missing argument is a usage error for `command`.
    pub fn shift_required(&mut self, command: &str, what: &str) -> Result<String, TaskError> {
        self.shift()
            .ok_or_else(|| TaskError::usage(command, format!("missing <{what}> argument")))
    }

    pub fn positionals(&self) -> impl Iterator<Item = &str> {
        self.positionals.iter().map(String::as_str)
    }

    /// Stores `value` under `key`. Null values are ignored so that a key set by
    /// an earlier step is never replaced by an absent one.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if value.is_null() {
            log::debug!("Ignoring null value for option '{key}'.");
            return;
        }
        self.values.insert(key.to_string(), value);
    }

    /// Stores `value` only when it is present.
    pub fn set_opt<V: Into<Value>>(&mut self, key: &str, value: Option<V>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    /// Appends `value` to the list stored under `key`, creating it if needed.
    pub fn append(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.values.get_mut(key) {
            Some(Value::Array(list)) => list.push(value),
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, value]);
            }
            None => {
                self.values.insert(key.to_string(), Value::Array(vec![value]));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the value as a string. Numbers and booleans are rendered.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// A flag is on when it was given bare or with a truthy value.
    pub fn get_bool(&self, key: &str) -> bool {
        match self.values.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.as_str(), "true" | "yes" | "1"),
            _ => false,
        }
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.values.get(key) {
            Some(Value::Array(list)) => list
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Returns the string stored by an earlier step, failing when it is absent.
    pub fn require_str(&self, key: &str) -> Result<String, TaskError> {
        self.get_str(key).ok_or_else(|| {
            TaskError::InvalidInput(format!("Internal error: option '{key}' was not set."))
        })
    }

    /// Whether `--help` was passed.
    pub fn wants_help(&self) -> bool {
        self.get_bool("help")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags_and_positionals() {
        let mut options =
            Options::from_args(["create", "billing", "--port", "8081", "--yes", "--method=POST"]);

        assert_eq!(options.get_str("port").as_deref(), Some("8081"));
        assert!(options.get_bool("yes"));
        assert_eq!(options.get_str("method").as_deref(), Some("POST"));
        assert_eq!(options.shift().as_deref(), Some("create"));
        assert_eq!(options.shift().as_deref(), Some("billing"));
        assert_eq!(options.shift(), None);
    }

    #[test]
    fn test_switches_never_take_values() {
        let mut options = Options::from_args(["--help", "create"]);
        assert!(options.wants_help());
        assert_eq!(options.shift().as_deref(), Some("create"));

        let options = Options::from_args(["--email", "ops@example.com"]);
        assert_eq!(options.get_str("email").as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn test_double_dash_stops_flag_parsing() {
        let mut options = Options::from_args(["--", "--not-a-flag"]);
        assert_eq!(options.shift().as_deref(), Some("--not-a-flag"));
        assert!(!options.contains("not-a-flag"));
    }

    #[test]
    fn test_null_never_overwrites() {
        let mut options = Options::default();
        options.set("root", "/srv/platform");
        options.set("root", Value::Null);
        options.set_opt::<String>("root", None);
        assert_eq!(options.get_str("root").as_deref(), Some("/srv/platform"));
    }

    #[test]
    fn test_append_builds_lists() {
        let mut options = Options::default();
        options.append("trace", "a");
        options.append("trace", "b");
        assert_eq!(options.get_list("trace"), vec!["a", "b"]);

        options.set("single", "x");
        options.append("single", "y");
        assert_eq!(options.get_list("single"), vec!["x", "y"]);
    }

    #[test]
    fn test_shift_required_is_usage_error() {
        let mut options = Options::default();
        let err = options.shift_required("service", "name").unwrap_err();
        assert!(err.is_handled());
    }
}
