// src/core/pipeline.rs

use crate::{core::options::Options, errors::TaskError};
use colored::Colorize;
use std::{fmt, future::Future, pin::Pin};

/// The future returned by an asynchronous step.
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'a>>;

/// An asynchronous step: a plain function borrowing the options for the
/// duration of its future.
pub type AsyncStepFn = for<'a> fn(&'a mut Options) -> StepFuture<'a>;

type SyncStepFn = Box<dyn Fn(&mut Options) -> Result<(), TaskError> + Send + Sync>;

enum StepAction {
    Sync(SyncStepFn),
    Async(AsyncStepFn),
}

struct Step {
    name: &'static str,
    action: StepAction,
}

/// An ordered list of steps that run one at a time.
///
/// A step runs only after the previous one finished without error. The first
/// failing step stops the pipeline and its error becomes the pipeline's
/// outcome; nothing after it runs.
pub struct Pipeline {
    name: String,
    steps: Vec<Step>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish()
    }
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a synchronous step.
    pub fn step<F>(mut self, name: &'static str, action: F) -> Self
    where
        F: Fn(&mut Options) -> Result<(), TaskError> + Send + Sync + 'static,
    {
        self.steps.push(Step {
            name,
            action: StepAction::Sync(Box::new(action)),
        });
        self
    }

    /// Appends an asynchronous step.
    pub fn step_async(mut self, name: &'static str, action: AsyncStepFn) -> Self {
        self.steps.push(Step {
            name,
            action: StepAction::Async(action),
        });
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name).collect()
    }

    /// Runs every step in registration order against `options`.
    pub async fn run(&self, options: &mut Options) -> Result<(), TaskError> {
        log::debug!("Pipeline '{}' starting ({} steps).", self.name, self.steps.len());

        for (i, step) in self.steps.iter().enumerate() {
            log::debug!("[{}] step {}/{}: {}", self.name, i + 1, self.steps.len(), step.name);
            println!("{} {}", "→".blue(), step.name.dimmed());

            let outcome = match &step.action {
                StepAction::Sync(action) => action(&mut *options),
                StepAction::Async(action) => action(&mut *options).await,
            };

            if let Err(e) = outcome {
                log::debug!("[{}] step '{}' failed: {}", self.name, step.name, e);
                return Err(e);
            }
        }

        log::debug!("Pipeline '{}' finished.", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    fn recording(
        trace: &Trace,
        name: &'static str,
    ) -> impl Fn(&mut Options) -> Result<(), TaskError> + Send + Sync + 'static {
        let trace = Arc::clone(trace);
        move |_: &mut Options| {
            trace.lock().unwrap().push(name);
            Ok(())
        }
    }

    fn failing(
        trace: &Trace,
        name: &'static str,
    ) -> impl Fn(&mut Options) -> Result<(), TaskError> + Send + Sync + 'static {
        let trace = Arc::clone(trace);
        move |_: &mut Options| {
            trace.lock().unwrap().push(name);
            Err(TaskError::InvalidInput(format!("{name} failed")))
        }
    }

    fn mark_async(options: &mut Options) -> StepFuture<'_> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            options.append("trace", "async");
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_all_steps_run_in_order() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new("ok")
            .step("one", recording(&trace, "one"))
            .step("two", recording(&trace, "two"))
            .step("three", recording(&trace, "three"));

        let mut options = Options::default();
        pipeline.run(&mut options).await.unwrap();
        assert_eq!(*trace.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_pipeline() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new("abort")
            .step("one", recording(&trace, "one"))
            .step("two", failing(&trace, "two"))
            .step("three", recording(&trace, "three"))
            .step("four", failing(&trace, "four"));

        let mut options = Options::default();
        let err = pipeline.run(&mut options).await.unwrap_err();

        assert_eq!(*trace.lock().unwrap(), vec!["one", "two"]);
        assert_eq!(err.to_string(), "two failed");
    }

    #[tokio::test]
    async fn test_async_steps_share_options_with_sync_steps() {
        let pipeline = Pipeline::new("mixed")
            .step("first", |options: &mut Options| {
                options.append("trace", "sync");
                Ok(())
            })
            .step_async("second", mark_async)
            .step("third", |options: &mut Options| {
                options.append("trace", "sync-again");
                Ok(())
            });

        let mut options = Options::default();
        pipeline.run(&mut options).await.unwrap();
        assert_eq!(options.get_list("trace"), vec!["sync", "async", "sync-again"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_resolves() {
        let mut options = Options::default();
        assert!(Pipeline::new("empty").run(&mut options).await.is_ok());
    }
}
