//! Test scripts and their results.

use std::fmt;

use log::{debug, info, warn};

use crate::app::{App, CommandApp, expand_template};
use crate::test_environment::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestResultType {
    Success,
    Failure,
}

impl fmt::Display for TestResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestResultType::Success => write!(f, "[SUCCESS]"),
            TestResultType::Failure => write!(f, "[FAILURE]"),
        }
    }
}

/// Outcome of a script or of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    result_type: TestResultType,
    description: String,
}

impl TestResult {
    pub fn new(result_type: TestResultType, description: impl Into<String>) -> Self {
        Self {
            result_type,
            description: description.into(),
        }
    }

    pub fn success(description: impl Into<String>) -> Self {
        Self::new(TestResultType::Success, description)
    }

    pub fn failure(description: impl Into<String>) -> Self {
        Self::new(TestResultType::Failure, description)
    }

    pub fn result_type(&self) -> TestResultType {
        self.result_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_success(&self) -> bool {
        self.result_type == TestResultType::Success
    }
}

/// One test scenario over a batch of apps.
///
/// `name` identifies the script in reports and names its report directory.
pub trait TestScript<A> {
    fn name(&self) -> &str;

    fn run(&self, apps: Vec<A>) -> TestResult;
}

/// Starts every app, runs an optional shell check in every environment and shuts the apps
/// down again. The script fails if an app cannot be started or a check exits non-zero.
#[derive(Debug, Clone)]
pub struct CommandScript {
    name: String,
    check: Option<String>,
    start_apps: bool,
}

impl CommandScript {
    pub fn new(name: impl Into<String>, check: Option<String>, start_apps: bool) -> Self {
        Self {
            name: name.into(),
            check,
            start_apps,
        }
    }

    fn run_check<E: Environment + ?Sized>(check: &str, env: &E) -> Result<(), String> {
        let line = expand_template(check, env).map_err(|e| e.to_string())?;
        debug!("Checking environment {}: {line}", env.id());
        let process = env
            .run_command(&["sh", "-c", &line])
            .map_err(|e| format!("`{line}` could not run in environment {}: {e}", env.id()))?;
        match process.wait_for() {
            Ok(0) => Ok(()),
            Ok(code) => Err(format!(
                "`{line}` exited with {code} in environment {}",
                env.id()
            )),
            Err(e) => Err(format!("`{line}` failed in environment {}: {e}", env.id())),
        }
    }
}

impl<E: Environment + ?Sized> TestScript<CommandApp<E>> for CommandScript {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, mut apps: Vec<CommandApp<E>>) -> TestResult {
        info!("Running script {}", self.name);
        let mut failures = Vec::new();

        let mut started = 0;
        if self.start_apps {
            for app in apps.iter_mut() {
                if let Err(e) = app.start_up() {
                    failures.push(format!("could not start {}: {e}", app.name()));
                    break;
                }
                started += 1;
            }
        }

        if failures.is_empty() {
            if let Some(check) = &self.check {
                for app in &apps {
                    if let Err(failure) = Self::run_check(check, app.environment().as_ref()) {
                        failures.push(failure);
                    }
                }
            }
        }

        for app in apps.iter_mut().take(started) {
            if let Err(e) = app.shut_down() {
                warn!("Could not shut down {}: {e}", app.name());
            }
        }

        if failures.is_empty() {
            TestResult::success(format!("{} passed", self.name))
        } else {
            TestResult::failure(failures.join("; "))
        }
    }
}
