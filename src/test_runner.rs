//! Orchestration of a whole test run.
//!
//! [`MultiTestRunner`] creates one environment batch and runs every script against it in
//! order. For each script it prepares or restores the batch, binds fresh apps, runs the
//! script, collects output, appends reports and optionally cleans. A failing script never
//! stops the remaining scripts.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::app::ApplicationFactory;
use crate::environment_factory::EnvironmentFactory;
use crate::error::BuildError;
use crate::preparator::EnvironmentPreparator;
use crate::report::ReportWriter;
use crate::test_script::{TestResult, TestScript};

pub trait TestRunner {
    fn run(&self) -> TestResult;
}

/// Renders an error together with its sources, outermost first.
fn error_chain(e: &dyn Error) -> String {
    let mut chain = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

/// Runs several scripts against one environment batch.
pub struct MultiTestRunner<E: ?Sized, A> {
    scripts: Vec<Box<dyn TestScript<A>>>,
    environment_factory: Box<dyn EnvironmentFactory<E>>,
    environment_preparator: Box<dyn EnvironmentPreparator<E>>,
    application_factory: Box<dyn ApplicationFactory<E, A>>,
    should_prepare: bool,
    should_clean: bool,
    reports: ReportWriter,
}

impl<E: ?Sized, A> MultiTestRunner<E, A> {
    pub fn new(
        scripts: Vec<Box<dyn TestScript<A>>>,
        environment_factory: Box<dyn EnvironmentFactory<E>>,
        environment_preparator: Box<dyn EnvironmentPreparator<E>>,
        application_factory: Box<dyn ApplicationFactory<E, A>>,
        should_prepare: bool,
        should_clean: bool,
        report_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            scripts,
            environment_factory,
            environment_preparator,
            application_factory,
            should_prepare,
            should_clean,
            reports: ReportWriter::new(report_path),
        }
    }

    /// Runs one script; `needs_prepare` tells whether the batch must be fully prepared
    /// and is updated for the next script.
    fn run_script(
        &self,
        script: &dyn TestScript<A>,
        envs: &[Arc<E>],
        needs_prepare: &mut bool,
    ) -> TestResult {
        let name = script.name();
        let prepared = if *needs_prepare {
            debug!("run(): Preparing environments for {name}.");
            self.environment_preparator.prepare(envs)
        } else {
            debug!("run(): Restoring environments for {name}.");
            self.environment_preparator.restore(envs)
        };

        let ran = prepared.is_ok();
        let result = match prepared {
            Err(e) => {
                let reason = format!(
                    "Could not prepare environments for {name}: {}",
                    error_chain(&e)
                );
                error!("run(): {reason}");
                TestResult::failure(reason)
            }
            Ok(()) => {
                *needs_prepare = false;
                let apps = envs
                    .iter()
                    .map(|env| self.application_factory.new_app(Arc::clone(env)))
                    .collect();

                info!("run(): Running test {name}.");
                let result = script.run(apps);
                info!("run(): Test {name} has ended with {}.", result.result_type());

                debug!("run(): Collecting output and log files.");
                self.environment_preparator
                    .collect_output(envs, &self.reports.script_dir(name));
                result
            }
        };

        if let Err(e) = self.reports.append_summary(name, &result) {
            warn!("run(): Could not append to summary report file: {e}");
        }
        if let Err(e) = self.reports.append_script_report(name, &result) {
            warn!("run(): Could not append to report file of {name}: {e}");
        }

        // Nothing ran when preparation failed, and prepare() cleans up after itself.
        if !ran {
            return result;
        }
        if self.should_prepare && self.should_clean {
            debug!("run(): Cleaning environments.");
            self.environment_preparator.clean_all(envs);
            *needs_prepare = true;
        } else {
            debug!("run(): Cleaning output files.");
            self.environment_preparator.clean_output(envs);
        }
        result
    }
}

impl<E: ?Sized, A> TestRunner for MultiTestRunner<E, A> {
    fn run(&self) -> TestResult {
        info!("run()");

        debug!("run(): Creating environments.");
        let envs = match self.environment_factory.create() {
            Ok(envs) => envs,
            Err(e) => {
                error!("run(): Could not create environments: {}", error_chain(&e));
                return TestResult::failure("Could not create environments.");
            }
        };

        let mut needs_prepare = self.should_prepare;
        let mut failed_scripts = Vec::new();
        for script in &self.scripts {
            let result = self.run_script(script.as_ref(), &envs, &mut needs_prepare);
            if !result.is_success() {
                failed_scripts.push(script.name().to_string());
            }
        }

        if self.should_clean {
            debug!("run(): Destroying environments.");
            self.environment_factory.destroy(&envs);
        }

        if failed_scripts.is_empty() {
            TestResult::success("TestRunner has run all tests successfully.")
        } else {
            TestResult::failure(format!(
                "Some tests have failed: {}",
                failed_scripts.join(" ")
            ))
        }
    }
}

/// Assembles a [`MultiTestRunner`]. Preparation and cleaning default to `true`.
pub struct RunnerBuilder<E: ?Sized, A> {
    scripts: Vec<Box<dyn TestScript<A>>>,
    environment_factory: Option<Box<dyn EnvironmentFactory<E>>>,
    environment_preparator: Option<Box<dyn EnvironmentPreparator<E>>>,
    application_factory: Option<Box<dyn ApplicationFactory<E, A>>>,
    should_prepare: bool,
    should_clean: bool,
    report_path: Option<PathBuf>,
}

impl<E: ?Sized, A> Default for RunnerBuilder<E, A> {
    fn default() -> Self {
        Self {
            scripts: Vec::new(),
            environment_factory: None,
            environment_preparator: None,
            application_factory: None,
            should_prepare: true,
            should_clean: true,
            report_path: None,
        }
    }
}

impl<E: ?Sized, A> RunnerBuilder<E, A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, script: Box<dyn TestScript<A>>) -> Self {
        self.scripts.push(script);
        self
    }

    pub fn environment_factory(mut self, factory: Box<dyn EnvironmentFactory<E>>) -> Self {
        self.environment_factory = Some(factory);
        self
    }

    pub fn environment_preparator(
        mut self,
        preparator: Box<dyn EnvironmentPreparator<E>>,
    ) -> Self {
        self.environment_preparator = Some(preparator);
        self
    }

    pub fn application_factory(mut self, factory: Box<dyn ApplicationFactory<E, A>>) -> Self {
        self.application_factory = Some(factory);
        self
    }

    pub fn should_prepare(mut self, should: bool) -> Self {
        self.should_prepare = should;
        self
    }

    pub fn should_clean(mut self, should: bool) -> Self {
        self.should_clean = should;
        self
    }

    pub fn report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<MultiTestRunner<E, A>, BuildError> {
        if self.scripts.is_empty() {
            return Err(BuildError::NoScripts);
        }
        Ok(MultiTestRunner::new(
            self.scripts,
            self.environment_factory
                .ok_or(BuildError::MissingDependency("environment factory"))?,
            self.environment_preparator
                .ok_or(BuildError::MissingDependency("environment preparator"))?,
            self.application_factory
                .ok_or(BuildError::MissingDependency("application factory"))?,
            self.should_prepare,
            self.should_clean,
            self.report_path
                .ok_or(BuildError::MissingDependency("report path"))?,
        ))
    }
}
