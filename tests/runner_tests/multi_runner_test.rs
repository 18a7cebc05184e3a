use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use mockall::{Sequence, mock};
use tempfile::tempdir;

use distestor::app::ApplicationFactory;
use distestor::environment_factory::EnvironmentFactory;
use distestor::error::{BuildError, FactoryError, PreparationError};
use distestor::preparator::EnvironmentPreparator;
use distestor::report::REPORT_FILENAME;
use distestor::test_runner::{MultiTestRunner, RunnerBuilder, TestRunner};
use distestor::test_script::{TestResult, TestResultType, TestScript};

#[derive(Debug)]
pub struct StubEnvironment {
    id: usize,
}

#[derive(Debug)]
pub struct StubApp {
    env_id: usize,
}

mock! {
    pub Factory {}
    impl EnvironmentFactory<StubEnvironment> for Factory {
        fn create(&self) -> Result<Vec<Arc<StubEnvironment>>, FactoryError>;
        fn destroy(&self, envs: &[Arc<StubEnvironment>]);
    }
}

mock! {
    pub Preparator {}
    impl EnvironmentPreparator<StubEnvironment> for Preparator {
        fn prepare(&self, envs: &[Arc<StubEnvironment>]) -> Result<(), PreparationError>;
        fn restore(&self, envs: &[Arc<StubEnvironment>]) -> Result<(), PreparationError>;
        fn clean_all(&self, envs: &[Arc<StubEnvironment>]);
        fn clean_output(&self, envs: &[Arc<StubEnvironment>]);
        fn collect_output(&self, envs: &[Arc<StubEnvironment>], dest_path: &Path);
    }
}

mock! {
    pub AppFactory {}
    impl ApplicationFactory<StubEnvironment, StubApp> for AppFactory {
        fn new_app(&self, env: Arc<StubEnvironment>) -> StubApp;
    }
}

/// Records the environment ids of the apps of every run.
type Runs = Arc<Mutex<Vec<Vec<usize>>>>;

struct StubScript {
    name: String,
    succeed: bool,
    runs: Runs,
}

impl StubScript {
    fn boxed(name: &str, succeed: bool, runs: &Runs) -> Box<dyn TestScript<StubApp>> {
        Box::new(Self {
            name: name.to_string(),
            succeed,
            runs: Arc::clone(runs),
        })
    }
}

impl TestScript<StubApp> for StubScript {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, apps: Vec<StubApp>) -> TestResult {
        self.runs
            .lock()
            .unwrap()
            .push(apps.iter().map(|app| app.env_id).collect());
        if self.succeed {
            TestResult::success(format!("{} worked", self.name))
        } else {
            TestResult::failure(format!("{} broke", self.name))
        }
    }
}

fn environments(count: usize) -> Vec<Arc<StubEnvironment>> {
    (0..count).map(|id| Arc::new(StubEnvironment { id })).collect()
}

fn factory(count: usize, destroys: usize) -> MockFactory {
    let envs = environments(count);
    let mut factory = MockFactory::new();
    factory
        .expect_create()
        .times(1)
        .returning(move || Ok(envs.clone()));
    factory
        .expect_destroy()
        .withf(move |envs| envs.len() == count)
        .times(destroys)
        .return_const(());
    factory
}

fn app_factory() -> MockAppFactory {
    let mut factory = MockAppFactory::new();
    factory
        .expect_new_app()
        .returning(|env| StubApp { env_id: env.id });
    factory
}

/// Expected number of calls of every preparator operation.
struct Calls {
    prepare: usize,
    restore: usize,
    clean_all: usize,
    clean_output: usize,
    collect_output: usize,
}

fn preparator(calls: Calls) -> MockPreparator {
    let mut preparator = MockPreparator::new();
    preparator
        .expect_prepare()
        .times(calls.prepare)
        .returning(|_| Ok(()));
    preparator
        .expect_restore()
        .times(calls.restore)
        .returning(|_| Ok(()));
    preparator
        .expect_clean_all()
        .times(calls.clean_all)
        .return_const(());
    preparator
        .expect_clean_output()
        .times(calls.clean_output)
        .return_const(());
    preparator
        .expect_collect_output()
        .times(calls.collect_output)
        .return_const(());
    preparator
}

fn runner(
    scripts: Vec<Box<dyn TestScript<StubApp>>>,
    factory: MockFactory,
    preparator: MockPreparator,
    should_prepare: bool,
    should_clean: bool,
    report_path: &Path,
) -> MultiTestRunner<StubEnvironment, StubApp> {
    let mut builder = RunnerBuilder::<StubEnvironment, StubApp>::new()
        .environment_factory(Box::new(factory))
        .environment_preparator(Box::new(preparator))
        .application_factory(Box::new(app_factory()))
        .should_prepare(should_prepare)
        .should_clean(should_clean)
        .report_path(report_path);
    for script in scripts {
        builder = builder.script(script);
    }
    builder.build().unwrap()
}

fn two_passing_scripts(runs: &Runs) -> Vec<Box<dyn TestScript<StubApp>>> {
    vec![
        StubScript::boxed("first", true, runs),
        StubScript::boxed("second", true, runs),
    ]
}

#[test_log::test]
fn create_failure_fails_the_run() {
    let reports = tempdir().unwrap();
    let runs = Runs::default();
    let mut factory = MockFactory::new();
    factory
        .expect_create()
        .times(1)
        .returning(|| Err(FactoryError::InvalidConfig("no hosts".to_string())));
    factory.expect_destroy().never();

    let result = runner(
        two_passing_scripts(&runs),
        factory,
        MockPreparator::new(),
        true,
        true,
        reports.path(),
    )
    .run();

    assert_eq!(result.result_type(), TestResultType::Failure);
    assert_eq!(result.description(), "Could not create environments.");
    assert!(runs.lock().unwrap().is_empty());
    assert!(!reports.path().join(REPORT_FILENAME).exists());
}

#[test_log::test]
fn prepare_and_clean_prepares_before_every_script() {
    let reports = tempdir().unwrap();
    let runs = Runs::default();
    let calls = Calls {
        prepare: 2,
        restore: 0,
        clean_all: 2,
        clean_output: 0,
        collect_output: 2,
    };

    let result = runner(
        two_passing_scripts(&runs),
        factory(2, 1),
        preparator(calls),
        true,
        true,
        reports.path(),
    )
    .run();

    assert_eq!(result.description(), "TestRunner has run all tests successfully.");
    assert_eq!(runs.lock().unwrap().len(), 2);
}

#[test_log::test]
fn prepare_without_clean_restores_after_first_script() {
    let reports = tempdir().unwrap();
    let runs = Runs::default();
    let calls = Calls {
        prepare: 1,
        restore: 1,
        clean_all: 0,
        clean_output: 2,
        collect_output: 2,
    };

    let result = runner(
        two_passing_scripts(&runs),
        factory(2, 0),
        preparator(calls),
        true,
        false,
        reports.path(),
    )
    .run();

    assert!(result.is_success());
}

#[test_log::test]
fn clean_without_prepare_only_restores() {
    let reports = tempdir().unwrap();
    let runs = Runs::default();
    let calls = Calls {
        prepare: 0,
        restore: 2,
        clean_all: 0,
        clean_output: 2,
        collect_output: 2,
    };

    let result = runner(
        two_passing_scripts(&runs),
        factory(2, 1),
        preparator(calls),
        false,
        true,
        reports.path(),
    )
    .run();

    assert!(result.is_success());
}

#[test_log::test]
fn neither_prepare_nor_clean_keeps_environments() {
    let reports = tempdir().unwrap();
    let runs = Runs::default();
    let calls = Calls {
        prepare: 0,
        restore: 2,
        clean_all: 0,
        clean_output: 2,
        collect_output: 2,
    };

    let result = runner(
        two_passing_scripts(&runs),
        factory(1, 0),
        preparator(calls),
        false,
        false,
        reports.path(),
    )
    .run();

    assert!(result.is_success());
}

#[test_log::test]
fn failing_script_does_not_stop_the_run() {
    let reports = tempdir().unwrap();
    let runs = Runs::default();
    let scripts = vec![
        StubScript::boxed("A", false, &runs),
        StubScript::boxed("B", true, &runs),
    ];
    let calls = Calls {
        prepare: 2,
        restore: 0,
        clean_all: 2,
        clean_output: 0,
        collect_output: 2,
    };

    let result = runner(
        scripts,
        factory(2, 1),
        preparator(calls),
        true,
        true,
        reports.path(),
    )
    .run();

    assert_eq!(result.result_type(), TestResultType::Failure);
    assert_eq!(result.description(), "Some tests have failed: A");
    assert_eq!(runs.lock().unwrap().len(), 2);
}

#[test_log::test]
fn every_script_gets_one_app_per_environment() {
    let reports = tempdir().unwrap();
    let runs = Runs::default();
    let calls = Calls {
        prepare: 2,
        restore: 0,
        clean_all: 2,
        clean_output: 0,
        collect_output: 2,
    };

    runner(
        two_passing_scripts(&runs),
        factory(3, 1),
        preparator(calls),
        true,
        true,
        reports.path(),
    )
    .run();

    assert_eq!(*runs.lock().unwrap(), vec![vec![0, 1, 2], vec![0, 1, 2]]);
}

#[test_log::test]
fn reports_are_written_per_script_and_in_summary() {
    let reports = tempdir().unwrap();
    let root = reports.path().join("run");
    let runs = Runs::default();
    let scripts = vec![
        StubScript::boxed("A", false, &runs),
        StubScript::boxed("B", true, &runs),
    ];
    let mut preparator = MockPreparator::new();
    preparator.expect_prepare().returning(|_| Ok(()));
    preparator.expect_clean_all().return_const(());
    let expected_a = root.join("A");
    preparator
        .expect_collect_output()
        .withf(move |envs, dest| envs.len() == 2 && dest.to_path_buf() == expected_a)
        .times(1)
        .return_const(());
    let expected_b = root.join("B");
    preparator
        .expect_collect_output()
        .withf(move |_, dest| dest.to_path_buf() == expected_b)
        .times(1)
        .return_const(());

    runner(scripts, factory(2, 1), preparator, true, true, &root).run();

    assert_eq!(
        fs::read_to_string(root.join(REPORT_FILENAME)).unwrap(),
        "[FAILURE] A\n[SUCCESS] B\n"
    );
    assert_eq!(
        fs::read_to_string(root.join("A").join(REPORT_FILENAME)).unwrap(),
        "[FAILURE] A broke\n"
    );
    assert_eq!(
        fs::read_to_string(root.join("B").join(REPORT_FILENAME)).unwrap(),
        "[SUCCESS] B worked\n"
    );
}

#[test_log::test]
fn failed_preparation_skips_the_script_and_prepares_again() {
    let reports = tempdir().unwrap();
    let runs = Runs::default();
    let mut seq = Sequence::new();
    let mut preparator = MockPreparator::new();
    preparator
        .expect_prepare()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(PreparationError::Configuration("port overflow".to_string())));
    preparator
        .expect_prepare()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    preparator
        .expect_collect_output()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    preparator
        .expect_clean_all()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());

    let result = runner(
        two_passing_scripts(&runs),
        factory(3, 1),
        preparator,
        true,
        true,
        reports.path(),
    )
    .run();

    assert_eq!(result.description(), "Some tests have failed: first");
    assert_eq!(runs.lock().unwrap().len(), 1);
    let report = fs::read_to_string(reports.path().join("first").join(REPORT_FILENAME)).unwrap();
    assert!(report.starts_with("[FAILURE] Could not prepare environments for first"));
    assert!(report.contains("port overflow"));
}

#[test_log::test]
fn operations_run_in_order() {
    let reports = tempdir().unwrap();
    let runs = Runs::default();
    let mut seq = Sequence::new();
    let mut factory = MockFactory::new();
    factory
        .expect_create()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(environments(2)));
    let mut preparator = MockPreparator::new();
    preparator
        .expect_prepare()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    preparator
        .expect_collect_output()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    preparator
        .expect_clean_output()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    preparator
        .expect_restore()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    preparator
        .expect_collect_output()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    preparator
        .expect_clean_output()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    factory.expect_destroy().never();

    let result = runner(
        two_passing_scripts(&runs),
        factory,
        preparator,
        true,
        false,
        reports.path(),
    )
    .run();

    assert!(result.is_success());
}

#[test]
fn builder_requires_scripts_and_dependencies() {
    let runs = Runs::default();

    let err = RunnerBuilder::<StubEnvironment, StubApp>::new()
        .environment_factory(Box::new(MockFactory::new()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, BuildError::NoScripts));

    let err = RunnerBuilder::<StubEnvironment, StubApp>::new()
        .script(StubScript::boxed("only", true, &runs))
        .environment_factory(Box::new(MockFactory::new()))
        .environment_preparator(Box::new(MockPreparator::new()))
        .report_path("reports")
        .build()
        .err()
        .unwrap();
    assert!(matches!(
        err,
        BuildError::MissingDependency("application factory")
    ));
}
