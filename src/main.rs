use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use env_logger::Env;
use log::{error, info};

use distestor::app::{CommandApp, CommandAppFactory};
use distestor::config::cli_args::CliArgs;
use distestor::config::run_config::RunConfig;
use distestor::environment_factory::factory_from_config;
use distestor::preparator::FilePreparator;
use distestor::test_environment::Environment;
use distestor::test_runner::{MultiTestRunner, RunnerBuilder, TestRunner};
use distestor::test_script::{CommandScript, TestResultType};

/// 配置错误时的退出码
const CONFIG_ERROR: u8 = 2;

type Runner = MultiTestRunner<dyn Environment, CommandApp<dyn Environment>>;

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports").join(Local::now().format("%Y%m%d-%H%M%S").to_string())
}

/// 根据配置文件和命令行参数组装运行器
fn build_runner(args: &CliArgs) -> Result<Runner> {
    let mut config = RunConfig::from_file(&args.config)
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("无法读取配置文件 {}", args.config.display()))?;
    config.retain_scripts(&args.scripts);

    let report_dir = args
        .report_dir
        .clone()
        .or_else(|| config.report_dir.clone())
        .unwrap_or_else(default_report_dir);
    let should_prepare = config.should_prepare && !args.skip_prepare;
    let should_clean = config.should_clean && !args.keep_environments;

    let mut builder = RunnerBuilder::<dyn Environment, CommandApp<dyn Environment>>::new()
        .environment_factory(factory_from_config(&config.environment)?)
        .environment_preparator(Box::new(FilePreparator::from_config(&config.preparator)))
        .application_factory(Box::new(CommandAppFactory::new(config.app.command.clone())))
        .should_prepare(should_prepare)
        .should_clean(should_clean)
        .report_path(&report_dir);
    for script in &config.scripts {
        builder = builder.script(Box::new(CommandScript::new(
            script.name.clone(),
            script.command.clone(),
            script.start_apps,
        )));
    }

    let runner = builder.build().context("无法创建测试运行器")?;
    info!(
        "报告目录: {} (prepare={should_prepare}, clean={should_clean})",
        report_dir.display()
    );
    Ok(runner)
}

fn main() -> ExitCode {
    let args = CliArgs::parse_args();
    env_logger::Builder::from_env(Env::default().default_filter_or(args.get_log_level())).init();

    let runner = match build_runner(&args) {
        Ok(runner) => runner,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(CONFIG_ERROR);
        }
    };

    let result = runner.run();
    match result.result_type() {
        TestResultType::Success => {
            info!("{}", result.description());
            ExitCode::SUCCESS
        }
        TestResultType::Failure => {
            error!("{}", result.description());
            ExitCode::FAILURE
        }
    }
}
