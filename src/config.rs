pub mod cli_args;
pub mod environment_config;
pub mod run_config;
