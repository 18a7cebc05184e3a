mod cli_test;
mod local_environment_test;
mod multi_runner_test;
