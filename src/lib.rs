//! Distestor runs functional tests of a distributed application across a batch of
//! execution environments: local temporary directories or hosts reachable over SSH.
//!
//! The [`test_runner::MultiTestRunner`] creates the environments, prepares them, binds one
//! [`app::App`] per environment for every [`test_script::TestScript`], collects output and
//! writes reports. Commands on environments run through [`connection::RemoteProcess`]
//! handles.

pub mod app;
pub mod config;
pub mod connection;
pub mod environment_factory;
pub mod error;
pub mod preparator;
pub mod report;
pub mod test_environment;
pub mod test_runner;
pub mod test_script;
pub mod utils;
