//! Proxies for instances of the application under test.
//!
//! Apps are bound to one environment and created fresh for every script.

use std::sync::Arc;

use log::{debug, info, warn};
use regex::Regex;

use crate::connection::RemoteProcess;
use crate::error::{AppError, CommandError};
use crate::test_environment::Environment;

/// One instance of the application under test.
pub trait App: Send {
    type Env: ?Sized;

    fn id(&self) -> usize;

    fn name(&self) -> String;

    fn environment(&self) -> &Arc<Self::Env>;

    fn start_up(&mut self) -> Result<(), AppError>;

    fn shut_down(&mut self) -> Result<(), AppError>;
}

/// Binds a new app to an environment.
pub trait ApplicationFactory<E: ?Sized, A> {
    fn new_app(&self, env: Arc<E>) -> A;
}

const PLACEHOLDER: &str = r"\{([A-Za-z0-9_.-]+)\}";

/// Expands `{id}`, `{hostname}`, `{name}` and `{<property>}` placeholders.
///
/// # Errors
///
/// Returns [`AppError::Template`] for a placeholder naming a property that is absent or has
/// no textual form.
pub fn expand_template<E: Environment + ?Sized>(template: &str, env: &E) -> Result<String, AppError> {
    let placeholder = Regex::new(PLACEHOLDER).map_err(|e| AppError::Template(e.to_string()))?;

    let mut expanded = String::with_capacity(template.len());
    let mut last = 0;
    for caps in placeholder.captures_iter(template) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        expanded.push_str(&template[last..whole.start()]);
        let value = match key.as_str() {
            "id" => env.id().to_string(),
            "hostname" => env.hostname(),
            "name" => env.name(),
            key => env.properties().render(key).ok_or_else(|| {
                AppError::Template(format!("environment {} has no property `{key}`", env.id()))
            })?,
        };
        expanded.push_str(&value);
        last = whole.end();
    }
    expanded.push_str(&template[last..]);
    Ok(expanded)
}

/// App started by a shell command line in its environment's home.
///
/// Without a command line the app only tracks its lifecycle state.
pub struct CommandApp<E: Environment + ?Sized> {
    env: Arc<E>,
    template: Option<String>,
    running: bool,
    process: Option<Box<dyn RemoteProcess>>,
}

impl<E: Environment + ?Sized> CommandApp<E> {
    pub fn new(env: Arc<E>, template: Option<String>) -> Self {
        Self {
            env,
            template,
            running: false,
            process: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl<E: Environment + ?Sized> App for CommandApp<E> {
    type Env = E;

    fn id(&self) -> usize {
        self.env.id()
    }

    fn name(&self) -> String {
        format!("app-{}@{}", self.env.id(), self.env.hostname())
    }

    fn environment(&self) -> &Arc<E> {
        &self.env
    }

    fn start_up(&mut self) -> Result<(), AppError> {
        if self.running {
            return Err(AppError::AlreadyRunning);
        }
        if let Some(template) = &self.template {
            let line = expand_template(template, self.env.as_ref())?;
            info!("Starting {}: {line}", self.name());
            self.process = Some(self.env.run_command_asynchronously(&["sh", "-c", &line])?);
        }
        self.running = true;
        Ok(())
    }

    fn shut_down(&mut self) -> Result<(), AppError> {
        if !self.running {
            return Err(AppError::NotStarted);
        }
        self.running = false;
        let Some(process) = self.process.take() else {
            return Ok(());
        };

        info!("Shutting down {}", self.name());
        process.destroy();
        match process.wait_for() {
            Ok(code) => {
                debug!("{} exited with {code}", self.name());
                Ok(())
            }
            Err(CommandError::Destroyed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl<E: Environment + ?Sized> Drop for CommandApp<E> {
    fn drop(&mut self) {
        if let Some(process) = self.process.take() {
            warn!("{} dropped while running, destroying it", self.name());
            process.destroy();
        }
    }
}

/// Creates [`CommandApp`]s sharing one command template.
#[derive(Debug, Clone, Default)]
pub struct CommandAppFactory {
    template: Option<String>,
}

impl CommandAppFactory {
    pub fn new(template: Option<String>) -> Self {
        Self { template }
    }
}

impl<E: Environment + ?Sized> ApplicationFactory<E, CommandApp<E>> for CommandAppFactory {
    fn new_app(&self, env: Arc<E>) -> CommandApp<E> {
        CommandApp::new(env, self.template.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_environment::LocalEnvironment;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    #[test]
    fn expands_identity_and_properties() {
        let env = LocalEnvironment::new(2, "/tmp/distestor-env");
        env.properties().set("port", 10_002u16);

        let line = expand_template("./app --id {id} --host {hostname} --port {port} {x", &env)
            .unwrap();
        assert_eq!(line, "./app --id 2 --host localhost --port 10002 {x");
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let env = LocalEnvironment::new(0, "/tmp/distestor-env");
        assert!(matches!(
            expand_template("./app --port {port}", &env),
            Err(AppError::Template(_))
        ));
    }

    #[test]
    fn lifecycle_guards() {
        let dir = tempdir().unwrap();
        let env = Arc::new(LocalEnvironment::new(0, dir.path()));
        let mut app = CommandAppFactory::new(Some("sleep 30".to_string())).new_app(env);

        assert!(matches!(app.shut_down(), Err(AppError::NotStarted)));
        app.start_up().unwrap();
        assert!(app.is_running());
        assert!(matches!(app.start_up(), Err(AppError::AlreadyRunning)));

        let started = Instant::now();
        app.shut_down().unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!app.is_running());
        assert!(matches!(app.shut_down(), Err(AppError::NotStarted)));
    }

    #[test]
    fn started_app_runs_in_environment_home() {
        let dir = tempdir().unwrap();
        let env = Arc::new(LocalEnvironment::new(4, dir.path()));
        let mut app = CommandApp::new(env, Some("echo {id} > started; sleep 30".to_string()));

        app.start_up().unwrap();
        let marker = dir.path().join("started");
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut content = String::new();
        while content.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
            content = std::fs::read_to_string(&marker).unwrap_or_default();
        }
        app.shut_down().unwrap();

        assert_eq!(content.trim(), "4");
    }

    #[test]
    fn shut_down_stops_processes_forked_by_the_app() {
        let dir = tempdir().unwrap();
        let env = Arc::new(LocalEnvironment::new(0, dir.path()));
        let mut app = CommandApp::new(
            env,
            Some("cd . && sh -c 'sleep 1; echo still > alive'".to_string()),
        );

        app.start_up().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        app.shut_down().unwrap();
        std::thread::sleep(Duration::from_millis(1500));

        assert!(!dir.path().join("alive").exists());
    }

    #[test]
    fn app_without_command_only_tracks_state() {
        let env = Arc::new(LocalEnvironment::new(1, "/nonexistent"));
        let mut app: CommandApp<LocalEnvironment> = CommandAppFactory::default().new_app(env);
        assert_eq!(app.name(), "app-1@localhost");
        app.start_up().unwrap();
        app.shut_down().unwrap();
    }
}
