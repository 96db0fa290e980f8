//! Gateway configuration, loaded once at startup from the environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How the helper child's standard streams are wired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HelperStdio {
    /// Share the gateway's stdin/stdout/stderr.
    #[default]
    Inherit,
    /// Discard the helper's output.
    Null,
}

impl HelperStdio {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "inherit" => Some(Self::Inherit),
            "null" => Some(Self::Null),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HelperConfig {
    pub host: String,
    pub port: u16,
    pub health_path: String,
    /// Interpreter used to launch the helper script.
    pub command: PathBuf,
    pub script_path: PathBuf,
    pub readiness_timeout: Duration,
    pub readiness_poll_interval: Duration,
    pub stdio: HelperStdio,
}

impl HelperConfig {
    /// Base URL of the helper's HTTP service.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Full URL of the helper's health endpoint.
    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url(), normalize_path(&self.health_path))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_host: String,
    pub listen_port: u16,
    pub helper: HelperConfig,
}

impl Config {
    /// Build from process environment, resolving relative defaults against
    /// the current working directory.
    pub fn from_env() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_lookup(|key| std::env::var(key).ok(), &cwd)
    }

    /// Build from an arbitrary key lookup. `base_dir` stands in for the
    /// working directory when resolving the default script and interpreter.
    pub fn from_lookup<F>(lookup: F, base_dir: &Path) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let repo_root = base_dir.join("..");

        let command = lookup("PYTHON_CMD")
            .map(PathBuf::from)
            .unwrap_or_else(|| resolve_python_command(&repo_root));

        let script_path = lookup("NUMBER_HELPER_SCRIPT")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                repo_root
                    .join("numberhelper")
                    .join("src")
                    .join("number_helper_service.py")
            });

        let stdio = lookup("NUMBER_HELPER_STDIO")
            .and_then(|v| HelperStdio::parse(&v))
            .unwrap_or_default();

        Self {
            listen_host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            listen_port: parse_or(lookup("PORT"), 3000),
            helper: HelperConfig {
                host: lookup("NUMBER_HELPER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
                port: parse_or(lookup("NUMBER_HELPER_PORT"), 8001),
                health_path: lookup("NUMBER_HELPER_HEALTH_PATH")
                    .map(|p| normalize_path(&p))
                    .unwrap_or_else(|| "/health".to_string()),
                command,
                script_path,
                readiness_timeout: Duration::from_millis(parse_or(
                    lookup("NUMBER_HELPER_READY_TIMEOUT_MS"),
                    15_000,
                )),
                readiness_poll_interval: Duration::from_millis(parse_or(
                    lookup("NUMBER_HELPER_READY_POLL_MS"),
                    500,
                )),
                stdio,
            },
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, fallback: T) -> T {
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(fallback)
}

/// Ensure a URL path starts with `/`.
fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Prefer the repo-local virtualenv interpreter when one exists.
fn resolve_python_command(repo_root: &Path) -> PathBuf {
    let venv_python = repo_root.join(".venv").join("bin").join("python");
    if venv_python.exists() {
        venv_python
    } else {
        PathBuf::from("python3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)], base_dir: &Path) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned(), base_dir)
    }

    #[test]
    fn defaults_when_environment_empty() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("backend");
        std::fs::create_dir(&base).unwrap();

        let config = config_from(&[], &base);

        assert_eq!(config.listen_host, "0.0.0.0");
        assert_eq!(config.listen_port, 3000);
        assert_eq!(config.helper.host, "127.0.0.1");
        assert_eq!(config.helper.port, 8001);
        assert_eq!(config.helper.health_path, "/health");
        assert_eq!(config.helper.command, PathBuf::from("python3"));
        assert_eq!(
            config.helper.script_path,
            base.join("..")
                .join("numberhelper")
                .join("src")
                .join("number_helper_service.py")
        );
        assert_eq!(config.helper.readiness_timeout, Duration::from_millis(15_000));
        assert_eq!(config.helper.readiness_poll_interval, Duration::from_millis(500));
        assert_eq!(config.helper.stdio, HelperStdio::Inherit);
    }

    #[test]
    fn overrides_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_from(
            &[
                ("HOST", "127.0.0.1"),
                ("PORT", "4100"),
                ("NUMBER_HELPER_HOST", "localhost"),
                ("NUMBER_HELPER_PORT", "9001"),
                ("NUMBER_HELPER_HEALTH_PATH", "/ready"),
                ("PYTHON_CMD", "/usr/bin/python3.12"),
                ("NUMBER_HELPER_SCRIPT", "/srv/helper.py"),
                ("NUMBER_HELPER_READY_TIMEOUT_MS", "2500"),
                ("NUMBER_HELPER_READY_POLL_MS", "50"),
                ("NUMBER_HELPER_STDIO", "null"),
            ],
            dir.path(),
        );

        assert_eq!(config.listen_host, "127.0.0.1");
        assert_eq!(config.listen_port, 4100);
        assert_eq!(config.helper.host, "localhost");
        assert_eq!(config.helper.port, 9001);
        assert_eq!(config.helper.health_path, "/ready");
        assert_eq!(config.helper.command, PathBuf::from("/usr/bin/python3.12"));
        assert_eq!(config.helper.script_path, PathBuf::from("/srv/helper.py"));
        assert_eq!(config.helper.readiness_timeout, Duration::from_millis(2500));
        assert_eq!(config.helper.readiness_poll_interval, Duration::from_millis(50));
        assert_eq!(config.helper.stdio, HelperStdio::Null);
        assert_eq!(config.helper.base_url(), "http://localhost:9001");
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_from(
            &[
                ("PORT", "not-a-port"),
                ("NUMBER_HELPER_PORT", "70000"),
                ("NUMBER_HELPER_READY_TIMEOUT_MS", "soon"),
                ("NUMBER_HELPER_READY_POLL_MS", "-5"),
                ("NUMBER_HELPER_STDIO", "pipe"),
            ],
            dir.path(),
        );

        assert_eq!(config.listen_port, 3000);
        assert_eq!(config.helper.port, 8001);
        assert_eq!(config.helper.readiness_timeout, Duration::from_millis(15_000));
        assert_eq!(config.helper.readiness_poll_interval, Duration::from_millis(500));
        assert_eq!(config.helper.stdio, HelperStdio::Inherit);
    }

    #[test]
    fn health_path_gets_leading_slash() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_from(&[("NUMBER_HELPER_HEALTH_PATH", "status/live")], dir.path());

        assert_eq!(config.helper.health_path, "/status/live");
        assert_eq!(config.helper.health_url(), "http://127.0.0.1:8001/status/live");
    }

    #[test]
    fn prefers_repo_virtualenv_python() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("backend");
        let venv_bin = dir.path().join(".venv").join("bin");
        std::fs::create_dir(&base).unwrap();
        std::fs::create_dir_all(&venv_bin).unwrap();
        std::fs::write(venv_bin.join("python"), b"").unwrap();

        let config = config_from(&[], &base);

        assert_eq!(
            config.helper.command,
            base.join("..").join(".venv").join("bin").join("python")
        );
    }
}
