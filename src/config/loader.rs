//! Configuration loading from the process environment.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::Level;

use crate::config::schema::AppConfig;

/// A variable that was set but could not be coerced, so its default was kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub var: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}={:?} is not a valid {}, using default",
            self.var, self.value, self.expected
        )
    }
}

impl AppConfig {
    /// Resolve the configuration from the process environment.
    pub fn from_env() -> (Self, Vec<ConfigWarning>) {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Resolve the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<ConfigWarning>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = Lenient {
            lookup,
            warnings: Vec::new(),
        };
        let defaults = AppConfig::default();

        let config = AppConfig {
            app_name: env.string("APP_NAME").unwrap_or(defaults.app_name),
            expose_port: env
                .parse::<u16>("EXPOSE_PORT", "port number")
                .unwrap_or(defaults.expose_port),
            otlp_grpc_endpoint: env
                .string("OTLP_GRPC_ENDPOINT")
                .unwrap_or(defaults.otlp_grpc_endpoint),
            disable_telemetry: env
                .flag("DISABLE_TELEMETRY")
                .unwrap_or(defaults.disable_telemetry),
            log_level: env
                .parse::<Level>("LOG_LEVEL", "log level")
                .unwrap_or(defaults.log_level),
            log_correlation: env
                .flag("LOG_CORRELATION")
                .unwrap_or(defaults.log_correlation),
            model_dir: env
                .string("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            workers: env
                .parse::<usize>("WORKERS", "positive integer")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.workers),
        };

        (config, env.warnings)
    }
}

struct Lenient<F> {
    lookup: F,
    warnings: Vec<ConfigWarning>,
}

impl<F> Lenient<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&mut self, var: &'static str, expected: &'static str) -> Option<T> {
        let raw = self.string(var)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                self.warn(var, raw, expected);
                None
            }
        }
    }

    fn flag(&mut self, var: &'static str) -> Option<bool> {
        let raw = self.string(var)?;
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                self.warn(var, raw, "boolean");
                None
            }
        }
    }

    fn warn(&mut self, var: &'static str, value: String, expected: &'static str) {
        self.warnings.push(ConfigWarning {
            var,
            value,
            expected,
        });
    }
}
