use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};
use typed_builder::TypedBuilder;

const DEFAULT_SERVICE_NAME: &str = "relayer-sdk";
const DEFAULT_LOG_FILE_PREFIX: &str = "relayer-sdk.log";

lazy_static::lazy_static! {
    pub(crate) static ref ENVIRONMENT: ExecutionEnvironment = mode();
}

/// Logging settings for applications embedding the SDK.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, TypedBuilder, Default)]
pub struct TelemetryConfig {
    /// Name attached to every log line. Defaults to `relayer-sdk`.
    #[builder(default, setter(strip_option, into))]
    service_name: Option<String>,

    /// Directory for a JSON log file. When unset, logs only go to stdout.
    #[builder(default, setter(strip_option, into))]
    log_dir: Option<PathBuf>,

    /// File name prefix used by the daily rolling appender.
    #[builder(default, setter(strip_option, into))]
    log_file_prefix: Option<String>,

    /// Use JSON output on stdout as well.
    #[builder(default, setter(strip_option))]
    json_logs: Option<bool>,
}

impl TelemetryConfig {
    pub fn service_name(&self) -> &str {
        self.service_name.as_deref().unwrap_or(DEFAULT_SERVICE_NAME)
    }

    pub fn log_dir(&self) -> Option<&PathBuf> {
        self.log_dir.as_ref()
    }

    pub fn log_file_prefix(&self) -> &str {
        self.log_file_prefix
            .as_deref()
            .unwrap_or(DEFAULT_LOG_FILE_PREFIX)
    }

    pub fn json_logs(&self) -> bool {
        self.json_logs.unwrap_or(false)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.service_name {
            if name.trim().is_empty() {
                return Err(ConfigError::Message(
                    "service_name must not be empty if specified".to_string(),
                ));
            }
        }
        if let Some(prefix) = &self.log_file_prefix {
            if prefix.trim().is_empty() {
                return Err(ConfigError::Message(
                    "log_file_prefix must not be empty if specified".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(
    Default, Display, Deserialize, Serialize, Clone, EnumString, AsRefStr, Eq, PartialEq, Debug,
)]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionEnvironment {
    #[default]
    Local,
    #[strum(serialize = "dev")]
    Development,
    Stage,
    #[strum(serialize = "prod")]
    Production,
    Integration,
}

/// The environment selected through `RUN_MODE`, read once per process.
pub fn execution_environment() -> &'static ExecutionEnvironment {
    &ENVIRONMENT
}

#[derive(TypedBuilder, Debug)]
pub struct Settings<'a> {
    #[builder(setter(strip_option), default = None)]
    path: Option<&'a str>,
    env_prefix: &'a str,
    #[builder(default)]
    parse_keys: Vec<&'a str>,
}

fn mode() -> ExecutionEnvironment {
    env::var("RUN_MODE")
        .map(|enum_str| ExecutionEnvironment::from_str(enum_str.as_str()).unwrap_or_default())
        .unwrap_or_else(|_| ExecutionEnvironment::Local)
}

impl Settings<'_> {
    /// Loads `T` from the layered file sources and the environment.
    ///
    /// Later sources win: `config/default`, `config/{prefix}`, `config/{prefix}-{RUN_MODE}`,
    /// `/etc/config/{prefix}.toml`, the explicit `path` and finally variables named
    /// `{PREFIX}__SECTION__KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be created or deserialized.
    pub fn init_conf<'de, T: Deserialize<'de> + std::fmt::Debug>(&self) -> Result<T, ConfigError> {
        let mut env_conf = config::Environment::default()
            .prefix(self.env_prefix)
            .separator("__")
            .list_separator(",");
        if !self.parse_keys.is_empty() {
            env_conf = env_conf.try_parsing(true);
        }
        for key in &self.parse_keys {
            env_conf = env_conf.with_list_parse_key(key);
        }
        let prefix = self.env_prefix.to_lowercase();
        let mut config_builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{prefix}")).required(false))
            .add_source(
                File::with_name(&format!("config/{prefix}-{}", *ENVIRONMENT)).required(false),
            )
            .add_source(File::with_name(&format!("/etc/config/{prefix}.toml")).required(false));

        if let Some(path) = self.path {
            config_builder = config_builder.add_source(File::with_name(path).required(true))
        };

        let config = config_builder.add_source(env_conf).build()?;

        let settings: T = config.try_deserialize()?;

        tracing::debug!("Loaded settings: {:?}", settings);

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        retries: u32,
        telemetry: Option<TelemetryConfig>,
    }

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn loads_explicit_file() {
        let file = write_toml(
            r#"
name = "sdk"
retries = 3

[telemetry]
service_name = "demo"
json_logs = true
"#,
        );
        let sample: Sample = Settings::builder()
            .path(file.path().to_str().unwrap())
            .env_prefix("OBS_TEST_FILE")
            .build()
            .init_conf()
            .unwrap();
        assert_eq!(sample.name, "sdk");
        assert_eq!(sample.retries, 3);
        let telemetry = sample.telemetry.unwrap();
        assert_eq!(telemetry.service_name(), "demo");
        assert!(telemetry.json_logs());
        assert_eq!(telemetry.log_file_prefix(), DEFAULT_LOG_FILE_PREFIX);
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        let file = write_toml("name = \"sdk\"\nretries = 3\n");
        env::set_var("OBS_TEST_ENV__RETRIES", "7");
        let sample: Result<Sample, _> = Settings::builder()
            .path(file.path().to_str().unwrap())
            .env_prefix("OBS_TEST_ENV")
            .build()
            .init_conf();
        env::remove_var("OBS_TEST_ENV__RETRIES");
        let sample = sample.unwrap();
        assert_eq!(sample.retries, 7);
        assert!(sample.telemetry.is_none());
    }

    #[test]
    #[serial]
    fn missing_explicit_file_is_an_error() {
        let res: Result<Sample, _> = Settings::builder()
            .path("/nonexistent/relayer-sdk-config.toml")
            .env_prefix("OBS_TEST_MISSING")
            .build()
            .init_conf();
        assert!(res.is_err());
    }

    #[test]
    fn telemetry_validation() {
        let conf = TelemetryConfig::builder().service_name("  ").build();
        assert!(conf.validate().is_err());
        let conf = TelemetryConfig::builder()
            .service_name("relayer")
            .log_dir("/tmp/logs")
            .build();
        assert!(conf.validate().is_ok());
        assert_eq!(conf.log_dir().unwrap(), &PathBuf::from("/tmp/logs"));
    }

    #[test]
    fn execution_environment_names() {
        assert_eq!(
            ExecutionEnvironment::from_str("prod").unwrap(),
            ExecutionEnvironment::Production
        );
        assert_eq!(ExecutionEnvironment::Development.to_string(), "dev");
        assert_eq!(ExecutionEnvironment::Integration.to_string(), "integration");
    }
}
