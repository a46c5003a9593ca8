//! Logic for loading configuration in to an object model
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use displaydoc::Display;
use schemars::gen::SchemaSettings;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

const DEFAULT_BACKEND_URL: &str = "/api";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not resolve backend url '{backend_url}' against '{origin}': {error}
    InvalidEndpoint {
        origin: String,
        backend_url: String,
        error: url::ParseError,
    },
    /// could not create the HTTP client: {0}
    HttpClient(#[from] reqwest::Error),
    /// could not read configuration file '{path}': {error}
    CannotReadConfigFile {
        path: String,
        error: std::io::Error,
    },
    /// could not deserialize configuration: {0}
    DeserializeConfigError(#[from] serde_yaml::Error),
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

fn default_origin() -> Url {
    Url::parse("http://localhost").expect("static url is valid")
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_search_debounce() -> Duration {
    DEFAULT_SEARCH_DEBOUNCE
}

/// The configuration of the data layer.
///
/// Can be created through `serde::Deserialize` from various formats; the CLI
/// reads it from YAML.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// The origin the backend url is resolved against; defaults to http://localhost
    pub origin: Url,

    /// The GraphQL endpoint, absolute or relative to the origin; defaults to /api
    pub backend_url: String,

    /// The value of the Accept-Language header, if any.
    pub accept_language: Option<String>,

    /// Authentication.
    pub auth: Auth,

    /// Polling and search refetch timings.
    pub refresh: Refresh,

    /// Request timeout in human-readable format; requests never time out by default.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "Option<String>")]
    pub timeout: Option<Duration>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            backend_url: default_backend_url(),
            accept_language: None,
            auth: Auth::default(),
            refresh: Refresh::default(),
            timeout: None,
        }
    }
}

/// Authentication settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Auth {
    /// The bearer token sent with every request. Requests are anonymous when unset.
    pub token: Option<String>,
}

/// Refresh settings.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Refresh {
    /// Interval between polls of live views in human-readable format; defaults to 5s
    #[serde(
        with = "humantime_serde",
        default = "default_poll_interval"
    )]
    #[schemars(with = "String", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Quiet period before a search refetch in human-readable format; defaults to 500ms
    #[serde(
        with = "humantime_serde",
        default = "default_search_debounce"
    )]
    #[schemars(with = "String", default = "default_search_debounce")]
    pub search_debounce: Duration,
}

impl Default for Refresh {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            search_debounce: default_search_debounce(),
        }
    }
}

impl Configuration {
    /// The GraphQL endpoint: the backend url resolved against the origin.
    pub fn endpoint(&self) -> Result<Url, ConfigurationError> {
        self.origin
            .join(&self.backend_url)
            .map_err(|error| ConfigurationError::InvalidEndpoint {
                origin: self.origin.to_string(),
                backend_url: self.backend_url.clone(),
                error,
            })
    }

    /// Reads and validates a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|error| ConfigurationError::CannotReadConfigFile {
                path: path.display().to_string(),
                error,
            })?;
        content.parse()
    }

    pub(crate) fn validate(self) -> Result<Self, ConfigurationError> {
        if self.refresh.poll_interval.is_zero() {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid refresh configuration",
                error: "poll_interval must be greater than zero".to_string(),
            });
        }
        self.endpoint()?;
        Ok(self)
    }
}

/// Parse configuration from a string in YAML syntax
impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let configuration: Configuration = serde_yaml::from_str(s)?;
        configuration.validate()
    }
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> RootSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = true;
        s.option_add_null_type = false;
        s.inline_subschemas = true;
    });
    settings.into_generator().into_root_schema_for::<Configuration>()
}
