//! Configuration for the dispatcher, its probes and failover behavior

use std::fs;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use log::debug;

/// Default hosted-inference endpoint; the model id is appended.
pub const DEFAULT_ENDPOINT: &str
  = "https://api-inference.huggingface.co/models/";

/// Environment variable overriding the endpoint
pub const ENDPOINT_ENV: &str = "RESILGEN_ENDPOINT";

/// Availability probe configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig
{   /// Probe timeout in seconds
    pub timeout_secs: u64
  , /// Synthetic input sent by every probe
    pub input: String
}

impl Default for ProbeConfig
{   fn default() -> Self
    {   ProbeConfig
        {   timeout_secs: 5
          , input: "Hello".to_string()
        }
    }
}

/// Failover configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig
{   /// Stop trying further candidates after the first 401
    pub abort_on_invalid_credential: bool
}

/// Per-user sliding window rate limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig
{   /// Requests allowed inside one window
    pub max_requests: usize
  , /// Window length in seconds
    pub window_secs: u64
}

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig
{   /// Base URL the model id is appended to
    pub endpoint: String
  , /// Real request timeout in seconds
    pub request_timeout_secs: u64
  , /// Probe configuration
    pub probe: ProbeConfig
  , /// Failover configuration
    pub failover: FailoverConfig
  , /// Optional per-user rate limit for the backend
    pub rate_limit: Option<RateLimitConfig>
}

impl Default for DispatchConfig
{   fn default() -> Self
    {   DispatchConfig
        {   endpoint: DEFAULT_ENDPOINT.to_string()
          , request_timeout_secs: 20
          , probe: ProbeConfig::default()
          , failover: FailoverConfig::default()
          , rate_limit: None
        }
    }
}

impl DispatchConfig
{   /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str)
      -> Result<Self, crate::error::Error>
    {   let config: DispatchConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P)
      -> Result<Self, crate::error::Error>
    {   let path = path.as_ref();
        debug!("Loading dispatch config from {}", path.display());
        let json = fs::read_to_string(path).map_err(|e| {
          crate::error::Error::InvalidConfiguration(
            format!("{}: {}", path.display(), e)
          )
        })?;
        Self::from_json_str(&json)
    }

    /// Apply environment overrides on top of this configuration
    pub fn with_env_overrides(mut self) -> Self
    {   if let Ok(endpoint) = std::env::var(ENDPOINT_ENV)
        {   if !endpoint.trim().is_empty()
            {   debug!("Endpoint overridden from {}", ENDPOINT_ENV);
                self.endpoint = endpoint;
            }
        }
        self
    }

    /// Reject values the dispatcher cannot work with
    pub fn validate(&self) -> Result<(), crate::error::Error>
    {   if self.endpoint.trim().is_empty()
        {   return Err(crate::error::Error::InvalidConfiguration(
              "endpoint must not be empty".to_string()
            ));
        }
        if self.request_timeout_secs == 0
          || self.probe.timeout_secs == 0
        {   return Err(crate::error::Error::InvalidConfiguration(
              "timeouts must be at least one second".to_string()
            ));
        }
        if let Some(limit) = &self.rate_limit
        {   if limit.max_requests == 0 || limit.window_secs == 0
            {   return Err(crate::error::Error::InvalidConfiguration(
                  "rate limit window and size must be non-zero"
                    .to_string()
                ));
            }
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration
    {   Duration::from_secs(self.probe.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration
    {   Duration::from_secs(self.request_timeout_secs)
    }
}
