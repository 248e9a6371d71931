//! Outbound inference clients

pub mod huggingface;

// Re-export for convenience
pub use huggingface::HuggingFaceClient;

use std::time::Duration;
use async_trait::async_trait;
use serde_json::Value;

/// Why a single upstream call did not produce a 2xx body.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamFailure
{   /// Upstream answered with a non-2xx status
    Status
    {   status: u16
      , body: Value
    }
  , /// Connection refused, DNS failure or timeout
    Network(String)
  , /// Request went out but nothing usable came back
    NoResponse(String)
  , /// Request was never sent
    Setup(String)
}

impl UpstreamFailure
{   pub fn status(&self) -> Option<u16>
    {   match self
        {   UpstreamFailure::Status { status, .. } => Some(*status)
          , _ => None
        }
    }

    /// Upstream `error` text, or the raw body when it is plain text
    pub fn body_message(&self) -> Option<String>
    {   match self
        {   UpstreamFailure::Status { body, .. } => {
              match body
              {   Value::Object(map) => match map.get("error")
                  {   Some(Value::String(msg)) => Some(msg.clone())
                    , Some(Value::Array(items)) => {
                        let joined: Vec<&str> = items
                          .iter()
                          .filter_map(Value::as_str)
                          .collect();
                        if joined.is_empty()
                        {   None
                        } else
                        {   Some(joined.join("; "))
                        }
                      }
                    , _ => None
                  }
                , Value::String(text) if !text.trim().is_empty() => {
                    Some(text.clone())
                  }
                , _ => None
              }
            }
          , _ => None
        }
    }

    /// Body message or a generic description of the failure
    pub fn message(&self) -> String
    {   if let Some(msg) = self.body_message()
        {   return msg;
        }
        match self
        {   UpstreamFailure::Status { status, .. } => {
              format!("Request failed with status code {}", status)
            }
          , UpstreamFailure::Network(msg)
          | UpstreamFailure::NoResponse(msg)
          | UpstreamFailure::Setup(msg) => msg.clone()
        }
    }
}

impl std::fmt::Display for UpstreamFailure
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>)
      -> std::fmt::Result
    {   match self
        {   UpstreamFailure::Status { status, .. } => {
              write!(f, "status {}: {}", status, self.message())
            }
          , UpstreamFailure::Network(msg) => {
              write!(f, "network error: {}", msg)
            }
          , UpstreamFailure::NoResponse(msg) => {
              write!(f, "no response: {}", msg)
            }
          , UpstreamFailure::Setup(msg) => {
              write!(f, "request setup failed: {}", msg)
            }
        }
    }
}

/// `POST <endpoint>/<model>` with a JSON body and bearer auth.
#[async_trait]
pub trait InferenceClient: Send + Sync
{   /// Returns the decoded 2xx body, or why there is none
    async fn post(
      &self
    , credential: &str
    , model: &str
    , body: &Value
    , timeout: Duration
    ) -> Result<Value, UpstreamFailure>;
}
