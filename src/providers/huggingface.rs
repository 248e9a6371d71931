use std::time::Duration;
use async_trait::async_trait;
use serde_json::Value;
use log::{debug, trace, error};

use super::{InferenceClient, UpstreamFailure};

/// Hosted-inference client over reqwest.
/// Holds no per-request state; one instance serves every caller.
#[derive(Debug, Clone)]
pub struct HuggingFaceClient
{   endpoint: String
  , http_client: reqwest::Client
}

impl HuggingFaceClient
{   pub fn new(endpoint: impl Into<String>) -> Self
    {   let mut endpoint = endpoint.into();
        if !endpoint.ends_with('/')
        {   endpoint.push('/');
        }
        debug!("Creating HuggingFaceClient for {}", endpoint);
        HuggingFaceClient
        {   endpoint
          , http_client: reqwest::Client::new()
        }
    }

    pub fn endpoint(&self) -> &str
    {   &self.endpoint
    }

    fn model_url(&self, model: &str)
      -> Result<reqwest::Url, UpstreamFailure>
    {   reqwest::Url::parse(&format!("{}{}", self.endpoint, model))
          .map_err(|e| {
            error!("Bad URL for model {}: {}", model, e);
            UpstreamFailure::Setup(e.to_string())
          })
    }
}

impl Default for HuggingFaceClient
{   fn default() -> Self
    {   HuggingFaceClient::new(crate::config::DEFAULT_ENDPOINT)
    }
}

/// Sort a reqwest error into the failure shapes the classifier knows
fn transport_failure(e: reqwest::Error) -> UpstreamFailure
{   if e.is_builder()
    {   UpstreamFailure::Setup(e.to_string())
    } else if e.is_timeout() || e.is_connect()
    {   UpstreamFailure::Network(e.to_string())
    } else
    {   UpstreamFailure::NoResponse(e.to_string())
    }
}

#[async_trait]
impl InferenceClient for HuggingFaceClient
{   async fn post(
      &self
    , credential: &str
    , model: &str
    , body: &Value
    , timeout: Duration
    ) -> Result<Value, UpstreamFailure>
    {   let url = self.model_url(model)?;
        trace!("POST {} (timeout {:?})", url, timeout);

        let response = self.http_client
          .post(url)
          .bearer_auth(credential)
          .header("Content-Type", "application/json")
          .json(body)
          .timeout(timeout)
          .send()
          .await
          .map_err(transport_failure)?;

        let status = response.status();
        trace!("{} responded with {}", model, status);

        let text = response.text().await.map_err(transport_failure)?;
        let decoded = serde_json::from_str::<Value>(&text)
          .unwrap_or(Value::String(text));

        if status.is_success()
        {   Ok(decoded)
        } else
        {   Err(UpstreamFailure::Status
            {   status: status.as_u16()
              , body: decoded
            })
        }
    }
}
