//! Cheap availability checks run before committing to a request

use std::time::Duration;
use serde_json::json;
use log::{debug, error, warn};

use crate::providers::{InferenceClient, UpstreamFailure};

/// Whether `model` can serve requests right now.
///
/// Never fails: every failure shape, known or not, reads as
/// unavailable. Nothing is cached between calls.
pub async fn probe(
  client: &dyn InferenceClient
, credential: &str
, model: &str
, input: &str
, timeout: Duration
) -> bool
{   if crate::catalog::is_likely_oversized(model)
    {   debug!("Model {} is likely too large for the free tier", model);
        return false;
    }

    let body = json!({ "inputs": input });
    match client.post(credential, model, &body, timeout).await
    {   Ok(_) => {
          debug!("Model {} is available (probe successful)", model);
          true
        }
      , Err(failure) => {
          log_unavailable(model, &failure);
          false
        }
    }
}

fn log_unavailable(model: &str, failure: &UpstreamFailure)
{   let message = failure.body_message().unwrap_or_default();
    match failure
    {   UpstreamFailure::Status { status: 404, .. } => {
          debug!("Model {} not found or inaccessible (404)", model);
        }
      , UpstreamFailure::Status { status: 503, .. } => {
          debug!("Model {} is unavailable (503)", model);
        }
      , UpstreamFailure::Status { status: 401, .. } => {
          error!(
            "Invalid API key detected during availability check for {}",
            model
          );
        }
      , UpstreamFailure::Status { .. } if message.contains("loading") => {
          debug!("Model {} exists but is still loading", model);
        }
      , UpstreamFailure::Status { .. } if message.contains("too large") => {
          debug!("Model {} is too large to be loaded automatically", model);
        }
      , UpstreamFailure::Network(msg) => {
          debug!("Network error during availability check for {}: {}", model, msg);
        }
      , other => {
          warn!(
            "Assuming model {} is unavailable after unhandled probe error: {}",
            model, other
          );
        }
    }
}
