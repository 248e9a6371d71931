//! Turns the last upstream failure into a fallback or an error

use once_cell::sync::Lazy;
use regex::Regex;
use log::{debug, error, warn};

use crate::error::Error;
use crate::providers::UpstreamFailure;
use crate::request::FallbackDocument;

static MISSING_MODEL: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"Model (.*) does not exist").expect("missing model regex")
});

/// Name used when a 404 body does not say which model is missing
pub const UNKNOWN_MODEL: &str = "The specified model";

/// Classify the failure that ended a dispatch.
///
/// `None` means no candidate ever got a real request out, which is
/// treated like a network outage.
pub fn classify(
  last_failure: Option<&UpstreamFailure>
, input: &str
) -> Result<FallbackDocument, Error>
{   let failure = match last_failure
    {   Some(failure) => failure
      , None => {
          warn!("No model accepted the request, providing fallback response");
          return Ok(fallback(input));
        }
    };

    match failure
    {   UpstreamFailure::Network(msg) => {
          error!("Network error or service down, providing fallback response: {}", msg);
          Ok(fallback(input))
        }
      , UpstreamFailure::NoResponse(msg) => {
          error!("No response received from Hugging Face API: {}", msg);
          Ok(fallback(input))
        }
      , UpstreamFailure::Setup(msg) => {
          Err(Error::RequestSetupError(msg.clone()))
        }
      , UpstreamFailure::Status { status, .. } => {
          let message = failure.message();
          match *status
          {   401 => Err(Error::InvalidCredential)
            , 404 => Err(Error::ModelNotFound(missing_model(&message)))
            , 403 if message.contains("too large") => {
                Err(Error::ModelTooLarge)
              }
            , 403 => Err(Error::AccessDenied(message))
            , 429 => Err(Error::RateLimited)
            , 503 => {
                error!(
                  "Hugging Face service unavailable (503), providing fallback response: {}",
                  message
                );
                Ok(fallback(input))
              }
            , 400 if message.contains("loading") => {
                Err(Error::ModelLoading)
              }
            , status => Err(Error::UpstreamError { status, message })
          }
        }
    }
}

fn missing_model(message: &str) -> String
{   MISSING_MODEL
      .captures(message)
      .map(|caps| caps[1].to_string())
      .unwrap_or_else(|| UNKNOWN_MODEL.to_string())
}

fn fallback(input: &str) -> FallbackDocument
{   debug!(
      "Synthesizing fallback document for input of {} chars",
      input.chars().count()
    );
    FallbackDocument::service_unavailable()
}
