use std::fmt;

/// Custom error type for dispatch operations
/// Implements Clone for sending through channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// Upstream rejected the bearer token (401)
    InvalidCredential
  , /// Upstream does not know the model (404)
    ModelNotFound(String)
  , /// Model exceeds what the upstream tier will load (403)
    ModelTooLarge
  , /// Upstream refused access for another reason (403)
    AccessDenied(String)
  , /// Upstream rate limit exceeded (429)
    RateLimited
  , /// Model is still being loaded upstream (400)
    ModelLoading
  , /// Any other upstream status
    UpstreamError
    {   status: u16
      , message: String
    }
  , /// Request could not be built or sent at all
    RequestSetupError(String)
  , /// Local per-user rate limit exceeded
    LocalRateLimited
    {   retry_after_secs: u64
    }
  , /// Invalid configuration
    InvalidConfiguration(String)
  , /// Caller input rejected before dispatch
    InvalidRequest(String)
  , /// Failed to parse configuration or payload
    ParseError(String)
  , /// Generic error
    Other(String)
}

impl Error
{   /// Whether the caller should simply retry later, as opposed
    /// to fixing the request (model name, credential, ...).
    pub fn is_retryable(&self) -> bool
    {   matches!(
          self
        , Error::RateLimited
          | Error::ModelLoading
          | Error::LocalRateLimited { .. }
        )
    }
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::InvalidCredential => {
              write!(f, "Invalid credentials for Hugging Face API")
            }
          , Error::ModelNotFound(model) => {
              write!(f,
                "{} does not exist on Hugging Face. \
                 Please check the model name.",
                model
              )
            }
          , Error::ModelTooLarge => {
              write!(f,
                "The selected model is too large for the free tier. \
                 Please try a smaller model."
              )
            }
          , Error::AccessDenied(msg) => {
              write!(f, "Access denied: {}", msg)
            }
          , Error::RateLimited => {
              write!(f,
                "Rate limit exceeded for Hugging Face API. \
                 Please try again later."
              )
            }
          , Error::ModelLoading => {
              write!(f,
                "The model is still loading. \
                 Please try again in a few moments."
              )
            }
          , Error::UpstreamError { status, message } => {
              write!(f,
                "Hugging Face API error ({}): {}",
                status, message
              )
            }
          , Error::RequestSetupError(msg) => {
              write!(f, "Error setting up request: {}", msg)
            }
          , Error::LocalRateLimited { retry_after_secs } => {
              write!(f,
                "Rate limit exceeded. Try again in {} seconds.",
                retry_after_secs
              )
            }
          , Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::InvalidRequest(msg) => {
              write!(f, "Invalid request: {}", msg)
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
          , Error::Other(msg) => {
              write!(f, "Error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error
{   fn from(s: String) -> Self
    {   Error::Other(s)
    }
}

impl From<&str> for Error
{   fn from(s: &str) -> Self
    {   Error::Other(s.to_string())
    }
}

impl From<serde_json::Error> for Error
{   fn from(e: serde_json::Error) -> Self
    {   Error::ParseError(e.to_string())
    }
}
