//! Candidate-by-candidate dispatch with probing and fallback

use std::sync::Arc;
use serde_json::Value;
use log::{debug, error, info};

use crate::config::DispatchConfig;
use crate::error::Error;
use crate::failover::CandidateList;
use crate::providers::{HuggingFaceClient, InferenceClient, UpstreamFailure};
use crate::request::{
  ConversationOptions, ConversationResult, CreativeOptions
, CreativeResult, DispatchOutcome, SentimentOptions
, SentimentResult, ServedResponse, FALLBACK_MODEL
};
use crate::usage::{LogUsageSink, UsageSink};
use crate::{GenerationRequest, Task, UsageRecord};

const SENTIMENT_FALLBACK_NOTICE: &str
  = "Note: All sentiment analysis models are currently unavailable.";

/// Mediates between callers and an unreliable upstream.
///
/// Cheap to clone; clones share the client and sink but no
/// per-request state, so concurrent dispatches are independent.
#[derive(Clone)]
pub struct Dispatcher
{   client: Arc<dyn InferenceClient>
  , usage: Arc<dyn UsageSink>
  , config: DispatchConfig
}

impl Dispatcher
{   pub fn new(
      client: Arc<dyn InferenceClient>
    , usage: Arc<dyn UsageSink>
    , config: DispatchConfig
    ) -> Self
    {   debug!("Creating Dispatcher for {}", config.endpoint);
        Dispatcher
        {   client
          , usage
          , config
        }
    }

    /// Real upstream client and log-based usage recording
    pub fn huggingface(config: DispatchConfig) -> Result<Self, Error>
    {   config.validate()?;
        let client = HuggingFaceClient::new(config.endpoint.clone());
        Ok(Dispatcher::new(
          Arc::new(client)
        , Arc::new(LogUsageSink)
        , config
        ))
    }

    pub fn config(&self) -> &DispatchConfig
    {   &self.config
    }

    /// Try each candidate in order until one serves the request.
    ///
    /// A failing candidate never ends the loop (unless configured to
    /// abort on 401); only once every candidate is spent is the last
    /// failure classified into a fallback document or an error.
    pub async fn dispatch(
      &self
    , user_id: &str
    , credential: &str
    , request: &GenerationRequest
    ) -> Result<DispatchOutcome, Error>
    {   let candidates = CandidateList::build(
          &request.task
        , request.requested_model.as_deref()
        );
        debug_assert!(!candidates.is_empty(), "catalog yields no models");
        let requested = candidates.requested().to_string();
        info!(
          "Initiating {} with Hugging Face API user_id={} requested_model={}",
          request.task, user_id, requested
        );

        let payload = request.payload();
        let mut last_failure: Option<UpstreamFailure> = None;

        for model in &candidates
        {   debug!("Attempting to use model: {}", model);
            let available = crate::probe::probe(
              self.client.as_ref()
            , credential
            , model
            , &self.config.probe.input
            , self.config.probe_timeout()
            ).await;
            if !available
            {   debug!("Model {} is unavailable, trying next option", model);
                continue;
            }

            let used_fallback = *model != requested;
            if used_fallback
            {   info!("Using fallback model {} instead of {}", model, requested);
            }

            match self.client
              .post(credential, model, &payload, self.config.request_timeout())
              .await
            {   Ok(data) => {
                  self.record_usage(user_id, &request.task, model);
                  debug!("{} successful with model {}", request.task, model);
                  return Ok(DispatchOutcome::Served(ServedResponse
                  {   data
                    , model_used: model.clone()
                    , used_fallback
                    , notice: used_fallback.then(|| {
                        format!(
                          "Note: The requested model \"{}\" was unavailable. \
                           Used \"{}\" instead.",
                          requested, model
                        )
                      })
                  }));
                }
              , Err(failure) => {
                  error!(
                    "Error with model {} during {}: {}",
                    model, request.task, failure
                  );
                  let abort = self.config.failover.abort_on_invalid_credential
                    && failure.status() == Some(401);
                  last_failure = Some(failure);
                  if abort
                  {   info!("Credential rejected, skipping remaining candidates");
                      break;
                  }
                }
            }
        }

        error!(
          "All models failed for {} user_id={} requested_model={} last_error={}",
          request.task,
          user_id,
          requested,
          last_failure
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "No specific error captured".to_string())
        );
        crate::classify::classify(last_failure.as_ref(), &request.input_text)
          .map(DispatchOutcome::Degraded)
    }

    fn record_usage(&self, user_id: &str, task: &Task, model: &str)
    {   self.usage.record(UsageRecord
        {   user_id: user_id.to_string()
          , task: task.clone()
          , model_used: model.to_string()
          , timestamp: chrono::Utc::now()
        });
    }

    /// Creative text generation with markdown cleanup
    pub async fn generate_creative(
      &self
    , user_id: &str
    , credential: &str
    , prompt: &str
    , options: &CreativeOptions
    ) -> Result<CreativeResult, Error>
    {   require_text("Prompt", prompt)?;
        let request = GenerationRequest::new(Task::Creative, prompt)
          .with_model(options.model.clone())
          .with_parameters(options.parameters());

        match self.dispatch(user_id, credential, &request).await?
        {   DispatchOutcome::Degraded(doc) => Ok(CreativeResult
            {   generated_text: doc.generated_text
              , formatted_markdown: doc.formatted_markdown
              , model_used: doc.model_used
              , fallback_used: doc.fallback_used
              , notice: Some(doc.notice)
            })
          , DispatchOutcome::Served(served) => {
              let generated_text = first_generated_text(&served.data);
              let formatted_markdown
                = crate::normalize::normalize(&generated_text, prompt);
              Ok(CreativeResult
              {   generated_text
                , formatted_markdown
                , model_used: served.model_used
                , fallback_used: served.used_fallback
                , notice: served.notice
              })
            }
        }
    }

    /// Sentiment labels and scores as returned upstream
    pub async fn analyze_sentiment(
      &self
    , user_id: &str
    , credential: &str
    , text: &str
    , options: &SentimentOptions
    ) -> Result<SentimentResult, Error>
    {   require_text("Text", text)?;
        let request = GenerationRequest::new(Task::Sentiment, text)
          .with_model(options.model.clone());

        match self.dispatch(user_id, credential, &request).await?
        {   DispatchOutcome::Degraded(_) => Ok(SentimentResult
            {   sentiment_results: vec![]
              , model_used: FALLBACK_MODEL.to_string()
              , fallback_used: true
              , notice: Some(SENTIMENT_FALLBACK_NOTICE.to_string())
            })
          , DispatchOutcome::Served(served) => Ok(SentimentResult
            {   sentiment_results: sentiment_entries(served.data)
              , model_used: served.model_used
              , fallback_used: served.used_fallback
              , notice: served.notice
            })
        }
    }

    /// One conversational turn; history travels in the options
    pub async fn converse(
      &self
    , user_id: &str
    , credential: &str
    , message: &str
    , options: &ConversationOptions
    ) -> Result<ConversationResult, Error>
    {   require_text("Message", message)?;
        let request = GenerationRequest::new(Task::Conversation, message)
          .with_model(options.model.clone())
          .with_parameters(options.parameters())
          .with_history(options.history());

        match self.dispatch(user_id, credential, &request).await?
        {   DispatchOutcome::Degraded(doc) => Ok(ConversationResult
            {   response: serde_json::Map::new()
              , generated_text: doc.generated_text
              , formatted_markdown: doc.formatted_markdown
              , model_used: doc.model_used
              , fallback_used: doc.fallback_used
              , notice: Some(doc.notice)
            })
          , DispatchOutcome::Served(served) => {
              let mut response = match served.data
              {   Value::Object(map) => map
                , Value::Array(mut items) if !items.is_empty() => {
                    match items.swap_remove(0)
                    {   Value::Object(map) => map
                      , _ => serde_json::Map::new()
                    }
                  }
                , _ => serde_json::Map::new()
              };
              let generated_text = match response.remove("generated_text")
              {   Some(Value::String(text)) => text
                , _ => String::new()
              };
              let formatted_markdown
                = crate::normalize::normalize(&generated_text, message);
              Ok(ConversationResult
              {   response
                , generated_text
                , formatted_markdown
                , model_used: served.model_used
                , fallback_used: served.used_fallback
                , notice: served.notice
              })
            }
        }
    }
}

fn require_text(what: &str, text: &str) -> Result<(), Error>
{   if text.trim().is_empty()
    {   return Err(Error::InvalidRequest(format!("{} is required", what)));
    }
    Ok(())
}

/// `data[0].generated_text`, or `data[0]` when it is a bare string
fn first_generated_text(data: &Value) -> String
{   let first = match data
    {   Value::Array(items) => items.first()
      , other => Some(other)
    };
    match first
    {   Some(Value::String(text)) => text.clone()
      , Some(Value::Object(map)) => map
          .get("generated_text")
          .and_then(Value::as_str)
          .unwrap_or_default()
          .to_string()
      , _ => String::new()
    }
}

/// Upstream nests classifier output as `[[{label, score}, ...]]`
fn sentiment_entries(data: Value) -> Vec<Value>
{   match data
    {   Value::Array(mut items) => {
          if matches!(items.first(), Some(Value::Array(_)))
          {   match items.swap_remove(0)
              {   Value::Array(inner) => inner
                , _ => vec![]
              }
          } else
          {   items
          }
        }
      , _ => vec![]
    }
}
