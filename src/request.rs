//! Per-task options, dispatch outcomes and task-shaped results

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// `model_used` value of a synthesized response
pub const FALLBACK_MODEL: &str = "fallback";

/// Options for creative text generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreativeOptions
{   /// Model to try first
    pub model: Option<String>
  , /// Max generated length (default 150)
    pub max_length: Option<u32>
  , /// Sampling temperature (default 0.7)
    pub temperature: Option<f64>
}

impl CreativeOptions
{   pub fn parameters(&self) -> Map<String, Value>
    {   let params = json!({
          "max_length": self.max_length.unwrap_or(150),
          "temperature": self.temperature.unwrap_or(0.7),
          "return_full_text": false,
          "num_return_sequences": 1,
          "do_sample": true,
          "top_k": 50,
          "top_p": 0.95,
        });
        into_map(params)
    }
}

/// Options for sentiment analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentOptions
{   /// Model to try first
    pub model: Option<String>
}

/// Options for a conversational turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationOptions
{   /// Model to try first
    pub model: Option<String>
  , /// Earlier user messages, oldest first
    pub past_user_inputs: Vec<String>
  , /// Earlier model replies, oldest first
    pub generated_responses: Vec<String>
  , /// Min generated length (default 10)
    pub min_length: Option<u32>
  , /// Max generated length (default 150)
    pub max_length: Option<u32>
  , /// Sampling temperature (default 0.8)
    pub temperature: Option<f64>
}

impl ConversationOptions
{   pub fn parameters(&self) -> Map<String, Value>
    {   let params = json!({
          "min_length": self.min_length.unwrap_or(10),
          "max_length": self.max_length.unwrap_or(150),
          "temperature": self.temperature.unwrap_or(0.8),
          "top_k": 50,
          "top_p": 0.9,
          "repetition_penalty": 1.03,
        });
        into_map(params)
    }

    pub fn history(&self) -> crate::ConversationHistory
    {   crate::ConversationHistory
        {   past_user_inputs: self.past_user_inputs.clone()
          , generated_responses: self.generated_responses.clone()
        }
    }
}

fn into_map(value: Value) -> Map<String, Value>
{   match value
    {   Value::Object(map) => map
      , _ => Map::new()
    }
}

/// A model actually served the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServedResponse
{   /// Raw upstream payload
    pub data: Value
  , pub model_used: String
  , /// Whether `model_used` differs from the requested model
    pub used_fallback: bool
  , pub notice: Option<String>
}

/// Degraded-service response synthesized when every candidate failed
/// for transient or service-wide reasons. A valid answer, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackDocument
{   pub generated_text: String
  , pub formatted_markdown: String
  , pub model_used: String
  , pub fallback_used: bool
  , pub notice: String
}

impl FallbackDocument
{   pub fn service_unavailable() -> Self
    {   FallbackDocument
        {   generated_text: "I apologize, but I'm unable to generate a \
              response at the moment due to service limitations."
              .to_string()
          , formatted_markdown: "# Service Temporarily Unavailable\n\n\
              I apologize, but I'm unable to generate a response to your \
              request at the moment due to service limitations. \
              Please try again later."
              .to_string()
          , model_used: FALLBACK_MODEL.to_string()
          , fallback_used: true
          , notice: "Note: All Hugging Face models are currently \
              unavailable. This is a fallback response."
              .to_string()
        }
    }
}

/// What one dispatch produced. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome
{   Served(ServedResponse)
  , Degraded(FallbackDocument)
}

impl DispatchOutcome
{   pub fn model_used(&self) -> &str
    {   match self
        {   DispatchOutcome::Served(served) => &served.model_used
          , DispatchOutcome::Degraded(doc) => &doc.model_used
        }
    }

    /// True for a substitute model and for the fallback document
    pub fn fallback_used(&self) -> bool
    {   match self
        {   DispatchOutcome::Served(served) => served.used_fallback
          , DispatchOutcome::Degraded(doc) => doc.fallback_used
        }
    }

    pub fn notice(&self) -> Option<&str>
    {   match self
        {   DispatchOutcome::Served(served) => served.notice.as_deref()
          , DispatchOutcome::Degraded(doc) => Some(&doc.notice)
        }
    }

    pub fn is_degraded(&self) -> bool
    {   matches!(self, DispatchOutcome::Degraded(_))
    }
}

/// Creative generation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativeResult
{   pub generated_text: String
  , pub formatted_markdown: String
  , pub model_used: String
  , pub fallback_used: bool
  , pub notice: Option<String>
}

/// Sentiment analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult
{   /// Label/score entries as returned upstream
    pub sentiment_results: Vec<Value>
  , pub model_used: String
  , pub fallback_used: bool
  , pub notice: Option<String>
}

/// Conversational turn result. Upstream fields other than
/// `generated_text` are kept verbatim in `response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationResult
{   #[serde(flatten)]
    pub response: Map<String, Value>
  , pub generated_text: String
  , pub formatted_markdown: String
  , pub model_used: String
  , pub fallback_used: bool
  , pub notice: Option<String>
}
