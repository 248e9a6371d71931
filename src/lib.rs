pub mod error;
pub mod config;
pub mod catalog;
pub mod failover;
pub mod providers;
pub mod probe;
pub mod classify;
pub mod normalize;
pub mod usage;
pub mod request;
pub mod dispatch;
pub mod ratelimit;
pub mod client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub use client::GenerationBackend;
pub use dispatch::Dispatcher;
pub use error::Error;
pub use request::{
  ConversationOptions, ConversationResult, CreativeOptions
, CreativeResult, DispatchOutcome, FallbackDocument
, SentimentOptions, SentimentResult, ServedResponse
};

/*

resilgen (resilient generation) sits between a caller asking for
text generation, sentiment or conversation and a hosted-inference
provider that exposes many interchangeable, often unavailable models.

Request flow:

  entry point (generate_creative / analyze_sentiment / converse)
    -> GenerationRequest
    -> CandidateList (requested model, then catalog fallbacks)
    -> for each candidate: probe, then real request
    -> first success wins, otherwise classify the last failure
    -> task-shaped result (markdown normalized where text comes back)

*/

/// Install the env_logger backend. Safe to call more than once.
pub fn init_logger()
{   let _ = env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).try_init();
}

/// DISPATCH CHANNEL INTERFACE:

// ===== GenerateCreative =====

pub type CreativeReply
  = Result<crate::request::CreativeResult, crate::error::Error>;
pub type CreativeReplySender
  = tokio::sync::mpsc::UnboundedSender<CreativeReply>;

pub struct GenerateCreativeArgs
{   pub user_id: String
  , pub credential: String
  , pub prompt: String
  , pub options: crate::request::CreativeOptions
  , pub reply: CreativeReplySender
}

// ===== AnalyzeSentiment =====

pub type SentimentReply
  = Result<crate::request::SentimentResult, crate::error::Error>;
pub type SentimentReplySender
  = tokio::sync::mpsc::UnboundedSender<SentimentReply>;

pub struct AnalyzeSentimentArgs
{   pub user_id: String
  , pub credential: String
  , pub text: String
  , pub options: crate::request::SentimentOptions
  , pub reply: SentimentReplySender
}

// ===== Converse =====

pub type ConversationReply
  = Result<crate::request::ConversationResult, crate::error::Error>;
pub type ConversationReplySender
  = tokio::sync::mpsc::UnboundedSender<ConversationReply>;

pub struct ConverseArgs
{   pub user_id: String
  , pub credential: String
  , pub message: String
  , pub options: crate::request::ConversationOptions
  , pub reply: ConversationReplySender
}

// ===== Shutdown =====

pub type ShutdownReply = Result<(), crate::error::Error>;
pub type ShutdownReplySender
  = tokio::sync::mpsc::UnboundedSender<ShutdownReply>;

pub struct ShutdownArgs
{   pub reply: ShutdownReplySender
}

// ===== DispatchHand (sender side) =====

pub struct DispatchHand
{   pub generate_creative_tx
      : tokio::sync::mpsc::UnboundedSender<GenerateCreativeArgs>
  , pub analyze_sentiment_tx
      : tokio::sync::mpsc::UnboundedSender<AnalyzeSentimentArgs>
  , pub converse_tx
      : tokio::sync::mpsc::UnboundedSender<ConverseArgs>
  , pub shutdown_tx
      : tokio::sync::mpsc::UnboundedSender<ShutdownArgs>
}

// ===== DispatchFoot (receiver side) =====

pub struct DispatchFoot
{   pub generate_creative_rx
      : tokio::sync::mpsc::UnboundedReceiver<GenerateCreativeArgs>
  , pub analyze_sentiment_rx
      : tokio::sync::mpsc::UnboundedReceiver<AnalyzeSentimentArgs>
  , pub converse_rx
      : tokio::sync::mpsc::UnboundedReceiver<ConverseArgs>
  , pub shutdown_rx
      : tokio::sync::mpsc::UnboundedReceiver<ShutdownArgs>
}

/// DISPATCH STRUCTURES:

/// Inference task a request is routed as.
/// The string form is the upstream pipeline name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Task
{   /// Free-form creative writing ("text-generation")
    Creative
  , /// Text classification ("sentiment-analysis")
    Sentiment
  , /// Multi-turn chat ("conversation")
    Conversation
  , /// Any other pipeline; served from the generic catalog list
    Other(String)
}

impl Task
{   pub fn as_str(&self) -> &str
    {   match self
        {   Task::Creative => "text-generation"
          , Task::Sentiment => "sentiment-analysis"
          , Task::Conversation => "conversation"
          , Task::Other(name) => name.as_str()
        }
    }
}

impl From<&str> for Task
{   fn from(name: &str) -> Self
    {   match name
        {   "text-generation" | "creative" => Task::Creative
          , "sentiment-analysis" | "sentiment" => Task::Sentiment
          , "conversation" => Task::Conversation
          , other => Task::Other(other.to_string())
        }
    }
}

impl From<String> for Task
{   fn from(name: String) -> Self
    {   Task::from(name.as_str())
    }
}

impl From<Task> for String
{   fn from(task: Task) -> Self
    {   task.as_str().to_string()
    }
}

impl std::fmt::Display for Task
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>)
      -> std::fmt::Result
    {   f.write_str(self.as_str())
    }
}

/// Prior turns of a conversation, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ConversationHistory
{   pub past_user_inputs: Vec<String>
  , pub generated_responses: Vec<String>
}

/// One immutable request for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest
{   /// Task the request is routed as
    pub task: Task
  , /// Prompt, text to classify, or the user's message
    pub input_text: String
  , /// Model the caller asked for, tried first
    pub requested_model: Option<String>
  , /// Upstream tuning knobs (max_length, temperature, ...)
    pub parameters: Map<String, Value>
  , /// Conversation turns, sent as structured inputs when present
    pub history: Option<ConversationHistory>
}

impl GenerationRequest
{   pub fn new(task: Task, input_text: impl Into<String>) -> Self
    {   GenerationRequest
        {   task
          , input_text: input_text.into()
          , requested_model: None
          , parameters: Map::new()
          , history: None
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self
    {   self.requested_model = model;
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>)
      -> Self
    {   self.parameters = parameters;
        self
    }

    pub fn with_history(mut self, history: ConversationHistory) -> Self
    {   self.history = Some(history);
        self
    }

    /// JSON body sent upstream for the real request
    pub fn payload(&self) -> Value
    {   let inputs = match &self.history
        {   Some(history) => json!({
              "text": self.input_text,
              "past_user_inputs": history.past_user_inputs,
              "generated_responses": history.generated_responses,
            })
          , None => Value::String(self.input_text.clone())
        };
        let mut body = Map::new();
        body.insert("inputs".to_string(), inputs);
        if !self.parameters.is_empty()
        {   body.insert(
              "parameters".to_string()
            , Value::Object(self.parameters.clone())
            );
        }
        Value::Object(body)
    }
}

/// Emitted once per successful model use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord
{   pub user_id: String
  , pub task: Task
  , pub model_used: String
  , pub timestamp: chrono::DateTime<chrono::Utc>
}
