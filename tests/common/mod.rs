#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use serde_json::{json, Value};

use resilgen::config::DispatchConfig;
use resilgen::providers::{InferenceClient, UpstreamFailure};
use resilgen::usage::UsageSink;
use resilgen::{Dispatcher, UsageRecord};

pub type Reply = Result<Value, UpstreamFailure>;

/// One recorded upstream call
#[derive(Debug, Clone)]
pub struct Call
{   pub model: String
  , pub body: Value
  , pub timeout: Duration
}

/// Answers each model's calls from a queue, in order.
/// An exhausted queue answers as a refused connection.
#[derive(Default)]
pub struct ScriptedClient
{   script: Mutex<HashMap<String, VecDeque<Reply>>>
  , calls: Mutex<Vec<Call>>
}

impl ScriptedClient
{   pub fn new() -> Self
    {   ScriptedClient::default()
    }

    /// Queue replies for `model`: probe and real request alike
    pub fn script(self, model: &str, replies: Vec<Reply>) -> Self
    {   self.script
          .lock()
          .unwrap()
          .entry(model.to_string())
          .or_default()
          .extend(replies);
        self
    }

    pub fn calls(&self) -> Vec<Call>
    {   self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, model: &str) -> Vec<Call>
    {   self.calls()
          .into_iter()
          .filter(|c| c.model == model)
          .collect()
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient
{   async fn post(
      &self
    , _credential: &str
    , model: &str
    , body: &Value
    , timeout: Duration
    ) -> Result<Value, UpstreamFailure>
    {   self.calls.lock().unwrap().push(Call
        {   model: model.to_string()
          , body: body.clone()
          , timeout
        });
        self.script
          .lock()
          .unwrap()
          .get_mut(model)
          .and_then(VecDeque::pop_front)
          .unwrap_or_else(|| {
            Err(UpstreamFailure::Network("connection refused".to_string()))
          })
    }
}

/// Collects usage records in memory
#[derive(Default)]
pub struct MemorySink
{   pub records: Mutex<Vec<UsageRecord>>
}

impl UsageSink for MemorySink
{   fn record(&self, record: UsageRecord)
    {   self.records.lock().unwrap().push(record);
    }
}

pub fn ok(body: Value) -> Reply
{   Ok(body)
}

pub fn probe_ok() -> Reply
{   Ok(json!([{ "generated_text": "Hello there" }]))
}

pub fn status(code: u16, body: Value) -> Reply
{   Err(UpstreamFailure::Status { status: code, body })
}

pub fn dispatcher_with(
  client: Arc<ScriptedClient>
, sink: Arc<MemorySink>
, config: DispatchConfig
) -> Dispatcher
{   Dispatcher::new(client, sink, config)
}

pub fn dispatcher(client: Arc<ScriptedClient>) -> Dispatcher
{   dispatcher_with(
      client
    , Arc::new(MemorySink::default())
    , DispatchConfig::default()
    )
}
