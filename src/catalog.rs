//! Static per-task model rankings and the size heuristic

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

const TEXT_GENERATION_MODELS: &[&str] = &[
  "microsoft/phi-2"
, "Qwen/Qwen1.5-0.5B-Chat"
, "TinyLlama/TinyLlama-1.1B-Chat-v1.0"
, "EleutherAI/gpt-neo-125M"
, "gpt2-medium"
, "gpt2"
];

const SENTIMENT_MODELS: &[&str] = &[
  "distilbert-base-uncased-finetuned-sst-2-english"
, "cardiffnlp/twitter-roberta-base-sentiment"
, "finiteautomata/bertweet-base-sentiment-analysis"
, "nlptown/bert-base-multilingual-uncased-sentiment"
];

const CONVERSATION_MODELS: &[&str] = &[
  "microsoft/DialoGPT-medium"
, "facebook/blenderbot-400M-distill"
, "Qwen/Qwen1.5-0.5B-Chat"
, "TinyLlama/TinyLlama-1.1B-Chat-v1.0"
];

const DEFAULT_MODELS: &[&str] = &["gpt2-medium", "gpt2"];

/// Name fragments of models the free tier will not load
const KNOWN_OVERSIZED: &[&str] = &[
  "mistralai/Mistral-7B"
, "meta-llama/Llama-2-7b"
, "tiiuae/falcon-7b"
, "mistralai/Mixtral-8x7B"
, "meta-llama/Llama-2-13b"
, "meta-llama/Llama-2-70b"
, "bigscience/bloom"
];

/// Parameter count at or above which a model counts as oversized
pub const OVERSIZED_BILLIONS: u64 = 7;

static SIZE_TOKEN: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(\d+)[bB](-|\b)").expect("size token regex")
});

/// Ranked substitutes for a task, best first. Never empty.
pub fn recommended_models(task: &crate::Task) -> &'static [&'static str]
{   match task
    {   crate::Task::Creative => TEXT_GENERATION_MODELS
      , crate::Task::Sentiment => SENTIMENT_MODELS
      , crate::Task::Conversation => CONVERSATION_MODELS
      , crate::Task::Other(_) => DEFAULT_MODELS
    }
}

/// Name-based guess that a model is too big to be served.
///
/// Only a filter: models that slip through are still probed, and
/// a `false` here says nothing about actual availability.
pub fn is_likely_oversized(model: &str) -> bool
{   let lowered = model.to_lowercase();
    if let Some(hit) = KNOWN_OVERSIZED
      .iter()
      .find(|large| lowered.contains(&large.to_lowercase()))
    {   debug!(
          "Model {} is likely too large (matches pattern: {})",
          model, hit
        );
        return true;
    }

    if let Some(caps) = SIZE_TOKEN.captures(model)
    {   // digits too long for u64 are certainly past the threshold
        let billions = caps[1].parse::<u64>().unwrap_or(u64::MAX);
        if billions >= OVERSIZED_BILLIONS
        {   debug!(
              "Model {} is likely too large (size indicator: {}B)",
              model, billions
            );
            return true;
        }
    }
    false
}
