mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use serde_json::json;
use tokio::sync::mpsc;

use common::{dispatcher, dispatcher_with, ok, probe_ok, status, MemorySink, ScriptedClient};
use resilgen::catalog::{is_likely_oversized, recommended_models};
use resilgen::config::DispatchConfig;
use resilgen::failover::CandidateList;
use resilgen::request::{
  ConversationOptions, CreativeOptions, DispatchOutcome, SentimentOptions
};
use resilgen::{Dispatcher, Error, GenerationRequest, Task, UsageRecord};

const SENTIMENT: [&str; 4] = [
  "distilbert-base-uncased-finetuned-sst-2-english"
, "cardiffnlp/twitter-roberta-base-sentiment"
, "finiteautomata/bertweet-base-sentiment-analysis"
, "nlptown/bert-base-multilingual-uncased-sentiment"
];

fn all_tasks() -> Vec<Task>
{   vec![
      Task::Creative
    , Task::Sentiment
    , Task::Conversation
    , Task::Other("summarization".to_string())
    ]
}

fn sentiment_request(text: &str) -> GenerationRequest
{   GenerationRequest::new(Task::Sentiment, text)
}

// ===== Catalog and candidate list =====

#[test]
fn test_unset_model_starts_with_top_catalog_entry()
{   for task in all_tasks()
    {   let list = CandidateList::build(&task, None);
        assert_eq!(list.models()[0], recommended_models(&task)[0]);
        assert_eq!(list.requested(), recommended_models(&task)[0]);
    }
}

#[test]
fn test_requested_catalog_model_is_not_duplicated()
{   for task in all_tasks()
    {   let ranked = recommended_models(&task);
        for model in ranked
        {   let list = CandidateList::build(&task, Some(*model));
            let unique: HashSet<&String> = list.iter().collect();
            assert_eq!(unique.len(), list.len());
            assert_eq!(list.len(), ranked.len());
            assert_eq!(list.models()[0], *model);
        }
    }
}

#[test]
fn test_requested_model_outside_catalog_goes_first()
{   let list = CandidateList::build(&Task::Sentiment, Some("my-org/custom-sentiment"));
    assert_eq!(list.len(), SENTIMENT.len() + 1);
    assert_eq!(list.requested(), "my-org/custom-sentiment");
    assert_eq!(list.models()[1], SENTIMENT[0]);
}

#[test]
fn test_blank_requested_model_uses_catalog_default()
{   let list = CandidateList::build(&Task::Creative, Some("   "));
    assert_eq!(list.requested(), "microsoft/phi-2");
}

#[test]
fn test_unknown_task_gets_generic_defaults()
{   let task = Task::from("translation");
    assert_eq!(task, Task::Other("translation".to_string()));
    assert_eq!(recommended_models(&task), &["gpt2-medium", "gpt2"]);
}

#[test]
fn test_size_heuristic()
{   assert!(is_likely_oversized("meta-llama/Llama-2-70b-chat-hf"));
    assert!(is_likely_oversized("tiiuae/falcon-7b-instruct"));
    assert!(is_likely_oversized("BigScience/bloom-560m"));
    assert!(is_likely_oversized("some-org/custom-13B-model"));
    assert!(is_likely_oversized("org/model-7b"));
    assert!(!is_likely_oversized("Qwen/Qwen1.5-0.5B-Chat"));
    assert!(!is_likely_oversized("google/gemma-2b"));
    assert!(!is_likely_oversized("gpt2-medium"));
    for task in all_tasks()
    {   for model in recommended_models(&task)
        {   assert!(!is_likely_oversized(model), "{} flagged", model);
        }
    }
}

#[test]
fn test_task_string_forms()
{   assert_eq!(
      serde_json::to_string(&Task::Sentiment).unwrap()
    , "\"sentiment-analysis\""
    );
    let task: Task = serde_json::from_str("\"text-generation\"").unwrap();
    assert_eq!(task, Task::Creative);
    assert_eq!(Task::from("creative"), Task::Creative);
    assert_eq!(Task::Conversation.to_string(), "conversation");
}

#[test]
fn test_payload_shapes()
{   assert_eq!(sentiment_request("great").payload(), json!({ "inputs": "great" }));

    let options = ConversationOptions
    {   past_user_inputs: vec!["hi".to_string()]
      , generated_responses: vec!["hello".to_string()]
      , ..ConversationOptions::default()
    };
    let request = GenerationRequest::new(Task::Conversation, "how are you")
      .with_parameters(options.parameters())
      .with_history(options.history());
    let payload = request.payload();
    assert_eq!(payload["inputs"]["text"], "how are you");
    assert_eq!(payload["inputs"]["past_user_inputs"], json!(["hi"]));
    assert_eq!(payload["inputs"]["generated_responses"], json!(["hello"]));
    assert_eq!(payload["parameters"]["min_length"], 10);
    assert_eq!(payload["parameters"]["max_length"], 150);
}

// ===== Dispatch loop =====

#[tokio::test]
async fn test_all_candidates_unavailable_degrades_to_fallback()
{   let client = Arc::new(ScriptedClient::new());
    let outcome = dispatcher(client.clone())
      .dispatch("user-1", "hf_key", &sentiment_request("I love it"))
      .await
      .expect("fallback is not an error");

    assert!(outcome.is_degraded());
    assert_eq!(outcome.model_used(), "fallback");
    assert!(outcome.fallback_used());

    // one probe per candidate, no real request
    let calls = client.calls();
    assert_eq!(calls.len(), SENTIMENT.len());
    for (call, model) in calls.iter().zip(SENTIMENT.iter())
    {   assert_eq!(call.model, *model);
        assert_eq!(call.body, json!({ "inputs": "Hello" }));
        assert_eq!(call.timeout, Duration::from_secs(5));
    }
}

#[tokio::test]
async fn test_invalid_credential_mid_loop_continues()
{   let client = Arc::new(
      ScriptedClient::new()
        .script(SENTIMENT[0], vec![
          probe_ok()
        , status(401, json!({ "error": "Invalid credentials in Authorization header" }))
        ])
        .script(SENTIMENT[1], vec![
          probe_ok()
        , ok(json!([[{ "label": "POSITIVE", "score": 0.99 }]]))
        ])
    );
    let outcome = dispatcher(client.clone())
      .dispatch("user-1", "hf_key", &sentiment_request("I love it"))
      .await
      .unwrap();

    match outcome
    {   DispatchOutcome::Served(served) => {
          assert_eq!(served.model_used, SENTIMENT[1]);
          assert!(served.used_fallback);
          assert_eq!(
            served.notice.as_deref()
          , Some(
              "Note: The requested model \"distilbert-base-uncased-finetuned-sst-2-english\" \
               was unavailable. Used \"cardiffnlp/twitter-roberta-base-sentiment\" instead."
            )
          );
        }
      , other => panic!("expected served outcome, got {:?}", other)
    }

    let calls = client.calls_for(SENTIMENT[1]);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].body, json!({ "inputs": "I love it" }));
    assert_eq!(calls[1].timeout, Duration::from_secs(20));
    assert!(client.calls_for(SENTIMENT[2]).is_empty());
}

#[tokio::test]
async fn test_exhausted_candidates_classify_last_error()
{   let client = Arc::new(
      ScriptedClient::new()
        .script(SENTIMENT[0], vec![probe_ok(), status(401, json!({}))])
        .script(SENTIMENT[3], vec![
          probe_ok()
        , status(404, json!({ "error": "Model xyz does not exist" }))
        ])
    );
    let err = dispatcher(client)
      .dispatch("user-1", "hf_key", &sentiment_request("meh"))
      .await
      .unwrap_err();
    assert_eq!(err, Error::ModelNotFound("xyz".to_string()));
    assert_eq!(
      err.to_string()
    , "xyz does not exist on Hugging Face. Please check the model name."
    );
}

#[tokio::test]
async fn test_probe_failures_do_not_replace_last_error()
{   let client = Arc::new(
      ScriptedClient::new()
        .script(SENTIMENT[0], vec![probe_ok(), status(401, json!({}))])
    );
    let err = dispatcher(client)
      .dispatch("user-1", "bad_key", &sentiment_request("meh"))
      .await
      .unwrap_err();
    assert_eq!(err, Error::InvalidCredential);
}

#[tokio::test]
async fn test_abort_on_invalid_credential_stops_loop()
{   let client = Arc::new(
      ScriptedClient::new()
        .script(SENTIMENT[0], vec![probe_ok(), status(401, json!({}))])
        .script(SENTIMENT[1], vec![probe_ok(), ok(json!([]))])
    );
    let mut config = DispatchConfig::default();
    config.failover.abort_on_invalid_credential = true;
    let err = dispatcher_with(client.clone(), Arc::new(MemorySink::default()), config)
      .dispatch("user-1", "bad_key", &sentiment_request("meh"))
      .await
      .unwrap_err();
    assert_eq!(err, Error::InvalidCredential);
    assert!(client.calls_for(SENTIMENT[1]).is_empty());
}

#[tokio::test]
async fn test_service_unavailable_as_last_error_degrades()
{   let client = Arc::new(
      ScriptedClient::new()
        .script(SENTIMENT[2], vec![
          probe_ok()
        , status(503, json!({ "error": "Service Unavailable" }))
        ])
    );
    let outcome = dispatcher(client)
      .dispatch("user-1", "hf_key", &sentiment_request("meh"))
      .await
      .unwrap();
    assert!(outcome.is_degraded());
}

#[tokio::test]
async fn test_oversized_requested_model_is_never_called()
{   let big = "meta-llama/Llama-2-70b-chat-hf";
    let client = Arc::new(
      ScriptedClient::new()
        .script("microsoft/phi-2", vec![
          probe_ok()
        , ok(json!([{ "generated_text": "A calm and quiet evening by the sea" }]))
        ])
    );
    let request = GenerationRequest::new(Task::Creative, "describe an evening")
      .with_model(Some(big.to_string()));
    let outcome = dispatcher(client.clone())
      .dispatch("user-1", "hf_key", &request)
      .await
      .unwrap();

    assert!(client.calls_for(big).is_empty());
    assert_eq!(outcome.model_used(), "microsoft/phi-2");
    assert!(outcome.fallback_used());
}

#[tokio::test]
async fn test_usage_recorded_only_on_success()
{   let (usage_tx, mut usage_rx) = mpsc::unbounded_channel::<UsageRecord>();
    let client = Arc::new(
      ScriptedClient::new()
        .script(SENTIMENT[0], vec![probe_ok(), ok(json!([[]]))])
    );
    let dispatcher = Dispatcher::new(client, Arc::new(usage_tx), DispatchConfig::default());

    dispatcher
      .dispatch("user-42", "hf_key", &sentiment_request("fine"))
      .await
      .unwrap();
    let record = usage_rx.try_recv().expect("usage record");
    assert_eq!(record.user_id, "user-42");
    assert_eq!(record.task, Task::Sentiment);
    assert_eq!(record.model_used, SENTIMENT[0]);

    // script exhausted: everything unavailable now
    let outcome = dispatcher
      .dispatch("user-42", "hf_key", &sentiment_request("fine"))
      .await
      .unwrap();
    assert!(outcome.is_degraded());
    assert!(usage_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_usage_sink_failure_does_not_affect_caller()
{   let (usage_tx, usage_rx) = mpsc::unbounded_channel::<UsageRecord>();
    drop(usage_rx);
    let client = Arc::new(
      ScriptedClient::new()
        .script(SENTIMENT[0], vec![probe_ok(), ok(json!([[]]))])
    );
    let dispatcher = Dispatcher::new(client, Arc::new(usage_tx), DispatchConfig::default());
    let outcome = dispatcher
      .dispatch("user-42", "hf_key", &sentiment_request("fine"))
      .await
      .unwrap();
    assert_eq!(outcome.model_used(), SENTIMENT[0]);
}

// ===== Task entry points =====

#[tokio::test]
async fn test_generate_creative_formats_markdown()
{   let raw = "The keeper climbed the stairs every night.\n\n\
               The keeper climbed the stairs every night.\n\n\
               Ships passed safely along the rocky coast";
    let client = Arc::new(
      ScriptedClient::new()
        .script("microsoft/phi-2", vec![
          probe_ok()
        , ok(json!([{ "generated_text": raw }]))
        ])
    );
    let sink = Arc::new(MemorySink::default());
    let result = dispatcher_with(client.clone(), sink.clone(), DispatchConfig::default())
      .generate_creative(
        "user-1"
      , "hf_key"
      , "write a short story about a lighthouse"
      , &CreativeOptions::default()
      )
      .await
      .unwrap();

    assert_eq!(result.generated_text, raw);
    assert_eq!(
      result.formatted_markdown
    , "# A lighthouse\n\n\
       The keeper climbed the stairs every night.\n\n\
       Ships passed safely along the rocky coast."
    );
    assert_eq!(result.model_used, "microsoft/phi-2");
    assert!(!result.fallback_used);
    assert_eq!(result.notice, None);

    let calls = client.calls_for("microsoft/phi-2");
    let body = &calls[1].body;
    assert_eq!(body["inputs"], "write a short story about a lighthouse");
    assert_eq!(body["parameters"]["max_length"], 150);
    assert_eq!(body["parameters"]["return_full_text"], false);
    assert_eq!(sink.records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_generate_creative_fallback_document()
{   let client = Arc::new(ScriptedClient::new());
    let result = dispatcher(client)
      .generate_creative("user-1", "hf_key", "write a poem", &CreativeOptions::default())
      .await
      .unwrap();
    assert_eq!(result.model_used, "fallback");
    assert!(result.fallback_used);
    assert!(result.formatted_markdown.starts_with("# Service Temporarily Unavailable"));
    assert!(result.notice.is_some());
}

#[tokio::test]
async fn test_blank_prompt_is_rejected_before_dispatch()
{   let client = Arc::new(ScriptedClient::new());
    let err = dispatcher(client.clone())
      .generate_creative("user-1", "hf_key", "  ", &CreativeOptions::default())
      .await
      .unwrap_err();
    assert_eq!(err, Error::InvalidRequest("Prompt is required".to_string()));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_analyze_sentiment_unwraps_nested_results()
{   let client = Arc::new(
      ScriptedClient::new()
        .script(SENTIMENT[0], vec![
          probe_ok()
        , ok(json!([[
            { "label": "POSITIVE", "score": 0.98 },
            { "label": "NEGATIVE", "score": 0.02 }
          ]]))
        ])
    );
    let result = dispatcher(client)
      .analyze_sentiment("user-1", "hf_key", "What a day", &SentimentOptions::default())
      .await
      .unwrap();
    assert_eq!(result.sentiment_results.len(), 2);
    assert_eq!(result.sentiment_results[0]["label"], "POSITIVE");
    assert!(!result.fallback_used);
}

#[tokio::test]
async fn test_analyze_sentiment_fallback_is_empty()
{   let client = Arc::new(ScriptedClient::new());
    let result = dispatcher(client)
      .analyze_sentiment("user-1", "hf_key", "What a day", &SentimentOptions::default())
      .await
      .unwrap();
    assert!(result.sentiment_results.is_empty());
    assert_eq!(result.model_used, "fallback");
    assert_eq!(
      result.notice.as_deref()
    , Some("Note: All sentiment analysis models are currently unavailable.")
    );
}

#[tokio::test]
async fn test_converse_keeps_upstream_fields()
{   let client = Arc::new(
      ScriptedClient::new()
        .script("microsoft/DialoGPT-medium", vec![
          probe_ok()
        , ok(json!({
            "generated_text": "Sure, I can help you plan a trip to the mountains",
            "conversation": { "past_user_inputs": ["Can you help me plan a trip?"] }
          }))
        ])
    );
    let options = ConversationOptions
    {   past_user_inputs: vec!["Hi".to_string()]
      , generated_responses: vec!["Hello!".to_string()]
      , ..ConversationOptions::default()
    };
    let result = dispatcher(client.clone())
      .converse("user-1", "hf_key", "Can you help me plan a trip?", &options)
      .await
      .unwrap();

    assert_eq!(result.generated_text, "Sure, I can help you plan a trip to the mountains");
    assert!(result.response.contains_key("conversation"));
    assert!(!result.response.contains_key("generated_text"));
    assert_eq!(
      result.formatted_markdown
    , "# Can you help me plan...\n\n\
       Sure, I can help you plan a trip to the mountains."
    );

    let calls = client.calls_for("microsoft/DialoGPT-medium");
    assert_eq!(calls[1].body["inputs"]["past_user_inputs"], json!(["Hi"]));
    assert_eq!(calls[1].body["parameters"]["temperature"], 0.8);
}
