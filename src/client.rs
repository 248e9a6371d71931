use std::time::Instant;
use tokio::sync::mpsc;
use log::{debug, error, info};
use crate::DispatchFoot;

/// Backend loop state: the dispatcher every task clones and the
/// optional admission limiter. Nothing here is per-request.
pub struct BackendState
{   pub dispatcher: crate::dispatch::Dispatcher
  , pub limiter: Option<crate::ratelimit::SlidingWindowLimiter>
}

impl BackendState
{   pub fn new(
      dispatcher: crate::dispatch::Dispatcher
    , limiter: Option<crate::ratelimit::SlidingWindowLimiter>
    ) -> Self
    {   debug!("Initializing BackendState");
        BackendState
        {   dispatcher
          , limiter
        }
    }

    /// Admit one request for `user_id`, or say why not
    fn admit(&mut self, user_id: &str)
      -> Result<(), crate::error::Error>
    {   match self.limiter.as_mut()
        {   Some(limiter) => {
              let now = Instant::now();
              limiter.evict_idle(now);
              limiter.check(user_id, now)
            }
          , None => Ok(())
        }
    }
}

/// Public API for the generation backend - owns the task
pub struct GenerationBackend
{   hand: crate::DispatchHand
  , _task_handle: tokio::task::JoinHandle<()>
}

impl GenerationBackend
{   /// Create and spawn a new backend
    /// Returns immediately - spawns background task
    pub fn new(
      dispatcher: crate::dispatch::Dispatcher
    , limiter: Option<crate::ratelimit::SlidingWindowLimiter>
    ) -> Self
    {   debug!("Creating GenerationBackend with task ownership");

        let (generate_creative_tx, generate_creative_rx)
          = mpsc::unbounded_channel();
        let (analyze_sentiment_tx, analyze_sentiment_rx)
          = mpsc::unbounded_channel();
        let (converse_tx, converse_rx)
          = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx)
          = mpsc::unbounded_channel();

        let hand = crate::DispatchHand
        {   generate_creative_tx
          , analyze_sentiment_tx
          , converse_tx
          , shutdown_tx
        };

        let foot = crate::DispatchFoot
        {   generate_creative_rx
          , analyze_sentiment_rx
          , converse_rx
          , shutdown_rx
        };

        let state = BackendState::new(dispatcher, limiter);
        let _task_handle = tokio::spawn(async move {
          run_backend_loop(foot, state).await
        });

        GenerationBackend
        {   hand
          , _task_handle
        }
    }

    /// Backend built from config: real upstream client, log usage
    /// sink and the configured rate limit, if any.
    pub fn from_config(config: crate::config::DispatchConfig)
      -> Result<Self, crate::error::Error>
    {   let limiter = config.rate_limit
          .as_ref()
          .map(crate::ratelimit::SlidingWindowLimiter::from_config);
        let dispatcher = crate::dispatch::Dispatcher::huggingface(config)?;
        Ok(GenerationBackend::new(dispatcher, limiter))
    }

    /// Queue creative generation - returns almost immediately
    pub async fn generate_creative(
      &self
    , user_id: String
    , credential: String
    , prompt: String
    , options: crate::request::CreativeOptions
    ) -> Result<
        mpsc::UnboundedReceiver<crate::CreativeReply>,
        crate::error::Error
      >
    {   debug!("generate_creative queuing command for {}", user_id);
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::GenerateCreativeArgs
        {   user_id
          , credential
          , prompt
          , options
          , reply: reply_tx
        };

        self.hand.generate_creative_tx
          .send(cmd)
          .map_err(|_| disconnected())?;

        Ok(reply_rx)
    }

    /// Queue sentiment analysis - returns almost immediately
    pub async fn analyze_sentiment(
      &self
    , user_id: String
    , credential: String
    , text: String
    , options: crate::request::SentimentOptions
    ) -> Result<
        mpsc::UnboundedReceiver<crate::SentimentReply>,
        crate::error::Error
      >
    {   debug!("analyze_sentiment queuing command for {}", user_id);
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::AnalyzeSentimentArgs
        {   user_id
          , credential
          , text
          , options
          , reply: reply_tx
        };

        self.hand.analyze_sentiment_tx
          .send(cmd)
          .map_err(|_| disconnected())?;

        Ok(reply_rx)
    }

    /// Queue a conversational turn - returns almost immediately
    pub async fn converse(
      &self
    , user_id: String
    , credential: String
    , message: String
    , options: crate::request::ConversationOptions
    ) -> Result<
        mpsc::UnboundedReceiver<crate::ConversationReply>,
        crate::error::Error
      >
    {   debug!("converse queuing command for {}", user_id);
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::ConverseArgs
        {   user_id
          , credential
          , message
          , options
          , reply: reply_tx
        };

        self.hand.converse_tx
          .send(cmd)
          .map_err(|_| disconnected())?;

        Ok(reply_rx)
    }

    /// Gracefully shutdown the backend. Requests already
    /// dispatched keep running to their own timeouts.
    pub async fn shutdown(self)
      -> Result<(), crate::error::Error>
    {   debug!("Shutting down GenerationBackend");
        let (reply_tx, mut reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::ShutdownArgs
        {   reply: reply_tx
        };

        self.hand.shutdown_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel already closed");
            crate::error::Error::Other(
              "Backend already shutdown".to_string()
            )
          })?;

        // Wait for shutdown confirmation
        match reply_rx.recv().await
        {   Some(result) => {
              debug!("Backend shutdown confirmed");
              result
            }
          , None => {
              error!("Backend exited without confirming shutdown");
              Err(crate::error::Error::Other(
                "Backend disconnected".to_string()
              ))
            }
        }
    }
}

fn disconnected() -> crate::error::Error
{   error!("Backend channel closed");
    crate::error::Error::Other("Backend disconnected".to_string())
}

/// Main backend event loop
///
/// tokio::select! only admits and routes. Every admitted request
/// runs in its own task, so one slow upstream never holds up the
/// loop or another caller.
async fn run_backend_loop(
  foot: crate::DispatchFoot
, mut state: BackendState
)
{   debug!("Starting GenerationBackend event loop");
    let DispatchFoot
    {   mut generate_creative_rx
      , mut analyze_sentiment_rx
      , mut converse_rx
      , mut shutdown_rx
    } = foot;

    loop
    { tokio::select!
      { Some(cmd) = generate_creative_rx.recv() => {
          debug!("Received GenerateCreative for {}", cmd.user_id);
          if let Err(e) = state.admit(&cmd.user_id)
          {   let _ = cmd.reply.send(Err(e));
              continue;
          }
          let dispatcher = state.dispatcher.clone();
          tokio::spawn(async move {
            let result = dispatcher
              .generate_creative(
                &cmd.user_id,
                &cmd.credential,
                &cmd.prompt,
                &cmd.options
              )
              .await;
            let _ = cmd.reply.send(result);
          });
        }
      , Some(cmd) = analyze_sentiment_rx.recv() => {
          debug!("Received AnalyzeSentiment for {}", cmd.user_id);
          if let Err(e) = state.admit(&cmd.user_id)
          {   let _ = cmd.reply.send(Err(e));
              continue;
          }
          let dispatcher = state.dispatcher.clone();
          tokio::spawn(async move {
            let result = dispatcher
              .analyze_sentiment(
                &cmd.user_id,
                &cmd.credential,
                &cmd.text,
                &cmd.options
              )
              .await;
            let _ = cmd.reply.send(result);
          });
        }
      , Some(cmd) = converse_rx.recv() => {
          debug!("Received Converse for {}", cmd.user_id);
          if let Err(e) = state.admit(&cmd.user_id)
          {   let _ = cmd.reply.send(Err(e));
              continue;
          }
          let dispatcher = state.dispatcher.clone();
          tokio::spawn(async move {
            let result = dispatcher
              .converse(
                &cmd.user_id,
                &cmd.credential,
                &cmd.message,
                &cmd.options
              )
              .await;
            let _ = cmd.reply.send(result);
          });
        }
      , Some(cmd) = shutdown_rx.recv() => {
          debug!("Received Shutdown");
          let _ = cmd.reply.send(Ok(()));
          info!("GenerationBackend shutting down");
          break;
        }
      , else => {
          debug!("All command channels closed");
          break;
        }
      }
    }
}
