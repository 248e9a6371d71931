//! Fire-and-forget usage recording

use log::info;
use tokio::sync::mpsc;

/// Receives one record per successful model use.
/// Implementations must not block and must swallow their own failures.
pub trait UsageSink: Send + Sync
{   fn record(&self, record: crate::UsageRecord);
}

/// Writes usage as a structured log line
#[derive(Debug, Clone, Copy, Default)]
pub struct LogUsageSink;

impl UsageSink for LogUsageSink
{   fn record(&self, record: crate::UsageRecord)
    {   info!(
          "Hugging Face API usage user_id={} service_type={} model={} timestamp={}",
          record.user_id,
          record.task,
          record.model_used,
          record.timestamp.to_rfc3339()
        );
    }
}

/// Forward records to whoever holds the receiver; a closed
/// channel just drops them.
impl UsageSink for mpsc::UnboundedSender<crate::UsageRecord>
{   fn record(&self, record: crate::UsageRecord)
    {   let _ = self.send(record);
    }
}
