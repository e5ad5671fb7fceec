//! NATS publishing for replies and scoring results

use crate::types::verdict::ScoringResult;
use anyhow::Result;
use async_nats::Client;
use tracing::debug;

/// Publishes request replies and fans scoring results out to subscribers
#[derive(Clone)]
pub struct ResultProducer {
    client: Client,
    result_subject: String,
}

impl ResultProducer {
    pub fn new(client: Client, result_subject: &str) -> Self {
        Self {
            client,
            result_subject: result_subject.to_string(),
        }
    }

    /// Publish a scoring result on the result subject
    pub async fn publish(&self, result: &ScoringResult) -> Result<()> {
        let payload = serde_json::to_vec(result)?;

        self.client
            .publish(self.result_subject.clone(), payload.into())
            .await?;

        debug!(
            score_id = %result.score_id,
            label = ?result.label,
            probability = result.probability,
            "Published scoring result"
        );

        Ok(())
    }

    /// Answer a request on its reply subject
    pub async fn reply(&self, reply_subject: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(reply_subject.to_string(), payload.into())
            .await?;
        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.result_subject
    }
}
