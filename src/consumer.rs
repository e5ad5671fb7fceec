//! NATS subscriptions for incoming scoring requests

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::stream::{self, SelectAll};
use tracing::info;

/// Consumer for the request subjects the service answers on
pub struct RequestConsumer {
    client: Client,
    subjects: Vec<String>,
}

impl RequestConsumer {
    pub fn new<S: AsRef<str>>(client: Client, subjects: &[S]) -> Self {
        Self {
            client,
            subjects: subjects.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    /// Subscribe to every request subject, merged into one stream
    pub async fn subscribe(&self) -> Result<SelectAll<Subscriber>> {
        let mut subscribers = Vec::with_capacity(self.subjects.len());
        for subject in &self.subjects {
            subscribers.push(self.client.subscribe(subject.clone()).await?);
            info!(subject = %subject, "Subscribed to request subject");
        }
        Ok(stream::select_all(subscribers))
    }

    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }
}
