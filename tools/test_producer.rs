//! Test Payment Producer
//!
//! Sends simulated payment requests to the scoring service and logs the
//! verdicts it replies with.
//!
//! Usage: test_producer [nats_url] [subject] [count] [suspicious_rate] [delay_ms]

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Payment request matching the service's expected format
#[derive(Debug, Clone, Serialize)]
struct PaymentRequest {
    amount: f64,
}

/// Subset of the service reply worth logging
#[derive(Debug, Deserialize)]
struct Reply {
    label: Option<String>,
    probability: Option<f64>,
    error: Option<String>,
}

/// Payment generator for testing
struct PaymentGenerator {
    rng: rand::rngs::ThreadRng,
}

impl PaymentGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Everyday purchase amount
    fn generate_ordinary(&mut self) -> PaymentRequest {
        PaymentRequest {
            amount: (self.rng.gen_range(1.0..500.0_f64) * 100.0).round() / 100.0,
        }
    }

    /// Amount large enough to hit the demo trigger
    fn generate_suspicious(&mut self) -> PaymentRequest {
        let amount = if self.rng.gen_bool(0.5) {
            9999.0
        } else {
            (self.rng.gen_range(5000.01..10000.0_f64) * 100.0).round() / 100.0
        };
        PaymentRequest { amount }
    }

    fn next(&mut self, suspicious_rate: f64) -> (PaymentRequest, bool) {
        if self.rng.gen_bool(suspicious_rate) {
            (self.generate_suspicious(), true)
        } else {
            (self.generate_ordinary(), false)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Payment Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("fraud.payment");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let suspicious_rate: f64 = args
        .get(4)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.1_f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        suspicious_rate = suspicious_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, suspicious_rate, delay_ms).await;
        }
    };

    let mut generator = PaymentGenerator::new();
    let mut flagged_count = 0;
    let mut suspicious_count = 0;

    info!("Starting to send {} payments...", count);

    for i in 0..count {
        let (payment, suspicious) = generator.next(suspicious_rate);
        if suspicious {
            suspicious_count += 1;
        }

        let payload = serde_json::to_vec(&payment)?;
        match client.request(subject.to_string(), payload.into()).await {
            Ok(message) => match serde_json::from_slice::<Reply>(&message.payload) {
                Ok(Reply {
                    error: Some(kind), ..
                }) => warn!(amount = payment.amount, kind = %kind, "Payment rejected"),
                Ok(reply) => {
                    if reply.label.as_deref() == Some("flagged") {
                        flagged_count += 1;
                    }
                    info!(
                        amount = payment.amount,
                        label = ?reply.label,
                        probability = ?reply.probability,
                        "Payment scored"
                    );
                }
                Err(e) => warn!(error = %e, "Unreadable reply"),
            },
            Err(e) => warn!(error = %e, "Request failed"),
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Sent {}/{} payments ({} suspicious, {} flagged)",
                i + 1,
                count,
                suspicious_count,
                flagged_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} payments ({} suspicious, {} flagged)",
        count, suspicious_count, flagged_count
    );

    Ok(())
}

async fn run_dry_mode(count: u64, suspicious_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = PaymentGenerator::new();

    for i in 0..count {
        let (payment, suspicious) = generator.next(suspicious_rate);
        let json = serde_json::to_string(&payment)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!(suspicious, "Sample payment {}: {}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
