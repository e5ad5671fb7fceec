//! Fraud Scoring Pipeline - Main Entry Point
//!
//! Loads (or trains) the fitted pipeline, then answers scoring requests from
//! NATS with a bounded number of concurrent workers.

use anyhow::{Context, Result};
use fraud_scoring_pipeline::{
    config::AppConfig,
    consumer::RequestConsumer,
    handler::RequestHandler,
    logging::init_tracing,
    metrics::{MetricsReporter, ScoringMetrics},
    models::ArtifactStore,
    producer::ResultProducer,
    scoring::ScoringService,
    training::Trainer,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    info!("Starting Fraud Scoring Pipeline");
    info!(
        threshold = config.scoring.threshold,
        demo_trigger = config.scoring.demo.enabled,
        model_path = %config.storage.model_path.display(),
        "Configuration loaded"
    );

    let store = ArtifactStore::from_config(&config.storage);
    let service = Arc::new(ScoringService::new(store, config.scoring.threshold));

    // Startup never exits on a bad artifact or failed training
    let startup = {
        let service = service.clone();
        let trainer = Trainer::new(config.training.clone());
        let dataset_path = config.storage.dataset_path.clone();
        let train_if_missing = config.scoring.train_if_missing;
        tokio::task::spawn_blocking(move || {
            service.load_or_train(&trainer, dataset_path, train_if_missing)
        })
        .await
        .context("Startup task panicked")?
    };
    info!(startup = ?startup, "Pipeline ready");

    match service.load_reference_dataset(&config.storage.dataset_path) {
        Ok(rows) => info!(rows, "Reference dataset loaded"),
        Err(e) => warn!(error = %e, "Reference dataset unavailable; sampling disabled"),
    }

    let metrics = Arc::new(ScoringMetrics::new());
    let handler = Arc::new(RequestHandler::new(
        service.clone(),
        metrics.clone(),
        config.scoring.demo.clone(),
        &config.nats,
    ));

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats.request_subjects());
    let producer = Arc::new(ResultProducer::new(client.clone(), &config.nats.result_subject));

    let num_workers = config.pipeline.workers;
    info!(
        workers = num_workers,
        subjects = ?consumer.subjects(),
        results = %producer.subject(),
        "Starting request loop"
    );

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let handled_count = Arc::new(AtomicU64::new(0));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.report_interval_secs);
    tokio::spawn(reporter.start());

    let mut requests = consumer.subscribe().await?;

    while let Some(message) = requests.next().await {
        let Some(route) = handler.route(&message.subject) else {
            warn!(subject = %message.subject, "No route for subject");
            continue;
        };

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Worker semaphore closed")?;

        let handler = handler.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();
        let handled_count = handled_count.clone();

        tokio::spawn(async move {
            let reply = message.reply.clone();
            let payload = message.payload;

            // Scoring is CPU-bound; keep it off the async workers
            let response =
                match tokio::task::spawn_blocking(move || handler.handle(route, &payload)).await {
                    Ok(response) => response,
                    Err(e) => {
                        error!(error = %e, "Request handler panicked");
                        drop(permit);
                        return;
                    }
                };

            if let Some(reply) = reply.as_deref() {
                if let Err(e) = producer.reply(reply, response.to_bytes()).await {
                    error!(error = %e, "Failed to send reply");
                }
            }

            if let Some(result) = &response.scored {
                if let Err(e) = producer.publish(result).await {
                    error!(score_id = %result.score_id, error = %e, "Failed to publish result");
                }
            }

            let count = handled_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                let stats = metrics.get_processing_stats();
                info!(
                    handled = count,
                    throughput = format!("{:.1} req/s", metrics.get_throughput()),
                    avg_latency_us = stats.mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    info!("Pipeline shutting down...");
    metrics.print_summary();

    Ok(())
}
