use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use aupipe::asr::create_speech_recognizer;
use aupipe::audio::denoise::create_denoise_engine;
use aupipe::audio::transcode::create_transcoder;
use aupipe::audio::vad::create_vad_engine;
use aupipe::config::WorkerConfig;
use aupipe::emotion::create_emotion_engine;
use aupipe::health;
use aupipe::logging::init_logging;
use aupipe::pipeline::{Pipeline, PipelineSettings};
use aupipe::queue::QueueConsumer;
use aupipe::queue::transport::PullQueueClient;
use aupipe::storage::blob::HttpBlobStore;
use aupipe::storage::status::HttpStatusStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env().context("loading configuration")?;
    init_logging(config.log_json)?;

    info!("audio batch worker starting");

    let blob_store = Arc::new(HttpBlobStore::new(
        &config.blob_base_url,
        &config.blob_bucket,
        &config.blob_token,
    )?);
    let status_store = Arc::new(HttpStatusStore::new(
        &config.status_store_url,
        &config.status_store_secret,
    )?);
    let transcoder = create_transcoder(&config.transcoder_provider)?;
    let vad = create_vad_engine(&config.vad_provider)?;
    let denoiser = create_denoise_engine(&config.denoise_provider)?;
    let recognizer = create_speech_recognizer(&config.asr_provider, &config.asr_api_key)?;
    let emotion = match &config.emotion_provider {
        Some(provider) => Some(create_emotion_engine(provider, &config.emotion_api_key)?),
        None => None,
    };

    let pipeline = Arc::new(Pipeline::new(
        blob_store,
        status_store.clone(),
        transcoder,
        vad,
        denoiser,
        recognizer,
        emotion,
        PipelineSettings::default(),
    ));

    let transport = Arc::new(PullQueueClient::new(
        &config.queue_api_url,
        &config.queue_api_token,
    )?);
    let consumer = Arc::new(QueueConsumer::new(
        transport,
        status_store,
        config.consumer_config(),
    ));

    let shutdown = consumer.shutdown_token();
    let health_task = tokio::spawn(health::serve(config.health_port, shutdown.clone()));

    let mut consumer_task = {
        let consumer = consumer.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            consumer
                .run(move |batch_id, user_id| {
                    let pipeline = pipeline.clone();
                    async move {
                        pipeline.process_batch(&batch_id, &user_id, 0.0).await;
                        Ok(())
                    }
                })
                .await
        })
    };

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("installing SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received interrupt"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }

    // Let the current poll cycle finish, then force-cancel.
    consumer.stop();
    if tokio::time::timeout(config.shutdown_grace, &mut consumer_task)
        .await
        .is_err()
    {
        warn!(
            grace_seconds = config.shutdown_grace.as_secs(),
            "shutdown grace period elapsed, aborting in-flight work"
        );
        consumer_task.abort();
        let _ = consumer_task.await;
    }

    let _ = health_task.await;
    info!("audio batch worker stopped");
    Ok(())
}
