use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use longshore::cli::{Cli, Commands};
use longshore::config::{FileSettingsStore, SettingsStore};
use longshore::extractor::ExtractionClient;
use longshore::flow::{PipelineCoordinator, StageRunner};
use longshore::pipeline::{AudioExtractionStage, AudioRequest, DownloadRequest, DownloadStage};
use longshore::report::LogReportSink;
use longshore::storage::S3ObjectStore;
use longshore::transcode::FfmpegTranscoder;
use longshore::utils;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "longshore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let missing = utils::check_dependencies().await;
    if !missing.is_empty() {
        for tool in &missing {
            tracing::warn!("missing external tool: {tool}");
        }
        tracing::warn!("continuing anyway; stages that need these tools will fail");
    }

    match cli.command {
        Commands::Download {
            source_url,
            task_id,
            object_name,
        } => {
            utils::validate_source_url(&source_url)?;
            let settings = FileSettingsStore::load()?;
            let task_id = task_id.unwrap_or_else(new_task_id);

            let stage = build_download_stage(&settings, &cli.extractor, &cli.bucket).await?;
            let path = stage
                .run(&DownloadRequest {
                    source_url,
                    task_id,
                    object_name,
                })
                .await?;
            println!("Stored video object: {path}");
        }
        Commands::ExtractAudio {
            source_object_path,
            task_id,
            object_name,
        } => {
            let settings = FileSettingsStore::load()?;

            let stage = build_audio_stage(&settings, &cli.bucket).await?;
            let path = stage
                .run(&AudioRequest {
                    source_object_path,
                    task_id,
                    object_name,
                })
                .await?;
            println!("Stored audio object: {path}");
        }
        Commands::Run {
            source_url,
            task_id,
            object_name,
            audio_name,
            max_attempts,
        } => {
            utils::validate_source_url(&source_url)?;
            let settings = FileSettingsStore::load()?;
            let task_id = task_id.unwrap_or_else(new_task_id);

            let download =
                Arc::new(build_download_stage(&settings, &cli.extractor, &cli.bucket).await?);
            let audio = Arc::new(build_audio_stage(&settings, &cli.bucket).await?);
            let runner = StageRunner::new(max_attempts);
            let coordinator = PipelineCoordinator::new(runner.clone(), download, audio);

            let summary = coordinator
                .run(
                    DownloadRequest {
                        source_url,
                        task_id,
                        object_name,
                    },
                    audio_name,
                )
                .await?;
            println!(
                "Download run {} ({})",
                summary.download_run_id, summary.download_status
            );
            println!("Audio run {} dispatched", summary.audio_run_id);

            // Keep the process alive until the dispatched audio unit settles.
            runner.drain().await;
        }
        Commands::Config => {
            let settings = FileSettingsStore::load()?;
            settings.display();
        }
    }

    Ok(())
}

fn new_task_id() -> String {
    format!("task-{}", uuid::Uuid::new_v4())
}

async fn build_download_stage(
    settings: &FileSettingsStore,
    extractor_name: &str,
    bucket_name: &str,
) -> Result<DownloadStage> {
    let extractor_settings = settings.load_extractor(extractor_name).await?;
    let bucket_settings = settings.load_bucket(bucket_name).await?;

    let resolver = Arc::new(ExtractionClient::new(extractor_settings)?);
    let store = Arc::new(S3ObjectStore::connect(&bucket_settings).await?);

    let mut stage = DownloadStage::new(
        resolver,
        store,
        Arc::new(LogReportSink),
        bucket_settings.path_prefix.clone(),
    );
    if let Some(dir) = &settings.config().app.scratch_dir {
        stage = stage.with_scratch_dir(dir.clone());
    }
    Ok(stage)
}

async fn build_audio_stage(
    settings: &FileSettingsStore,
    bucket_name: &str,
) -> Result<AudioExtractionStage> {
    let bucket_settings = settings.load_bucket(bucket_name).await?;

    let store = Arc::new(S3ObjectStore::connect(&bucket_settings).await?);

    let mut stage = AudioExtractionStage::new(
        store,
        Arc::new(FfmpegTranscoder::new()),
        Arc::new(LogReportSink),
        bucket_settings.path_prefix.clone(),
    );
    if let Some(dir) = &settings.config().app.scratch_dir {
        stage = stage.with_scratch_dir(dir.clone());
    }
    Ok(stage)
}
