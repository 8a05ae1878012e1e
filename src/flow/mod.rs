//! Stage scheduling and the two-stage pipeline coordinator.
//!
//! Each stage runs as an independently spawned unit of work with a bounded
//! retry policy. The coordinator blocks on the download unit, because its
//! result key feeds the audio stage, but dispatches the audio unit without
//! awaiting it.

use std::future::Future;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::pipeline::{AudioExtractionStage, AudioRequest, DownloadRequest, DownloadStage};
use crate::PipelineError;

/// Dispatches named units of work with bounded retries.
///
/// Protocol errors are never retried: the extraction service already gave a
/// definitive answer, and the picker case needs a human.
#[derive(Clone)]
pub struct StageRunner {
    max_attempts: u32,
    detached: Arc<Mutex<Vec<JoinHandle<Result<String>>>>>,
}

impl StageRunner {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            detached: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Spawn a unit of work. `make_job` is re-invoked for each attempt.
    pub fn dispatch<F, Fut>(&self, label: String, make_job: F) -> StageRun
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let max_attempts = self.max_attempts;
        let handle = tokio::spawn(async move {
            let mut attempt = 1;
            loop {
                match make_job().await {
                    Ok(result) => {
                        tracing::info!("unit '{label}' completed (run {run_id})");
                        return Ok(result);
                    }
                    Err(err) if attempt < max_attempts && is_retryable(&err) => {
                        tracing::warn!(
                            "unit '{label}' attempt {attempt} failed: {err:#}; retrying"
                        );
                        attempt += 1;
                    }
                    Err(err) => {
                        tracing::error!("unit '{label}' failed after {attempt} attempt(s): {err:#}");
                        return Err(err);
                    }
                }
            }
        });

        StageRun {
            run_id,
            handle,
            runner: self.clone(),
        }
    }

    /// Await every detached unit. Called at process shutdown so
    /// dispatch-and-forget units still finish inside this process.
    pub async fn drain(&self) {
        loop {
            let handle = self.detached.lock().unwrap_or_else(|e| e.into_inner()).pop();
            let Some(handle) = handle else { break };
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => tracing::warn!("detached unit ended with error: {err:#}"),
                Err(err) => tracing::warn!("detached unit was cancelled: {err}"),
            }
        }
    }
}

impl Default for StageRunner {
    fn default() -> Self {
        Self::new(1)
    }
}

fn is_retryable(err: &anyhow::Error) -> bool {
    !matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::ServiceProtocol(_))
    )
}

/// Handle to a dispatched unit of work.
pub struct StageRun {
    run_id: Uuid,
    handle: JoinHandle<Result<String>>,
    runner: StageRunner,
}

impl StageRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Await the unit's terminal result.
    pub async fn join(self) -> Result<String> {
        self.handle.await.context("stage unit was cancelled")?
    }

    /// Leave the unit running; `StageRunner::drain` will collect it.
    pub fn detach(self) {
        self.runner
            .detached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(self.handle);
    }
}

/// Aggregate record of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRunSummary {
    pub download_run_id: Uuid,
    pub download_status: String,
    pub audio_run_id: Uuid,
}

/// Sequences the download and audio stages as two scheduled units, passing
/// the download's result key into the extraction stage.
pub struct PipelineCoordinator {
    runner: StageRunner,
    download: Arc<DownloadStage>,
    audio: Arc<AudioExtractionStage>,
}

impl PipelineCoordinator {
    pub fn new(
        runner: StageRunner,
        download: Arc<DownloadStage>,
        audio: Arc<AudioExtractionStage>,
    ) -> Self {
        Self {
            runner,
            download,
            audio,
        }
    }

    /// Run the download unit to completion, then hand its key to the audio
    /// unit without awaiting it. Stage failures surface unmasked; retries
    /// happen per unit inside the runner.
    pub async fn run(
        &self,
        request: DownloadRequest,
        audio_object_name: Option<String>,
    ) -> Result<PipelineRunSummary> {
        let task_id = request.task_id.clone();

        let download_stage = Arc::clone(&self.download);
        let download_run = self
            .runner
            .dispatch(format!("download-{task_id}"), move || {
                let stage = Arc::clone(&download_stage);
                let request = request.clone();
                async move { stage.run(&request).await }
            });
        let download_run_id = download_run.run_id();

        let video_key = download_run.join().await?;

        let audio_stage = Arc::clone(&self.audio);
        let audio_request = AudioRequest {
            source_object_path: video_key,
            task_id: task_id.clone(),
            object_name: audio_object_name,
        };
        let audio_run = self.runner.dispatch(format!("audio-{task_id}"), move || {
            let stage = Arc::clone(&audio_stage);
            let request = audio_request.clone();
            async move { stage.run(&request).await }
        });
        let audio_run_id = audio_run.run_id();
        audio_run.detach();

        Ok(PipelineRunSummary {
            download_run_id,
            download_status: "completed".to_string(),
            audio_run_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::MockMediaResolver;
    use crate::report::{ArtifactSummary, ReportSink};
    use crate::storage::memory::MemoryStore;
    use crate::storage::ObjectStore;
    use crate::transcode::MockTranscoder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullSink;

    #[async_trait::async_trait]
    impl ReportSink for NullSink {
        async fn publish(&self, _summary: &ArtifactSummary) {}
    }

    #[tokio::test]
    async fn runner_retries_until_the_unit_succeeds() {
        let runner = StageRunner::new(3);
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let run = runner.dispatch("flaky".to_string(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("transient failure")
                }
                Ok("done".to_string())
            }
        });

        assert_eq!(run.join().await.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn runner_never_retries_protocol_errors() {
        let runner = StageRunner::new(3);
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let run = runner.dispatch("picker".to_string(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::ServiceProtocol("user selection required".to_string()).into())
            }
        });

        assert!(run.join().await.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    fn coordinator_over(store: Arc<MemoryStore>, transcoder: MockTranscoder) -> PipelineCoordinator {
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_resolve()
            .returning(|_| Ok("http://download.test/video".to_string()));
        resolver
            .expect_fetch()
            .returning(|_, dest| fs_err::write(dest, b"video-bytes").map_err(Into::into));

        let download = Arc::new(
            DownloadStage::new(Arc::new(resolver), store.clone(), Arc::new(NullSink), None)
                .with_probe(crate::probe::MediaProbe::with_tool_path(
                    "/nonexistent/ffprobe-missing",
                )),
        );
        let audio = Arc::new(AudioExtractionStage::new(
            store,
            Arc::new(transcoder),
            Arc::new(NullSink),
            None,
        ));
        PipelineCoordinator::new(StageRunner::new(1), download, audio)
    }

    #[tokio::test]
    async fn pipeline_hands_the_download_key_to_the_audio_stage() {
        let store = Arc::new(MemoryStore::new());

        let mut transcoder = MockTranscoder::new();
        transcoder.expect_remux_audio().times(1).returning(|_, target| {
            fs_err::write(target, b"audio-bytes").unwrap();
            Ok(())
        });

        let coordinator = coordinator_over(store.clone(), transcoder);
        let summary = coordinator
            .run(
                DownloadRequest {
                    source_url: "http://example.com/video".to_string(),
                    task_id: "task-7".to_string(),
                    object_name: Some("video.mp4".to_string()),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(summary.download_status, "completed");
        assert_ne!(summary.download_run_id, summary.audio_run_id);

        // The audio unit was dispatched, not awaited; drain to observe it.
        coordinator.runner.drain().await;
        assert!(store
            .exists("task-7/extract-audio/video.audio.mka")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn download_failure_aborts_before_audio_dispatch() {
        let store = Arc::new(MemoryStore::new());

        let mut resolver = MockMediaResolver::new();
        resolver.expect_resolve().returning(|_| {
            Err(PipelineError::ServiceProtocol("unexpected service status 'busy'".to_string()).into())
        });
        resolver.expect_fetch().never();

        let mut transcoder = MockTranscoder::new();
        transcoder.expect_remux_audio().never();

        let download = Arc::new(DownloadStage::new(
            Arc::new(resolver),
            store.clone(),
            Arc::new(NullSink),
            None,
        ));
        let audio = Arc::new(AudioExtractionStage::new(
            store,
            Arc::new(transcoder),
            Arc::new(NullSink),
            None,
        ));
        let coordinator = PipelineCoordinator::new(StageRunner::new(2), download, audio);

        let err = coordinator
            .run(
                DownloadRequest {
                    source_url: "http://example.com/video".to_string(),
                    task_id: "task-8".to_string(),
                    object_name: None,
                },
                None,
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("busy"));
    }
}
