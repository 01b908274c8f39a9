use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::domain::error::AppError;
use crate::domain::job::{Job, JobRequest, JobSnapshot, JobState};
use crate::domain::narrator::ProgressNarrator;
use crate::domain::settings::OrchestratorSettings;
use crate::domain::types::{AudioFile, JobId};
use crate::domain::validator::FileValidator;
use crate::infra::scheduler::{sleep_or_cancel, CancelHandle};
use crate::infra::transport::{StatusReply, SubmitTarget, TranscriptionTransport};

/// ジョブオーケストレーター: 単一ライブジョブのライフサイクルを駆動する
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn TranscriptionTransport>,
    settings: OrchestratorSettings,
    validator: FileValidator,
    narrator: ProgressNarrator,
    slot: Mutex<Slot>,
    events: mpsc::UnboundedSender<JobSnapshot>,
    /// オーケストレーター破棄済み。以後の遷移はすべて捨てる
    closed: AtomicBool,
}

/// ライブジョブの枠。generation が一致しない応答は捨てる
struct Slot {
    generation: u64,
    job: Option<Job>,
    cancel: Option<CancelHandle>,
    handle: Option<JoinHandle<()>>,
    current: JobSnapshot,
}

impl Slot {
    fn live_job_mut(&mut self, generation: u64) -> Option<&mut Job> {
        if self.generation != generation {
            return None;
        }
        self.job
            .as_mut()
            .filter(|job| job.generation == generation && job.state.is_live())
    }

    /// タイマー停止。タスク自身から呼ばれうるので abort はしない
    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.handle = None;
    }

    /// セッション終了: ライブジョブを止め、generation を進めて遅れて届く応答を無効にする。
    /// キャンセルしたジョブがあればそのジョブを返す
    fn end_session(&mut self) -> Option<&Job> {
        self.generation += 1;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.release();
        let job = self.job.as_mut()?;
        if !job.cancel(now()) {
            return None;
        }
        Some(job)
    }

    fn publish(&mut self, snapshot: JobSnapshot, events: &mpsc::UnboundedSender<JobSnapshot>) {
        self.current = snapshot.clone();
        if events.send(snapshot).is_err() {
            log::debug!("スナップショットの受信側がありません");
        }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl JobOrchestrator {
    /// オーケストレーターとスナップショット受信チャネルを返す
    pub fn new(
        transport: Arc<dyn TranscriptionTransport>,
        settings: OrchestratorSettings,
    ) -> (Self, mpsc::UnboundedReceiver<JobSnapshot>) {
        let (events, rx) = mpsc::unbounded_channel();
        let validator = FileValidator::new(settings.max_upload_bytes);
        let narrator = ProgressNarrator::new(settings.phrases.clone(), settings.message_cycle());
        let slot = Slot {
            generation: 0,
            job: None,
            cancel: None,
            handle: None,
            current: JobSnapshot::without_job(0, JobState::Idle, None, None, now()),
        };

        let inner = Inner {
            transport,
            settings,
            validator,
            narrator,
            slot: Mutex::new(slot),
            events,
            closed: AtomicBool::new(false),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// 新しいジョブを開始する。既存のジョブは先に破棄する。
    /// アップロードは同期的に検証し、不正なら Idle に戻してエラーを返す。
    pub async fn start(&self, request: JobRequest) -> Result<u64, AppError> {
        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;

        supersede(&mut slot);
        slot.generation += 1;
        let generation = slot.generation;
        let source = request.source_kind();

        let (artifact_name, file) = match request {
            JobRequest::Sample => (String::new(), None),
            JobRequest::Upload(file) => {
                slot.publish(
                    JobSnapshot::without_job(
                        generation,
                        JobState::Validating,
                        Some(source),
                        None,
                        now(),
                    ),
                    &inner.events,
                );
                match inner.validator.validate(file) {
                    Ok(valid) => (valid.artifact_name, Some(valid.file)),
                    Err(err) => {
                        log::info!("ジョブ {generation}: ファイル検証エラー ({:?})", err.reason);
                        let error = AppError::from(err);
                        slot.job = None;
                        slot.publish(
                            JobSnapshot::without_job(
                                generation,
                                JobState::Idle,
                                Some(source),
                                Some(error.clone()),
                                now(),
                            ),
                            &inner.events,
                        );
                        return Err(error);
                    }
                }
            }
        };

        let job = Job::new(generation, source, artifact_name, now());
        let cancel = CancelHandle::new();
        let snapshot = JobSnapshot::of_job(&job, &inner.phrase_for(&job));
        slot.job = Some(job);
        slot.cancel = Some(cancel.clone());
        slot.publish(snapshot, &inner.events);
        log::info!("ジョブ {generation} 開始 ({source:?}, transport: {})", inner.transport.name());

        let task_inner = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            task_inner.run(generation, file, cancel).await;
        });
        slot.handle = Some(handle);

        Ok(generation)
    }

    /// ライブジョブをキャンセル。終端・キャンセル済みなら何もしない（false）
    pub async fn cancel(&self) -> bool {
        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;
        let Some(job) = slot.job.as_mut() else {
            return false;
        };
        if !job.cancel(now()) {
            return false;
        }
        let snapshot = JobSnapshot::of_job(job, &inner.phrase_for(job));
        log::info!("ジョブ {} をキャンセル", snapshot.generation);
        slot.release();
        slot.publish(snapshot, &inner.events);
        true
    }

    /// セッション終了: ライブジョブを止めてタスクも破棄する。
    /// ライブジョブがあれば Cancelled を一度だけ通知する
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;
        let Some(job) = slot.end_session() else {
            return;
        };
        let snapshot = JobSnapshot::of_job(job, &inner.phrase_for(job));
        log::info!("セッション終了: ジョブ {} をキャンセル", snapshot.generation);
        slot.publish(snapshot, &inner.events);
    }

    /// 最新のスナップショット
    pub async fn snapshot(&self) -> JobSnapshot {
        self.inner.slot.lock().await.current.clone()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    pub fn narrator(&self) -> &ProgressNarrator {
        &self.inner.narrator
    }

    pub fn effective_timeout(&self) -> Duration {
        self.inner.settings.effective_timeout()
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        // ロックが取れなくても closed で以後の遷移は捨てられ、タスクは次の応答で終わる
        if let Ok(mut slot) = self.inner.slot.try_lock() {
            if let Some(job) = slot.end_session() {
                log::debug!("ジョブ {} を破棄", job.generation);
            }
        }
    }
}

/// 直前のジョブを破棄する（通知はしない）
fn supersede(slot: &mut Slot) {
    if let Some(job) = slot.job.as_mut() {
        if job.cancel(now()) {
            log::warn!(
                "ジョブ {} 実行中に新しいジョブを開始します (attempt: {})",
                job.generation,
                job.attempt
            );
        }
    }
    slot.release();
}

impl Inner {
    fn phrase_for(&self, job: &Job) -> String {
        match job.state {
            JobState::Succeeded => "Transcription complete.".to_string(),
            JobState::Cancelled => "Transcription cancelled.".to_string(),
            JobState::Failed | JobState::TimedOut => job
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_default(),
            _ => self.narrator.phrase_for(job.attempt).to_string(),
        }
    }

    /// generation が一致するライブジョブにだけ遷移を適用し、通知する。
    /// 古い応答なら何もせず None。
    async fn update<F>(&self, generation: u64, apply: F) -> Option<JobState>
    where
        F: FnOnce(&mut Job) -> Result<(), AppError>,
    {
        let mut slot = self.slot.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            log::debug!("ジョブ {generation}: 破棄済みのため応答を無視");
            return None;
        }
        let Some(job) = slot.live_job_mut(generation) else {
            log::debug!("ジョブ {generation} の古い応答を破棄");
            return None;
        };

        let prev = job.state;
        if let Err(e) = apply(job) {
            log::error!("ジョブ {generation}: 不正な遷移 {e}");
            return None;
        }
        let state = job.state;
        let snapshot = JobSnapshot::of_job(job, &self.phrase_for(job));

        if prev != state {
            log::info!("ジョブ {generation}: {} → {}", prev.as_str(), state.as_str());
        } else {
            log::debug!("ジョブ {generation}: attempt {}", snapshot.attempt);
        }
        if let Some(error) = &snapshot.error {
            log::warn!("ジョブ {generation}: {error}");
        }

        if state.is_terminal() {
            slot.release();
        }
        slot.publish(snapshot, &self.events);
        Some(state)
    }

    async fn run(&self, generation: u64, file: Option<AudioFile>, cancel: CancelHandle) {
        let target = match file {
            Some(file) => match self.transport.upload(&file).await {
                Ok(upload) => SubmitTarget::Upload(upload),
                Err(e) => {
                    self.update(generation, |job| job.fail(AppError::submission(&e), now()))
                        .await;
                    return;
                }
            },
            None => SubmitTarget::Sample,
        };
        if cancel.is_cancelled() {
            return;
        }

        let job_id = match self.transport.submit(&target).await {
            Ok(id) => id,
            Err(e) => {
                self.update(generation, |job| job.fail(AppError::submission(&e), now()))
                    .await;
                return;
            }
        };
        let assigned = job_id.clone();
        if self
            .update(generation, move |job| job.assign_id(assigned, now()))
            .await
            != Some(JobState::Polling)
        {
            return;
        }

        self.poll_loop(generation, &job_id, &cancel).await;
    }

    async fn poll_loop(&self, generation: u64, job_id: &JobId, cancel: &CancelHandle) {
        let max_attempts = self.settings.max_attempts;
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let state = match self.transport.poll_status(job_id).await {
                Ok(StatusReply::Ready(result)) if !result.is_empty() => {
                    self.update(generation, |job| job.succeed(result, now()))
                        .await
                }
                Ok(StatusReply::Pending) | Ok(StatusReply::Ready(_)) => {
                    self.update(generation, |job| job.record_pending(max_attempts, now()))
                        .await
                }
                Ok(StatusReply::Completed) => self.fetch_completed(generation, job_id).await,
                Err(e) => {
                    self.update(generation, |job| job.fail(AppError::poll(&e), now()))
                        .await
                }
            };

            if state != Some(JobState::Polling) {
                return;
            }
            if !sleep_or_cancel(self.settings.poll_interval(), cancel).await {
                return;
            }
        }
    }

    /// 完了通知のみの応答。結果を取りに行き、空ならまだ処理中とみなす
    async fn fetch_completed(&self, generation: u64, job_id: &JobId) -> Option<JobState> {
        let max_attempts = self.settings.max_attempts;
        match self.transport.fetch_result(job_id).await {
            Ok(Some(result)) if !result.is_empty() => {
                self.update(generation, |job| job.succeed(result, now()))
                    .await
            }
            Ok(_) => {
                self.update(generation, |job| job.record_pending(max_attempts, now()))
                    .await
            }
            Err(e) => {
                self.update(generation, |job| job.fail(AppError::poll(&e), now()))
                    .await
            }
        }
    }
}
