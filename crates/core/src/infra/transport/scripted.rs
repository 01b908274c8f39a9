use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::sample::{sample_job_id, sample_transcript};
use super::{StatusReply, SubmitTarget, TranscriptionTransport, TransportError};
use crate::domain::types::{AudioFile, JobId, TranscriptResult, UploadRef};

/// 呼び出し回数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub upload: usize,
    pub submit: usize,
    pub poll: usize,
    pub fetch: usize,
}

/// delay 後に返す応答
struct Delayed<T> {
    delay: Duration,
    reply: Result<T, TransportError>,
}

impl<T> Delayed<T> {
    fn now(reply: Result<T, TransportError>) -> Self {
        Self {
            delay: Duration::ZERO,
            reply,
        }
    }

    async fn resolve(self) -> Result<T, TransportError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply
    }
}

/// ScriptedTransport: 事前に積んだ応答を順に返すインメモリ実装。
/// 応答が尽きたら poll は Pending、upload/submit は成功を返す。
#[derive(Default)]
pub struct ScriptedTransport {
    uploads: Mutex<VecDeque<Delayed<UploadRef>>>,
    submits: Mutex<VecDeque<Delayed<JobId>>>,
    polls: Mutex<VecDeque<Delayed<StatusReply>>>,
    fetches: Mutex<VecDeque<Result<Option<TranscriptResult>, TransportError>>>,
    upload_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `pending` 回 Pending を返した後にサンプル書き起こしを返す（--dry-run 用）
    pub fn demo(pending: usize) -> Result<Self, TransportError> {
        let mut transport = Self::new();
        let polls = transport.polls.get_mut();
        for _ in 0..pending {
            polls.push_back(Delayed::now(Ok(StatusReply::Pending)));
        }
        polls.push_back(Delayed::now(Ok(StatusReply::Ready(sample_transcript()?))));
        Ok(transport)
    }

    pub async fn push_upload(&self, reply: Result<UploadRef, TransportError>) {
        self.push_upload_after(Duration::ZERO, reply).await;
    }

    pub async fn push_upload_after(
        &self,
        delay: Duration,
        reply: Result<UploadRef, TransportError>,
    ) {
        self.uploads.lock().await.push_back(Delayed { delay, reply });
    }

    pub async fn push_submit(&self, reply: Result<JobId, TransportError>) {
        self.push_submit_after(Duration::ZERO, reply).await;
    }

    pub async fn push_submit_after(&self, delay: Duration, reply: Result<JobId, TransportError>) {
        self.submits.lock().await.push_back(Delayed { delay, reply });
    }

    pub async fn push_poll(&self, reply: Result<StatusReply, TransportError>) {
        self.push_poll_after(Duration::ZERO, reply).await;
    }

    /// delay 後に応答する poll を積む（遅延応答の再現用）
    pub async fn push_poll_after(
        &self,
        delay: Duration,
        reply: Result<StatusReply, TransportError>,
    ) {
        self.polls.lock().await.push_back(Delayed { delay, reply });
    }

    pub async fn push_fetch(&self, reply: Result<Option<TranscriptResult>, TransportError>) {
        self.fetches.lock().await.push_back(reply);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            upload: self.upload_calls.load(Ordering::SeqCst),
            submit: self.submit_calls.load(Ordering::SeqCst),
            poll: self.poll_calls.load(Ordering::SeqCst),
            fetch: self.fetch_calls.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl TranscriptionTransport for ScriptedTransport {
    async fn upload(&self, file: &AudioFile) -> Result<UploadRef, TransportError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.uploads.lock().await.pop_front();
        match next {
            Some(scripted) => scripted.resolve().await,
            None => Ok(UploadRef {
                key: file.name.clone(),
            }),
        }
    }

    async fn submit(&self, target: &SubmitTarget) -> Result<JobId, TransportError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.submits.lock().await.pop_front();
        if let Some(scripted) = next {
            return scripted.resolve().await;
        }
        Ok(match target {
            SubmitTarget::Sample => sample_job_id(),
            SubmitTarget::Upload(upload) => JobId(upload.key.clone()),
        })
    }

    async fn poll_status(&self, _job_id: &JobId) -> Result<StatusReply, TransportError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.polls.lock().await.pop_front();
        match next {
            Some(scripted) => scripted.resolve().await,
            None => Ok(StatusReply::Pending),
        }
    }

    async fn fetch_result(
        &self,
        _job_id: &JobId,
    ) -> Result<Option<TranscriptResult>, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetches.lock().await.pop_front().unwrap_or(Ok(None))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_when_script_is_empty() {
        let t = ScriptedTransport::new();
        let file = AudioFile::new("a.mp3", "audio/mpeg", vec![1, 2, 3]);
        let upload = t.upload(&file).await.unwrap();
        assert_eq!(upload.key, "a.mp3");
        let id = t.submit(&SubmitTarget::Upload(upload)).await.unwrap();
        assert_eq!(id.as_str(), "a.mp3");
        assert_eq!(t.poll_status(&id).await.unwrap(), StatusReply::Pending);
        assert_eq!(t.fetch_result(&id).await.unwrap(), None);
        assert_eq!(
            t.calls(),
            CallCounts {
                upload: 1,
                submit: 1,
                poll: 1,
                fetch: 1
            }
        );
    }

    #[tokio::test]
    async fn test_replies_are_returned_in_order() {
        let t = ScriptedTransport::new();
        t.push_poll(Ok(StatusReply::Pending)).await;
        t.push_poll(Err(TransportError::Timeout)).await;
        let id = JobId::from("x");
        assert_eq!(t.poll_status(&id).await.unwrap(), StatusReply::Pending);
        assert!(matches!(t.poll_status(&id).await, Err(TransportError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_submit_waits() {
        let t = ScriptedTransport::new();
        t.push_submit_after(Duration::from_secs(5), Ok(JobId::from("late")))
            .await;
        let started = tokio::time::Instant::now();
        let id = t.submit(&SubmitTarget::Sample).await.unwrap();
        assert_eq!(id.as_str(), "late");
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_demo_ends_with_sample() {
        let t = ScriptedTransport::demo(2).unwrap();
        let id = sample_job_id();
        assert_eq!(t.poll_status(&id).await.unwrap(), StatusReply::Pending);
        assert_eq!(t.poll_status(&id).await.unwrap(), StatusReply::Pending);
        assert!(matches!(t.poll_status(&id).await.unwrap(), StatusReply::Ready(_)));
    }

    #[test]
    fn test_name() {
        assert_eq!(ScriptedTransport::new().name(), "scripted");
    }
}
