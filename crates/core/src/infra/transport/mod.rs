pub mod http;
pub mod sample;
mod scripted;

pub use http::HttpTransport;
pub use scripted::{CallCounts, ScriptedTransport};

use async_trait::async_trait;

use crate::domain::types::{AudioFile, JobId, TranscriptResult, UploadRef};

/// トランスポートエラー
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Response decode error: {0}")]
    Decode(String),
    #[error("Request timeout")]
    Timeout,
}

/// submit の対象
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitTarget {
    Sample,
    Upload(UploadRef),
}

/// pollStatus の応答
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReply {
    /// まだ処理中（空の応答）
    Pending,
    /// 完了、ペイロード付き
    Ready(TranscriptResult),
    /// 完了、ペイロードは fetch_result で取得する
    Completed,
}

impl StatusReply {
    /// 空ペイロードは Pending 扱い
    pub fn from_payload(payload: Option<TranscriptResult>) -> Self {
        match payload {
            Some(result) if !result.is_empty() => Self::Ready(result),
            _ => Self::Pending,
        }
    }
}

/// 書き起こしバックエンド trait
#[async_trait]
pub trait TranscriptionTransport: Send + Sync {
    async fn upload(&self, file: &AudioFile) -> Result<UploadRef, TransportError>;

    async fn submit(&self, target: &SubmitTarget) -> Result<JobId, TransportError>;

    async fn poll_status(&self, job_id: &JobId) -> Result<StatusReply, TransportError>;

    async fn fetch_result(&self, job_id: &JobId)
        -> Result<Option<TranscriptResult>, TransportError>;

    fn name(&self) -> &str;
}
