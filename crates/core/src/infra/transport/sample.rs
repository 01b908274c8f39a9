use super::TransportError;
use crate::domain::types::{JobId, TranscriptResult};

/// サンプルジョブ用の予約ID
pub const SAMPLE_JOB_ID: &str = "sample";

const SAMPLE_TRANSCRIPT_JSON: &str = include_str!("../../../assets/sample_transcript.json");

pub fn sample_job_id() -> JobId {
    JobId::from(SAMPLE_JOB_ID)
}

pub fn is_sample(job_id: &JobId) -> bool {
    job_id.as_str() == SAMPLE_JOB_ID
}

/// 同梱のサンプル書き起こし
pub fn sample_transcript() -> Result<TranscriptResult, TransportError> {
    serde_json::from_str(SAMPLE_TRANSCRIPT_JSON)
        .map_err(|e| TransportError::Decode(format!("bundled sample transcript: {e}")))
}
