use serde::Serialize;

use super::error::AppError;
use super::types::{AudioFile, JobId, TranscriptResult};

/// ジョブ状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Validating,
    Submitting,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Submitting => "submitting",
            Self::Polling => "polling",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// キャンセル可能（非同期処理が走っている）状態
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Submitting | Self::Polling)
    }
}

/// ジョブ種別（作成時に固定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Sample,
    Upload,
}

/// start() への入力
#[derive(Debug, Clone)]
pub enum JobRequest {
    Sample,
    Upload(AudioFile),
}

impl JobRequest {
    pub fn source_kind(&self) -> SourceKind {
        match self {
            Self::Sample => SourceKind::Sample,
            Self::Upload(_) => SourceKind::Upload,
        }
    }
}

/// 書き起こしジョブ
#[derive(Debug, Clone)]
pub struct Job {
    pub generation: u64,
    pub id: Option<JobId>,
    pub source: SourceKind,
    pub artifact_name: String,
    pub state: JobState,
    pub attempt: u32,
    pub result: Option<TranscriptResult>,
    pub error: Option<AppError>,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    pub fn new(generation: u64, source: SourceKind, artifact_name: String, now: String) -> Self {
        Self {
            generation,
            id: None,
            source,
            artifact_name,
            state: JobState::Submitting,
            attempt: 0,
            result: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// submit 成功: IDは一度だけ割り当てる
    pub fn assign_id(&mut self, id: JobId, now: String) -> Result<(), AppError> {
        if self.id.is_some() {
            return Err(AppError::invalid_state("ジョブIDは割り当て済みです"));
        }
        if self.state != JobState::Submitting {
            return Err(AppError::invalid_state(format!(
                "assign_id は {} 状態では実行できません",
                self.state.as_str()
            )));
        }
        self.id = Some(id);
        self.state = JobState::Polling;
        self.attempt = 0;
        self.updated_at = now;
        Ok(())
    }

    /// 未完了応答: attempt を進め、上限到達なら TimedOut
    pub fn record_pending(&mut self, max_attempts: u32, now: String) -> Result<(), AppError> {
        self.ensure_state(JobState::Polling, "record_pending")?;
        self.attempt = (self.attempt + 1).min(max_attempts);
        if self.attempt >= max_attempts {
            self.state = JobState::TimedOut;
            self.error = Some(AppError::timed_out(max_attempts));
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn succeed(&mut self, result: TranscriptResult, now: String) -> Result<(), AppError> {
        self.ensure_state(JobState::Polling, "succeed")?;
        self.state = JobState::Succeeded;
        self.result = Some(result);
        self.updated_at = now;
        Ok(())
    }

    /// Submitting / Polling からの失敗
    pub fn fail(&mut self, error: AppError, now: String) -> Result<(), AppError> {
        if !self.state.is_live() {
            return Err(AppError::invalid_state(format!(
                "fail は {} 状態では実行できません",
                self.state.as_str()
            )));
        }
        self.state = JobState::Failed;
        self.error = Some(error);
        self.updated_at = now;
        Ok(())
    }

    /// 終端状態なら何もしない（false）
    pub fn cancel(&mut self, now: String) -> bool {
        if !self.state.is_live() {
            return false;
        }
        self.state = JobState::Cancelled;
        self.updated_at = now;
        true
    }

    fn ensure_state(&self, expected: JobState, op: &str) -> Result<(), AppError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AppError::invalid_state(format!(
                "{op} は {} 状態では実行できません",
                self.state.as_str()
            )))
        }
    }
}

/// プレゼンテーション層へ通知するスナップショット
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub generation: u64,
    pub state: JobState,
    pub attempt: u32,
    pub phrase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceKind>,
    pub artifact_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TranscriptResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AppError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub updated_at: String,
}

impl JobSnapshot {
    pub fn of_job(job: &Job, phrase: &str) -> Self {
        Self {
            generation: job.generation,
            state: job.state,
            attempt: job.attempt,
            phrase: phrase.to_string(),
            source: Some(job.source),
            artifact_name: job.artifact_name.clone(),
            job_id: job.id.clone(),
            result: job.result.clone(),
            error: job.error.clone(),
            created_at: Some(job.created_at.clone()),
            updated_at: job.updated_at.clone(),
        }
    }

    /// ジョブを持たない状態（Idle / Validating）
    pub fn without_job(
        generation: u64,
        state: JobState,
        source: Option<SourceKind>,
        error: Option<AppError>,
        now: String,
    ) -> Self {
        Self {
            generation,
            state,
            attempt: 0,
            phrase: String::new(),
            source,
            artifact_name: String::new(),
            job_id: None,
            result: None,
            error,
            created_at: None,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorCode;

    fn now() -> String {
        "2026-01-01T00:00:00Z".to_string()
    }

    fn polling_job() -> Job {
        let mut job = Job::new(1, SourceKind::Upload, "call".to_string(), now());
        job.assign_id(JobId::from("abc"), now()).unwrap();
        job
    }

    #[test]
    fn test_new_job_is_submitting() {
        let job = Job::new(7, SourceKind::Sample, String::new(), now());
        assert_eq!(job.state, JobState::Submitting);
        assert_eq!(job.attempt, 0);
        assert!(job.id.is_none());
    }

    #[test]
    fn test_id_assigned_once() {
        let mut job = polling_job();
        assert_eq!(job.state, JobState::Polling);
        assert!(job.assign_id(JobId::from("other"), now()).is_err());
        assert_eq!(job.id, Some(JobId::from("abc")));
    }

    #[test]
    fn test_pending_until_timeout() {
        let mut job = polling_job();
        job.record_pending(3, now()).unwrap();
        job.record_pending(3, now()).unwrap();
        assert_eq!(job.state, JobState::Polling);
        job.record_pending(3, now()).unwrap();
        assert_eq!(job.state, JobState::TimedOut);
        assert_eq!(job.attempt, 3);
        assert_eq!(job.error.as_ref().unwrap().code, ErrorCode::Timeout);
        assert!(job.record_pending(3, now()).is_err());
        assert_eq!(job.attempt, 3);
    }

    #[test]
    fn test_result_and_error_are_exclusive() {
        let mut job = polling_job();
        job.succeed(TranscriptResult::default(), now()).unwrap();
        assert!(job.fail(AppError::poll("boom"), now()).is_err());
        assert!(job.error.is_none());
        assert!(job.result.is_some());
    }

    #[test]
    fn test_cancel_is_noop_when_terminal() {
        let mut job = polling_job();
        assert!(job.cancel(now()));
        assert_eq!(job.state, JobState::Cancelled);
        assert!(!job.cancel(now()));

        let mut done = polling_job();
        done.fail(AppError::poll("x"), now()).unwrap();
        assert!(!done.cancel(now()));
        assert_eq!(done.state, JobState::Failed);
    }

    #[test]
    fn test_state_flags() {
        assert!(JobState::Submitting.is_live());
        assert!(JobState::Polling.is_live());
        assert!(!JobState::Idle.is_live());
        for s in [
            JobState::Succeeded,
            JobState::Failed,
            JobState::TimedOut,
            JobState::Cancelled,
        ] {
            assert!(s.is_terminal());
            assert!(!s.is_live());
        }
    }
}
