use serde::Serialize;

use super::validator::InvalidFileError;

/// アプリケーション共通エラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E_INVALID_FILE")]
    InvalidFile,
    #[serde(rename = "E_SUBMISSION")]
    Submission,
    #[serde(rename = "E_POLL")]
    Poll,
    #[serde(rename = "E_TIMEOUT")]
    Timeout,
    #[serde(rename = "E_INVALID_STATE")]
    InvalidState,
}

/// アプリケーションエラー（スナップショットのペイロード兼用）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

impl AppError {
    /// ファイル検証エラー。ジョブは作られず Idle に戻るだけなので recoverable。
    pub fn invalid_file(err: &InvalidFileError) -> Self {
        Self {
            code: ErrorCode::InvalidFile,
            message: err.to_string(),
            recoverable: true,
        }
    }

    pub fn submission(cause: impl std::fmt::Display) -> Self {
        Self {
            code: ErrorCode::Submission,
            message: format!("Could not submit audio for transcription: {cause}"),
            recoverable: false,
        }
    }

    pub fn poll(cause: impl std::fmt::Display) -> Self {
        Self {
            code: ErrorCode::Poll,
            message: format!("Could not check transcription status: {cause}"),
            recoverable: false,
        }
    }

    pub fn timed_out(attempts: u32) -> Self {
        Self {
            code: ErrorCode::Timeout,
            message: format!(
                "Transcription did not finish after {attempts} status checks. Please try again."
            ),
            recoverable: false,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidState,
            message: msg.into(),
            recoverable: true,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl From<InvalidFileError> for AppError {
    fn from(err: InvalidFileError) -> Self {
        Self::invalid_file(&err)
    }
}
