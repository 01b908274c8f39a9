use serde::Serialize;

use super::types::AudioFile;

/// アップロード上限のデフォルト (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const AUDIO_MIME_PREFIX: &str = "audio/";

/// どのルールに違反したか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidFileReason {
    Type,
    Size,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid file. Please upload an audio file no larger than {limit_label}. ({detail})")]
pub struct InvalidFileError {
    pub reason: InvalidFileReason,
    limit_label: String,
    detail: String,
}

impl InvalidFileError {
    fn new(reason: InvalidFileReason, max_bytes: u64, detail: String) -> Self {
        Self {
            reason,
            limit_label: format_limit(max_bytes),
            detail,
        }
    }
}

/// 検証済みファイル
#[derive(Debug, Clone)]
pub struct ValidFile {
    pub file: AudioFile,
    /// 拡張子を除いたファイル名
    pub artifact_name: String,
}

/// ファイル検証（純粋関数）
#[derive(Debug, Clone, Copy)]
pub struct FileValidator {
    max_bytes: u64,
}

impl FileValidator {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// MIME type は `audio/` 始まり、サイズは上限以下。両方違反なら type を報告する。
    pub fn validate(&self, file: AudioFile) -> Result<ValidFile, InvalidFileError> {
        if !file.mime_type.starts_with(AUDIO_MIME_PREFIX) {
            return Err(InvalidFileError::new(
                InvalidFileReason::Type,
                self.max_bytes,
                format!("unsupported type '{}'", file.mime_type),
            ));
        }
        if file.size > self.max_bytes {
            return Err(InvalidFileError::new(
                InvalidFileReason::Size,
                self.max_bytes,
                format!("{} bytes", file.size),
            ));
        }

        let artifact_name = strip_extension(&file.name).to_string();
        Ok(ValidFile {
            file,
            artifact_name,
        })
    }
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

/// "meeting.final.mp3" → "meeting.final"。先頭ドットのみの名前はそのまま。
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

fn format_limit(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}
