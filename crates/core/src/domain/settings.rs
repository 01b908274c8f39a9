use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validator::DEFAULT_MAX_UPLOAD_BYTES;

/// 設定ファイルのデフォルト名（config_dir/scribe/ 配下）
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// ポーリング間隔・メッセージ周期の上限（1時間）
pub const MAX_INTERVAL_MS: u64 = 60 * 60 * 1000;
/// ポーリング上限回数の上限
pub const MAX_ATTEMPTS_LIMIT: u32 = 10_000;

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub orchestrator: OrchestratorSettings,
    pub transport: TransportSettings,
}

/// ジョブオーケストレーターの定数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// ポーリング上限回数（タイムアウトは回数のみで決まる）
    pub max_attempts: u32,
    /// ポーリング間隔（固定、バックオフなし）
    pub poll_interval_ms: u64,
    /// 進捗メッセージの切り替え周期
    pub message_cycle_ms: u64,
    /// アップロード上限バイト数
    pub max_upload_bytes: u64,
    /// 進捗フレーズ（空ならデフォルト一覧）
    pub phrases: Vec<String>,
}

impl OrchestratorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn message_cycle(&self) -> Duration {
        Duration::from_millis(self.message_cycle_ms)
    }

    /// 実効タイムアウト = 上限回数 × 間隔。間隔だけ変えると黙って伸び縮みする点に注意。
    /// 桁あふれする値は Duration::MAX に丸める
    pub fn effective_timeout(&self) -> Duration {
        self.poll_interval()
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            poll_interval_ms: 15_000,
            message_cycle_ms: 5_000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            phrases: vec![],
        }
    }
}

/// HTTPトランスポート設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// ステータス確認API (GET ?fileName=...)
    pub api_url: String,
    /// アップロード先バケット
    pub upload_bucket: String,
    /// 書き起こし結果バケット
    pub transcript_bucket: String,
    pub region: String,
    /// 1リクエストあたりのタイムアウト
    pub request_timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            upload_bucket: String::new(),
            transcript_bucket: String::new(),
            region: "us-east-1".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

impl AppSettings {
    /// デフォルト → 設定ファイル → 環境変数 の順で上書きする
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_settings_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 環境変数による上書き。テストのため取得関数を注入できる。
    pub fn apply_env<F>(&mut self, get: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("API_URL") {
            self.transport.api_url = v;
        }
        if let Some(v) = get("S3_UPLOAD") {
            self.transport.upload_bucket = v;
        }
        if let Some(v) = get("S3_TRANSCRIPT") {
            self.transport.transcript_bucket = v;
        }
        if let Some(v) = get("AWS_REGION") {
            self.transport.region = v;
        }
        if let Some(v) = get("SCRIBE_MAX_ATTEMPTS") {
            self.orchestrator.max_attempts = parse_env("SCRIBE_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("SCRIBE_POLL_INTERVAL_MS") {
            self.orchestrator.poll_interval_ms = parse_env("SCRIBE_POLL_INTERVAL_MS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let o = &self.orchestrator;
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&o.max_attempts) {
            return Err(SettingsError::Invalid(format!(
                "max_attempts must be between 1 and {MAX_ATTEMPTS_LIMIT}"
            )));
        }
        if !(1..=MAX_INTERVAL_MS).contains(&o.poll_interval_ms) {
            return Err(SettingsError::Invalid(format!(
                "poll_interval_ms must be between 1 and {MAX_INTERVAL_MS}"
            )));
        }
        if !(1..=MAX_INTERVAL_MS).contains(&o.message_cycle_ms) {
            return Err(SettingsError::Invalid(format!(
                "message_cycle_ms must be between 1 and {MAX_INTERVAL_MS}"
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}

pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("scribe").join(SETTINGS_FILE_NAME))
}
