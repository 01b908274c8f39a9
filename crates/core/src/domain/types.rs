use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 書き起こし結果。オーケストレーターは中身を解釈せずそのまま転送する。
/// entities / segments の形はバックエンドごとに違うので JSON オブジェクトのまま持つ。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranscriptResult(pub Map<String, Value>);

impl TranscriptResult {
    /// 空ペイロードは「まだ処理中」とみなす。
    /// `{"entities":{},"segments":[]}` のように中身が全部空のものも含む。
    pub fn is_empty(&self) -> bool {
        self.0.values().all(is_blank)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// ユーザーが選んだ音声ファイル
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub name: String,
    /// MIME type (例: "audio/mpeg")
    pub mime_type: String,
    /// バイト数。data を読み込む前に検証できるよう別に持つ
    pub size: u64,
    pub data: Vec<u8>,
}

impl AudioFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: data.len() as u64,
            data,
        }
    }
}

/// アップロード先オブジェクトへの参照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRef {
    pub key: String,
}

/// 書き起こしジョブID（submit が払い出す不透明な値）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
