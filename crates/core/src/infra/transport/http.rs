use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use super::sample::{is_sample, sample_job_id, sample_transcript};
use super::{StatusReply, SubmitTarget, TranscriptionTransport, TransportError};
use crate::domain::settings::TransportSettings;
use crate::domain::types::{AudioFile, JobId, TranscriptResult, UploadRef};

/// S3 + ステータスAPI を使うトランスポート。
/// アップロード完了がサーバー側で書き起こしを起動するので、submit はキーをそのままジョブIDにする。
pub struct HttpTransport {
    client: reqwest::Client,
    settings: TransportSettings,
}

/// ステータスAPIのレスポンス本体
#[derive(Debug, Default, Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, settings })
    }

    fn bucket_url(&self, bucket: &str, key: &str) -> Result<Url, TransportError> {
        if bucket.is_empty() {
            return Err(TransportError::Storage("bucket is not configured".to_string()));
        }
        let base = format!("https://{bucket}.s3.{}.amazonaws.com/", self.settings.region);
        let mut url = Url::parse(&base)
            .map_err(|e| TransportError::Storage(format!("invalid bucket url {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| TransportError::Storage(format!("invalid bucket url {base}")))?
            .pop_if_empty()
            .push(key);
        Ok(url)
    }

    fn status_url(&self) -> Result<Url, TransportError> {
        if self.settings.api_url.is_empty() {
            return Err(TransportError::Remote("API_URL is not configured".to_string()));
        }
        Url::parse(&self.settings.api_url)
            .map_err(|e| TransportError::Remote(format!("invalid API_URL: {e}")))
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(format!("HTTP request failed: {e}"))
    }
}

#[async_trait]
impl TranscriptionTransport for HttpTransport {
    async fn upload(&self, file: &AudioFile) -> Result<UploadRef, TransportError> {
        let url = self.bucket_url(&self.settings.upload_bucket, &file.name)?;
        log::debug!("Uploading {} ({} bytes) to {url}", file.name, file.size);

        let response = self
            .client
            .put(url)
            .header("content-type", &file.mime_type)
            .body(file.data.clone())
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Storage(format!(
                "upload failed: {status} - {body}"
            )));
        }

        Ok(UploadRef {
            key: file.name.clone(),
        })
    }

    async fn submit(&self, target: &SubmitTarget) -> Result<JobId, TransportError> {
        match target {
            SubmitTarget::Sample => Ok(sample_job_id()),
            SubmitTarget::Upload(upload) => {
                if upload.key.is_empty() {
                    return Err(TransportError::Storage("empty upload key".to_string()));
                }
                Ok(JobId(upload.key.clone()))
            }
        }
    }

    async fn poll_status(&self, job_id: &JobId) -> Result<StatusReply, TransportError> {
        if is_sample(job_id) {
            return Ok(StatusReply::Ready(sample_transcript()?));
        }

        let response = self
            .client
            .get(self.status_url()?)
            .query(&[("fileName", job_id.as_str())])
            .header("accept", "application/json")
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_send_error)?;
        if !status.is_success() {
            return Err(TransportError::Remote(format!(
                "status API error: {status} - {body}"
            )));
        }

        parse_status_body(&body)
    }

    async fn fetch_result(
        &self,
        job_id: &JobId,
    ) -> Result<Option<TranscriptResult>, TransportError> {
        if is_sample(job_id) {
            return sample_transcript().map(Some);
        }

        let url = self.bucket_url(&self.settings.transcript_bucket, job_id.as_str())?;
        let response = self.client.get(url).send().await.map_err(map_send_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Storage(format!(
                "transcript fetch failed: {status} - {body}"
            )));
        }

        let result: TranscriptResult = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(format!("transcript parse error: {e}")))?;
        Ok(Some(result))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// ステータスAPIの本文を解釈する。
/// 本文はオブジェクト、JSON文字列に包まれたオブジェクト、`body` に包まれたものがありうる。
pub(crate) fn parse_status_body(raw: &str) -> Result<StatusReply, TransportError> {
    if raw.trim().is_empty() {
        return Ok(StatusReply::Pending);
    }

    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| TransportError::Decode(format!("status response: {e}")))?;
    let value = unwrap_envelope(value)?;
    if value.is_null() {
        return Ok(StatusReply::Pending);
    }

    let body: StatusBody = serde_json::from_value(value)
        .map_err(|e| TransportError::Decode(format!("status response: {e}")))?;
    let status = body.status.as_deref().unwrap_or_default().to_ascii_uppercase();

    match body.result {
        Some(result) if !result.is_null() => {
            let result = unwrap_json_string(result)?;
            let payload: TranscriptResult = serde_json::from_value(result)
                .map_err(|e| TransportError::Decode(format!("transcript payload: {e}")))?;
            Ok(StatusReply::from_payload(Some(payload)))
        }
        _ if status == "FAILED" || status == "ERROR" => Err(TransportError::Remote(
            body.error
                .unwrap_or_else(|| format!("transcription {}", status.to_ascii_lowercase())),
        )),
        _ if status == "COMPLETED" => Ok(StatusReply::Completed),
        _ => Ok(StatusReply::Pending),
    }
}

/// JSON文字列 / `{"body": ...}` の包みを一段ずつ剥がす
fn unwrap_envelope(value: serde_json::Value) -> Result<serde_json::Value, TransportError> {
    let value = unwrap_json_string(value)?;
    match value {
        serde_json::Value::Object(mut map)
            if !map.contains_key("result") && !map.contains_key("status") =>
        {
            match map.remove("body") {
                Some(inner) => unwrap_json_string(inner),
                None => Ok(serde_json::Value::Object(map)),
            }
        }
        other => Ok(other),
    }
}

fn unwrap_json_string(value: serde_json::Value) -> Result<serde_json::Value, TransportError> {
    match value {
        serde_json::Value::String(s) => serde_json::from_str(&s)
            .map_err(|e| TransportError::Decode(format!("embedded JSON: {e}"))),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> HttpTransport {
        HttpTransport::new(TransportSettings {
            api_url: "https://api.example.com/status".to_string(),
            upload_bucket: "stt-uploads".to_string(),
            transcript_bucket: "stt-transcripts".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_http_transport_name() {
        assert_eq!(transport().name(), "http");
    }

    #[test]
    fn test_bucket_url_encodes_key() {
        let url = transport().bucket_url("stt-uploads", "my call #2.mp3").unwrap();
        assert_eq!(
            url.as_str(),
            "https://stt-uploads.s3.us-east-1.amazonaws.com/my%20call%20%232.mp3"
        );
    }

    #[test]
    fn test_bucket_url_requires_bucket() {
        let err = transport().bucket_url("", "a.mp3").unwrap_err();
        assert!(matches!(err, TransportError::Storage(_)));
    }

    #[tokio::test]
    async fn test_submit_uses_upload_key() {
        let t = transport();
        let id = t
            .submit(&SubmitTarget::Upload(UploadRef {
                key: "deposition.mp3".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "deposition.mp3");
        assert!(is_sample(&t.submit(&SubmitTarget::Sample).await.unwrap()));
    }

    #[tokio::test]
    async fn test_sample_poll_is_ready_without_network() {
        let t = transport();
        let reply = t.poll_status(&sample_job_id()).await.unwrap();
        assert!(matches!(reply, StatusReply::Ready(_)));
    }

    #[test]
    fn test_parse_in_progress() {
        let reply =
            parse_status_body(r#"{"status":"IN_PROGRESS","result":null,"error":null}"#).unwrap();
        assert_eq!(reply, StatusReply::Pending);
    }

    #[test]
    fn test_parse_empty_object_is_pending() {
        assert_eq!(parse_status_body("{}").unwrap(), StatusReply::Pending);
        assert_eq!(parse_status_body("").unwrap(), StatusReply::Pending);
    }

    #[test]
    fn test_parse_completed_with_payload() {
        let raw = r#"{"status":"COMPLETED","result":{"entities":{"PERSON":["Ann"]},"segments":[{"start":0.0,"end":1.5,"speaker":"SPEAKER_00","text":"hi"}]},"error":null}"#;
        match parse_status_body(raw).unwrap() {
            StatusReply::Ready(result) => {
                assert_eq!(result.0["entities"]["PERSON"][0], "Ann");
                assert_eq!(result.0["segments"][0]["text"], "hi");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_parse_timestamped_segments() {
        // enhance ステップの出力形式（start/end ではなく timestamp 文字列）
        let raw = r#"{"status":"COMPLETED","result":{"transcript":"x","segments":[{"timestamp":"12.5","speaker":"Speaker 1","text":"hi"}]},"error":null}"#;
        match parse_status_body(raw).unwrap() {
            StatusReply::Ready(result) => {
                assert_eq!(result.0["transcript"], "x");
                assert_eq!(result.0["segments"][0]["timestamp"], "12.5");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_parse_string_wrapped_body() {
        let inner = r#"{"status":"COMPLETED","result":{"segments":[{"start":0,"end":1,"speaker":"A","text":"x"}]}}"#;
        let raw = serde_json::to_string(inner).unwrap();
        assert!(matches!(parse_status_body(&raw).unwrap(), StatusReply::Ready(_)));
    }

    #[test]
    fn test_parse_lambda_envelope() {
        let raw = r#"{"statusCode":200,"body":"{\"status\":\"IN_PROGRESS\",\"result\":null}"}"#;
        assert_eq!(parse_status_body(raw).unwrap(), StatusReply::Pending);
    }

    #[test]
    fn test_parse_completed_without_payload() {
        let raw = r#"{"status":"COMPLETED","result":null}"#;
        assert_eq!(parse_status_body(raw).unwrap(), StatusReply::Completed);
    }

    #[test]
    fn test_parse_failed_is_remote_error() {
        let raw = r#"{"status":"FAILED","result":null,"error":"Transcription failed with status: FAILED"}"#;
        match parse_status_body(raw).unwrap_err() {
            TransportError::Remote(msg) => assert!(msg.contains("FAILED")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_garbage_is_decode_error() {
        let err = parse_status_body("<html>").unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }
}
