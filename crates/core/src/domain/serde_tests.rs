#[cfg(test)]
mod tests {
    use crate::domain::error::{AppError, ErrorCode};
    use crate::domain::job::{Job, JobSnapshot, JobState, SourceKind};
    use crate::domain::types::{AudioFile, JobId, TranscriptResult};
    use crate::domain::validator::{FileValidator, InvalidFileReason};

    #[test]
    fn test_job_state_serialization() {
        assert_eq!(serde_json::to_string(&JobState::Idle).unwrap(), "\"idle\"");
        assert_eq!(
            serde_json::to_string(&JobState::Submitting).unwrap(),
            "\"submitting\""
        );
        assert_eq!(
            serde_json::to_string(&JobState::TimedOut).unwrap(),
            "\"timed_out\""
        );
        assert_eq!(
            serde_json::to_string(&JobState::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn test_as_str_matches_serde() {
        for state in [
            JobState::Idle,
            JobState::Validating,
            JobState::Submitting,
            JobState::Polling,
            JobState::Succeeded,
            JobState::Failed,
            JobState::TimedOut,
            JobState::Cancelled,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json.trim_matches('"'), state.as_str());
        }
    }

    #[test]
    fn test_error_code_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::InvalidFile).unwrap(),
            "\"E_INVALID_FILE\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::Submission).unwrap(),
            "\"E_SUBMISSION\""
        );
        assert_eq!(serde_json::to_string(&ErrorCode::Poll).unwrap(), "\"E_POLL\"");
        assert_eq!(
            serde_json::to_string(&ErrorCode::Timeout).unwrap(),
            "\"E_TIMEOUT\""
        );
    }

    #[test]
    fn test_invalid_file_error_payload() {
        let err = FileValidator::default()
            .validate(AudioFile::new("photo.png", "image/png", vec![0; 4]))
            .unwrap_err();
        assert_eq!(err.reason, InvalidFileReason::Type);
        let json = serde_json::to_string(&AppError::from(err)).unwrap();
        assert!(json.contains("E_INVALID_FILE"));
        assert!(json.contains("\"recoverable\":true"));
        assert_eq!(
            serde_json::to_string(&InvalidFileReason::Size).unwrap(),
            "\"size\""
        );
    }

    #[test]
    fn test_snapshot_skips_absent_fields() {
        let job = Job::new(3, SourceKind::Sample, String::new(), "t".to_string());
        let json = serde_json::to_value(JobSnapshot::of_job(&job, "Uploading")).unwrap();
        assert_eq!(json["state"], "submitting");
        assert_eq!(json["source"], "sample");
        assert_eq!(json["generation"], 3);
        assert_eq!(json["phrase"], "Uploading");
        assert_eq!(json["created_at"], "t");
        assert!(json.get("result").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("job_id").is_none());
    }

    #[test]
    fn test_snapshot_without_job_has_no_created_at() {
        let snap = JobSnapshot::without_job(1, JobState::Idle, None, None, "t".to_string());
        let json = serde_json::to_value(snap).unwrap();
        assert!(json.get("created_at").is_none());
        assert_eq!(json["updated_at"], "t");
    }

    #[test]
    fn test_job_id_is_transparent() {
        assert_eq!(
            serde_json::to_string(&JobId::from("abc")).unwrap(),
            "\"abc\""
        );
    }

    #[test]
    fn test_transcript_result_preserves_unknown_fields() {
        let raw = r#"{
            "entities": {"DATE": ["March 3rd"]},
            "segments": [{"start": 1.0, "end": 2.5, "speaker": "SPEAKER_01", "text": "yes"}],
            "language": "en-US"
        }"#;
        let result: TranscriptResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.0["entities"]["DATE"][0], "March 3rd");
        assert_eq!(result.0["segments"][0]["speaker"], "SPEAKER_01");
        assert_eq!(result.0["language"], "en-US");

        let back = serde_json::to_value(&result).unwrap();
        assert_eq!(back["language"], "en-US");
    }

    #[test]
    fn test_transcript_segments_round_trip_verbatim() {
        let raw = serde_json::json!({
            "entities": {"PERSON": [{"text": "Ann", "score": 0.98}]},
            "segments": [
                {"start": 0.0, "end": 1.0, "speaker": "SPEAKER_00", "text": "hi", "confidence": 0.9},
                {"timestamp": "12.5", "speaker": "Speaker 1", "text": "hello"}
            ]
        });
        let result: TranscriptResult = serde_json::from_value(raw.clone()).unwrap();
        assert!(!result.is_empty());
        assert_eq!(serde_json::to_value(&result).unwrap(), raw);
    }

    #[test]
    fn test_blank_fields_count_as_empty() {
        let result: TranscriptResult =
            serde_json::from_str(r#"{"entities":{},"segments":[],"transcript":null}"#).unwrap();
        assert!(result.is_empty());
        let result: TranscriptResult = serde_json::from_str(r#"{"transcript":"x"}"#).unwrap();
        assert!(!result.is_empty());
    }

    #[test]
    fn test_empty_transcript_result() {
        let result: TranscriptResult = serde_json::from_str("{}").unwrap();
        assert!(result.is_empty());
    }
}
