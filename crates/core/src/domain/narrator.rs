use std::time::Duration;

/// 進捗メッセージのデフォルト一覧（試行回数順）
pub const DEFAULT_PHRASES: &[&str] = &[
    "Uploading your audio...",
    "Transcribing audio...",
    "Identifying speakers...",
    "Aligning speaker segments...",
    "Extracting entities...",
    "Polishing the transcript...",
    "Almost there, thanks for your patience...",
    "Still working on it. Long recordings take a little longer...",
];

/// 試行回数 → 表示用フレーズ。最後のエントリで頭打ちになる。
#[derive(Debug, Clone)]
pub struct ProgressNarrator {
    phrases: Vec<String>,
    message_cycle: Duration,
}

impl ProgressNarrator {
    /// 空の一覧はデフォルトに置き換える（最低1件を保証）
    pub fn new(phrases: Vec<String>, message_cycle: Duration) -> Self {
        let phrases = if phrases.is_empty() {
            DEFAULT_PHRASES.iter().map(|p| p.to_string()).collect()
        } else {
            phrases
        };
        Self {
            phrases,
            message_cycle,
        }
    }

    pub fn phrase_for(&self, attempt: u32) -> &str {
        let idx = (attempt as usize).min(self.phrases.len() - 1);
        &self.phrases[idx]
    }

    /// ポーリング間のアニメーション用。経過時間を message_cycle で割った位置のフレーズ。
    pub fn phrase_for_elapsed(&self, elapsed: Duration) -> &str {
        let cycle = self.message_cycle.as_millis().max(1);
        let idx = (elapsed.as_millis() / cycle).min(u32::MAX as u128) as u32;
        self.phrase_for(idx)
    }
}

impl Default for ProgressNarrator {
    fn default() -> Self {
        Self::new(Vec::new(), Duration::from_millis(5_000))
    }
}
