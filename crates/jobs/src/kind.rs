//! Job kinds: wire tags routing jobs to handlers.

use serde::{Deserialize, Serialize};

/// Job kind for routing to the matching handler.
///
/// Kinds travel as kebab-case strings. Unknown tags stay representable as
/// `Custom` so a job enqueued by a newer writer is dispatched (and failed)
/// rather than rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum JobKind {
    /// Analyze a single completed task (enqueued on every completion).
    AnalyzeCompletedTask,
    /// Look for patterns across a project's completed tasks.
    DetectPatterns,
    /// Review the project's accumulated analysis backlog.
    ReviewSuggestions,
    /// Anything else; dispatched by its literal tag.
    Custom(String),
}

impl JobKind {
    pub const ANALYZE_COMPLETED_TASK: &'static str = "analyze-completed-task";
    pub const DETECT_PATTERNS: &'static str = "detect-patterns";
    pub const REVIEW_SUGGESTIONS: &'static str = "review-suggestions";

    pub fn as_str(&self) -> &str {
        match self {
            JobKind::AnalyzeCompletedTask => Self::ANALYZE_COMPLETED_TASK,
            JobKind::DetectPatterns => Self::DETECT_PATTERNS,
            JobKind::ReviewSuggestions => Self::REVIEW_SUGGESTIONS,
            JobKind::Custom(tag) => tag,
        }
    }
}

impl core::fmt::Display for JobKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for JobKind {
    fn from(tag: &str) -> Self {
        match tag {
            Self::ANALYZE_COMPLETED_TASK => JobKind::AnalyzeCompletedTask,
            Self::DETECT_PATTERNS => JobKind::DetectPatterns,
            Self::REVIEW_SUGGESTIONS => JobKind::ReviewSuggestions,
            other => JobKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for JobKind {
    fn from(tag: String) -> Self {
        JobKind::from(tag.as_str())
    }
}

impl From<JobKind> for String {
    fn from(kind: JobKind) -> Self {
        kind.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_round_trip() {
        for (kind, tag) in [
            (JobKind::AnalyzeCompletedTask, "analyze-completed-task"),
            (JobKind::DetectPatterns, "detect-patterns"),
            (JobKind::ReviewSuggestions, "review-suggestions"),
        ] {
            assert_eq!(kind.as_str(), tag);
            assert_eq!(JobKind::from(tag), kind);
        }
    }

    #[test]
    fn unknown_tag_becomes_custom() {
        let kind = JobKind::from("compact-logs");
        assert_eq!(kind, JobKind::Custom("compact-logs".to_string()));
        assert_eq!(kind.as_str(), "compact-logs");
    }

    #[test]
    fn serde_uses_the_wire_tag() {
        let json = serde_json::to_string(&JobKind::DetectPatterns).unwrap();
        assert_eq!(json, r#""detect-patterns""#);
        let back: JobKind = serde_json::from_str(r#""analyze-completed-task""#).unwrap();
        assert_eq!(back, JobKind::AnalyzeCompletedTask);
    }
}
