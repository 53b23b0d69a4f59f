//! Timed narration segments.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// One slice of narration needing a visual. Offsets are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Long segments look better with moving footage.
    pub fn prefers_video(&self, min_secs: f64) -> bool {
        self.duration() > min_secs
    }
}

/// Produces the segment sequence for a run.
#[async_trait]
pub trait SegmentSource: Send + Sync {
    async fn segments(&self) -> Result<Vec<Segment>>;
}

#[async_trait]
impl SegmentSource for Vec<Segment> {
    async fn segments(&self) -> Result<Vec<Segment>> {
        Ok(self.clone())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptDocument {
    Bare(Vec<Segment>),
    Wrapped { segments: Vec<Segment> },
}

/// Transcript JSON on disk: either `[{start,end,text}, ...]` or an object
/// with a `segments` array of the same shape.
#[derive(Debug, Clone)]
pub struct TranscriptFile {
    path: PathBuf,
}

impl TranscriptFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SegmentSource for TranscriptFile {
    async fn segments(&self) -> Result<Vec<Segment>> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let parsed = match serde_json::from_str(&raw)? {
            TranscriptDocument::Bare(segments) => segments,
            TranscriptDocument::Wrapped { segments } => segments,
        };
        let segments = sanitize(parsed)?;
        debug!(
            path = %self.path.display(),
            count = segments.len(),
            "Loaded transcript"
        );
        Ok(segments)
    }
}

/// Reject inverted offsets and drop segments with nothing to search for.
fn sanitize(segments: Vec<Segment>) -> Result<Vec<Segment>> {
    let mut kept = Vec::with_capacity(segments.len());
    for (index, mut segment) in segments.into_iter().enumerate() {
        if !segment.start.is_finite() || !segment.end.is_finite() || segment.end < segment.start {
            return Err(Error::validation(format!(
                "segment {index} has invalid offsets {}..{}",
                segment.start, segment.end
            )));
        }
        let text = segment.text.trim();
        if text.is_empty() {
            warn!(index, "Dropping segment with empty text");
            continue;
        }
        segment.text = text.to_string();
        kept.push(segment);
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_video_only_above_threshold() {
        assert!(!Segment::new(0.0, 15.0, "a").prefers_video(15.0));
        assert!(Segment::new(0.0, 15.5, "a").prefers_video(15.0));
        assert_eq!(Segment::new(5.0, 2.0, "a").duration(), 0.0);
    }

    #[tokio::test]
    async fn test_loads_both_document_shapes() {
        let dir = tempfile::TempDir::new().unwrap();
        let bare = dir.path().join("bare.json");
        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(&bare, r#"[{"start":0,"end":4.5,"text":" Mars rover "}]"#).unwrap();
        std::fs::write(
            &wrapped,
            r#"{"language":"en","segments":[{"start":0,"end":2,"text":"a"},{"start":2,"end":3,"text":"  "}]}"#,
        )
        .unwrap();

        let segments = TranscriptFile::new(&bare).segments().await.unwrap();
        assert_eq!(segments, vec![Segment::new(0.0, 4.5, "Mars rover")]);

        let segments = TranscriptFile::new(&wrapped).segments().await.unwrap();
        assert_eq!(segments.len(), 1);
    }

    #[tokio::test]
    async fn test_inverted_offsets_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"[{"start":3,"end":1,"text":"x"}]"#).unwrap();

        let err = TranscriptFile::new(&path).segments().await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
