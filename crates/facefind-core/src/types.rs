use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Cosine similarity in [-1, 1], or `None` when the vectors cannot be
    /// compared (length mismatch, empty, or zero norm).
    pub fn cosine(&self, other: &Embedding) -> Option<f32> {
        if self.values.is_empty() || self.values.len() != other.values.len() {
            return None;
        }

        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 && denom.is_finite() {
            let cos = dot / denom;
            cos.is_finite().then_some(cos)
        } else {
            None
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// Platform a candidate was discovered on.
///
/// Parsed case-insensitively from a platform-name key; unknown keys are kept
/// verbatim (lowercased) in [`Source::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
    Facebook,
    Google,
    Instagram,
    Twitter,
    Other(String),
}

impl Source {
    pub fn as_str(&self) -> &str {
        match self {
            Source::Facebook => "facebook",
            Source::Google => "google",
            Source::Instagram => "instagram",
            Source::Twitter => "twitter",
            Source::Other(name) => name,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl From<&str> for Source {
    fn from(key: &str) -> Self {
        let key = key.trim().to_ascii_lowercase();
        match key.as_str() {
            "facebook" => Source::Facebook,
            "google" => Source::Google,
            "instagram" => Source::Instagram,
            "twitter" | "x" => Source::Twitter,
            _ => Source::Other(key),
        }
    }
}

impl From<String> for Source {
    fn from(key: String) -> Self {
        Source::from(key.as_str())
    }
}

impl From<Source> for String {
    fn from(source: Source) -> Self {
        source.as_str().to_string()
    }
}

impl FromStr for Source {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Source::from(s))
    }
}

/// One discovered profile or image from a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub source: Source,
}

impl CandidateRecord {
    pub fn new(url: impl Into<String>, source: Source) -> Self {
        Self {
            url: url.into(),
            display_name: None,
            username: None,
            thumbnail_url: None,
            source,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail_url.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Which signal produced a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Cosine similarity of face embeddings.
    Embedding,
    /// Perceptual-hash Hamming distance fallback.
    PerceptualHash,
}

/// A candidate scored against the query image. `similarity` is in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: CandidateRecord,
    pub similarity: f32,
    pub method: MatchMethod,
}

/// Sort scored candidates descending by similarity.
///
/// Stable: equal scores keep their input order.
pub fn sort_by_similarity(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
}
