use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Opaque bearer credential issued by the login endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens end up in log lines; only show a prefix.
impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "{}…", prefix)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken({})", self)
    }
}

/// A resume picked by the user, held only for the duration of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeFile {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl ResumeFile {
    pub async fn load(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Not a file path: {}", path.display()))?;
        // Check the extension before touching the disk
        mime_for(&file_name)?;

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read resume file: {}", path.display()))?;

        Self::from_bytes(&file_name, bytes)
    }

    pub fn from_bytes(file_name: &str, bytes: Vec<u8>) -> Result<Self> {
        Ok(Self {
            file_name: file_name.to_string(),
            mime: mime_for(file_name)?,
            bytes,
        })
    }
}

pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["pdf", "docx", "txt"];

pub fn is_accepted(file_name: &str) -> bool {
    mime_for(file_name).is_ok()
}

fn mime_for(file_name: &str) -> Result<&'static str> {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".pdf") {
        Ok("application/pdf")
    } else if lower.ends_with(".docx") {
        Ok("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
    } else if lower.ends_with(".txt") {
        Ok("text/plain")
    } else {
        bail!(
            "Unsupported file format: {} (expected one of: .{})",
            file_name,
            ACCEPTED_EXTENSIONS.join(", .")
        )
    }
}

/// Analysis record returned by the upload and last-result endpoints.
///
/// Decoding is lenient: a field with an unexpected type is treated as
/// absent rather than failing the whole record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, deserialize_with = "lenient_number")]
    pub manual_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub ats_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub impact_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub found_keywords: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub missing_keywords: Option<Vec<String>>,
    /// Category percentages in the order the service sent them.
    #[serde(default, deserialize_with = "lenient_subscores")]
    pub subscores: Vec<(String, f64)>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ai_feedback: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uploaded_at: Option<String>,
}

impl AnalysisResult {
    /// True when the body carries none of the analysis fields.
    pub fn is_blank(&self) -> bool {
        *self == AnalysisResult::default()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub access: AuthToken,
    /// Address the service registered the login under.
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
}

/// `{error}` / `{message}` envelope used by every endpoint for non-results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorBody {
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(as_number(&value))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn lenient_strings<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    match Value::deserialize(d)? {
        Value::Array(items) => Ok(Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        )),
        _ => Ok(None),
    }
}

fn lenient_subscores<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<(String, f64)>, D::Error> {
    match Value::deserialize(d)? {
        Value::Object(map) => Ok(map
            .into_iter()
            .filter_map(|(name, value)| as_number(&value).map(|pct| (name, pct)))
            .collect()),
        _ => Ok(Vec::new()),
    }
}
