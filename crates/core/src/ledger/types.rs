//! Job ledger data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Job classes and kinds
// ============================================================================

/// The two families of sub-jobs a bundle fans out to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobClass {
    /// AI-generated material (lead-in, backdrop, lead-out).
    Asset,
    /// Final per-format video rendering.
    Render,
}

impl JobClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobClass::Asset => "asset",
            JobClass::Render => "render",
        }
    }
}

impl fmt::Display for JobClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of AI-generated asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    LeadIn,
    Backdrop,
    LeadOut,
}

impl AssetKind {
    /// All asset kinds, in composition order.
    pub const ALL: [AssetKind; 3] = [AssetKind::LeadIn, AssetKind::Backdrop, AssetKind::LeadOut];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::LeadIn => "lead_in",
            AssetKind::Backdrop => "backdrop",
            AssetKind::LeadOut => "lead_out",
        }
    }

    /// Human-readable label used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            AssetKind::LeadIn => "lead-in",
            AssetKind::Backdrop => "backdrop",
            AssetKind::LeadOut => "lead-out",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lead_in" | "intro" => Ok(AssetKind::LeadIn),
            "backdrop" | "background" => Ok(AssetKind::Backdrop),
            "lead_out" | "outro" => Ok(AssetKind::LeadOut),
            other => Err(format!("unknown asset kind: {}", other)),
        }
    }
}

/// Target video format of a render job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RenderFormat {
    /// 16:9 landscape.
    Wide,
    /// 9:16 portrait.
    Tall,
    /// 1:1.
    Square,
}

impl RenderFormat {
    pub const ALL: [RenderFormat; 3] = [RenderFormat::Wide, RenderFormat::Tall, RenderFormat::Square];

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderFormat::Wide => "wide",
            RenderFormat::Tall => "tall",
            RenderFormat::Square => "square",
        }
    }

    /// Output dimensions as (width, height) in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            RenderFormat::Wide => (1920, 1080),
            RenderFormat::Tall => (1080, 1920),
            RenderFormat::Square => (1080, 1080),
        }
    }
}

impl fmt::Display for RenderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wide" | "landscape" => Ok(RenderFormat::Wide),
            "tall" | "portrait" => Ok(RenderFormat::Tall),
            "square" => Ok(RenderFormat::Square),
            other => Err(format!("unknown render format: {}", other)),
        }
    }
}

/// What a job produces, tagged with its class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "class", content = "kind", rename_all = "snake_case")]
pub enum JobKind {
    Asset(AssetKind),
    Render(RenderFormat),
}

impl JobKind {
    pub fn class(&self) -> JobClass {
        match self {
            JobKind::Asset(_) => JobClass::Asset,
            JobKind::Render(_) => JobClass::Render,
        }
    }

    /// The kind column value (without the class).
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Asset(kind) => kind.as_str(),
            JobKind::Render(format) => format.as_str(),
        }
    }

    /// Rebuild a kind from its stored class and kind columns.
    pub fn parse(class: JobClass, kind: &str) -> Result<Self, String> {
        match class {
            JobClass::Asset => kind.parse().map(JobKind::Asset),
            JobClass::Render => kind.parse().map(JobKind::Render),
        }
    }

    pub fn asset(&self) -> Option<AssetKind> {
        match self {
            JobKind::Asset(kind) => Some(*kind),
            JobKind::Render(_) => None,
        }
    }

    pub fn render_format(&self) -> Option<RenderFormat> {
        match self {
            JobKind::Render(format) => Some(*format),
            JobKind::Asset(_) => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class(), self.as_str())
    }
}

// ============================================================================
// Job status
// ============================================================================

/// Status of a sub-job.
///
/// Transitions are monotonic:
/// ```text
/// Pending -> Processing -> Completed
///                      \-> Failed
/// ```
/// `Pending` may also jump straight to a terminal status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Recorded but not yet acknowledged by the external service.
    Pending,
    /// Dispatched, awaiting a callback.
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Statuses a job may be in for a move to `self` to be legal.
    pub fn predecessors(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[],
            JobStatus::Processing => &[JobStatus::Pending],
            JobStatus::Completed | JobStatus::Failed => {
                &[JobStatus::Pending, JobStatus::Processing]
            }
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

// ============================================================================
// Job record
// ============================================================================

/// Output references attached to a completed job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobOutput {
    /// Primary output (asset URL or rendered video URL).
    pub url: String,
    /// Thumbnail, for render jobs that supply one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl JobOutput {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            thumbnail_url: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail_url.into());
        self
    }
}

/// One sub-job recorded in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub bundle_id: String,
    pub kind: JobKind,
    /// External handle issued by the generation or render service.
    pub handle: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn class(&self) -> JobClass {
        self.kind.class()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn failed(&self) -> bool {
        self.status == JobStatus::Failed
    }
}

/// Result of a status update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The write was applied; carries the updated job.
    Applied(Job),
    /// The job was already terminal (or the move was not forward); nothing changed.
    Ignored(Job),
}

impl UpdateOutcome {
    pub fn job(&self) -> &Job {
        match self {
            UpdateOutcome::Applied(job) | UpdateOutcome::Ignored(job) => job,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_kind_aliases() {
        assert_eq!("intro".parse::<AssetKind>().unwrap(), AssetKind::LeadIn);
        assert_eq!("background".parse::<AssetKind>().unwrap(), AssetKind::Backdrop);
        assert_eq!("lead_out".parse::<AssetKind>().unwrap(), AssetKind::LeadOut);
        assert!("credits".parse::<AssetKind>().is_err());
    }

    #[test]
    fn test_job_kind_parse_roundtrip_by_class() {
        let kind = JobKind::parse(JobClass::Render, "tall").unwrap();
        assert_eq!(kind, JobKind::Render(RenderFormat::Tall));
        assert_eq!(kind.class(), JobClass::Render);
        assert!(JobKind::parse(JobClass::Asset, "tall").is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_predecessors_are_monotonic() {
        assert!(JobStatus::Pending.predecessors().is_empty());
        assert_eq!(JobStatus::Processing.predecessors(), &[JobStatus::Pending]);
        for terminal in [JobStatus::Completed, JobStatus::Failed] {
            assert!(!terminal.predecessors().iter().any(|s| s.is_terminal()));
        }
    }

    #[test]
    fn test_format_dimensions() {
        assert_eq!(RenderFormat::Wide.dimensions(), (1920, 1080));
        assert_eq!(RenderFormat::Tall.dimensions(), (1080, 1920));
        assert_eq!(RenderFormat::Square.dimensions(), (1080, 1080));
    }
}
