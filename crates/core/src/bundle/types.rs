//! Core bundle data types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{AssetKind, RenderFormat};

// ============================================================================
// Stage
// ============================================================================

/// Lifecycle stage of a bundle.
///
/// State machine flow:
/// ```text
/// Pending -> Analyzing -> Composing -> Rendering -> Validating -> Reviewing -> Completed
///
/// Any non-terminal stage can transition to Failed.
/// ```
///
/// Stages only move forward. `Reviewing` is skipped when no reviewer is configured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Bundle created, site analysis attached, waiting to advance.
    Pending,
    /// Site analysis done, asset jobs being dispatched.
    Analyzing,
    /// Asset jobs dispatched, waiting for their callbacks.
    Composing,
    /// Script stored, render jobs dispatched.
    Rendering,
    /// All renders succeeded, outputs being checked.
    Validating,
    /// Automated quality review in progress.
    Reviewing,
    /// Output descriptor assembled (terminal).
    Completed,
    /// Terminal failure, reachable from any non-terminal stage.
    Failed,
}

impl Stage {
    /// Every stage, in lifecycle order.
    pub const ALL: [Stage; 8] = [
        Stage::Pending,
        Stage::Analyzing,
        Stage::Composing,
        Stage::Rendering,
        Stage::Validating,
        Stage::Reviewing,
        Stage::Completed,
        Stage::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::Analyzing => "analyzing",
            Stage::Composing => "composing",
            Stage::Rendering => "rendering",
            Stage::Validating => "validating",
            Stage::Reviewing => "reviewing",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }

    fn ordinal(&self) -> u8 {
        match self {
            Stage::Pending => 0,
            Stage::Analyzing => 1,
            Stage::Composing => 2,
            Stage::Rendering => 3,
            Stage::Validating => 4,
            Stage::Reviewing => 5,
            Stage::Completed => 6,
            Stage::Failed => 7,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Whether a bundle in this stage may move to `next`.
    pub fn can_transition_to(&self, next: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Stage::Failed || next.ordinal() > self.ordinal()
    }

    /// Coarse progress indicator for status polling (0-100).
    pub fn progress_pct(&self) -> u8 {
        match self {
            Stage::Pending => 0,
            Stage::Analyzing => 10,
            Stage::Composing => 30,
            Stage::Rendering => 60,
            Stage::Validating => 85,
            Stage::Reviewing => 95,
            Stage::Completed | Stage::Failed => 100,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Stage::Pending),
            "analyzing" => Ok(Stage::Analyzing),
            "composing" => Ok(Stage::Composing),
            "rendering" => Ok(Stage::Rendering),
            "validating" => Ok(Stage::Validating),
            "reviewing" => Ok(Stage::Reviewing),
            "completed" => Ok(Stage::Completed),
            "failed" => Ok(Stage::Failed),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}

// ============================================================================
// Request parameters
// ============================================================================

/// Visual style of the generated videos.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    Minimal,
    Bold,
    Cinematic,
    Playful,
}

/// Emotional tone of the generated videos.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Energetic,
    Calm,
    Professional,
    Inspiring,
}

impl Style {
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Minimal => "minimal",
            Style::Bold => "bold",
            Style::Cinematic => "cinematic",
            Style::Playful => "playful",
        }
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Ok(Style::Minimal),
            "bold" => Ok(Style::Bold),
            "cinematic" => Ok(Style::Cinematic),
            "playful" => Ok(Style::Playful),
            _ => Err(format!(
                "unknown style '{}' (expected minimal, bold, cinematic or playful)",
                s
            )),
        }
    }
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Energetic => "energetic",
            Mood::Calm => "calm",
            Mood::Professional => "professional",
            Mood::Inspiring => "inspiring",
        }
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "energetic" => Ok(Mood::Energetic),
            "calm" => Ok(Mood::Calm),
            "professional" => Ok(Mood::Professional),
            "inspiring" => Ok(Mood::Inspiring),
            _ => Err(format!(
                "unknown mood '{}' (expected energetic, calm, professional or inspiring)",
                s
            )),
        }
    }
}

/// Style, mood and target length requested for a bundle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationParams {
    pub style: Style,
    pub mood: Mood,
    /// Target video length in seconds.
    pub duration_secs: u32,
}

// ============================================================================
// Stage artifacts
// ============================================================================

/// Brand colors extracted from the source site.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrandPalette {
    pub primary: String,
    pub secondary: String,
    pub accent: String,
}

/// Content and color model produced by inspecting the source site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteAnalysis {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Selling points, in the order the site presents them.
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub palette: BrandPalette,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

/// One scene of the generated script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scene {
    pub heading: String,
    pub narration: String,
    pub duration_secs: f64,
}

/// Scene script produced by the script generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Script {
    pub scenes: Vec<Scene>,
}

impl Script {
    pub fn total_duration_secs(&self) -> f64 {
        self.scenes.iter().map(|s| s.duration_secs).sum()
    }
}

/// Output references of the asset jobs, one slot per kind.
///
/// A `None` slot means the asset is absent (never dispatched, failed, or not
/// yet complete); downstream stages degrade around it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetSlots {
    pub lead_in: Option<String>,
    pub backdrop: Option<String>,
    pub lead_out: Option<String>,
}

impl AssetSlots {
    pub fn get(&self, kind: AssetKind) -> Option<&str> {
        match kind {
            AssetKind::LeadIn => self.lead_in.as_deref(),
            AssetKind::Backdrop => self.backdrop.as_deref(),
            AssetKind::LeadOut => self.lead_out.as_deref(),
        }
    }

    pub fn set(&mut self, kind: AssetKind, url: Option<String>) {
        match kind {
            AssetKind::LeadIn => self.lead_in = url,
            AssetKind::Backdrop => self.backdrop = url,
            AssetKind::LeadOut => self.lead_out = url,
        }
    }

    /// Kinds with an output reference, in composition order.
    pub fn available(&self) -> Vec<AssetKind> {
        AssetKind::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_some())
            .collect()
    }
}

// ============================================================================
// Output descriptor
// ============================================================================

/// One finished rendition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderedVideo {
    pub video_url: String,
    pub thumbnail_url: String,
    pub width: u32,
    pub height: u32,
}

/// Result of automated quality review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityReview {
    /// Score between 0.0 and 1.0.
    pub score: f32,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Aggregate information about a completed bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputMetadata {
    pub total_duration_secs: f64,
    pub scene_count: usize,
    pub assets_used: Vec<AssetKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<QualityReview>,
}

/// Public description of a completed bundle's renditions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputDescriptor {
    pub videos: BTreeMap<RenderFormat, RenderedVideo>,
    pub metadata: OutputMetadata,
}

// ============================================================================
// Failure record
// ============================================================================

/// Where a bundle failure came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Every asset job failed (or none could be dispatched).
    AssetGeneration,
    /// The script generator call failed after the fan-in gate.
    ScriptGeneration,
    /// The render dispatch call failed.
    RenderDispatch,
    /// At least one render job reported failure.
    RenderExecution,
    /// Renders reported success but their outputs were unusable.
    RenderValidation,
    /// Store or other unexpected error while advancing.
    Internal,
}

impl FailureKind {
    /// Prefix for the human-readable failure message.
    pub fn prefix(&self) -> &'static str {
        match self {
            FailureKind::AssetGeneration => "AI asset generation failed",
            FailureKind::ScriptGeneration => "Script generation failed",
            FailureKind::RenderDispatch => "Render dispatch failed",
            FailureKind::RenderExecution => "Render execution failed",
            FailureKind::RenderValidation => "Render validation failed",
            FailureKind::Internal => "Internal error",
        }
    }
}

/// Recorded reason for a bundle entering `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleFailure {
    pub kind: FailureKind,
    /// Stage the bundle was in when it failed.
    pub stage: Stage,
    /// Single human-readable message, shown by the status endpoint.
    pub message: String,
    /// Structured detail for operators; never exposed to clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub failed_at: DateTime<Utc>,
}

impl BundleFailure {
    /// Failure whose message is the bare kind summary, e.g. `"Script generation failed"`.
    pub fn new(kind: FailureKind, stage: Stage) -> Self {
        Self {
            kind,
            stage,
            message: kind.prefix().to_string(),
            details: None,
            failed_at: Utc::now(),
        }
    }

    /// Failure whose message lists the affected slots:
    /// `"Render dispatch failed: wide, tall"`.
    ///
    /// Subjects are asset labels or format names, never downstream text.
    pub fn naming<I, S>(kind: FailureKind, stage: Stage, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let subjects: Vec<String> = subjects
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        let mut failure = Self::new(kind, stage);
        if !subjects.is_empty() {
            failure.message = format!("{}: {}", kind.prefix(), subjects.join(", "));
        }
        failure
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Keep the raw cause for operators under `details.cause`.
    pub fn with_cause(self, cause: impl fmt::Display) -> Self {
        self.with_details(serde_json::json!({ "cause": cause.to_string() }))
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// The aggregate root of one generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bundle {
    pub id: String,
    pub owner_id: String,
    pub source_url: String,
    pub params: GenerationParams,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<SiteAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,
    #[serde(default)]
    pub assets: AssetSlots,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<BundleFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Bundle {
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Message shown to clients when the bundle failed.
    pub fn error_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STAGES: [Stage; 8] = Stage::ALL;

    #[test]
    fn test_stage_never_regresses() {
        for from in ALL_STAGES {
            for to in ALL_STAGES {
                if from.can_transition_to(to) && to != Stage::Failed {
                    assert!(
                        to.ordinal() > from.ordinal(),
                        "{} -> {} would regress",
                        from,
                        to
                    );
                }
            }
        }
    }

    #[test]
    fn test_failed_reachable_from_every_non_terminal_stage() {
        for stage in ALL_STAGES {
            assert_eq!(stage.can_transition_to(Stage::Failed), !stage.is_terminal());
        }
    }

    #[test]
    fn test_terminal_stages_are_final() {
        for to in ALL_STAGES {
            assert!(!Stage::Completed.can_transition_to(to));
            assert!(!Stage::Failed.can_transition_to(to));
        }
    }

    #[test]
    fn test_reviewing_can_be_skipped() {
        assert!(Stage::Validating.can_transition_to(Stage::Completed));
        assert!(!Stage::Rendering.can_transition_to(Stage::Composing));
    }

    #[test]
    fn test_stage_parse() {
        for stage in ALL_STAGES {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert!("queued".parse::<Stage>().is_err());
    }

    #[test]
    fn test_style_and_mood_parse() {
        assert_eq!("Cinematic".parse::<Style>().unwrap(), Style::Cinematic);
        assert_eq!("calm".parse::<Mood>().unwrap(), Mood::Calm);
        assert!("grungy".parse::<Style>().is_err());
        assert!("angry".parse::<Mood>().is_err());
    }

    #[test]
    fn test_asset_slots_available() {
        let mut slots = AssetSlots::default();
        assert!(slots.available().is_empty());

        slots.set(AssetKind::LeadOut, Some("out.mp4".to_string()));
        slots.set(AssetKind::LeadIn, Some("in.mp4".to_string()));
        assert_eq!(slots.available(), vec![AssetKind::LeadIn, AssetKind::LeadOut]);
        assert_eq!(slots.get(AssetKind::Backdrop), None);
    }

    #[test]
    fn test_script_total_duration() {
        let script = Script {
            scenes: vec![
                Scene {
                    heading: "Hook".to_string(),
                    narration: "Meet the product".to_string(),
                    duration_secs: 4.5,
                },
                Scene {
                    heading: "Call to action".to_string(),
                    narration: "Try it today".to_string(),
                    duration_secs: 3.0,
                },
            ],
        };
        assert_eq!(script.total_duration_secs(), 7.5);
    }

    #[test]
    fn test_failure_message_prefix() {
        let failure = BundleFailure::naming(
            FailureKind::RenderDispatch,
            Stage::Rendering,
            ["wide", "tall"],
        );
        assert_eq!(failure.message, "Render dispatch failed: wide, tall");

        let bare = BundleFailure::new(FailureKind::ScriptGeneration, Stage::Composing);
        assert_eq!(bare.message, "Script generation failed");
    }

    #[test]
    fn test_failure_cause_stays_out_of_message() {
        let failure = BundleFailure::new(FailureKind::Internal, Stage::Rendering)
            .with_cause("disk I/O error at /var/lib/reelforge.db");
        assert_eq!(failure.message, "Internal error");
        assert_eq!(
            failure.details.unwrap()["cause"],
            "disk I/O error at /var/lib/reelforge.db"
        );
    }

    #[test]
    fn test_output_descriptor_serializes_formats_as_keys() {
        let mut videos = BTreeMap::new();
        videos.insert(
            RenderFormat::Square,
            RenderedVideo {
                video_url: "https://cdn.example/square.mp4".to_string(),
                thumbnail_url: "https://cdn.example/square.jpg".to_string(),
                width: 1080,
                height: 1080,
            },
        );
        let descriptor = OutputDescriptor {
            videos,
            metadata: OutputMetadata {
                total_duration_secs: 30.0,
                scene_count: 5,
                assets_used: vec![AssetKind::Backdrop],
                review: None,
            },
        };

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["videos"]["square"]["width"], 1080);
        assert_eq!(json["metadata"]["assets_used"][0], "backdrop");
    }
}
