// ============================================================================
// reframe-core/src/transform/planner.rs
// ============================================================================
//
// TRANSFORM PLANNER: Deciding What a Source Needs
//
// Given a metadata record and a target profile, the planner decides which
// operations are required: physical rotation, antialiasing, scaling,
// padding or cropping, re-encoding, and how much to boost the bitrate.
// The planner is pure; identical inputs always produce identical plans.
//
// KEY COMPONENTS:
// - TargetAspect / TargetProfile: portrait, landscape and square presets
// - TransformPlan: the decision record consumed by the filter builder and engine
// - ScaleStrategy: fit-and-pad versus fill-and-crop
// - TransformPlanner: the decision procedure

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::media::{MediaKind, MediaMetadata, Rotation, normalize_rotation, ratio};

/// Aspect mismatch above which padding is preferred over cropping.
pub const ASPECT_TOLERANCE: f64 = 0.01;

/// Codec that never needs re-encoding by itself.
pub const TARGET_CODEC: &str = "h264";

/// Compensation for detail lost in rotated portrait captures.
pub const ROTATED_PORTRAIT_BOOST: f64 = 1.2;

/// Compensation for downscaling 4K sources.
pub const UHD_BOOST: f64 = 1.5;

const HIGH_QUALITY_DIMENSION: u32 = 1920;
const HIGH_QUALITY_HEIGHT: u32 = 1080;

// ============================================================================
// TARGETS
// ============================================================================

/// Target orientation preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetAspect {
    Portrait,
    Landscape,
    Square,
}

impl TargetAspect {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            TargetAspect::Portrait => (1080, 1920),
            TargetAspect::Landscape => (1920, 1080),
            TargetAspect::Square => (1080, 1080),
        }
    }
}

impl FromStr for TargetAspect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" | "9:16" => Ok(TargetAspect::Portrait),
            "landscape" | "16:9" => Ok(TargetAspect::Landscape),
            "square" | "1:1" => Ok(TargetAspect::Square),
            other => Err(format!(
                "unknown aspect '{other}' (expected portrait, landscape or square)"
            )),
        }
    }
}

impl fmt::Display for TargetAspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetAspect::Portrait => "portrait",
            TargetAspect::Landscape => "landscape",
            TargetAspect::Square => "square",
        };
        write!(f, "{name}")
    }
}

/// Output frame size every source is normalized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetProfile {
    pub width: u32,
    pub height: u32,
}

impl TargetProfile {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f64 {
        ratio(self.width, self.height)
    }
}

impl From<TargetAspect> for TargetProfile {
    fn from(aspect: TargetAspect) -> Self {
        let (width, height) = aspect.dimensions();
        Self { width, height }
    }
}

impl Default for TargetProfile {
    fn default() -> Self {
        TargetAspect::Portrait.into()
    }
}

impl fmt::Display for TargetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ============================================================================
// PLAN
// ============================================================================

/// How the source frame is brought to the target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScaleStrategy {
    /// Dimensions already match.
    None,
    /// Scale to fit inside the target, then pad centered. Never crops.
    FitAndPad,
    /// Scale to cover the target, then crop centered.
    FillAndCrop,
}

/// Decision record for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformPlan {
    pub needs_rotation: bool,
    pub needs_scaling: bool,
    pub needs_padding: bool,
    pub needs_encoding: bool,
    pub needs_antialias: bool,
    pub target_width: u32,
    pub target_height: u32,
    pub bitrate_boost: f64,
    pub is_4k: bool,
    pub is_high_quality: bool,
    /// Rotation the filter chain must physically apply.
    pub rotation: Rotation,
    /// Source dimensions after the planned rotation.
    pub effective_width: u32,
    pub effective_height: u32,
    pub scale_strategy: ScaleStrategy,
    pub kind: MediaKind,
}

impl TransformPlan {
    pub fn needs_processing(&self) -> bool {
        self.needs_rotation || self.needs_scaling || self.needs_padding || self.needs_encoding
    }
}

// ============================================================================
// PLANNER
// ============================================================================

/// Planner policy switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlannerOptions {
    /// Leave rotation untouched for 4K HEVC sources whose stored frame is
    /// standard 16:9 landscape. Pending product confirmation; off by default.
    pub preserve_4k_hevc_landscape: bool,
}

/// Computes transform plans against a fixed policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformPlanner {
    options: PlannerOptions,
}

impl TransformPlanner {
    pub fn new(options: PlannerOptions) -> Self {
        Self { options }
    }

    fn skips_rotation(&self, metadata: &MediaMetadata) -> bool {
        self.options.preserve_4k_hevc_landscape
            && metadata.is_4k()
            && metadata.is_hevc()
            && metadata.is_standard_landscape()
    }

    /// Plans the transformation of `metadata` into `target`.
    pub fn plan(&self, metadata: &MediaMetadata, target: &TargetProfile) -> TransformPlan {
        // 1. Defensive re-normalization; a no-op for well-formed records.
        let mut rotation = normalize_rotation(f64::from(metadata.rotation.degrees()));

        if !rotation.is_none() && self.skips_rotation(metadata) {
            log::debug!(
                "Keeping {} rotation on 4K HEVC landscape source ({}x{})",
                rotation,
                metadata.width,
                metadata.height
            );
            rotation = Rotation::None;
        }

        // 2. Effective dimensions under the rotation actually applied.
        let (effective_width, effective_height) = if rotation.is_quarter_turn() {
            (metadata.height, metadata.width)
        } else {
            (metadata.width, metadata.height)
        };

        // 3. Target size.
        let (target_width, target_height) = (target.width, target.height);

        // 4-5. Rotation is always corrected physically, with smoothing.
        let needs_rotation = !rotation.is_none();
        let needs_antialias = needs_rotation;

        // 6. Codec. Stills are written as a single frame and never need a
        // codec change on their own.
        let needs_encoding = match metadata.kind {
            MediaKind::Video => metadata.codec != TARGET_CODEC,
            MediaKind::Image => false,
        };

        // 7-8. Scaling and padding.
        let needs_scaling = effective_width != target_width || effective_height != target_height;
        let effective_aspect = ratio(effective_width, effective_height);
        let aspect_mismatch = (target.aspect_ratio() - effective_aspect).abs() > ASPECT_TOLERANCE;
        let needs_padding = needs_scaling && aspect_mismatch;

        let scale_strategy = if !needs_scaling {
            ScaleStrategy::None
        } else if needs_padding {
            ScaleStrategy::FitAndPad
        } else if effective_width < target_width && effective_height < target_height {
            ScaleStrategy::FitAndPad
        } else {
            ScaleStrategy::FillAndCrop
        };

        // 9. Bitrate boost.
        let is_4k = metadata.is_4k();
        let portrait_after_rotation = needs_rotation && effective_height > effective_width;
        let mut bitrate_boost = 1.0;
        if portrait_after_rotation {
            bitrate_boost *= ROTATED_PORTRAIT_BOOST;
        }
        if is_4k {
            bitrate_boost *= UHD_BOOST;
        }

        // 10. Quality class.
        let is_high_quality = metadata.width >= HIGH_QUALITY_DIMENSION
            || metadata.height >= HIGH_QUALITY_HEIGHT
            || effective_width >= HIGH_QUALITY_DIMENSION
            || effective_height >= HIGH_QUALITY_DIMENSION;

        let plan = TransformPlan {
            needs_rotation,
            needs_scaling,
            needs_padding,
            needs_encoding,
            needs_antialias,
            target_width,
            target_height,
            bitrate_boost,
            is_4k,
            is_high_quality,
            rotation,
            effective_width,
            effective_height,
            scale_strategy,
            kind: metadata.kind,
        };
        log::debug!("Transform plan: {:?}", plan);
        plan
    }
}
