//! Filter-graph rendering.
//!
//! Turns a `TransformPlan` into the `-vf` chain handed to ffmpeg. Stage order
//! is fixed: rotate, antialias, scale + pad/crop, pixel format. A plan that
//! needs nothing renders to `FilterChain::Passthrough`, which is distinct
//! from an empty chain.

use std::fmt;

use super::planner::{ScaleStrategy, TransformPlan};
use crate::media::{MediaKind, MediaMetadata, Rotation};

/// ffmpeg's no-op video filter, used when a chain must be spelled out.
pub const PASSTHROUGH_FILTER: &str = "null";

/// Light smoothing after a transpose.
const ANTIALIAS_FILTER: &str = "gblur=sigma=0.4:steps=1";

/// Pixel format every encoded video leaves with.
pub const VIDEO_PIXEL_FORMAT: &str = "yuv420p";

/// A rendered filter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChain {
    /// Nothing to do; the source can pass through untouched.
    Passthrough,
    /// Ordered, non-empty list of filters.
    Filters(Vec<String>),
}

impl FilterChain {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FilterChain::Passthrough)
    }

    /// Value for `-vf`, or `None` when no filter argument is needed.
    pub fn to_arg(&self) -> Option<String> {
        match self {
            FilterChain::Passthrough => None,
            FilterChain::Filters(filters) => Some(filters.join(",")),
        }
    }

    pub fn filters(&self) -> &[String] {
        match self {
            FilterChain::Passthrough => &[],
            FilterChain::Filters(filters) => filters,
        }
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_arg() {
            Some(chain) => write!(f, "{chain}"),
            None => write!(f, "{PASSTHROUGH_FILTER}"),
        }
    }
}

/// Builder for constructing video filter chains
#[derive(Default)]
pub struct VideoFilterChain {
    filters: Vec<String>,
}

impl VideoFilterChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter; empty strings are ignored.
    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        if !filter.is_empty() {
            self.filters.push(filter);
        }
        self
    }

    #[must_use]
    pub fn add_filters<I, S>(self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        filters.into_iter().fold(self, |chain, f| chain.add_filter(f))
    }

    #[must_use]
    pub fn build(self) -> FilterChain {
        if self.filters.is_empty() {
            FilterChain::Passthrough
        } else {
            FilterChain::Filters(self.filters)
        }
    }
}

/// Physical rotation filters for a clockwise correction.
pub fn rotation_filters(rotation: Rotation) -> Vec<String> {
    match rotation {
        Rotation::None => Vec::new(),
        Rotation::Cw90 => vec!["transpose=1".to_string()],
        Rotation::Cw180 => vec!["transpose=1".to_string(), "transpose=1".to_string()],
        Rotation::Cw270 => vec!["transpose=2".to_string()],
    }
}

/// Scale + pad/crop filters, centered, lanczos resampling.
pub fn scale_filters(strategy: ScaleStrategy, width: u32, height: u32) -> Vec<String> {
    match strategy {
        ScaleStrategy::None => Vec::new(),
        ScaleStrategy::FitAndPad => vec![
            format!("scale={width}:{height}:force_original_aspect_ratio=decrease:flags=lanczos"),
            format!("pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:color=black"),
            "setsar=1".to_string(),
        ],
        ScaleStrategy::FillAndCrop => vec![
            format!("scale={width}:{height}:force_original_aspect_ratio=increase:flags=lanczos"),
            format!("crop={width}:{height}:(iw-ow)/2:(ih-oh)/2"),
            "setsar=1".to_string(),
        ],
    }
}

/// Final pixel-format stage for the output kind.
pub fn pixel_format_filter(metadata: &MediaMetadata) -> String {
    let format = match metadata.kind {
        MediaKind::Video => VIDEO_PIXEL_FORMAT,
        MediaKind::Image if metadata.codec == "png" => "rgb24",
        MediaKind::Image => "yuvj420p",
    };
    format!("format={format}")
}

/// Renders plans into filter chains.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterGraphBuilder;

impl FilterGraphBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, metadata: &MediaMetadata, plan: &TransformPlan) -> FilterChain {
        if !plan.needs_processing() {
            return FilterChain::Passthrough;
        }

        let mut chain = VideoFilterChain::new();
        if plan.needs_rotation {
            chain = chain.add_filters(rotation_filters(plan.rotation));
        }
        if plan.needs_antialias {
            chain = chain.add_filter(ANTIALIAS_FILTER);
        }
        chain = chain
            .add_filters(scale_filters(
                plan.scale_strategy,
                plan.target_width,
                plan.target_height,
            ))
            .add_filter(pixel_format_filter(metadata));

        let chain = chain.build();
        log::debug!("Filter chain: {}", chain);
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::planner::{TargetAspect, TransformPlanner};

    fn video(width: u32, height: u32, rotation: Rotation, codec: &str) -> MediaMetadata {
        MediaMetadata {
            width,
            height,
            rotation,
            codec: codec.to_string(),
            duration: 5.0,
            kind: MediaKind::Video,
            detail: None,
        }
    }

    fn chain_for(meta: &MediaMetadata) -> FilterChain {
        let plan = TransformPlanner::default().plan(meta, &TargetAspect::Portrait.into());
        FilterGraphBuilder::new().build(meta, &plan)
    }

    #[test]
    fn test_rotation_only_chain_order() {
        let chain = chain_for(&video(1920, 1080, Rotation::Cw90, "hevc"));
        assert_eq!(
            chain.filters(),
            &["transpose=1", ANTIALIAS_FILTER, "format=yuv420p"]
        );
    }

    #[test]
    fn test_rotation_filters_by_angle() {
        assert!(rotation_filters(Rotation::None).is_empty());
        assert_eq!(rotation_filters(Rotation::Cw90), vec!["transpose=1"]);
        assert_eq!(rotation_filters(Rotation::Cw180), vec!["transpose=1", "transpose=1"]);
        assert_eq!(rotation_filters(Rotation::Cw270), vec!["transpose=2"]);
    }

    #[test]
    fn test_pad_chain_is_centered() {
        let chain = chain_for(&video(640, 360, Rotation::None, "h264"));
        let arg = chain.to_arg().unwrap();
        assert_eq!(
            arg,
            "scale=1080:1920:force_original_aspect_ratio=decrease:flags=lanczos,\
             pad=1080:1920:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,format=yuv420p"
        );
    }

    #[test]
    fn test_crop_chain_for_larger_same_aspect() {
        let chain = chain_for(&video(2160, 3840, Rotation::None, "h264"));
        let filters = chain.filters();
        assert!(filters[0].contains("force_original_aspect_ratio=increase"));
        assert_eq!(filters[1], "crop=1080:1920:(iw-ow)/2:(ih-oh)/2");
        assert_eq!(filters.last().map(String::as_str), Some("format=yuv420p"));
    }

    #[test]
    fn test_full_chain_stage_order() {
        let chain = chain_for(&video(1280, 720, Rotation::Cw270, "vp9"));
        let filters = chain.filters();
        let position = |prefix: &str| filters.iter().position(|f| f.starts_with(prefix));
        assert!(position("transpose").unwrap() < position("gblur").unwrap());
        assert!(position("gblur").unwrap() < position("scale").unwrap());
        assert!(position("scale").unwrap() < position("format").unwrap());
        assert_eq!(position("format"), Some(filters.len() - 1));
    }

    #[test]
    fn test_nothing_to_do_is_passthrough_sentinel() {
        let chain = chain_for(&video(1080, 1920, Rotation::None, "h264"));
        assert!(chain.is_passthrough());
        assert_eq!(chain.to_arg(), None);
        assert_eq!(chain.to_string(), PASSTHROUGH_FILTER);
    }

    #[test]
    fn test_codec_only_change_still_normalizes_pixel_format() {
        let chain = chain_for(&video(1080, 1920, Rotation::None, "hevc"));
        assert_eq!(chain.filters(), &["format=yuv420p"]);
    }

    #[test]
    fn test_image_pixel_formats() {
        let mut png = video(800, 800, Rotation::None, "png");
        png.kind = MediaKind::Image;
        assert_eq!(pixel_format_filter(&png), "format=rgb24");
        let mut jpeg = png.clone();
        jpeg.codec = "mjpeg".to_string();
        assert_eq!(pixel_format_filter(&jpeg), "format=yuvj420p");
    }

    #[test]
    fn test_builder_ignores_empty_filters() {
        assert!(VideoFilterChain::new().add_filter("").build().is_passthrough());
    }
}
