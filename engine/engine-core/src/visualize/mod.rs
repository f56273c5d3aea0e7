//! Visualization exporter: DOT text, optionally rendered by Graphviz.

pub mod color;
pub mod dot;
pub mod render;

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use engine_config::VisualizationConfig;
use serde::Serialize;

pub use color::{ColorMap, ROOT_COLOR};
pub use dot::to_dot;
pub use render::{DotRenderer, INSTALL_HINT};

use crate::error::EngineError;
use crate::snapshot::TreeSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Png,
    Pdf,
    Svg,
    Dot,
}

impl Format {
    pub const ALL: [Format; 4] = [Self::Png, Self::Pdf, Self::Svg, Self::Dot];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Pdf => "pdf",
            Self::Svg => "svg",
            Self::Dot => "dot",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == lower)
            .ok_or_else(|| {
                EngineError::validation(
                    "format",
                    format!("unsupported format '{s}', expected one of png, pdf, svg, dot"),
                )
            })
    }
}

/// Validated visualization request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub format: Format,
    pub show_scores: bool,
    pub max_label_length: usize,
    pub title: Option<String>,
    /// Digits after the decimal point in score labels
    pub score_precision: usize,
}

impl RenderOptions {
    /// Fill unset options from `config` and validate the rest.
    pub fn new(
        format: Option<&str>,
        show_scores: Option<bool>,
        max_label_length: Option<i64>,
        title: Option<String>,
        config: &VisualizationConfig,
    ) -> Result<Self, EngineError> {
        let format = format.unwrap_or(config.default_format.as_str()).parse()?;
        let max_label_length = match max_label_length {
            None => config.default_max_label_length,
            Some(n) if n >= 1 => usize::try_from(n).map_err(|_| {
                EngineError::validation("max_label_length", format!("is too large: {n}"))
            })?,
            Some(n) => {
                return Err(EngineError::validation(
                    "max_label_length",
                    format!("must be at least 1, got {n}"),
                ))
            }
        };
        Ok(Self {
            format,
            show_scores: show_scores.unwrap_or(true),
            max_label_length,
            title: title.filter(|t| !t.trim().is_empty()),
            score_precision: config.score_precision,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationMetadata {
    pub algorithm: String,
    pub step_count: u64,
    pub node_count: usize,
    pub edge_count: usize,
    pub max_depth: u32,
    /// Range the colour map was stretched over
    pub score_range: [f64; 2],
    pub show_scores: bool,
    pub max_label_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Size of the rendered image; absent for `dot`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_bytes: Option<usize>,
}

/// Response of a visualization request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visualization {
    pub session_id: String,
    pub format: Format,
    pub source: String,
    pub metadata: VisualizationMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

/// Produce the graph description and, for image formats, the rendered bytes.
///
/// # Arguments
///
/// * `session_id` - Session the snapshot was taken from
/// * `algorithm` - Algorithm name, reported in the metadata
/// * `step_count` - Steps taken so far
/// * `snapshot` - Tree to draw
/// * `options` - Validated request options
/// * `renderer` - Graphviz runner used for png, pdf and svg
pub fn export(
    session_id: &str,
    algorithm: &str,
    step_count: u64,
    snapshot: &TreeSnapshot,
    options: &RenderOptions,
    renderer: &DotRenderer,
) -> Result<Visualization, EngineError> {
    let source = to_dot(snapshot, options);
    let image = match options.format {
        Format::Dot => None,
        format => Some(renderer.render(&source, format)?),
    };
    let (lo, hi) = ColorMap::for_bounds(snapshot.score_bounds()).range();

    Ok(Visualization {
        session_id: session_id.to_string(),
        format: options.format,
        metadata: VisualizationMetadata {
            algorithm: algorithm.to_string(),
            step_count,
            node_count: snapshot.nodes.len(),
            edge_count: snapshot.edge_count(),
            max_depth: snapshot.max_depth(),
            score_range: [lo, hi],
            show_scores: options.show_scores,
            max_label_length: options.max_label_length,
            title: options.title.clone(),
            image_bytes: image.as_ref().map(Vec::len),
        },
        image_base64: image.map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;

    fn config() -> VisualizationConfig {
        VisualizationConfig::default()
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("SVG".parse::<Format>().unwrap(), Format::Svg);
        let err = "jpeg".parse::<Format>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn test_options_defaults_and_validation() {
        let opts = RenderOptions::new(None, None, None, None, &config()).unwrap();
        assert_eq!(opts.format, Format::Png);
        assert!(opts.show_scores);
        assert_eq!(opts.max_label_length, 20);
        assert_eq!(opts.score_precision, 2);

        let err = RenderOptions::new(Some("dot"), None, Some(0), None, &config()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation { ref field, .. } if field == "max_label_length"
        ));

        let opts =
            RenderOptions::new(Some("dot"), Some(false), Some(3), Some("  ".into()), &config())
                .unwrap();
        assert_eq!(opts.title, None);
    }

    #[test]
    fn test_dot_export_needs_no_binary() {
        let snapshot = TreeSnapshot {
            nodes: Vec::new(),
            state_score_pairs: Vec::new(),
        };
        let opts =
            RenderOptions::new(Some("dot"), None, None, Some("t".into()), &config()).unwrap();
        let renderer = DotRenderer::new("/nonexistent/dot", Duration::from_secs(1));
        let vis = export("s1", "StandardMCTS", 0, &snapshot, &opts, &renderer).unwrap();
        assert!(vis.source.contains("digraph"));
        assert!(vis.image_base64.is_none());
        assert_eq!(vis.metadata.score_range, [0.0, 1.0]);
        assert_eq!(vis.metadata.title.as_deref(), Some("t"));
    }
}
