//! Chart renderer seam
//!
//! The chart tool hands over a finished series; the renderer owns the file
//! format and the write.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

const SERVICE: &str = "chart_renderer";

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// (category, value) in display order
    pub points: Vec<(String, f64)>,
}

/// Trait for chart rendering
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Render `spec` to `path`, replacing any previous artifact.
    async fn render(&self, spec: &ChartSpec, path: &Path) -> Result<PathBuf>;
}

/// Bar chart with value labels and a dashed trend line, as SVG.
pub struct SvgChartRenderer {
    width: f64,
    height: f64,
}

impl SvgChartRenderer {
    pub fn new() -> Self {
        Self {
            width: 900.0,
            height: 500.0,
        }
    }

    fn draw(&self, spec: &ChartSpec) -> std::result::Result<String, std::fmt::Error> {
        let (left, right, top, bottom) = (90.0, 30.0, 60.0, 60.0);
        let plot_w = self.width - left - right;
        let plot_h = self.height - top - bottom;

        let max = spec
            .points
            .iter()
            .map(|(_, v)| *v)
            .fold(0.0_f64, f64::max)
            .max(1.0)
            * 1.1;

        let slot = plot_w / spec.points.len() as f64;
        let bar_w = slot * 0.6;
        let y_of = |v: f64| top + plot_h - (v.max(0.0) / max) * plot_h;

        let mut svg = String::new();
        writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
            w = self.width,
            h = self.height
        )?;
        writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
        writeln!(
            svg,
            r#"<text x="{}" y="32" text-anchor="middle" font-size="18" font-weight="bold">{}</text>"#,
            self.width / 2.0,
            escape(&spec.title)
        )?;

        // gridlines + y ticks
        for i in 0..=4 {
            let value = max * i as f64 / 4.0;
            let y = y_of(value);
            writeln!(
                svg,
                r##"<line x1="{left}" y1="{y:.1}" x2="{x2}" y2="{y:.1}" stroke="#ddd" stroke-dasharray="4 4"/>"##,
                x2 = left + plot_w
            )?;
            writeln!(
                svg,
                r#"<text x="{}" y="{:.1}" text-anchor="end" font-size="11">{}</text>"#,
                left - 8.0,
                y + 4.0,
                format_thousands(value)
            )?;
        }

        let mut trend = Vec::with_capacity(spec.points.len());
        for (i, (label, value)) in spec.points.iter().enumerate() {
            let cx = left + slot * (i as f64 + 0.5);
            let y = y_of(*value);
            writeln!(
                svg,
                r##"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="#4472c4"/>"##,
                cx - bar_w / 2.0,
                y,
                bar_w,
                top + plot_h - y
            )?;
            writeln!(
                svg,
                r#"<text x="{cx:.1}" y="{:.1}" text-anchor="middle" font-size="11">{}</text>"#,
                y - 6.0,
                format_thousands(*value)
            )?;
            writeln!(
                svg,
                r#"<text x="{cx:.1}" y="{:.1}" text-anchor="middle" font-size="12">{}</text>"#,
                top + plot_h + 20.0,
                escape(label)
            )?;
            trend.push(format!("{:.1},{:.1}", cx, y));
        }

        if trend.len() > 1 {
            writeln!(
                svg,
                r##"<polyline points="{}" fill="none" stroke="#ed7d31" stroke-width="2" stroke-dasharray="6 4"/>"##,
                trend.join(" ")
            )?;
        }

        writeln!(
            svg,
            r#"<line x1="{left}" y1="{y}" x2="{x2}" y2="{y}" stroke="black"/>"#,
            y = top + plot_h,
            x2 = left + plot_w
        )?;
        writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle" font-size="12">{}</text>"#,
            left + plot_w / 2.0,
            self.height - 15.0,
            escape(&spec.x_label)
        )?;
        writeln!(
            svg,
            r#"<text x="20" y="{y}" text-anchor="middle" font-size="12" transform="rotate(-90 20 {y})">{}</text>"#,
            escape(&spec.y_label),
            y = top + plot_h / 2.0
        )?;
        svg.push_str("</svg>\n");

        Ok(svg)
    }
}

impl Default for SvgChartRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChartRenderer for SvgChartRenderer {
    async fn render(&self, spec: &ChartSpec, path: &Path) -> Result<PathBuf> {
        if spec.points.is_empty() {
            return Err(OrchestrationError::external(SERVICE, "no data to plot"));
        }

        let svg = self
            .draw(spec)
            .map_err(|e| OrchestrationError::external(SERVICE, e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OrchestrationError::external(SERVICE, format!("{}: {}", parent.display(), e))
            })?;
        }
        // Readers of `path` only ever see a complete file.
        let staging = staging_path(path);
        let written = match tokio::fs::write(&staging, svg).await {
            Ok(()) => tokio::fs::rename(&staging, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(OrchestrationError::external(
                SERVICE,
                format!("{}: {}", path.display(), e),
            ));
        }

        info!(path = %path.display(), points = spec.points.len(), "Chart saved");
        Ok(path.to_path_buf())
    }
}

/// Unique sibling of `path` for a write-then-rename.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chart".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()))
}

/// `211915.4` → `211,915`
pub fn format_thousands(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }

    if rounded < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
