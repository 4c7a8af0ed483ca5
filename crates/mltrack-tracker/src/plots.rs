//! Summary plots rendered as standalone SVG files
//!
//! Plots are an optional enhancement: callers tolerate a missing plots
//! directory, and the tracker renders them fail-open.

use async_trait::async_trait;
use mltrack_core::{Result, TrackError};
use mltrack_metrics::MetricsTable;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 400.0;
const MARGIN: f64 = 56.0;
const HISTOGRAM_BINS: usize = 30;

/// Renders summary plots for a metrics table into a directory
#[async_trait]
pub trait PlotRenderer: Send + Sync {
    /// Render every applicable plot, returning the files written
    async fn render(&self, table: &MetricsTable, dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Dependency-free SVG line charts, histogram and scatter plot
#[derive(Debug, Clone, Default)]
pub struct SvgPlotRenderer;

struct Series<'a> {
    label: &'a str,
    color: &'a str,
    points: Vec<(f64, f64)>,
}

impl SvgPlotRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render the SVG documents for a table without touching the filesystem
    ///
    /// Returns `(file_name, svg)` pairs. Empty tables produce nothing.
    pub fn documents(&self, table: &MetricsTable) -> Vec<(&'static str, String)> {
        if table.is_empty() {
            return Vec::new();
        }

        let mut docs = Vec::new();

        let mut loss_series = vec![Series {
            label: "Training Loss",
            color: "#1f77b4",
            points: points(table, "loss"),
        }];
        if table.has_values("val_loss") {
            loss_series.push(Series {
                label: "Validation Loss",
                color: "#ff7f0e",
                points: points(table, "val_loss"),
            });
        }
        docs.push((
            "loss.svg",
            line_chart("Training and Validation Loss", "Step", "Loss", &loss_series),
        ));

        let mut accuracy_series = Vec::new();
        if table.has_values("accuracy") {
            accuracy_series.push(Series {
                label: "Training Accuracy",
                color: "#2ca02c",
                points: points(table, "accuracy"),
            });
        }
        if table.has_values("val_accuracy") {
            accuracy_series.push(Series {
                label: "Validation Accuracy",
                color: "#d62728",
                points: points(table, "val_accuracy"),
            });
        }
        if !accuracy_series.is_empty() {
            docs.push((
                "accuracy.svg",
                line_chart(
                    "Training and Validation Accuracy",
                    "Step",
                    "Accuracy",
                    &accuracy_series,
                ),
            ));
        }

        if table.has_values("learning_rate") {
            docs.push((
                "learning_rate.svg",
                line_chart(
                    "Learning Rate Schedule",
                    "Step",
                    "Learning Rate",
                    &[Series {
                        label: "Learning Rate",
                        color: "#9467bd",
                        points: points(table, "learning_rate"),
                    }],
                ),
            ));
        }

        let losses: Vec<f64> = table.column("loss").into_iter().flatten().collect();
        docs.push((
            "loss_distribution.svg",
            histogram("Loss Distribution", "Loss", &losses, HISTOGRAM_BINS),
        ));

        let pairs: Vec<(f64, f64)> = table
            .rows()
            .iter()
            .filter_map(|row| row.accuracy.zip(row.val_accuracy))
            .collect();
        if !pairs.is_empty() {
            docs.push((
                "accuracy_correlation.svg",
                scatter(
                    "Training vs Validation Accuracy",
                    "Training Accuracy",
                    "Validation Accuracy",
                    &pairs,
                ),
            ));
        }

        docs
    }

    /// Overlay two runs' loss curves in one file
    pub async fn render_comparison(
        &self,
        first: (&str, &MetricsTable),
        second: (&str, &MetricsTable),
        path: &Path,
    ) -> Result<PathBuf> {
        let series = [
            Series {
                label: first.0,
                color: "#1f77b4",
                points: points(first.1, "loss"),
            },
            Series {
                label: second.0,
                color: "#ff7f0e",
                points: points(second.1, "loss"),
            },
        ];
        let svg = line_chart("Loss Comparison", "Step", "Loss", &series);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, svg).await?;
        Ok(path.to_path_buf())
    }
}

#[async_trait]
impl PlotRenderer for SvgPlotRenderer {
    async fn render(&self, table: &MetricsTable, dir: &Path) -> Result<Vec<PathBuf>> {
        let docs = self.documents(table);
        if docs.is_empty() {
            debug!("No metrics to plot");
            return Ok(Vec::new());
        }

        fs::create_dir_all(dir)
            .await
            .map_err(|e| TrackError::Plot(format!("Failed to create {}: {}", dir.display(), e)))?;

        let mut written = Vec::with_capacity(docs.len());
        for (name, svg) in docs {
            let path = dir.join(name);
            fs::write(&path, svg)
                .await
                .map_err(|e| TrackError::Plot(format!("Failed to write {}: {}", path.display(), e)))?;
            written.push(path);
        }

        info!("Training plots saved to {}", dir.display());
        Ok(written)
    }
}

// (step, value) pairs for rows that reported the metric
fn points(table: &MetricsTable, column: &str) -> Vec<(f64, f64)> {
    table
        .rows()
        .iter()
        .filter_map(|row| row.get(column).map(|v| (row.step as f64, v)))
        .filter(|(_, v)| v.is_finite())
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Min/max of an iterator, widened when degenerate
fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if lo == hi {
        let pad = if lo == 0.0 { 1.0 } else { lo.abs() * 0.05 };
        return (lo - pad, hi + pad);
    }
    (lo, hi)
}

/// Maps data coordinates into the plot area
struct Frame {
    x: (f64, f64),
    y: (f64, f64),
}

impl Frame {
    fn px(&self, x: f64) -> f64 {
        MARGIN + (x - self.x.0) / (self.x.1 - self.x.0) * (WIDTH - 2.0 * MARGIN)
    }

    fn py(&self, y: f64) -> f64 {
        HEIGHT - MARGIN - (y - self.y.0) / (self.y.1 - self.y.0) * (HEIGHT - 2.0 * MARGIN)
    }

    fn open(&self, title: &str, x_label: &str, y_label: &str) -> String {
        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="12">"#,
            w = WIDTH,
            h = HEIGHT
        );
        let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="24" text-anchor="middle" font-size="15">{}</text>"#,
            WIDTH / 2.0,
            escape(title)
        );
        // Axes
        let _ = writeln!(
            svg,
            r##"<path d="M{l} {t} L{l} {b} L{r} {b}" stroke="#333" fill="none"/>"##,
            l = MARGIN,
            t = MARGIN,
            b = HEIGHT - MARGIN,
            r = WIDTH - MARGIN
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">{}</text>"#,
            WIDTH / 2.0,
            HEIGHT - 14.0,
            escape(x_label)
        );
        let _ = writeln!(
            svg,
            r#"<text x="16" y="{y}" text-anchor="middle" transform="rotate(-90 16 {y})">{}</text>"#,
            escape(y_label),
            y = HEIGHT / 2.0
        );
        // Range labels
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="end">{:.4}</text>"#,
            MARGIN - 4.0,
            MARGIN + 4.0,
            self.y.1
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="end">{:.4}</text>"#,
            MARGIN - 4.0,
            HEIGHT - MARGIN,
            self.y.0
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="start">{}</text>"#,
            MARGIN,
            HEIGHT - MARGIN + 16.0,
            self.x.0
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="end">{}</text>"#,
            WIDTH - MARGIN,
            HEIGHT - MARGIN + 16.0,
            self.x.1
        );
        svg
    }
}

fn line_chart(title: &str, x_label: &str, y_label: &str, series: &[Series<'_>]) -> String {
    let all = || series.iter().flat_map(|s| s.points.iter().copied());
    let frame = Frame {
        x: bounds(all().map(|(x, _)| x)),
        y: bounds(all().map(|(_, y)| y)),
    };

    let mut svg = frame.open(title, x_label, y_label);
    for (idx, s) in series.iter().enumerate() {
        let coords: Vec<String> = s
            .points
            .iter()
            .map(|(x, y)| format!("{:.2},{:.2}", frame.px(*x), frame.py(*y)))
            .collect();
        let _ = writeln!(
            svg,
            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="1.5" stroke-opacity="0.8"/>"#,
            coords.join(" "),
            s.color
        );
        // Legend
        let ly = MARGIN + 14.0 * idx as f64;
        let _ = writeln!(
            svg,
            r#"<rect x="{}" y="{}" width="10" height="10" fill="{}"/><text x="{}" y="{}">{}</text>"#,
            WIDTH - MARGIN - 150.0,
            ly,
            s.color,
            WIDTH - MARGIN - 136.0,
            ly + 9.0,
            escape(s.label)
        );
    }
    svg.push_str("</svg>\n");
    svg
}

fn histogram(title: &str, x_label: &str, values: &[f64], bins: usize) -> String {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let (lo, hi) = bounds(finite.iter().copied());
    let bins = bins.max(1);
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in &finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(0).max(1);

    let frame = Frame {
        x: (lo, hi),
        y: (0.0, max_count as f64),
    };
    let mut svg = frame.open(title, x_label, "Frequency");
    for (idx, count) in counts.iter().enumerate() {
        let x0 = frame.px(lo + width * idx as f64);
        let x1 = frame.px(lo + width * (idx + 1) as f64);
        let top = frame.py(*count as f64);
        let _ = writeln!(
            svg,
            r##"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="#1f77b4" fill-opacity="0.7" stroke="black"/>"##,
            x0,
            top,
            (x1 - x0).max(0.0),
            (HEIGHT - MARGIN - top).max(0.0)
        );
    }
    svg.push_str("</svg>\n");
    svg
}

fn scatter(title: &str, x_label: &str, y_label: &str, pairs: &[(f64, f64)]) -> String {
    let frame = Frame {
        x: bounds(pairs.iter().map(|(x, _)| *x).chain([0.0, 1.0])),
        y: bounds(pairs.iter().map(|(_, y)| *y).chain([0.0, 1.0])),
    };

    let mut svg = frame.open(title, x_label, y_label);
    // Perfect-correlation reference line
    let _ = writeln!(
        svg,
        r##"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="red" stroke-dasharray="6 4" stroke-opacity="0.5"/>"##,
        frame.px(0.0),
        frame.py(0.0),
        frame.px(1.0),
        frame.py(1.0)
    );
    for (x, y) in pairs.iter().filter(|(x, y)| x.is_finite() && y.is_finite()) {
        let _ = writeln!(
            svg,
            r##"<circle cx="{:.2}" cy="{:.2}" r="3" fill="#1f77b4" fill-opacity="0.6"/>"##,
            frame.px(*x),
            frame.py(*y)
        );
    }
    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use mltrack_core::MetricSnapshot;
    use tempfile::TempDir;

    fn table(with_accuracy: bool) -> MetricsTable {
        let snapshots: Vec<MetricSnapshot> = (0..20)
            .map(|step| {
                let builder = MetricSnapshot::builder(step / 5, step, 1.0 / (step + 1) as f64)
                    .learning_rate(0.001);
                let builder = if with_accuracy {
                    builder
                        .accuracy(0.5 + step as f64 * 0.02)
                        .val_accuracy(0.45 + step as f64 * 0.02)
                } else {
                    builder
                };
                builder.build().unwrap()
            })
            .collect();
        MetricsTable::from_snapshots(&snapshots)
    }

    #[test]
    fn test_empty_table_renders_nothing() {
        assert!(SvgPlotRenderer::new().documents(&MetricsTable::default()).is_empty());
    }

    #[test]
    fn test_accuracy_plots_only_when_reported() {
        let names: Vec<&str> = SvgPlotRenderer::new()
            .documents(&table(false))
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["loss.svg", "learning_rate.svg", "loss_distribution.svg"]);
    }

    #[test]
    fn test_titles_are_escaped() {
        let svg = line_chart(
            "a < b & c",
            "x",
            "y",
            &[Series {
                label: "run <1>",
                color: "black",
                points: vec![(0.0, 1.0), (1.0, 2.0)],
            }],
        );
        assert!(svg.contains("a &lt; b &amp; c"));
        assert!(svg.contains("run &lt;1&gt;"));
    }

    #[test]
    fn test_histogram_handles_constant_values() {
        let svg = histogram("h", "Loss", &[0.5, 0.5, 0.5], 30);
        assert!(svg.starts_with("<svg"));
        assert!(!svg.contains("NaN"));
    }

    #[tokio::test]
    async fn test_render_writes_files() {
        let dir = TempDir::new().unwrap();
        let plots_dir = dir.path().join("plots");

        let written = SvgPlotRenderer::new()
            .render(&table(true), &plots_dir)
            .await
            .unwrap();

        assert_eq!(written.len(), 5);
        assert!(plots_dir.join("accuracy_correlation.svg").exists());
        let svg = std::fs::read_to_string(plots_dir.join("loss.svg")).unwrap();
        assert!(svg.contains("<polyline"));
    }

    #[tokio::test]
    async fn test_render_comparison() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cmp").join("loss_comparison.svg");

        SvgPlotRenderer::new()
            .render_comparison(("a", &table(false)), ("b", &table(true)), &path)
            .await
            .unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert_eq!(svg.matches("<polyline").count(), 2);
    }
}
