//! Chart models built from normalized orion results.
//!
//! A [`Chart`] is a backend independent description of what to draw. The
//! [`png`] backend rasterizes it for tool responses, the [`html`] backend
//! turns it into an interactive plotly page.

pub mod html;
pub mod png;

use base64::Engine;
use serde::Serialize;

use crate::{
    stats::pearson,
    tabular::{from_rows, parse_value},
};

/// Mime type of the encoded chart images.
pub const IMAGE_MIME_TYPE: &str = "image/png";

const DEFAULT_WIDTH: u32 = 1200;
const DEFAULT_HEIGHT: u32 = 700;
const SCATTER_WIDTH: u32 = 800;
const SCATTER_HEIGHT: u32 = 600;

const INDEX_AXIS_LABEL: &str = "Measurement Index";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// The `tab10` palette; series colors cycle through it by label order.
pub const PALETTE: [Rgb; 10] = [
    Rgb(31, 119, 180),
    Rgb(255, 127, 14),
    Rgb(44, 160, 44),
    Rgb(214, 39, 40),
    Rgb(148, 103, 189),
    Rgb(140, 86, 75),
    Rgb(227, 119, 194),
    Rgb(127, 127, 127),
    Rgb(188, 189, 34),
    Rgb(23, 190, 207),
];

const STEEL_BLUE: Rgb = Rgb(70, 130, 180);

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("Nothing to plot: the series collection is empty")]
    EmptyCollection,

    #[error("Failed to draw chart: {0}")]
    Draw(String),

    #[error("Failed to encode chart: {0}")]
    Encode(#[from] ::png::EncodingError),

    #[error("Chart rendering task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    Scatter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: Option<String>,
    pub color: Rgb,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub kind: ChartKind,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<Series>,
    pub width: u32,
    pub height: u32,
}

impl Chart {
    /// Data bounds over all series as `((x_min, x_max), (y_min, y_max))`.
    pub fn bounds(&self) -> Option<((f64, f64), (f64, f64))> {
        let mut points = self.series.iter().flat_map(|s| s.points.iter());
        let &(x, y) = points.next()?;
        Some(points.fold(((x, x), (y, y)), |((x0, x1), (y0, y1)), &(x, y)| {
            ((x0.min(x), x1.max(x)), (y0.min(y), y1.max(y)))
        }))
    }
}

fn indexed(values: &[f64]) -> Vec<(f64, f64)> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64, *v))
        .collect()
}

/// Ordered label -> values mapping used for overlay charts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesCollection {
    entries: Vec<(String, Vec<f64>)>,
}

impl SeriesCollection {
    /// Store the present values of `values` under `label`, replacing an
    /// earlier entry with the same label in place.
    pub fn insert(&mut self, label: impl Into<String>, values: impl IntoIterator<Item = Option<f64>>) {
        let label = label.into();
        let values: Vec<f64> = values.into_iter().flatten().collect();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((label, values)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, label: &str) -> Option<&[f64]> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, values)| values.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.entries
            .iter()
            .map(|(label, values)| (label.as_str(), values.as_slice()))
    }
}

/// One line chart per (configuration, metric) of encoded rows.
///
/// Rows of the same pair are concatenated; absent and unparsable cells are
/// dropped. Pairs left without a numeric value produce no chart.
pub fn single_series_charts(rows: &str) -> Vec<Chart> {
    let mut grouped: Vec<((String, String), Vec<f64>)> = Vec::new();
    for row in from_rows(rows) {
        let values = row.values.iter().filter_map(|v| parse_value(v));
        let key = (row.configuration, row.metric);
        match grouped.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => existing.extend(values),
            None => grouped.push((key, values.collect())),
        }
    }

    grouped
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|((configuration, metric), values)| Chart {
            kind: ChartKind::Line,
            title: format!("{metric} ({configuration})"),
            x_label: INDEX_AXIS_LABEL.to_string(),
            y_label: metric,
            series: vec![Series {
                label: None,
                color: PALETTE[0],
                points: indexed(&values),
            }],
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        })
        .collect()
}

/// One line per label of `collection`, colored by label position.
pub fn multi_series_chart(
    collection: &SeriesCollection,
    metric: &str,
    title_prefix: &str,
) -> Result<Chart, ChartError> {
    if collection.is_empty() {
        return Err(ChartError::EmptyCollection);
    }

    let series = collection
        .iter()
        .enumerate()
        .filter(|(_, (_, values))| !values.is_empty())
        .map(|(idx, (label, values))| Series {
            label: Some(label.to_string()),
            color: PALETTE[idx % PALETTE.len()],
            points: indexed(values),
        })
        .collect();

    Ok(Chart {
        kind: ChartKind::Line,
        title: format!("{title_prefix}{metric} over time"),
        x_label: INDEX_AXIS_LABEL.to_string(),
        y_label: metric.to_string(),
        series,
        width: DEFAULT_WIDTH,
        height: DEFAULT_HEIGHT,
    })
}

/// Scatter `values1` (Y-axis) against `values2` (X-axis), annotated with
/// their Pearson correlation.
pub fn correlation_chart(
    values1: &[f64],
    values2: &[f64],
    metric1: &str,
    metric2: &str,
    title_prefix: &str,
) -> Chart {
    let r = pearson(values1, values2);
    Chart {
        kind: ChartKind::Scatter,
        title: format!(
            "{title_prefix}Correlation between {metric1} and {metric2} (Pearson r = {r:.3})"
        ),
        x_label: metric2.to_string(),
        y_label: metric1.to_string(),
        series: vec![Series {
            label: None,
            color: STEEL_BLUE,
            points: values2.iter().copied().zip(values1.iter().copied()).collect(),
        }],
        width: SCATTER_WIDTH,
        height: SCATTER_HEIGHT,
    }
}

/// A rasterized chart, base64 encoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedImage {
    pub data: String,
    pub mime_type: &'static str,
}

pub fn encode(chart: &Chart) -> Result<EncodedImage, ChartError> {
    let png = png::render(chart)?;
    Ok(EncodedImage {
        data: base64::engine::general_purpose::STANDARD.encode(png),
        mime_type: IMAGE_MIME_TYPE,
    })
}

/// Rasterize `charts` on the blocking pool so that rendering does not stall
/// tasks waiting on orion.
pub async fn encode_all(charts: Vec<Chart>) -> Result<Vec<EncodedImage>, ChartError> {
    tokio::task::spawn_blocking(move || charts.iter().map(encode).collect())
        .await
        .map_err(|e| ChartError::Task(e.to_string()))?
}

/// Render the single-series charts of encoded rows.
pub async fn render_single_series(rows: &str) -> Result<Vec<EncodedImage>, ChartError> {
    encode_all(single_series_charts(rows)).await
}

pub async fn render_multi_series(
    collection: &SeriesCollection,
    metric: &str,
    title_prefix: &str,
) -> Result<EncodedImage, ChartError> {
    let chart = multi_series_chart(collection, metric, title_prefix)?;
    first_image(encode_all(vec![chart]).await?)
}

pub async fn render_correlation(
    values1: &[f64],
    values2: &[f64],
    metric1: &str,
    metric2: &str,
    title_prefix: &str,
) -> Result<EncodedImage, ChartError> {
    let chart = correlation_chart(values1, values2, metric1, metric2, title_prefix);
    first_image(encode_all(vec![chart]).await?)
}

fn first_image(images: Vec<EncodedImage>) -> Result<EncodedImage, ChartError> {
    images
        .into_iter()
        .next()
        .ok_or_else(|| ChartError::Task("renderer returned no image".to_string()))
}
