//! Interactive HTML report of [`Chart`]s, one plotly figure per chart.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use itertools::Itertools;
use plotly::{
    common::{Line, Marker, Mode, Title},
    layout::Axis,
    Layout, Plot, Scatter,
};

use super::{Chart, ChartKind, Rgb};

const MARKER_OPACITY: f64 = 0.7;

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{{TITLE}}</title>
    {{PLOTLY_HEAD}}
</head>
<body>
    {{PLOTLY_BODY}}
</body>
</html>"#;

fn css_color(Rgb(r, g, b): Rgb) -> String {
    format!("rgb({r}, {g}, {b})")
}

fn to_plot(chart: &Chart) -> Plot {
    let mut plot = Plot::new();

    for series in &chart.series {
        let (x, y): (Vec<f64>, Vec<f64>) = series.points.iter().copied().unzip();
        let color = css_color(series.color);

        let trace = match chart.kind {
            ChartKind::Line => Scatter::new(x, y)
                .mode(Mode::LinesMarkers)
                .line(Line::new().color(color)),
            ChartKind::Scatter => Scatter::new(x, y).mode(Mode::Markers).marker(
                Marker::new()
                    .color(color)
                    .opacity(MARKER_OPACITY),
            ),
        };
        let trace = match &series.label {
            Some(label) => trace.name(label.as_str()),
            None => trace.show_legend(false),
        };

        plot.add_trace(trace);
    }

    let layout = Layout::new()
        .title(Title::from(chart.title.as_str()))
        .x_axis(Axis::new().title(Title::from(chart.x_label.as_str())))
        .y_axis(Axis::new().title(Title::from(chart.y_label.as_str())));
    plot.set_layout(layout);

    plot
}

/// Build a standalone page embedding every chart. Plotly.js is loaded from
/// its CDN.
pub fn report(charts: &[Chart], title: &str) -> String {
    let body = charts
        .iter()
        .map(|chart| to_plot(chart).to_inline_html(None))
        .join("\n    ");

    HTML_TEMPLATE
        .replace("{{TITLE}}", title)
        .replace("{{PLOTLY_HEAD}}", &Plot::online_cdn_js())
        .replace("{{PLOTLY_BODY}}", &body)
}

pub fn write_report(charts: &[Chart], title: &str, path: &Path) -> Result<()> {
    fs::write(path, report(charts, title))
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::charts::{correlation_chart, multi_series_chart, SeriesCollection};

    #[test]
    fn report_embeds_every_chart() {
        let mut collection = SeriesCollection::default();
        collection.insert("4.18", vec![Some(1.0), Some(2.0)]);
        collection.insert("4.19", vec![Some(3.0)]);
        let overlay = multi_series_chart(&collection, "cpu", "").unwrap();
        let scatter = correlation_chart(&[1.0, 2.0], &[2.0, 1.0], "cpu", "lat", "");

        let html = report(&[overlay, scatter], "Orion report");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Orion report</title>"));
        assert!(html.contains("cpu over time"));
        assert!(html.contains("Correlation between cpu and lat"));
        assert!(html.contains("\"4.19\""));
        assert!(!html.contains("{{PLOTLY_BODY}}"));
    }

    #[test]
    fn writes_report_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.html");
        write_report(&[], "empty", &path).unwrap();
        let html = fs::read_to_string(&path).unwrap();
        assert!(html.contains("<title>empty</title>"));
    }

    #[test]
    fn colors_are_css() {
        assert_eq!(css_color(Rgb(70, 130, 180)), "rgb(70, 130, 180)");
    }
}
