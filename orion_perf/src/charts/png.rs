//! Rasterization of [`Chart`]s into PNG bytes.
//!
//! Text is drawn with system fonts through the `fonts` feature, which is on by
//! default. Without it the image carries the plot area, axes, and data only.

use std::{fmt::Display, ops::Range};

use plotters::prelude::*;

use super::{Chart, ChartError, ChartKind, Rgb};

const LINE_MARKER_SIZE: u32 = 3;
const SCATTER_MARKER_SIZE: u32 = 4;

/// plotters panics when asked to draw text without a font backend.
const DRAW_TEXT: bool = cfg!(feature = "fonts");

fn draw_error(err: impl Display) -> ChartError {
    ChartError::Draw(err.to_string())
}

impl From<Rgb> for RGBColor {
    fn from(Rgb(r, g, b): Rgb) -> Self {
        RGBColor(r, g, b)
    }
}

fn padded((min, max): (f64, f64)) -> Range<f64> {
    let span = max - min;
    let pad = if span > 0.0 {
        span * 0.05
    } else if min != 0.0 {
        min.abs() * 0.1
    } else {
        1.0
    };
    (min - pad)..(max + pad)
}

fn draw(chart: &Chart, pixels: &mut [u8]) -> Result<(), ChartError> {
    let root = BitMapBackend::with_buffer(pixels, (chart.width, chart.height)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_error)?;

    let (x_range, y_range) = match chart.bounds() {
        Some((x, y)) => (padded(x), padded(y)),
        None => (0.0..1.0, 0.0..1.0),
    };

    let mut builder = ChartBuilder::on(&root);
    builder.margin(20);
    if DRAW_TEXT {
        builder
            .caption(&chart.title, ("sans-serif", 22))
            .x_label_area_size(45)
            .y_label_area_size(70);
    }
    let mut ctx = builder
        .build_cartesian_2d(x_range, y_range)
        .map_err(draw_error)?;

    {
        let mut mesh = ctx.configure_mesh();
        if DRAW_TEXT {
            mesh.x_desc(chart.x_label.as_str())
                .y_desc(chart.y_label.as_str());
        } else {
            mesh.x_labels(0).y_labels(0);
        }
        mesh.draw().map_err(draw_error)?;
    }

    let mut has_legend = false;
    for series in &chart.series {
        let color = RGBColor::from(series.color);
        match chart.kind {
            ChartKind::Line => {
                let line = ctx
                    .draw_series(LineSeries::new(
                        series.points.iter().copied(),
                        color.stroke_width(2),
                    ))
                    .map_err(draw_error)?;
                if let Some(label) = &series.label {
                    line.label(label.as_str())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
                    has_legend = true;
                }
                ctx.draw_series(
                    series
                        .points
                        .iter()
                        .map(|&p| Circle::new(p, LINE_MARKER_SIZE, color.filled())),
                )
                .map_err(draw_error)?;
            }
            ChartKind::Scatter => {
                ctx.draw_series(
                    series
                        .points
                        .iter()
                        .map(|&p| Circle::new(p, SCATTER_MARKER_SIZE, color.mix(0.7).filled())),
                )
                .map_err(draw_error)?;
            }
        }
    }

    if has_legend && DRAW_TEXT {
        ctx.configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(draw_error)?;
    }

    root.present().map_err(draw_error)
}

fn encode_png(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ChartError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(pixels)?;
        writer.finish()?;
    }
    Ok(out)
}

/// Render `chart` to PNG bytes.
pub fn render(chart: &Chart) -> Result<Vec<u8>, ChartError> {
    let mut pixels = vec![0u8; chart.width as usize * chart.height as usize * 3];
    draw(chart, &mut pixels)?;
    encode_png(&pixels, chart.width, chart.height)
}
