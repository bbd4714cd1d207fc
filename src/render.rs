//! PNG rendering of the two pivots with plotters.

use crate::error::{CpuPlotError, Result};
use crate::pivot::{CoreMajor, TimeMajor};
use crate::suitable_xfmt;
use chrono::prelude::*;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

pub const LINE_PLOT_SIZE: (u32, u32) = (2048, 512);
pub const HEATMAP_SIZE: (u32, u32) = (2000, 1000);
const COLORBAR_WIDTH: i32 = 140;

/// Anchor colors of the viridis map, from low to high.
const VIRIDIS: [(u8, u8, u8); 5] = [
    (68, 1, 84),
    (59, 82, 139),
    (33, 145, 140),
    (94, 201, 98),
    (253, 231, 37),
];

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Plots one user-time line per core against time.
pub fn save_line_plot(pivot: &TimeMajor, fout: &Path) -> Result<()> {
    draw_line_plot(pivot, fout).map_err(|e| render_error(fout, e))
}

/// Plots the core-by-time grid of user time.
pub fn save_heatmap(pivot: &CoreMajor, fout: &Path) -> Result<()> {
    draw_heatmap(pivot, fout).map_err(|e| render_error(fout, e))
}

/// Maps v in [vmin, vmax] onto the viridis gradient, clamping outside values.
pub fn viridis(v: f64, vmin: f64, vmax: f64) -> RGBColor {
    let t = if vmax > vmin {
        ((v - vmin) / (vmax - vmin)).max(0.).min(1.)
    } else {
        0.5
    };
    let scaled = t * (VIRIDIS.len() - 1) as f64;
    let k = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = scaled - k as f64;
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    let (a, b) = (VIRIDIS[k], VIRIDIS[k + 1]);
    RGBColor(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

fn render_error(fout: &Path, e: Box<dyn std::error::Error>) -> CpuPlotError {
    CpuPlotError::Render {
        path: fout.to_path_buf(),
        message: e.to_string(),
    }
}

/// Pads a value range so that a flat series still gets a visible axis.
fn padded(vmin: f64, vmax: f64) -> (f64, f64) {
    let pad = ((vmax - vmin) / 10f64).max(1.);
    (vmin - pad, vmax + pad)
}

/// Tick label precision follows the axis span, so close ticks stay distinct.
fn tick_label(v: f64, span: f64) -> String {
    if span < 1. {
        format!("{:.2}", v)
    } else if span < 10. {
        format!("{:.1}", v)
    } else {
        format!("{:.0}", v)
    }
}

/// Cell k is centred on k; ticks between cell centres get no label.
fn label_at<T>(labels: &[T], x: f64) -> Option<&T> {
    let k = x.round();
    if k < 0. || (x - k).abs() > 1e-6 {
        None
    } else {
        labels.get(k as usize)
    }
}

/// Splits a series at its gaps into runs of present values.
fn segments<R: Copy>(series: &[(R, Option<f64>)]) -> Vec<Vec<(R, f64)>> {
    series
        .split(|(_, v)| v.is_none())
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| chunk.iter().filter_map(|(t, v)| v.map(|v| (*t, v))).collect())
        .collect()
}

fn draw_line_plot(pivot: &TimeMajor, fout: &Path) -> DrawResult {
    let (xmindt, xmaxdt) = match (pivot.index.first(), pivot.index.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err("no timestamps to plot".into()),
    };
    let xspan: chrono::Duration = xmaxdt - xmindt;
    let xmargin = std::cmp::max(xspan / 20, chrono::Duration::minutes(1));
    let xmindt = xmindt - xmargin;
    let xmaxdt = xmaxdt + xmargin;
    let xfmt = suitable_xfmt(xspan);
    let (ymin, ymax) = pivot.value_range().ok_or("no values to plot")?;
    let (ymin, ymax) = padded(ymin, ymax);

    let root = BitMapBackend::new(fout, LINE_PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("CPU User Usage per Core Over Time", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(xmindt..xmaxdt, ymin..ymax)?;
    chart
        .configure_mesh()
        .light_line_style(&TRANSPARENT)
        .bold_line_style(RGBColor(150, 150, 150).stroke_width(1))
        .set_all_tick_mark_size(2)
        .label_style(("sans-serif", 18))
        .x_labels(14)
        .x_label_formatter(&|x: &DateTime<Utc>| x.format(xfmt).to_string())
        .y_label_formatter(&|y: &f64| tick_label(*y, ymax - ymin))
        .x_desc("Timestamp")
        .y_desc("User (%)")
        .draw()?;

    for j in 0..pivot.columns.len() {
        let color = Palette99::pick(j);
        // a core missing at some timestamps gives a broken line
        for segment in segments(&pivot.column_series(j)) {
            if segment.len() == 1 {
                chart.draw_series(std::iter::once(Circle::new(segment[0], 3, color.filled())))?;
            } else {
                chart.draw_series(LineSeries::new(segment, color.stroke_width(2)))?;
            }
        }
    }
    root.present()?;
    Ok(())
}

fn draw_heatmap(pivot: &CoreMajor, fout: &Path) -> DrawResult {
    let (vmin, vmax) = pivot.value_range().ok_or("no values to plot")?;
    let xspan: chrono::Duration = match (pivot.columns.first(), pivot.columns.last()) {
        (Some(first), Some(last)) => *last - *first,
        _ => return Err("no timestamps to plot".into()),
    };
    let xfmt = suitable_xfmt(xspan);
    let ncols = pivot.columns.len();
    let nrows = pivot.index.len();
    let timestamps = &pivot.columns;
    let cores = &pivot.index;

    let root = BitMapBackend::new(fout, HEATMAP_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (area, colorbar) = root.split_horizontally(HEATMAP_SIZE.0 as i32 - COLORBAR_WIDTH);
    let mut chart = ChartBuilder::on(&area)
        .caption("CPU User Usage Heatmap (Core vs Time)", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(80)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5..ncols as f64 - 0.5, -0.5..nrows as f64 - 0.5)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .label_style(("sans-serif", 18))
        .x_labels(ncols.min(14))
        .y_labels(nrows.min(64))
        .x_label_formatter(&|x: &f64| {
            label_at(timestamps, *x)
                .map(|t| t.format(xfmt).to_string())
                .unwrap_or_default()
        })
        .y_label_formatter(&|y: &f64| label_at(cores, *y).map(|c| c.to_string()).unwrap_or_default())
        .x_desc("Timestamp")
        .y_desc("CPU Core")
        .draw()?;

    let cells = pivot.cells.iter().enumerate().flat_map(|(i, row)| {
        row.iter()
            .enumerate()
            .filter_map(move |(j, v)| v.map(|v| (i as f64, j as f64, v)))
    });
    chart.draw_series(cells.map(|(y, x, v)| {
        Rectangle::new(
            [(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)],
            viridis(v, vmin, vmax).filled(),
        )
    }))?;

    draw_colorbar(&colorbar, vmin, vmax)?;
    root.present()?;
    Ok(())
}

fn draw_colorbar(area: &DrawingArea<BitMapBackend<'_>, Shift>, vmin: f64, vmax: f64) -> DrawResult {
    let (lo, hi) = if vmax > vmin { (vmin, vmax) } else { padded(vmin, vmax) };
    let steps = 100;
    let step = (hi - lo) / steps as f64;
    let mut bar = ChartBuilder::on(area)
        .margin_top(60)
        .margin_bottom(100)
        .margin_right(20)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..1f64, lo..hi)?;
    bar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .label_style(("sans-serif", 16))
        .y_label_formatter(&|v: &f64| tick_label(*v, hi - lo))
        .draw()?;
    bar.draw_series((0..steps).map(|k| {
        let from = lo + step * k as f64;
        let to = from + step;
        Rectangle::new([(0., from), (1., to)], viridis((from + to) / 2., lo, hi).filled())
    }))?;
    Ok(())
}
