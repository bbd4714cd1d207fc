use chrono::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
pub mod error;
pub mod load;
pub mod pivot;
pub mod plot;
pub mod render;
pub mod table;

pub use error::{CpuPlotError, Result};
pub use load::{load_file, load_records, CoreReading, RawDocument, SampleRecord};
pub use pivot::{CoreMajor, Pivot, TimeMajor};
pub use table::{build_table, parse_timestamp, CpuTable, FlatRow};

pub const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

pub const LINE_PLOT_SUFFIX: &str = "_line_plot.png";
pub const HEATMAP_SUFFIX: &str = "_heatmap.png";

/// What to plot and where to put the images.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotOptions {
    pub input: PathBuf,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub output_dir: PathBuf,
}

impl PlotOptions {
    /// No time window, images in the working directory.
    pub fn new(input: PathBuf) -> PlotOptions {
        PlotOptions {
            input,
            start: None,
            end: None,
            output_dir: PathBuf::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Saved { line_plot: PathBuf, heatmap: PathBuf },
    /// The time window left no rows; nothing was written.
    NoData,
}

/// Names the two images after the input file stem, e.g.
/// `logs/cpu.json` gives `cpu_line_plot.png` and `cpu_heatmap.png`.
pub fn output_paths(input: &Path, output_dir: &Path) -> (PathBuf, PathBuf) {
    let base = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("cpu_usage"));
    (
        output_dir.join(format!("{}{}", base, LINE_PLOT_SUFFIX)),
        output_dir.join(format!("{}{}", base, HEATMAP_SUFFIX)),
    )
}

/// load, flatten, filter, pivot, and plot, stopping at the first error
pub fn run(opts: &PlotOptions) -> Result<RunOutcome> {
    let records = load_file(&opts.input)?;
    let table = build_table(&records)?;
    let table = table.filter_time(opts.start, opts.end);
    if table.is_empty() {
        warn!("no rows between {:?} and {:?}", opts.start, opts.end);
        return Ok(RunOutcome::NoData);
    }
    let time_major = table.pivot_time_major()?;
    let core_major = table.pivot_core_major()?;
    info!(
        "plotting {} timestamps for {} cores",
        time_major.index.len(),
        time_major.columns.len()
    );
    let (line_plot, heatmap) = output_paths(&opts.input, &opts.output_dir);
    render::save_line_plot(&time_major, &line_plot)?;
    render::save_heatmap(&core_major, &heatmap)?;
    Ok(RunOutcome::Saved { line_plot, heatmap })
}

/// Smallest and largest element, None for an empty slice.
pub fn min_and_max<T: std::cmp::PartialOrd + Copy>(s: &[T]) -> Option<(T, T)> {
    let mut self_iter = s.iter();
    let (mut min, mut max) = match self_iter.next() {
        Some(v) => (*v, *v),
        None => return None,
    };
    for es in self_iter {
        if *es > max {
            max = *es
        }
        if *es < min {
            min = *es
        }
    }
    Some((min, max))
}

/// datetime tick format fitting the plotted time span
pub fn suitable_xfmt(d: chrono::Duration) -> &'static str {
    if d > chrono::Duration::weeks(1) {
        "%y-%m-%d"
    } else if d > chrono::Duration::days(1) {
        "%m-%d %H"
    } else if d > chrono::Duration::hours(1) {
        "%d %H:%M"
    } else {
        "%H:%M:%S"
    }
}
