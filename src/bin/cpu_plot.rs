use anyhow::{bail, Result};
use cpu_usage_plot::plot::{init_logging, parse_cli};
use cpu_usage_plot::{parse_timestamp, run, PlotOptions, RunOutcome};

fn main() -> Result<()> {
    let (jsonin, start, end, verbose) = parse_cli();
    init_logging(verbose);

    if !jsonin.exists() {
        bail!("File '{}' does not exist.", jsonin.display());
    }

    let mut opts = PlotOptions::new(jsonin);
    opts.start = start.as_deref().map(parse_timestamp).transpose()?;
    opts.end = end.as_deref().map(parse_timestamp).transpose()?;
    tracing::debug!("plot options: {:?}", opts);

    match run(&opts)? {
        RunOutcome::NoData => println!("No data available in the specified time range."),
        RunOutcome::Saved { line_plot, heatmap } => {
            println!("Saved: {}, {}", line_plot.display(), heatmap.display())
        }
    }
    Ok(())
}
