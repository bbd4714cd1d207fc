use super::VERSION;
use clap::{App, Arg};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Takes the CLI arguments that control the plotting of the CPU usage:
/// input json file, optional start and end of the time window, verbosity.
pub fn parse_cli() -> (PathBuf, Option<String>, Option<String>, bool) {
    parse_cli_from(std::env::args_os())
}

pub fn parse_cli_from<I, T>(args: I) -> (PathBuf, Option<String>, Option<String>, bool)
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let arg_jsonin = Arg::with_name("input_jsonfile")
        .help("json file with the per-core cpu usage records")
        .index(1)
        .required(true);
    let arg_start = Arg::with_name("start")
        .help("keep the records at or after this datetime, e.g. 2025-03-25T16:00:00")
        .long("start")
        .takes_value(true);
    let arg_end = Arg::with_name("end")
        .help("keep the records at or before this datetime, e.g. 2025-03-25T16:30:00")
        .long("end")
        .takes_value(true);
    let arg_verbose = Arg::with_name("verbose")
        .help("print debug information")
        .short("v")
        .long("verbose")
        .takes_value(false)
        .required(false);
    let cli_args = App::new("cpu_plot")
        .version(VERSION.unwrap_or("unknown"))
        .author("Luca Peruzzo")
        .about("cli app to plot the cpu usage per core as line plot and heatmap")
        .arg(arg_jsonin)
        .arg(arg_start)
        .arg(arg_end)
        .arg(arg_verbose)
        .get_matches_from(args);
    let jsonin = PathBuf::from(cli_args.value_of("input_jsonfile").unwrap_or_default());
    let start = cli_args.value_of("start").map(String::from);
    let end = cli_args.value_of("end").map(String::from);
    let verbose = cli_args.is_present("verbose");
    return (jsonin, start, end, verbose);
}

/// Installs the stderr subscriber; RUST_LOG wins over the verbose flag.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry().with(filter).with(layer).init();
}
