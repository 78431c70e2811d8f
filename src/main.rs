// pcap-streamrate/src/main.rs
use std::path::{Path, PathBuf};

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use pcap_streamrate::charts::{render_all, render_overview_chart};
use pcap_streamrate::overview::{render_overview_table, summarize_capture};
use pcap_streamrate::report::{render, ReportFormat};
use pcap_streamrate::{
    analyze_pcap_with, AnalysisConfig, ChartOptions, PcapDissector, DEFAULT_BIN_WIDTH_SECS,
    DEFAULT_MAX_CONNECTIONS,
};

fn cli() -> Command {
    Command::new("pcap-streamrate")
        .version(clap::crate_version!())
        .about("Connection persistence and bit-rate analysis of video streaming captures")
        .args_conflicts_with_subcommands(true)
        .subcommand_negates_reqs(true)
        .arg(Arg::new("pcap")
            .help("The pcap or pcapng capture to analyze")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .index(1))
        .arg(Arg::new("time_window")
            .short('w')
            .long("time-window")
            .alias("time_window")
            .value_name("SECONDS")
            .help("Throughput bin width in seconds")
            .value_parser(value_parser!(f64))
            .default_value("0.2"))
        .arg(Arg::new("max_plots")
            .short('m')
            .long("max-plots")
            .value_name("N")
            .help("Maximum number of connections to bin, chart and stitch")
            .value_parser(value_parser!(usize))
            .default_value("31"))
        .arg(Arg::new("format")
            .short('f')
            .long("format")
            .value_name("FORMAT")
            .help("Report format")
            .value_parser(["text", "json", "csv"])
            .default_value("text"))
        .arg(Arg::new("output")
            .short('o')
            .long("output")
            .value_name("FILE")
            .help("Write the report to a file (default: stdout)")
            .value_parser(value_parser!(PathBuf)))
        .arg(chart_dir_arg())
        .arg(Arg::new("no_charts")
            .long("no-charts")
            .help("Skip chart rendering")
            .action(ArgAction::SetTrue))
        .arg(limit_arg())
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("Increase log verbosity")
            .action(ArgAction::Count)
            .global(true))
        .subcommand(Command::new("overview")
            .about("Compare packet and TCP stream counts across several captures")
            .arg(Arg::new("captures")
                .help("Captures to compare")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)))
            .arg(Arg::new("label")
                .short('l')
                .long("label")
                .value_name("NAME")
                .help("Label for each capture, in order (default: file name)")
                .action(ArgAction::Append))
            .arg(chart_dir_arg())
            .arg(limit_arg()))
}

fn chart_dir_arg() -> Arg {
    Arg::new("chart_dir")
        .long("chart-dir")
        .value_name("DIR")
        .help("Directory for the SVG charts")
        .value_parser(value_parser!(PathBuf))
        .default_value("charts")
}

fn limit_arg() -> Arg {
    Arg::new("limit")
        .short('n')
        .long("limit")
        .value_name("N")
        .help("Only read the first N frames of each capture")
        .value_parser(value_parser!(usize))
}

fn dissector_for(matches: &ArgMatches) -> PcapDissector {
    match matches.get_one::<usize>("limit") {
        Some(&limit) => PcapDissector::new().with_limit(limit),
        None => PcapDissector::new(),
    }
}

fn init_logging(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn run_analysis(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let pcap_file = matches
        .get_one::<PathBuf>("pcap")
        .ok_or("a capture file is required")?;
    let bin_width = matches
        .get_one::<f64>("time_window")
        .copied()
        .unwrap_or(DEFAULT_BIN_WIDTH_SECS);
    let max_plots = matches
        .get_one::<usize>("max_plots")
        .copied()
        .unwrap_or(DEFAULT_MAX_CONNECTIONS);
    let config = AnalysisConfig::new(bin_width, max_plots)?;

    println!("Processing pcap file: {}", pcap_file.display());
    let analysis = analyze_pcap_with(&dissector_for(matches), pcap_file, &config)?;

    let format = matches
        .get_one::<String>("format")
        .and_then(|name| ReportFormat::from_name(name))
        .unwrap_or(ReportFormat::Text);
    let output = render(&analysis, format)?;

    if let Some(output_file) = matches.get_one::<PathBuf>("output") {
        std::fs::write(output_file, output)?;
        println!("Report written to {}", output_file.display());
    } else {
        print!("{}", output);
    }

    if !matches.get_flag("no_charts") && !analysis.streams.connections.is_empty() {
        let chart_dir = chart_dir(matches);
        let written = render_all(&chart_dir, &analysis.streams, &ChartOptions::default())?;
        println!("Wrote {} charts to {}", written.len(), chart_dir.display());
    }
    Ok(())
}

fn run_overview(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let dissector = dissector_for(matches);
    let labels: Vec<&String> = matches
        .get_many::<String>("label")
        .map(|labels| labels.collect())
        .unwrap_or_default();

    let mut entries = Vec::new();
    for (i, capture) in matches
        .get_many::<PathBuf>("captures")
        .into_iter()
        .flatten()
        .enumerate()
    {
        let label = labels.get(i).map(|l| l.as_str());
        entries.push(summarize_capture(&dissector, capture, label)?);
    }
    print!("{}", render_overview_table(&entries));

    let chart_dir = chart_dir(matches);
    std::fs::create_dir_all(&chart_dir)?;
    let path = chart_dir.join("overview.svg");
    render_overview_chart(&path, &entries, &ChartOptions::default())?;
    println!("Overview chart written to {}", path.display());
    Ok(())
}

fn chart_dir(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<PathBuf>("chart_dir")
        .cloned()
        .unwrap_or_else(|| Path::new("charts").to_path_buf())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = cli().get_matches();
    init_logging(matches.get_count("verbose"));

    match matches.subcommand() {
        Some(("overview", sub_matches)) => run_overview(sub_matches),
        _ => run_analysis(&matches),
    }
}
