// pcap-streamrate/demos/export_csv.rs
use pcap_streamrate::report::render_csv;
use pcap_streamrate::{analyze_pcap, AnalysisConfig};
use std::env;
use std::fs::File;
use std::io::Write;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        println!("Usage: {} <pcap_file> <output.csv> [bin_width_seconds]", args[0]);
        return Ok(());
    }

    let pcap_file = &args[1];
    let csv_file = &args[2];
    let bin_width = match args.get(3) {
        Some(width) => width.parse::<f64>()?,
        None => pcap_streamrate::DEFAULT_BIN_WIDTH_SECS,
    };
    let config = AnalysisConfig::new(bin_width, pcap_streamrate::DEFAULT_MAX_CONNECTIONS)?;

    let result = analyze_pcap(pcap_file, &config)?;
    let mut file = File::create(csv_file)?;
    file.write_all(render_csv(&result.streams).as_bytes())?;

    println!(
        "Exported {} connections ({} cumulative bins) to {}",
        result.streams.connections.len(),
        result.streams.timeline.values_bps.len(),
        csv_file
    );
    Ok(())
}
