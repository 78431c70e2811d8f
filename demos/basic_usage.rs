// pcap-streamrate/demos/basic_usage.rs
use pcap_streamrate::{analyze_pcap, analyze_pcap_to_json, AnalysisConfig};
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: {} <pcap_file> [options]", args[0]);
        println!("Options:");
        println!("  --json-only    Only output JSON");
        println!("  --summary      Show the persistence verdict only");
        return Ok(());
    }

    let pcap_file = &args[1];
    let json_only = args.contains(&"--json-only".to_string());
    let summary_only = args.contains(&"--summary".to_string());

    if json_only {
        println!("{}", analyze_pcap_to_json(pcap_file)?);
        return Ok(());
    }

    let result = analyze_pcap(pcap_file, &AnalysisConfig::default())?;
    println!("=== Capture ===");
    println!("File: {}", result.file_info.filename);
    println!("Frames: {}", result.file_info.total_packets);
    println!("TCP connections: {}", result.streams.persistence.connection_count);
    println!("Verdict: {}", result.streams.persistence.verdict);
    if summary_only {
        return Ok(());
    }

    println!("\n=== Connections ===");
    for connection in &result.streams.connections {
        println!(
            "#{} stream {} | {} packets | {:.2}s | peak {:.0} bps",
            connection.index,
            connection.connection_id,
            connection.packet_count,
            connection.duration,
            connection.series.peak_bps()
        );
    }
    println!(
        "\nCumulative timeline: {} bins over {:.2}s",
        result.streams.timeline.values_bps.len(),
        result.streams.timeline.end_offset
    );

    Ok(())
}
