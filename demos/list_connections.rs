// pcap-streamrate/demos/list_connections.rs
use pcap_streamrate::{group_packets, PcapDissector};
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: {} <pcap_file> [min_packets]", args[0]);
        return Ok(());
    }

    let pcap_file = &args[1];
    let min_packets = match args.get(2) {
        Some(n) => n.parse::<usize>()?,
        None => 0,
    };

    let dissection = PcapDissector::new().dissect_pcap_file(pcap_file)?;
    let group = group_packets(&dissection.records);

    println!(
        "{} TCP packets in {} connections ({} frames skipped)",
        group.total_packets(),
        group.len(),
        group.skipped_records()
    );

    for (connection_id, packets) in group.iter().filter(|(_, p)| p.len() >= min_packets) {
        let first = packets.iter().map(|p| p.timestamp).fold(f64::INFINITY, f64::min);
        let last = packets.iter().map(|p| p.timestamp).fold(f64::NEG_INFINITY, f64::max);
        let bytes: u64 = packets.iter().map(|p| p.byte_length).sum();
        println!(
            "stream {:>4} | {:>7} packets | {:>10} bytes | {:.3}s",
            connection_id,
            packets.len(),
            bytes,
            last - first
        );
    }
    Ok(())
}
