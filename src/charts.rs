// pcap-streamrate/src/charts.rs
//! SVG charts for visual inspection of the throughput series.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use plotters::prelude::*;

use crate::analysis::{ConnectionAnalysis, StreamAnalysis};
use crate::config::ChartOptions;
use crate::error::{Error, Result};
use crate::overview::OverviewEntry;
use crate::timeline::CumulativeTimeline;

const X_DESC: &str = "Time offset (s)";
const Y_DESC: &str = "Throughput (bps)";

fn chart_error<E: Display>(e: E) -> Error {
    Error::Chart(e.to_string())
}

/// Upper bound for an axis; a flat or empty series still gets a unit range.
fn axis_max(values: impl Iterator<Item = f64>, headroom: f64) -> f64 {
    let max = values.fold(0.0, f64::max);
    if max > 0.0 {
        max * headroom
    } else {
        1.0
    }
}

fn draw_throughput_chart(
    path: &Path,
    title: &str,
    offsets: &[f64],
    values: &[f64],
    options: &ChartOptions,
) -> Result<()> {
    let points: Vec<(f64, f64)> = offsets.iter().copied().zip(values.iter().copied()).collect();

    let root = SVGBackend::new(path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_error)?;

    let x_max = axis_max(points.iter().map(|p| p.0), 1.0);
    let y_max = axis_max(points.iter().map(|p| p.1), 1.1);
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(15)
        .set_label_area_size(LabelAreaPosition::Left, 90)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(0.0..x_max, 0.0..y_max)
        .map_err(chart_error)?;

    chart
        .configure_mesh()
        .axis_desc_style(("sans-serif", 15))
        .x_desc(X_DESC)
        .y_desc(Y_DESC)
        .draw()
        .map_err(chart_error)?;

    chart
        .draw_series(LineSeries::new(points.iter().copied(), &BLUE))
        .map_err(chart_error)?;
    chart
        .draw_series(points.iter().map(|&p| Circle::new(p, 3, BLUE.filled())))
        .map_err(chart_error)?;

    root.present().map_err(chart_error)?;
    Ok(())
}

/// File name for a connection chart; unique per connection so that charts of
/// one run never overwrite each other.
pub fn connection_chart_name(connection: &ConnectionAnalysis) -> String {
    format!(
        "connection-{:02}-stream-{}.svg",
        connection.index, connection.connection_id
    )
}

pub fn render_connection_chart(
    path: &Path,
    connection: &ConnectionAnalysis,
    options: &ChartOptions,
) -> Result<()> {
    let title = format!("Throughput Over Time: Connection {}", connection.index);
    draw_throughput_chart(
        path,
        &title,
        &connection.series.time_offsets,
        &connection.series.values_bps,
        options,
    )
}

pub fn render_timeline_chart(
    path: &Path,
    timeline: &CumulativeTimeline,
    total_connections: usize,
    options: &ChartOptions,
) -> Result<()> {
    let stitched = timeline.segments.len();
    let title = if timeline.is_truncated() {
        format!(
            "Cumulative Throughput (first {} of {} connections)",
            stitched, total_connections
        )
    } else {
        format!("Cumulative Throughput ({} connections)", stitched)
    };
    draw_throughput_chart(
        path,
        &title,
        &timeline.time_offsets,
        &timeline.values_bps,
        options,
    )
}

/// Write one chart per connection plus the cumulative chart into `dir`.
pub fn render_all(dir: &Path, streams: &StreamAnalysis, options: &ChartOptions) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    for connection in &streams.connections {
        let path = dir.join(connection_chart_name(connection));
        render_connection_chart(&path, connection, options)?;
        written.push(path);
    }
    if !streams.connections.is_empty() {
        let path = dir.join("cumulative.svg");
        render_timeline_chart(
            &path,
            &streams.timeline,
            streams.persistence.connection_count,
            options,
        )?;
        written.push(path);
    }

    info!("Wrote {} charts to {}", written.len(), dir.display());
    Ok(written)
}

/// Bars for captured packets (left axis), line for TCP streams (right axis).
pub fn render_overview_chart(path: &Path, entries: &[OverviewEntry], options: &ChartOptions) -> Result<()> {
    let root = SVGBackend::new(path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_error)?;

    let count = entries.len().max(1) as f64;
    let max_packets = axis_max(entries.iter().map(|e| e.total_packets as f64), 1.1);
    let max_streams = axis_max(entries.iter().map(|e| e.tcp_streams as f64), 1.1);
    let labels: Vec<String> = entries.iter().map(|e| e.label.clone()).collect();
    let label_at = |x: &f64| {
        let rounded = x.round();
        if (x - rounded).abs() > 1e-6 || rounded < 0.0 {
            return String::new();
        }
        labels.get(rounded as usize).cloned().unwrap_or_default()
    };

    let mut chart = ChartBuilder::on(&root)
        .caption("Comparison of Video Streaming Captures", ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .right_y_label_area_size(60)
        .build_cartesian_2d(-0.5..(count - 0.5), 0.0..max_packets)
        .map_err(chart_error)?
        .set_secondary_coord(-0.5..(count - 0.5), 0.0..max_streams);

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(entries.len() + 1)
        .x_label_formatter(&label_at)
        .axis_desc_style(("sans-serif", 15))
        .x_desc("Capture")
        .y_desc("Packets captured")
        .draw()
        .map_err(chart_error)?;
    chart
        .configure_secondary_axes()
        .axis_desc_style(("sans-serif", 15))
        .y_desc("TCP streams")
        .draw()
        .map_err(chart_error)?;

    chart
        .draw_series(entries.iter().enumerate().map(|(i, entry)| {
            let x = i as f64;
            Rectangle::new(
                [(x - 0.2, 0.0), (x + 0.2, entry.total_packets as f64)],
                BLUE.filled(),
            )
        }))
        .map_err(chart_error)?
        .label("Packets captured")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], BLUE.filled()));

    let stream_points: Vec<(f64, f64)> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| (i as f64, entry.tcp_streams as f64))
        .collect();
    chart
        .draw_secondary_series(LineSeries::new(stream_points.iter().copied(), &RED))
        .map_err(chart_error)?
        .label("TCP streams")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], &RED));
    chart
        .draw_secondary_series(stream_points.iter().map(|&p| Circle::new(p, 4, RED.filled())))
        .map_err(chart_error)?;

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(chart_error)?;

    root.present().map_err(chart_error)?;
    Ok(())
}
