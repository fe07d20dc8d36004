use plotters::prelude::*;
use std::fs;
use std::path::Path;

use crate::config::BidAdjustmentConfig;
use crate::logger::Logger;
use crate::simulation::{DailySimulation, SimulationParams};

const SERIES_COLORS: [RGBColor; 6] = [BLUE, RED, GREEN, MAGENTA, CYAN, BLACK];

/// Draw one line per entity showing its bid after every simulated day
///
/// # Arguments
/// * `path` - PNG file to write, parent directories are created
/// * `title` - Chart caption
/// * `series` - (label, bids) pairs, bids indexed by day
pub fn plot_bid_trajectories(path: &Path, title: &str, series: &[(String, Vec<f64>)]) -> Result<(), Box<dyn std::error::Error>> {
    if series.is_empty() || series.iter().all(|(_, bids)| bids.is_empty()) {
        return Err("No bid trajectories to plot".into());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let days = series.iter().map(|(_, bids)| bids.len()).max().unwrap_or(1).max(2);
    let y_min = series.iter().flat_map(|(_, bids)| bids.iter().copied()).fold(f64::INFINITY, f64::min);
    let y_max = series.iter().flat_map(|(_, bids)| bids.iter().copied()).fold(f64::NEG_INFINITY, f64::max);
    let y_range = if y_max - y_min < 0.1 {
        y_min - 0.5..y_max + 0.5
    } else {
        let padding = (y_max - y_min) * 0.05;
        y_min - padding..y_max + padding
    };

    let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..(days - 1) as f64, y_range)?;

    chart
        .configure_mesh()
        .x_desc("Day")
        .y_desc("Bid")
        .draw()?;

    for (i, (label, bids)) in series.iter().enumerate() {
        let color = SERIES_COLORS[i % SERIES_COLORS.len()];
        chart
            .draw_series(LineSeries::new(
                bids.iter().enumerate().map(|(day, bid)| (day as f64, *bid)),
                &color,
            ))?
            .label(label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Simulate the device and keyword presets for 60 days and chart the bids
pub fn generate_all_charts(logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all("charts")?;
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("invalid start date")?;

    let mut devices = DailySimulation::new(SimulationParams::devices(2), BidAdjustmentConfig::device_modifiers(), start)?;
    let trace = devices.run(60, logger)?;
    let path = Path::new("charts/device_modifiers.png");
    plot_bid_trajectories(path, "Device modifiers over 60 daily passes", &trace.series())?;
    println!("Generated: {}", path.display());

    let mut keywords = DailySimulation::new(SimulationParams::keywords(1, 6), BidAdjustmentConfig::keyword_cpc(), start)?;
    let trace = keywords.run(60, logger)?;
    let path = Path::new("charts/keyword_cpc.png");
    plot_bid_trajectories(path, "Keyword CPC over 60 daily passes", &trace.series())?;
    println!("Generated: {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_series_rejected() {
        let path = std::env::temp_dir().join("bidnudge_empty_chart.png");
        assert!(plot_bid_trajectories(&path, "empty", &[]).is_err());
        assert!(plot_bid_trajectories(&path, "empty", &[("a".to_string(), vec![])]).is_err());
    }
}
