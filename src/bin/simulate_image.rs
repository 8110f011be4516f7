use std::error::Error;

use sonar_lib::{
    config::SonarConfig,
    helper::decibels_or_else,
    pipeline::{RunContext, SonarImager},
};
use tracing_subscriber::EnvFilter;

// Usage: simulate_image [config.json]
fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SonarConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => SonarConfig::default(),
    };
    let ctx = RunContext::new(config)?;

    let run = SonarImager::new().range_profile_sim(&ctx)?;
    if let Some(r) = run.peak_distance() {
        println!("receiver 0 strongest return at {:.3} m", r);
    }

    let image = SonarImager::new().image_sim(&ctx)?;
    let magnitude = image.magnitude();
    let (azimuths, ranges) = magnitude.dim();
    println!("image {} azimuths x {} ranges", azimuths, ranges);

    if let Some((a, r, peak)) = image.peak() {
        println!(
            "peak at {:.2} m, {:.1} deg",
            image.radial()[r],
            image.azimuth()[a].to_degrees()
        );
        // strongest cell per azimuth, relative to the global peak
        for (a, row) in magnitude.outer_iter().enumerate() {
            let best = row.iter().cloned().fold(0., f64::max);
            let db = decibels_or_else((best / peak).powi(2), -99.);
            println!("{:>7.1} deg {:>7.1} dB", image.azimuth()[a].to_degrees(), db);
        }
    }
    Ok(())
}
