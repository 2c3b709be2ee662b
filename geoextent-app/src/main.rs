use clap::Parser;
use geoextent_app::app::cli::GeoextentCli;

/// truthy values for the GEOEXTENT_DEBUG environment variable.
fn env_debug() -> bool {
    match std::env::var("GEOEXTENT_DEBUG") {
        Ok(value) => matches!(
            value.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "debug"
        ),
        Err(_) => false,
    }
}

#[tokio::main]
async fn main() {
    let cli = GeoextentCli::parse();

    let level = if cli.debug || env_debug() {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(e) = cli.run().await {
        eprintln!("geoextent: {}", e);
        std::process::exit(1);
    }
}
