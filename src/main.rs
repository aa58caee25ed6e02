use mtenc::bench::Benchmark;
use mtenc::config::{BenchmarkConfig, ResultsStorage};
use mtenc::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    println!("Example of running a codec on worker threads.");

    let config = BenchmarkConfig::load()?;
    let summary = match Benchmark::new(config).run().await {
        Ok(summary) => summary,
        Err(err) if err.is_fatal() => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
        Err(err) => return Err(err),
    };

    let entry = summary.summary();
    let saved = ResultsStorage::new().and_then(|storage| {
        storage.append_result(summary)?;
        Ok(storage)
    });
    match saved {
        Ok(storage) => info!(path = %storage.path().display(), "saved {}", entry),
        Err(err) => warn!("results not saved: {}", err),
    }

    Ok(())
}
