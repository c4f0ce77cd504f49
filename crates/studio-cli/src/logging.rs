//! Tracing subscriber setup from the `logging` config section.

use tracing_subscriber::EnvFilter;

use studio_core::config::LoggingConfig;

/// `RUST_LOG` wins; otherwise `--verbose`, then `logging.level`, then `warn`,
/// plus any `logging.filters` directives.
fn build_filter(logging: &LoggingConfig, verbose: bool) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level = if verbose {
        "debug"
    } else {
        logging.level.as_deref().unwrap_or("warn")
    };
    let mut filter = EnvFilter::new(level);
    for directive in &logging.filters {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

pub fn init(logging: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(build_filter(logging, verbose)?);

    let result = match (logging.format.as_str(), logging.output.as_str()) {
        ("json", "stdout") => builder.json().with_writer(std::io::stdout).try_init(),
        ("json", _) => builder.json().with_writer(std::io::stderr).try_init(),
        (_, "stdout") => builder.with_writer(std::io::stdout).try_init(),
        _ => builder.with_writer(std::io::stderr).try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
