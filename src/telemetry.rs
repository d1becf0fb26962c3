use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies, bumped to
/// `debug` for this crate when `verbose` is requested.
pub fn init_tracing(default_filter: &str, verbose: bool) -> Result<(), anyhow::Error> {
    let fallback = if verbose {
        format!("{default_filter},catalog_migrate=debug,migration=debug,reset=debug,extract=debug,supabase=debug")
    } else {
        default_filter.to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(verbose)
        .with_file(verbose)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
