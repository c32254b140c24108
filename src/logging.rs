use anyhow::Context as _;

/// Default filter when `RUST_LOG` is unset; the HTML parser and TLS stack are noisy at `info`.
const DEFAULT_DIRECTIVES: &str = "info,html5ever=error,rustls=warn,hyper_util=warn";

pub fn init() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_DIRECTIVES))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
