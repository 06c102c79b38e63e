//! Logging initialization for processes embedding the auth core.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

/// Initialize the global tracing subscriber.
///
/// Verbosity defaults to `ERROR`; `RUST_LOG` directives override it.
///
/// # Errors
///
/// Returns an error if a subscriber was already installed or a directive
/// fails to parse.
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let verbosity_level = verbosity_level.unwrap_or(Level::ERROR);

    let fmt_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?);

    let subscriber = Registry::default().with(fmt_layer).with(filter);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::init;
    use tracing::Level;

    #[test]
    fn second_init_is_rejected() {
        // Another test in the binary may have installed a subscriber already,
        // so only assert when this call won the race.
        if init(Some(Level::WARN)).is_ok() {
            assert!(init(Some(Level::WARN)).is_err());
        }
    }
}
