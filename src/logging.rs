use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "SCANSENSE_LOG";

/// Filter from `SCANSENSE_LOG`, else `fallback` (e.g. `"warn"`).
pub fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Installs the stderr fmt subscriber. Later calls are no-ops.
pub fn init(fallback: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(fallback))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_overrides_fallback() {
        temp_env::with_var(LOG_ENV, Some("scansense=trace"), || {
            assert_eq!(env_filter("warn").to_string(), "scansense=trace");
        });
    }

    #[test]
    #[serial]
    fn invalid_fallback_degrades_to_warn() {
        temp_env::with_var_unset(LOG_ENV, || {
            assert_eq!(env_filter("info").to_string(), "info");
            assert_eq!(env_filter("scansense=loud").to_string(), "warn");
        });
    }
}
