use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default directive when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Install the JSON stdout subscriber used by every sesame binary.
///
/// Event fields are flattened into the top-level object so log pipelines can index
/// `account_id`, `otp_id` and friends directly. A second call is a no-op.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true).with_current_span(false))
        .try_init();
}
