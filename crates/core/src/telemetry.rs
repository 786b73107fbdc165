use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogFormat {
	#[default]
	Plain,
	Json,
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the default `info` filter.
/// Logs go to stderr so stdout stays usable for command output.
pub fn setup_logging(format: LogFormat) -> Result<(), TryInitError> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let registry = tracing_subscriber::registry().with(filter);
	match format {
		LogFormat::Json => registry
			.with(fmt::layer().json().with_writer(std::io::stderr))
			.try_init(),
		LogFormat::Plain => registry
			.with(fmt::layer().with_writer(std::io::stderr))
			.try_init(),
	}
}
