use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the stderr subscriber. `RUST_LOG` wins over `-v`.
pub fn init_logging(verbose: u8) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

	let _ = tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_writer(std::io::stderr).with_target(true))
		.try_init();
}

fn default_directive(verbose: u8) -> &'static str {
	match verbose {
		0 => "warn",
		1 => "info",
		_ => "debug",
	}
}
