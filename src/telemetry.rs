use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Build a JSON-formatting subscriber without installing it.
///
/// `RUST_LOG` wins over `env_filter` when it is set.
pub fn get_subscriber<Sink>(env_filter: &str, sink: Sink) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(sink)
        .json();

    Registry::default().with(env_filter).with(formatting_layer)
}

/// Install structured JSON logging to stdout, level from `RUST_LOG` (default `info`).
///
/// Must be called at most once per process.
pub fn init_telemetry() {
    get_subscriber("info", std::io::stdout).init();
}
