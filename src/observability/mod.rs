pub mod metrics;
pub mod tracing;

pub use self::metrics::install_prometheus;
pub use self::tracing::init_tracing;
