pub mod logging;
pub mod metrics;

// Re-export commonly used items
pub use logging::{init_structured_logging, init_with_service, LogConfig, LogFormat, LoggingGuard};
pub use metrics::encode_metrics;
