use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Recognition Metrics ====
    pub static ref RECOGNITION_REQUESTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "facegate_recognition_requests_total",
                "Total number of recognition requests",
            ),
            &["status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref RECOGNITION_DURATION: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "facegate_recognition_duration_seconds",
                "End-to-end duration of recognition requests",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref FACES_DETECTED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "facegate_faces_detected_total",
                "Faces detected and encoded, by pipeline stage",
            ),
            &["stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref FACE_EMBEDDING_FAILURES: IntCounter = {
        let metric = IntCounter::new(
            "facegate_embedding_failures_total",
            "Detected faces dropped because no encoding could be computed",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Gallery Metrics ====
    pub static ref GALLERY_BUILD_DURATION: Histogram = {
        let metric = Histogram::with_opts(HistogramOpts::new(
            "facegate_gallery_build_seconds",
            "Duration of gallery rebuilds from the enrollment store",
        ))
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref GALLERY_ENTRIES: IntGauge = {
        let metric = IntGauge::new(
            "facegate_gallery_entries",
            "Number of entries in the most recently built gallery",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref GALLERY_SKIPPED_SOURCES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "facegate_gallery_skipped_sources_total",
                "Enrollment images skipped during gallery builds",
            ),
            &["reason"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Enrollment Metrics ====
    pub static ref ENROLLMENTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("facegate_enrollments_total", "Total number of enrollment uploads"),
            &["status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Auth Metrics ====
    pub static ref AUTH_OPERATIONS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "facegate_auth_operations_total",
                "Total number of authentication operations",
            ),
            &["operation", "status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Register every metric so `/metrics` lists them before first use.
pub fn init_metrics() {
    lazy_static::initialize(&RECOGNITION_REQUESTS);
    lazy_static::initialize(&RECOGNITION_DURATION);
    lazy_static::initialize(&FACES_DETECTED);
    lazy_static::initialize(&FACE_EMBEDDING_FAILURES);
    lazy_static::initialize(&GALLERY_BUILD_DURATION);
    lazy_static::initialize(&GALLERY_ENTRIES);
    lazy_static::initialize(&GALLERY_SKIPPED_SOURCES);
    lazy_static::initialize(&ENROLLMENTS);
    lazy_static::initialize(&AUTH_OPERATIONS);
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognition_metrics_accessible() {
        let before = RECOGNITION_REQUESTS.with_label_values(&["success"]).get();
        RECOGNITION_REQUESTS.with_label_values(&["success"]).inc();
        assert_eq!(
            RECOGNITION_REQUESTS.with_label_values(&["success"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_gallery_metrics_accessible() {
        GALLERY_ENTRIES.set(7);
        assert_eq!(GALLERY_ENTRIES.get(), 7);

        GALLERY_SKIPPED_SOURCES.with_label_values(&["decode"]).inc();
        assert!(GALLERY_SKIPPED_SOURCES.with_label_values(&["decode"]).get() >= 1);
    }

    #[test]
    fn test_encode_metrics_lists_registered_families() {
        // Vec metrics only show up in the exposition once a label set exists.
        init_metrics();
        AUTH_OPERATIONS.with_label_values(&["login", "success"]).inc();
        let encoded = encode_metrics().expect("metrics should encode");
        assert!(encoded.contains("facegate_auth_operations_total"));
        assert!(encoded.contains("facegate_gallery_entries"));
    }
}
