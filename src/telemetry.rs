use tracing_subscriber::EnvFilter;

/// Install the JSON log subscriber used by both binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}

/// Register descriptions for every metric the pipeline emits.
pub fn describe_metrics() {
    metrics::describe_counter!("intake_jobs_enqueued_total", "Processing jobs enqueued");
    metrics::describe_counter!("intake_jobs_claimed_total", "Processing jobs claimed by a worker");
    metrics::describe_counter!(
        "intake_jobs_completed_total",
        "Jobs that reached Done, labelled by target verdict"
    );
    metrics::describe_counter!(
        "intake_jobs_failed_total",
        "Jobs that reached Failed, labelled by failing stage"
    );
    metrics::describe_histogram!(
        "intake_job_processing_seconds",
        metrics::Unit::Seconds,
        "Time to process one job"
    );
    metrics::describe_gauge!("intake_jobs_in_flight", "Handlers currently running");
    metrics::describe_counter!("intake_resolutions_total", "Admin resolutions, labelled by action");
    metrics::describe_gauge!("intake_queue_depth", "Pending jobs at last health check");
}
