use tracing::trace;

// Metrics are emitted as trace events; a subscriber can aggregate them.

pub fn inc_requests(route: &'static str) {
    trace!(
        target: "importer.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target: "importer.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn import_finished(success: bool, imported: usize, images: usize) {
    trace!(
        target: "importer.metrics",
        success = success,
        imported = imported as u64,
        images = images as u64,
        "import_finished"
    );
}
