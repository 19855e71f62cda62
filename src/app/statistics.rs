//! End-of-run statistics printing.

use log::info;
use strum::IntoEnumIterator;

use crate::batch::BatchStatusView;
use crate::error_handling::{ErrorType, EventStats, InfoType};

/// Prints the per-event-type counters accumulated during the run.
///
/// Zero counters are skipped so quiet runs stay quiet.
pub fn print_event_statistics(events: &EventStats) {
    if events.total_errors() > 0 {
        info!("Failure events:");
        for error_type in ErrorType::iter() {
            let count = events.get_error_count(error_type);
            if count > 0 {
                info!("  {}: {}", error_type.as_str(), count);
            }
        }
    }
    if events.total_info() > 0 {
        info!("Run events:");
        for info_type in InfoType::iter() {
            let count = events.get_info_count(info_type);
            if count > 0 {
                info!("  {}: {}", info_type.as_str(), count);
            }
        }
    }
}

/// Prints the one-line batch summary shown at the end of a run.
pub fn print_batch_summary(view: &BatchStatusView, elapsed_seconds: f64) {
    let stats = view.stats;
    info!(
        "Batch {} {}: total={}, completed={}, failed={}, pending={} in {:.1}s",
        view.id,
        view.status.as_str(),
        stats.total,
        stats.completed,
        stats.failed,
        stats.pending,
        elapsed_seconds
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_event_statistics_handles_empty_stats() {
        // Nothing to assert beyond "does not panic" on all-zero counters.
        let events = EventStats::new();
        print_event_statistics(&events);
    }
}
