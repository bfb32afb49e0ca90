//! Maps a result batch onto the instrument set.

use tracing::debug;

use crate::constants::*;
use crate::metrics::InstrumentSet;
use crate::report::TestReport;

/// What a single translation recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Translation {
    pub latency_observations: usize,
    pub phase_observations: usize,
    pub error_increments: usize,
}

/// Record every observation carried by `report`. All observations are
/// recorded before this returns, so a push issued afterwards never sees a
/// partial batch.
pub fn translate(report: &TestReport, instruments: &InstrumentSet) -> Translation {
    let mut translation = Translation::default();

    for record in &report.latencies {
        let status_code = record.status_code.as_str();
        let path = record.path.as_str();

        instruments.latency.observe(
            record.latency_seconds(),
            &[(LABEL_PATH, path), (LABEL_STATUS_CODE, status_code)],
        );
        translation.latency_observations += 1;

        if let Some(phases) = &record.timings_by_phase {
            for (phase, nanos) in phases {
                instruments.phase_duration.observe(
                    nanos / NANOS_PER_SECOND,
                    &[(LABEL_PATH, path), (LABEL_STATUS_CODE, status_code), (LABEL_PHASE, phase.as_str())],
                );
                translation.phase_observations += 1;
            }
        }
    }

    for kind in report.errors.values() {
        instruments.client_errors.increment(&[(LABEL_ERROR, kind.as_str())]);
        translation.error_increments += 1;
    }

    debug!(
        latencies = translation.latency_observations,
        phases = translation.phase_observations,
        errors = translation.error_increments,
        "translated report"
    );
    translation
}
