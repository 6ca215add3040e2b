//! Progress reporting for batch corrections.

use crate::state::Correction;

/// Observer notified while a library corrects its devices.
pub trait ProgressObserver {
    fn started(&mut self, _correction: Correction, _total: usize) {}

    /// Device `index` (0-based) of `total` is corrected.
    fn device_done(&mut self, _correction: Correction, _index: usize, _total: usize, _device: &str) {}

    fn finished(&mut self, _correction: Correction, _total: usize) {}
}

/// Reports progress through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn started(&mut self, correction: Correction, total: usize) {
        tracing::info!("De-embedding {} of {} devices", correction, total);
    }

    fn device_done(&mut self, correction: Correction, index: usize, total: usize, device: &str) {
        tracing::debug!("{} de-embedded {} ({}/{})", correction, device, index + 1, total);
    }

    fn finished(&mut self, correction: Correction, total: usize) {
        tracing::info!("{} de-embedding complete for {} devices", correction, total);
    }
}

/// Discards all progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}
