//! Acquisition controller.
//!
//! Pulls raw datagrams from a [`SampleSource`] and feeds them to the shared
//! pipeline. One call to `process_loop_iteration` handles at most one
//! datagram, so the caller decides pacing and shutdown.

use anyhow::Result;
use log::{debug, info, warn};

use crate::pipeline::PipelineHandle;
use crate::traits::SampleSource;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

pub struct AcquisitionController<S>
where
    S: SampleSource,
{
    source: S,
    pipeline: PipelineHandle,

    // Loop counters (for status display)
    datagrams_received: u64,
    timeouts: u64,
    last_logged_generation: u64,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl<S> AcquisitionController<S>
where
    S: SampleSource,
{
    pub fn new(source: S, pipeline: PipelineHandle) -> Self {
        AcquisitionController {
            source,
            pipeline,
            datagrams_received: 0,
            timeouts: 0,
            last_logged_generation: 0,
        }
    }

    pub fn setup(&mut self) -> Result<()> {
        self.source.setup()
    }

    pub fn pipeline(&self) -> &PipelineHandle {
        &self.pipeline
    }

    pub fn datagrams_received(&self) -> u64 {
        self.datagrams_received
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    /// Receive at most one datagram and hand it to the pipeline.
    ///
    /// Source errors are returned; malformed datagrams are logged by the
    /// pipeline and are not an error here.
    pub fn process_loop_iteration(&mut self) -> Result<()> {
        let buf = match self.source.receive_batch()? {
            Some(b) => b,
            None => {
                self.timeouts += 1;
                return Ok(());
            }
        };
        self.datagrams_received += 1;

        match self.pipeline.ingest_datagram(&buf) {
            Ok(report) => {
                if let Some(offset) = report.calibrated {
                    info!(
                        "[Acq] Calibration applied: [{:.3}, {:.3}, {:.3}] mm/s",
                        offset[0], offset[1], offset[2]
                    );
                }
            }
            Err(e) => debug!("[Acq] Datagram rejected: {}", e),
        }

        Ok(())
    }

    pub fn log_status(&mut self) {
        let snap = self.pipeline.snapshot();
        let s = snap.stats;

        if snap.generation == self.last_logged_generation {
            warn!(
                "[Status] No new batches (link {:?}, {} timeouts so far)",
                snap.link, self.timeouts
            );
            return;
        }
        self.last_logged_generation = snap.generation;

        let rms = snap.latest_rms.map_or("-".to_string(), |r| format!("{:.3}", r));
        let zone = snap.iso_zone.map_or("-".to_string(), |z| format!("{} ({})", z, z.description()));
        let peak = snap.peak_frequency.map_or("-".to_string(), |f| format!("{:.1}", f));

        info!(
            "[Status] RMS={} mm/s | Zone {} | Peak {} Hz | Link {:?} | Cal {:?} | batches={} samples={} gaps={} missing={} malformed={}",
            rms, zone, peak, snap.link, snap.calibration,
            s.batches_accepted, s.samples_processed, s.sequence_gaps, s.missing_packets, s.malformed_datagrams
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
