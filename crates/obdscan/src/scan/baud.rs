//! Bus speed auto-detection
//!
//! Candidates are tried in priority order. The first speed at which enough
//! frames show up within the listen window wins and the transport is left
//! configured for it.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::deadline::Deadline;
use crate::error::ScanError;
use crate::transport::{BusSpeed, CanTransport};

/// Finds the speed a silent-until-configured bus is running at
#[derive(Debug, Clone)]
pub struct BaudRateDetector {
    candidates: Vec<BusSpeed>,
    window: Duration,
    min_frames: usize,
}

impl BaudRateDetector {
    pub fn new(candidates: Vec<BusSpeed>, window: Duration, min_frames: usize) -> Self {
        Self {
            candidates,
            window,
            min_frames: min_frames.max(1),
        }
    }

    pub fn candidates(&self) -> &[BusSpeed] {
        &self.candidates
    }

    /// Try every candidate until one shows traffic
    ///
    /// The scan deadline is checked before each candidate. A candidate the
    /// transport cannot switch to is skipped.
    pub async fn detect(
        &self,
        transport: &mut dyn CanTransport,
        deadline: &Deadline,
    ) -> Result<BusSpeed, ScanError> {
        for &speed in &self.candidates {
            if deadline.is_expired() {
                warn!(%speed, "Scan deadline reached during bus speed detection");
                return Err(ScanError::ScanDeadlineExceeded);
            }

            if let Err(e) = transport.reconfigure(speed).await {
                warn!(%speed, error = %e, "Cannot switch to candidate speed, skipping");
                continue;
            }

            let window = Deadline::after(self.window).earliest(*deadline);
            let frames = self.count_frames(transport, &window).await;
            if frames >= self.min_frames {
                info!(%speed, frames, "Bus activity detected");
                return Ok(speed);
            }
            debug!(%speed, frames, "Not enough traffic at candidate speed");
        }

        if deadline.is_expired() {
            Err(ScanError::ScanDeadlineExceeded)
        } else {
            Err(ScanError::NoActivityDetected)
        }
    }

    /// Count frames until the threshold is reached or the window closes
    async fn count_frames(&self, transport: &mut dyn CanTransport, window: &Deadline) -> usize {
        let mut frames = 0;
        while frames < self.min_frames && !window.is_expired() {
            match transport.receive(window.remaining()).await {
                Ok(Some(frame)) => {
                    frames += 1;
                    debug!(%frame, frames, "Frame during speed detection");
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Receive failed, abandoning candidate");
                    break;
                }
            }
        }
        frames
    }
}
