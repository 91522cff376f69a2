//! Passive capture of ambient bus traffic

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::deadline::Deadline;
use crate::obd::ModuleAddress;
use crate::transport::CanTransport;

/// What the bus carried during the listen window
///
/// Informational only; nothing downstream depends on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrafficSummary {
    pub frame_count: usize,
    pub extended_frames: usize,
    /// Distinct identifiers in first-seen order
    pub unique_ids: Vec<ModuleAddress>,
    /// How long the listener actually ran
    #[serde(rename = "listened_ms", serialize_with = "serialize_millis")]
    pub listened: Duration,
}

impl TrafficSummary {
    fn record(&mut self, id: u32, extended: bool) {
        self.frame_count += 1;
        if extended {
            self.extended_frames += 1;
        }
        let id = ModuleAddress(id);
        if !self.unique_ids.contains(&id) {
            self.unique_ids.push(id);
        }
    }
}

pub(crate) fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Listens to the bus without transmitting anything
#[derive(Debug, Clone)]
pub struct TrafficListener {
    duration: Duration,
}

impl TrafficListener {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Capture for the configured duration, cut short by `deadline`
    ///
    /// Can be called again on the same transport; every call starts from
    /// an empty summary.
    pub async fn listen(
        &self,
        transport: &mut dyn CanTransport,
        deadline: &Deadline,
    ) -> TrafficSummary {
        let window = Deadline::after(self.duration).earliest(*deadline);
        let mut summary = TrafficSummary::default();

        while !window.is_expired() {
            match transport.receive(window.remaining()).await {
                Ok(Some(frame)) => {
                    debug!(
                        id = format!("0x{:03X}", frame.id()),
                        data = %hex::encode_upper(frame.payload()),
                        "Ambient frame"
                    );
                    summary.record(frame.id(), frame.is_extended());
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Receive failed, ending traffic capture");
                    break;
                }
            }
        }

        summary.listened = window.elapsed();
        info!(
            frames = summary.frame_count,
            unique_ids = summary.unique_ids.len(),
            extended = summary.extended_frames,
            "Traffic capture finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BusSpeed, MockBus};
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn test_counts_frames_and_ids() {
        let mut bus = MockBus::new(BusSpeed::KBPS_500)
            .with_ambient(vec![0x0C9, 0x1E5, 0x0C9, 0x18FEF100], Duration::from_millis(100));
        bus.reconfigure(BusSpeed::KBPS_500).await.unwrap();
        let deadline = Deadline::after(Duration::from_secs(45));

        let summary = TrafficListener::new(Duration::from_millis(1000))
            .listen(&mut bus, &deadline)
            .await;

        assert_eq!(summary.frame_count, 10);
        assert_eq!(summary.extended_frames, 2);
        assert_eq!(
            summary.unique_ids,
            vec![
                ModuleAddress(0x0C9),
                ModuleAddress(0x1E5),
                ModuleAddress(0x18FEF100)
            ]
        );
        assert_eq!(summary.listened, Duration::from_millis(1000));
        assert!(bus.transmitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clamped_to_scan_deadline() {
        let mut bus = MockBus::new(BusSpeed::KBPS_500);
        bus.reconfigure(BusSpeed::KBPS_500).await.unwrap();
        let deadline = Deadline::after(Duration::from_millis(300));

        let summary = TrafficListener::new(Duration::from_secs(5))
            .listen(&mut bus, &deadline)
            .await;

        assert_eq!(summary.frame_count, 0);
        assert_eq!(summary.listened, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restartable() {
        let mut bus = MockBus::new(BusSpeed::KBPS_500)
            .with_ambient(vec![0x100], Duration::from_millis(50));
        bus.reconfigure(BusSpeed::KBPS_500).await.unwrap();
        let deadline = Deadline::after(Duration::from_secs(45));
        let listener = TrafficListener::new(Duration::from_millis(200));

        let first = listener.listen(&mut bus, &deadline).await;
        let second = listener.listen(&mut bus, &deadline).await;
        assert_eq!(first.frame_count, 4);
        assert_eq!(second.frame_count, 4);
    }
}
