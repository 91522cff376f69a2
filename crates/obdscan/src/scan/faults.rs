//! Fault code retrieval from discovered modules

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::config::TimingProfile;
use crate::deadline::Deadline;
use crate::error::ScanError;
use crate::obd::{decode_frame_payload, request_frame, service, AddressTable, FaultCode, ModuleAddress};
use crate::transport::CanTransport;

/// Faults collected across every pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultReport {
    /// Decoded codes, stored pass first, modules ascending within a pass
    pub faults: Vec<FaultCode>,
    /// Number of queries transmitted or attempted
    pub queries: usize,
    /// Whether the scan deadline stopped retrieval early, including a
    /// collection window cut short by it
    pub interrupted: bool,
}

/// Queries modules for stored and pending fault codes
#[derive(Debug, Clone)]
pub struct FaultRetriever {
    addressing: AddressTable,
    timing: TimingProfile,
    pending: bool,
}

impl FaultRetriever {
    pub fn new(addressing: AddressTable, timing: TimingProfile) -> Self {
        Self {
            addressing,
            timing,
            pending: false,
        }
    }

    /// Follow the stored pass with a pending pass (service 0x07)
    pub fn with_pending(mut self, enabled: bool) -> Self {
        self.pending = enabled;
        self
    }

    /// Run the stored pass, then the pending pass if enabled
    pub async fn retrieve(
        &self,
        transport: &mut dyn CanTransport,
        modules: &BTreeSet<ModuleAddress>,
        deadline: &Deadline,
    ) -> FaultReport {
        let mut report = FaultReport::default();
        if modules.is_empty() {
            debug!("No modules to query for faults");
            return report;
        }

        let mut passes = vec![(service::STORED_DTCS, false)];
        if self.pending {
            passes.push((service::PENDING_DTCS, true));
        }

        for (service_id, pending) in passes {
            for &module in modules {
                if report.queries > 0 {
                    tokio::time::sleep(deadline.clamp(self.timing.inter_probe_delay())).await;
                }
                if deadline.is_expired() {
                    warn!(
                        module = %module,
                        collected = report.faults.len(),
                        "Scan deadline reached during fault retrieval"
                    );
                    report.interrupted = true;
                    return report;
                }

                report.queries += 1;
                match self.query(transport, module, service_id, deadline).await {
                    Ok(codes) => {
                        info!(module = %module, pending, count = codes.len(), "Fault report received");
                        report.faults.extend(codes);
                    }
                    Err(e @ ScanError::MalformedResponse { .. }) => {
                        debug!(error = %e, "Treating short response as no faults");
                    }
                    Err(ScanError::NoResponseFromModule(_)) if deadline.is_expired() => {
                        warn!(
                            module = %module,
                            collected = report.faults.len(),
                            "Scan deadline cut the fault collection window"
                        );
                        report.interrupted = true;
                        return report;
                    }
                    Err(e) => {
                        warn!(module = %module, pending, error = %e, "No fault report");
                    }
                }
            }
        }

        info!(
            faults = report.faults.len(),
            queries = report.queries,
            "Fault retrieval finished"
        );
        report
    }

    /// Send one fault query and decode the matching reply
    ///
    /// The reply must come from the module's own identifier within the
    /// collection window; anything else on the bus is skipped.
    pub async fn query(
        &self,
        transport: &mut dyn CanTransport,
        module: ModuleAddress,
        service_id: u8,
        deadline: &Deadline,
    ) -> Result<Vec<FaultCode>, ScanError> {
        let request_id = self.addressing.request_for(module);
        let request = request_frame(request_id, service_id, &[])?;
        transport
            .transmit(&request, deadline.clamp(self.timing.transmit_timeout()))
            .await?;

        let window = Deadline::after(self.timing.dtc_collection_window()).earliest(*deadline);
        while !window.is_expired() {
            match transport.receive(window.remaining()).await? {
                Some(frame) if frame.id() == module.id() => {
                    let payload = frame.payload();
                    debug!(
                        module = %module,
                        data = %hex::encode_upper(payload),
                        "Fault response"
                    );
                    if payload.len() <= 2 {
                        return Err(ScanError::MalformedResponse {
                            module,
                            len: payload.len(),
                        });
                    }
                    if payload[1] != service_id.wrapping_add(service::POSITIVE_RESPONSE_OFFSET) {
                        debug!(
                            module = %module,
                            service = format!("0x{:02X}", payload[1]),
                            "Ignoring reply that is not a positive fault report"
                        );
                        continue;
                    }
                    return Ok(decode_frame_payload(
                        payload,
                        module,
                        service_id == service::PENDING_DTCS,
                    ));
                }
                Some(frame) => debug!(%frame, "Ignoring unrelated frame while collecting faults"),
                None => break,
            }
        }

        Err(ScanError::NoResponseFromModule(module))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::obd::DtcCode;
    use crate::transport::{BusSpeed, Frame, MockBus, MockModule, TransportError};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    fn code(s: &str) -> DtcCode {
        s.parse().unwrap()
    }

    fn modules(ids: &[u32]) -> BTreeSet<ModuleAddress> {
        ids.iter().copied().map(ModuleAddress).collect()
    }

    fn retriever() -> FaultRetriever {
        FaultRetriever::new(AddressTable::default(), TimingProfile::conservative())
    }

    async fn vehicle() -> MockBus {
        let mut bus = MockBus::new(BusSpeed::KBPS_500)
            .with_latency(Duration::from_millis(40))
            .with_module(
                MockModule::new(0x7E0)
                    .with_stored([code("P0133"), code("P0171")])
                    .with_pending([code("P0300")]),
            )
            .with_module(MockModule::new(0x7E1).with_stored([code("U0100")]))
            .with_module(MockModule::new(0x7E2).ignoring(service::STORED_DTCS));
        bus.reconfigure(BusSpeed::KBPS_500).await.unwrap();
        bus
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_modules_no_queries() {
        let mut bus = vehicle().await;
        let deadline = Deadline::after(Duration::from_secs(45));

        let report = retriever()
            .with_pending(true)
            .retrieve(&mut bus, &BTreeSet::new(), &deadline)
            .await;

        assert_eq!(report, FaultReport::default());
        assert!(bus.transmitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_pass() {
        let mut bus = vehicle().await;
        let deadline = Deadline::after(Duration::from_secs(45));

        let report = retriever()
            .retrieve(&mut bus, &modules(&[0x7E8, 0x7E9, 0x7EA]), &deadline)
            .await;

        let codes: Vec<String> = report.faults.iter().map(|f| f.to_string()).collect();
        assert_eq!(codes, vec!["P0133", "P0171", "U0100"]);
        assert!(report.faults.iter().all(|f| !f.pending));
        assert_eq!(report.faults[2].module, ModuleAddress(0x7E9));
        assert_eq!(report.queries, 3);
        let sent: Vec<u32> = bus.transmitted().iter().map(|f| f.id()).collect();
        assert_eq!(sent, vec![0x7E0, 0x7E1, 0x7E2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_pass_tags_codes() {
        let mut bus = vehicle().await;
        let deadline = Deadline::after(Duration::from_secs(45));

        let report = retriever()
            .with_pending(true)
            .retrieve(&mut bus, &modules(&[0x7E8]), &deadline)
            .await;

        assert_eq!(report.faults.len(), 3);
        let pending: Vec<String> = report
            .faults
            .iter()
            .filter(|f| f.pending)
            .map(|f| f.to_string())
            .collect();
        assert_eq!(pending, vec!["P0300"]);
        assert_eq!(bus.transmitted()[1].payload()[1], service::PENDING_DTCS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_module_is_not_fatal() {
        let mut bus = vehicle().await;
        let deadline = Deadline::after(Duration::from_secs(45));

        let err = retriever()
            .query(&mut bus, ModuleAddress(0x7EA), service::STORED_DTCS, &deadline)
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::NoResponseFromModule(ModuleAddress(0x7EA)));
        assert_eq!(deadline.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transmit_failure_is_transport_error() {
        let mut bus = vehicle().await.with_transmit_failures();
        let deadline = Deadline::after(Duration::from_secs(45));

        let err = retriever()
            .query(&mut bus, ModuleAddress(0x7E8), service::STORED_DTCS, &deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::TransportUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_retrieval() {
        let mut bus = vehicle().await;
        // First module answers at 40 ms, the second query never starts
        let deadline = Deadline::after(Duration::from_millis(60));

        let report = retriever()
            .retrieve(&mut bus, &modules(&[0x7E8, 0x7E9]), &deadline)
            .await;

        assert!(report.interrupted);
        assert_eq!(report.queries, 1);
        assert_eq!(report.faults.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_inside_last_window_interrupts() {
        let mut bus = vehicle().await;
        // 0x7EA never answers; its 1000 ms window is cut at 500 ms
        let deadline = Deadline::after(Duration::from_millis(500));

        let report = retriever()
            .retrieve(&mut bus, &modules(&[0x7EA]), &deadline)
            .await;

        assert!(report.interrupted);
        assert_eq!(report.queries, 1);
        assert_eq!(deadline.elapsed(), Duration::from_millis(500));
    }

    /// Module answering every fault query with one fixed payload
    struct CannedReplies {
        payload: Vec<u8>,
        reply: Option<Frame>,
    }

    impl CannedReplies {
        fn new(payload: &[u8]) -> Self {
            Self {
                payload: payload.to_vec(),
                reply: None,
            }
        }
    }

    #[async_trait]
    impl CanTransport for CannedReplies {
        async fn transmit(&mut self, _frame: &Frame, _timeout: Duration) -> Result<(), TransportError> {
            self.reply = Some(Frame::standard(0x7E8, &self.payload)?);
            Ok(())
        }

        async fn receive(&mut self, _timeout: Duration) -> Result<Option<Frame>, TransportError> {
            Ok(self.reply.take())
        }

        async fn reconfigure(&mut self, _speed: BusSpeed) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_payload_is_malformed() {
        let mut bus = CannedReplies::new(&[0x01, 0x43]);
        let deadline = Deadline::after(Duration::from_secs(45));
        let retriever = retriever();

        let err = retriever
            .query(&mut bus, ModuleAddress(0x7E8), service::STORED_DTCS, &deadline)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ScanError::MalformedResponse {
                module: ModuleAddress(0x7E8),
                len: 2
            }
        );

        let report = retriever
            .retrieve(&mut bus, &modules(&[0x7E8]), &deadline)
            .await;
        assert!(report.faults.is_empty());
        assert!(!report.interrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_response_yields_no_codes() {
        // 7F 03 12: service 0x03 rejected, must not decode as P0312
        let mut bus = CannedReplies::new(&[0x03, 0x7F, 0x03, 0x12, 0x00, 0x00, 0x00, 0x00]);
        let deadline = Deadline::after(Duration::from_secs(45));
        let retriever = retriever();

        let err = retriever
            .query(&mut bus, ModuleAddress(0x7E8), service::STORED_DTCS, &deadline)
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::NoResponseFromModule(ModuleAddress(0x7E8)));

        let report = retriever
            .retrieve(&mut bus, &modules(&[0x7E8]), &deadline)
            .await;
        assert!(report.faults.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_for_other_service_is_ignored() {
        let mut bus = CannedReplies::new(&[0x06, 0x47, 0x01, 0x33, 0x00, 0x00, 0x00, 0x00]);
        let deadline = Deadline::after(Duration::from_secs(45));

        let err = retriever()
            .query(&mut bus, ModuleAddress(0x7E8), service::STORED_DTCS, &deadline)
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::NoResponseFromModule(ModuleAddress(0x7E8)));
    }
}
