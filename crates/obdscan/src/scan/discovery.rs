//! Diagnostic module discovery
//!
//! Each probe address gets a service 0x01 / PID 0x00 query, one at a time.
//! Probes are never overlapped: on a shared bus a reply could not be tied
//! to its request otherwise.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::TimingProfile;
use crate::deadline::Deadline;
use crate::obd::{capability_probe, AddressTable, ModuleAddress};
use crate::progress::ProgressSink;
use crate::transport::CanTransport;

/// Progress span covered by the sweep
const SWEEP_PROGRESS_START: u8 = 50;
const SWEEP_PROGRESS_SPAN: usize = 25;

/// Outcome of a discovery run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Response identifiers of every module that answered
    pub modules: BTreeSet<ModuleAddress>,
    /// Probe addresses transmitted, in order
    pub probed: Vec<u32>,
    /// Whether the deadline cut the sweep short
    pub truncated: bool,
}

/// Probes the diagnostic address space for modules
#[derive(Debug, Clone)]
pub struct ModuleDiscovery {
    addressing: AddressTable,
    timing: TimingProfile,
    budget: Duration,
    broadcast_first: bool,
}

impl ModuleDiscovery {
    pub fn new(addressing: AddressTable, timing: TimingProfile, budget: Duration) -> Self {
        Self {
            addressing,
            timing,
            budget,
            broadcast_first: false,
        }
    }

    /// Start with one functional broadcast, sweeping only if nobody answers
    pub fn with_broadcast_first(mut self, enabled: bool) -> Self {
        self.broadcast_first = enabled;
        self
    }

    /// Run discovery under the discovery budget and the scan deadline
    ///
    /// The sweep reports one progress update per probe, between 50 and 75
    /// percent.
    pub async fn discover(
        &self,
        transport: &mut dyn CanTransport,
        scan_deadline: &Deadline,
        progress: &dyn ProgressSink,
    ) -> Discovery {
        let deadline = Deadline::after(self.budget).earliest(*scan_deadline);

        if self.broadcast_first {
            let modules = self.broadcast(transport, &deadline).await;
            if !modules.is_empty() {
                info!(count = modules.len(), "Modules answered the broadcast query");
                return Discovery {
                    modules,
                    probed: vec![self.addressing.broadcast_id],
                    truncated: false,
                };
            }
            info!("No replies to the broadcast query, falling back to the address sweep");
        }

        self.sweep(transport, &deadline, progress).await
    }

    /// Probe every address in ascending order
    pub async fn sweep(
        &self,
        transport: &mut dyn CanTransport,
        deadline: &Deadline,
        progress: &dyn ProgressSink,
    ) -> Discovery {
        let mut discovery = Discovery::default();
        let addresses = self.addressing.sweep_order();
        let total = addresses.len();

        for (index, address) in addresses.into_iter().enumerate() {
            if deadline.is_expired() {
                warn!(
                    next = format!("0x{:03X}", address),
                    found = discovery.modules.len(),
                    "Discovery deadline reached, stopping sweep"
                );
                discovery.truncated = true;
                break;
            }

            progress.on_progress(
                &format!("Checking module {}/{}", index + 1, total),
                sweep_percent(index, total),
            );
            discovery.probed.push(address);
            if let Some(module) = self.probe(transport, address, deadline).await {
                info!(
                    address = format!("0x{:03X}", address),
                    module = %module,
                    "Module responded"
                );
                discovery.modules.insert(module);
            }

            tokio::time::sleep(deadline.clamp(self.timing.inter_probe_delay())).await;
        }

        info!(
            found = discovery.modules.len(),
            probed = discovery.probed.len(),
            "Address sweep finished"
        );
        discovery
    }

    async fn probe(
        &self,
        transport: &mut dyn CanTransport,
        address: u32,
        deadline: &Deadline,
    ) -> Option<ModuleAddress> {
        let request = match capability_probe(address) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(address = format!("0x{:03X}", address), error = %e, "Cannot build probe");
                return None;
            }
        };

        if let Err(e) = transport
            .transmit(&request, deadline.clamp(self.timing.transmit_timeout()))
            .await
        {
            warn!(address = format!("0x{:03X}", address), error = %e, "Probe not sent, skipping address");
            return None;
        }

        let window = Deadline::after(self.timing.module_response_timeout()).earliest(*deadline);
        while !window.is_expired() {
            match transport.receive(window.remaining()).await {
                Ok(Some(frame)) if self.addressing.accepts_response(address, frame.id()) => {
                    return Some(ModuleAddress(frame.id()));
                }
                Ok(Some(frame)) => {
                    debug!(%frame, "Ignoring unrelated frame while probing");
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(address = format!("0x{:03X}", address), error = %e, "Receive failed while probing");
                    break;
                }
            }
        }

        debug!(address = format!("0x{:03X}", address), "No response");
        None
    }

    /// Single functional query; every response-band frame in the window counts
    async fn broadcast(
        &self,
        transport: &mut dyn CanTransport,
        deadline: &Deadline,
    ) -> BTreeSet<ModuleAddress> {
        let mut modules = BTreeSet::new();
        let broadcast_id = self.addressing.broadcast_id;

        let sent = match capability_probe(broadcast_id) {
            Ok(request) => transport
                .transmit(&request, deadline.clamp(self.timing.transmit_timeout()))
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = sent {
            warn!(error = %e, "Broadcast query not sent");
            return modules;
        }

        let window = Deadline::after(self.timing.module_response_timeout()).earliest(*deadline);
        while !window.is_expired() {
            match transport.receive(window.remaining()).await {
                Ok(Some(frame)) if self.addressing.is_response_id(frame.id()) => {
                    debug!(%frame, "Broadcast reply");
                    modules.insert(ModuleAddress(frame.id()));
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Receive failed during broadcast discovery");
                    break;
                }
            }
        }

        tokio::time::sleep(deadline.clamp(self.timing.inter_probe_delay())).await;
        modules
    }
}

fn sweep_percent(index: usize, total: usize) -> u8 {
    let step = index * SWEEP_PROGRESS_SPAN / total.max(1);
    SWEEP_PROGRESS_START + step.min(SWEEP_PROGRESS_SPAN) as u8
}
