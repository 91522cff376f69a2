//! Simulated vehicle bus for testing and demos
//!
//! `MockBus` plays a vehicle that only talks at one bus speed: periodic
//! ambient frames plus a set of diagnostic modules answering the capability
//! probe and the fault services. Time is taken from `tokio::time`, so tests
//! running on a paused clock complete instantly.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{BusSpeed, CanTransport, Frame, TransportError};
use crate::config::MockConfig;
use crate::obd::{service, DtcCode, BROADCAST_REQUEST_ID, PID_SUPPORTED_01_20, RESPONSE_OFFSET};

/// Codes that fit in a single-frame fault report
const CODES_PER_FRAME: usize = 3;

/// Supported-PID bitmap reported for PID 0x00
const SUPPORTED_PIDS: [u8; 4] = [0xBE, 0x3E, 0xB8, 0x13];

/// A simulated diagnostic module
#[derive(Debug, Clone)]
pub struct MockModule {
    request_id: u32,
    response_id: u32,
    stored: Vec<DtcCode>,
    pending: Vec<DtcCode>,
    ignored_services: Vec<u8>,
}

impl MockModule {
    /// Module answering on `request_id + 8`
    pub fn new(request_id: u32) -> Self {
        Self {
            request_id,
            response_id: request_id + RESPONSE_OFFSET,
            stored: Vec::new(),
            pending: Vec::new(),
            ignored_services: Vec::new(),
        }
    }

    pub fn responding_from(mut self, response_id: u32) -> Self {
        self.response_id = response_id;
        self
    }

    pub fn with_stored(mut self, codes: impl IntoIterator<Item = DtcCode>) -> Self {
        self.stored.extend(codes);
        self
    }

    pub fn with_pending(mut self, codes: impl IntoIterator<Item = DtcCode>) -> Self {
        self.pending.extend(codes);
        self
    }

    /// Stay silent when asked for `service`
    pub fn ignoring(mut self, service: u8) -> Self {
        self.ignored_services.push(service);
        self
    }

    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn response_id(&self) -> u32 {
        self.response_id
    }

    fn respond(&self, request: &Frame) -> Result<Option<Frame>, TransportError> {
        let payload = request.payload();
        let Some(&service_id) = payload.get(1) else {
            return Ok(None);
        };
        if self.ignored_services.contains(&service_id) {
            return Ok(None);
        }

        let positive = service_id.wrapping_add(service::POSITIVE_RESPONSE_OFFSET);
        match service_id {
            service::CURRENT_DATA if payload.get(2) == Some(&PID_SUPPORTED_01_20) => {
                let mut data = [0u8; 8];
                data[..3].copy_from_slice(&[0x06, positive, PID_SUPPORTED_01_20]);
                data[3..7].copy_from_slice(&SUPPORTED_PIDS);
                Frame::new(self.response_id, &data).map(Some)
            }
            service::STORED_DTCS => self.fault_report(positive, &self.stored).map(Some),
            service::PENDING_DTCS => self.fault_report(positive, &self.pending).map(Some),
            _ => Ok(None),
        }
    }

    fn fault_report(&self, positive: u8, codes: &[DtcCode]) -> Result<Frame, TransportError> {
        if codes.len() > CODES_PER_FRAME {
            tracing::debug!(
                module = format!("0x{:03X}", self.response_id),
                total = codes.len(),
                "Mock module reports only the first {} codes",
                CODES_PER_FRAME
            );
        }
        let codes = &codes[..codes.len().min(CODES_PER_FRAME)];

        let mut data = [0u8; 8];
        data[0] = 1 + 2 * codes.len() as u8;
        data[1] = positive;
        for (i, code) in codes.iter().enumerate() {
            data[2 + 2 * i..4 + 2 * i].copy_from_slice(&code.to_bytes());
        }
        Frame::new(self.response_id, &data)
    }
}

/// Simulated vehicle bus
pub struct MockBus {
    vehicle_speed: Option<BusSpeed>,
    speed: Option<BusSpeed>,
    broadcast_id: u32,
    modules: Vec<MockModule>,
    ambient_ids: Vec<u32>,
    ambient_period: Duration,
    ambient_sent: usize,
    next_ambient: Option<Instant>,
    latency: Duration,
    inbox: VecDeque<(Instant, Frame)>,
    failing_speeds: Vec<BusSpeed>,
    transmit_failures: bool,
    transmitted: Vec<Frame>,
    reconfigurations: Vec<BusSpeed>,
}

impl MockBus {
    /// Vehicle talking at `vehicle_speed`, no ambient traffic, no modules
    pub fn new(vehicle_speed: BusSpeed) -> Self {
        Self {
            vehicle_speed: Some(vehicle_speed),
            speed: None,
            broadcast_id: BROADCAST_REQUEST_ID,
            modules: Vec::new(),
            ambient_ids: Vec::new(),
            ambient_period: Duration::from_millis(10),
            ambient_sent: 0,
            next_ambient: None,
            latency: Duration::ZERO,
            inbox: VecDeque::new(),
            failing_speeds: Vec::new(),
            transmit_failures: false,
            transmitted: Vec::new(),
            reconfigurations: Vec::new(),
        }
    }

    /// Bus with nothing connected
    pub fn silent() -> Self {
        Self {
            vehicle_speed: None,
            ..Self::new(BusSpeed::KBPS_500)
        }
    }

    pub fn from_config(config: &MockConfig) -> Result<Self, TransportError> {
        let mut bus = if config.silent {
            Self::silent()
        } else {
            Self::new(config.vehicle_speed)
        };
        bus = bus
            .with_latency(Duration::from_millis(config.latency_ms))
            .with_ambient(
                config.ambient_ids.clone(),
                Duration::from_millis(config.ambient_period_ms.max(1)),
            );

        for module in &config.modules {
            let mut mock = MockModule::new(module.request_id)
                .with_stored(parse_codes(&module.stored)?)
                .with_pending(parse_codes(&module.pending)?);
            if let Some(response_id) = module.response_id {
                mock = mock.responding_from(response_id);
            }
            bus = bus.with_module(mock);
        }
        Ok(bus)
    }

    pub fn with_module(mut self, module: MockModule) -> Self {
        self.modules.push(module);
        self
    }

    /// Periodic frames cycling through `ids`, one every `period`
    pub fn with_ambient(mut self, ids: Vec<u32>, period: Duration) -> Self {
        self.ambient_ids = ids;
        self.ambient_period = period;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make `reconfigure` fail for this speed
    pub fn with_failing_speed(mut self, speed: BusSpeed) -> Self {
        self.failing_speeds.push(speed);
        self
    }

    /// Make every `transmit` fail at the driver level
    pub fn with_transmit_failures(mut self) -> Self {
        self.transmit_failures = true;
        self
    }

    /// Every frame handed to `transmit`, in order
    pub fn transmitted(&self) -> &[Frame] {
        &self.transmitted
    }

    /// Every speed passed to `reconfigure`, in order
    pub fn reconfigurations(&self) -> &[BusSpeed] {
        &self.reconfigurations
    }

    pub fn current_speed(&self) -> Option<BusSpeed> {
        self.speed
    }

    fn on_vehicle_speed(&self) -> bool {
        self.vehicle_speed.is_some() && self.speed == self.vehicle_speed
    }

    fn next_ambient_frame(&mut self, at: Instant) -> Result<Frame, TransportError> {
        let id = self.ambient_ids[self.ambient_sent % self.ambient_ids.len()];
        let counter = self.ambient_sent as u8;
        self.ambient_sent += 1;
        self.next_ambient = Some(at + self.ambient_period);
        Frame::new(id, &[counter, 0x00, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60])
    }
}

fn parse_codes(codes: &[String]) -> Result<Vec<DtcCode>, TransportError> {
    codes
        .iter()
        .map(|code| {
            code.parse::<DtcCode>()
                .map_err(|e| TransportError::InvalidConfig(e.to_string()))
        })
        .collect()
}

#[async_trait]
impl CanTransport for MockBus {
    async fn transmit(&mut self, frame: &Frame, _timeout: Duration) -> Result<(), TransportError> {
        self.transmitted.push(*frame);

        if self.transmit_failures {
            return Err(TransportError::SendFailed("simulated driver fault".to_string()));
        }
        if !self.on_vehicle_speed() {
            return Err(TransportError::SendFailed("frame not acknowledged".to_string()));
        }

        tracing::debug!(%frame, "Mock bus: frame transmitted");

        let ready_at = Instant::now() + self.latency;
        for module in &self.modules {
            if frame.id() != module.request_id && frame.id() != self.broadcast_id {
                continue;
            }
            if let Some(response) = module.respond(frame)? {
                self.inbox.push_back((ready_at, response));
            }
        }
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        let now = Instant::now();
        let limit = now + timeout;

        if !self.on_vehicle_speed() {
            tokio::time::sleep_until(limit).await;
            return Ok(None);
        }

        let response_at = self.inbox.front().map(|(at, _)| *at);
        let ambient_at = self.next_ambient.map(|at| at.max(now));
        let next = match (response_at, ambient_at) {
            (Some(response), Some(ambient)) => Some(response.min(ambient)),
            (response, ambient) => response.or(ambient),
        };

        match next {
            Some(at) if at <= limit => {
                tokio::time::sleep_until(at).await;
                if response_at == Some(at) {
                    Ok(self.inbox.pop_front().map(|(_, frame)| frame))
                } else {
                    self.next_ambient_frame(at).map(Some)
                }
            }
            _ => {
                tokio::time::sleep_until(limit).await;
                Ok(None)
            }
        }
    }

    async fn reconfigure(&mut self, speed: BusSpeed) -> Result<(), TransportError> {
        self.reconfigurations.push(speed);
        if self.failing_speeds.contains(&speed) {
            return Err(TransportError::ReconfigureFailed(format!(
                "simulated driver fault at {}",
                speed
            )));
        }

        self.speed = Some(speed);
        self.inbox.clear();
        self.next_ambient = if self.on_vehicle_speed() && !self.ambient_ids.is_empty() {
            Some(Instant::now() + self.ambient_period)
        } else {
            None
        };
        Ok(())
    }
}
