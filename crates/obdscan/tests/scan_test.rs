//! Full-scan tests against the simulated vehicle bus
//!
//! Every test runs on a paused tokio clock, so multi-second scans finish
//! instantly and timings are exact.

use std::collections::BTreeSet;
use std::time::Duration;

use obdscan::obd::service;
use obdscan::transport::{MockBus, MockModule};
use obdscan::{
    create_transport, decode_dtc_pairs, decode_frame_payload, BusSpeed, DtcCode, ModuleAddress,
    NoProgress, ScanConfig, ScanState, Scanner, TimingProfile,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn code(s: &str) -> DtcCode {
    s.parse().unwrap()
}

fn modules(ids: &[u32]) -> BTreeSet<ModuleAddress> {
    ids.iter().copied().map(ModuleAddress).collect()
}

fn codes(result: &obdscan::ScanResult) -> Vec<String> {
    result.fault_codes.iter().map(|f| f.to_string()).collect()
}

/// Ids of every frame sent with the given service byte
fn sent_with_service(bus: &MockBus, service_id: u8) -> Vec<u32> {
    bus.transmitted()
        .iter()
        .filter(|f| f.payload().get(1) == Some(&service_id))
        .map(|f| f.id())
        .collect()
}

fn vehicle() -> MockBus {
    MockBus::new(BusSpeed::KBPS_500)
        .with_latency(Duration::from_millis(15))
        .with_ambient(vec![0x0C9, 0x1E5, 0x3E9], Duration::from_millis(10))
        .with_module(
            MockModule::new(0x7E0)
                .with_stored([code("P0133"), code("P0171")])
                .with_pending([code("P0300")]),
        )
        .with_module(MockModule::new(0x7E1).with_stored([code("U0100")]))
        .with_module(MockModule::new(0x7E2))
}

fn config_with_timeout(ms: u64) -> ScanConfig {
    ScanConfig {
        scan_timeout_ms: ms,
        ..ScanConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_scan() {
    let mut bus = vehicle();

    let result = Scanner::with_defaults().scan(&mut bus, &NoProgress).await;

    assert_eq!(result.final_state, ScanState::Complete);
    assert!(result.vehicle_detected);
    assert_eq!(result.bus_speed, Some(BusSpeed::KBPS_500));
    assert_eq!(result.active_modules, modules(&[0x7E8, 0x7E9, 0x7EA]));
    assert_eq!(codes(&result), vec!["P0133", "P0171", "U0100", "P0300"]);
    assert_eq!(
        result.pending_faults().map(|f| f.to_string()).collect::<Vec<_>>(),
        vec!["P0300"]
    );
    assert_eq!(result.stored_faults().count(), 3);

    let traffic = result.traffic.as_ref().unwrap();
    assert!(traffic.frame_count > 0);
    assert_eq!(traffic.unique_ids.len(), 3);
    assert!(result.elapsed < Duration::from_secs(45));
}

#[tokio::test(start_paused = true)]
async fn test_detection_stops_at_first_active_candidate() {
    let mut bus = vehicle();

    let result = Scanner::with_defaults().scan(&mut bus, &NoProgress).await;

    assert_eq!(result.bus_speed, Some(BusSpeed::KBPS_500));
    assert_eq!(bus.reconfigurations(), &[BusSpeed::KBPS_500]);
}

#[tokio::test(start_paused = true)]
async fn test_vehicle_at_lower_priority_speed() {
    let mut bus = MockBus::new(BusSpeed::MBPS_1)
        .with_ambient(vec![0x100], Duration::from_millis(20))
        .with_module(MockModule::new(0x7E0));

    let result = Scanner::with_defaults().scan(&mut bus, &NoProgress).await;

    assert_eq!(result.bus_speed, Some(BusSpeed::MBPS_1));
    assert_eq!(bus.reconfigurations().len(), 4);
    assert_eq!(result.active_modules, modules(&[0x7E8]));
}

#[tokio::test(start_paused = true)]
async fn test_silent_bus() {
    let mut bus = MockBus::silent();

    let result = Scanner::with_defaults().scan(&mut bus, &NoProgress).await;

    assert_eq!(result.final_state, ScanState::Complete);
    assert!(!result.vehicle_detected);
    assert_eq!(result.bus_speed, None);
    assert!(result.active_modules.is_empty());
    assert!(result.fault_codes.is_empty());
    assert!(result.traffic.is_none());
    assert!(bus.transmitted().is_empty());
}

#[rstest]
#[case(20)]
#[case(500)]
#[case(3_000)]
#[case(7_000)]
#[case(12_000)]
#[case(16_300)]
#[tokio::test(start_paused = true)]
async fn test_elapsed_time_bounded_by_deadline(#[case] timeout_ms: u64) {
    let mut bus = vehicle();
    let profile = TimingProfile::conservative();
    let scanner = Scanner::new(&config_with_timeout(timeout_ms), profile.clone());

    let result = scanner.scan(&mut bus, &NoProgress).await;

    let budget = Duration::from_millis(timeout_ms);
    assert!(result.elapsed <= budget + profile.dtc_collection_window());
    assert_eq!(result.final_state, ScanState::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_keeps_vehicle_detected() {
    let mut bus = vehicle();
    let scanner = Scanner::new(&config_with_timeout(500), TimingProfile::conservative());

    let result = scanner.scan(&mut bus, &NoProgress).await;

    assert_eq!(result.final_state, ScanState::TimedOut);
    assert!(result.vehicle_detected);
    assert_eq!(result.bus_speed, Some(BusSpeed::KBPS_500));
    assert!(result.active_modules.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_during_fault_retrieval_keeps_partial_faults() {
    // Detection ends at 30 ms, traffic capture at 5.03 s, the sweep at
    // 16.275 s; the first fault report arrives at 16.29 s.
    let mut bus = vehicle();
    let scanner = Scanner::new(&config_with_timeout(16_300), TimingProfile::conservative());

    let result = scanner.scan(&mut bus, &NoProgress).await;

    assert_eq!(result.final_state, ScanState::TimedOut);
    assert_eq!(result.active_modules, modules(&[0x7E8, 0x7E9, 0x7EA]));
    assert_eq!(codes(&result), vec!["P0133", "P0171"]);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_inside_final_fault_window_is_timeout() {
    // One answering module: the sweep ends at 17.845 s, so the only fault
    // query gets a window cut from 1000 ms to 155 ms by the 18 s budget.
    let mut bus = MockBus::new(BusSpeed::KBPS_500)
        .with_latency(Duration::from_millis(15))
        .with_ambient(vec![0x0C9, 0x1E5, 0x3E9], Duration::from_millis(10))
        .with_module(MockModule::new(0x7E0).ignoring(service::STORED_DTCS));
    let config = ScanConfig {
        pending_faults: false,
        ..config_with_timeout(18_000)
    };
    let scanner = Scanner::new(&config, TimingProfile::conservative());

    let result = scanner.scan(&mut bus, &NoProgress).await;

    assert_eq!(result.final_state, ScanState::TimedOut);
    assert_eq!(result.active_modules, modules(&[0x7E8]));
    assert_eq!(sent_with_service(&bus, service::STORED_DTCS), vec![0x7E0]);
    assert_eq!(result.elapsed, Duration::from_millis(18_000));
}

#[tokio::test(start_paused = true)]
async fn test_probes_cover_range_in_ascending_order() {
    let mut bus = vehicle();

    Scanner::with_defaults().scan(&mut bus, &NoProgress).await;

    let probes = sent_with_service(&bus, service::CURRENT_DATA);
    assert_eq!(probes, (0x7E0..=0x7EF).collect::<Vec<u32>>());
}

#[tokio::test(start_paused = true)]
async fn test_truncated_sweep_is_a_prefix() {
    let mut bus = vehicle();
    let scanner = Scanner::new(&config_with_timeout(9_000), TimingProfile::conservative());

    let result = scanner.scan(&mut bus, &NoProgress).await;

    let probes = sent_with_service(&bus, service::CURRENT_DATA);
    assert!(!probes.is_empty() && probes.len() < 16);
    let expected: Vec<u32> = (0x7E0..0x7E0 + probes.len() as u32).collect();
    assert_eq!(probes, expected);
    assert_eq!(result.final_state, ScanState::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn test_no_modules_means_no_fault_queries() {
    let mut bus = MockBus::new(BusSpeed::KBPS_500)
        .with_ambient(vec![0x0C9], Duration::from_millis(10));

    let result = Scanner::with_defaults().scan(&mut bus, &NoProgress).await;

    assert_eq!(result.final_state, ScanState::Complete);
    assert!(result.vehicle_detected);
    assert!(result.active_modules.is_empty());
    assert!(result.fault_codes.is_empty());
    assert!(sent_with_service(&bus, service::STORED_DTCS).is_empty());
    assert!(sent_with_service(&bus, service::PENDING_DTCS).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pending_pass_can_be_disabled() {
    let mut bus = vehicle();
    let config = ScanConfig {
        pending_faults: false,
        ..ScanConfig::default()
    };

    let result = Scanner::new(&config, TimingProfile::conservative())
        .scan(&mut bus, &NoProgress)
        .await;

    assert_eq!(codes(&result), vec!["P0133", "P0171", "U0100"]);
    assert!(sent_with_service(&bus, service::PENDING_DTCS).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_discovery() {
    let mut bus = vehicle();
    let config = ScanConfig {
        broadcast_discovery: true,
        ..ScanConfig::default()
    };

    let result = Scanner::new(&config, TimingProfile::conservative())
        .scan(&mut bus, &NoProgress)
        .await;

    assert_eq!(result.active_modules, modules(&[0x7E8, 0x7E9, 0x7EA]));
    assert_eq!(sent_with_service(&bus, service::CURRENT_DATA), vec![0x7DF]);
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_without_replies_falls_back_to_sweep() {
    let mut bus = MockBus::new(BusSpeed::KBPS_500)
        .with_ambient(vec![0x0C9], Duration::from_millis(10))
        .with_module(MockModule::new(0x7E1).ignoring(service::CURRENT_DATA));
    let config = ScanConfig {
        broadcast_discovery: true,
        ..ScanConfig::default()
    };

    let result = Scanner::new(&config, TimingProfile::conservative())
        .scan(&mut bus, &NoProgress)
        .await;

    let probes = sent_with_service(&bus, service::CURRENT_DATA);
    assert_eq!(probes[0], 0x7DF);
    assert_eq!(&probes[1..], (0x7E0..=0x7EF).collect::<Vec<u32>>().as_slice());
    assert!(result.active_modules.is_empty());
    assert_eq!(result.final_state, ScanState::Complete);
}

#[tokio::test(start_paused = true)]
async fn test_driver_faults_are_not_fatal() {
    let mut bus = vehicle()
        .with_failing_speed(BusSpeed::KBPS_500)
        .with_transmit_failures();

    let result = Scanner::with_defaults().scan(&mut bus, &NoProgress).await;

    // 500k cannot be selected, so the vehicle is never heard
    assert!(!result.vehicle_detected);
    assert_eq!(result.final_state, ScanState::Complete);

    let mut bus = MockBus::new(BusSpeed::KBPS_250)
        .with_ambient(vec![0x0C9], Duration::from_millis(10))
        .with_module(MockModule::new(0x7E0))
        .with_transmit_failures();

    let result = Scanner::with_defaults().scan(&mut bus, &NoProgress).await;

    assert_eq!(result.bus_speed, Some(BusSpeed::KBPS_250));
    assert!(result.active_modules.is_empty());
    assert_eq!(result.final_state, ScanState::Complete);
}

#[tokio::test(start_paused = true)]
async fn test_each_scan_builds_a_fresh_result() {
    let scanner = Scanner::with_defaults();

    let mut bus = vehicle();
    let first = scanner.scan(&mut bus, &NoProgress).await;
    let mut silent = MockBus::silent();
    let second = scanner.scan(&mut silent, &NoProgress).await;

    assert!(first.vehicle_detected);
    assert!(!second.vehicle_detected);
    assert!(second.fault_codes.is_empty());
    assert!(second.active_modules.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scan_from_toml_configuration() {
    let config = ScanConfig::from_toml_str(
        r#"
        profile = "fast"
        pending_faults = false

        [transport]
        type = "mock"
        vehicle_speed = 250000
        ambient_ids = [0x0C9]

        [[transport.modules]]
        request_id = 0x7E4
        stored = ["C0420", "B1234"]
        "#,
    )
    .unwrap();

    let mut transport = create_transport(&config.transport).await.unwrap();
    let scanner = Scanner::new(&config, config.selected_profile().unwrap());
    let result = scanner.scan(transport.as_mut(), &NoProgress).await;

    assert_eq!(result.bus_speed, Some(BusSpeed::KBPS_250));
    assert_eq!(result.active_modules, modules(&[0x7EC]));
    assert_eq!(codes(&result), vec!["C0420", "B1234"]);
    assert!(result.fault_codes.iter().all(|f| f.system() == "ECU 0x7EC"));
}

#[test]
fn test_decoder_is_pure() {
    let payload = [0x07, 0x43, 0x01, 0x33, 0x00, 0x00, 0xC1, 0x00];
    let module = ModuleAddress(0x7E8);

    let first = decode_frame_payload(&payload, module, false);
    let second = decode_frame_payload(&payload, module, false);
    assert_eq!(first, second);

    let rendered: Vec<String> = first.iter().map(|f| f.to_string()).collect();
    assert_eq!(rendered, vec!["P0133", "U0100"]);
}

#[test]
fn test_single_pair_with_padding_decodes_to_one_code() {
    let faults = decode_dtc_pairs(&[0x01, 0x33, 0x00, 0x00], ModuleAddress(0x7E8), false);
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].to_string(), "P0133");
}
