// Read-path routing: datagram preference, CLI fallback, error surfaces
mod support;

use parking_lot::Mutex;
use ponpulse_agent::dispatcher::Dispatcher;
use ponpulse_common::{EquipmentRegistry, OltStatus, OnuRecord, PendingCommand, Vendor};
use serde_json::json;
use std::sync::Arc;
use support::{equipment, onu, MockControlPlane, MockDatagram, MockDeviceState, MockFactory};
use tokio_util::sync::CancellationToken;

fn command(value: serde_json::Value) -> PendingCommand {
    serde_json::from_value(value).expect("command fixture")
}

fn build(
    vendor: Vendor,
    datagram_enabled: bool,
    factory: MockFactory,
) -> (Dispatcher, Arc<MockControlPlane>) {
    let registry = Arc::new(EquipmentRegistry::new());
    registry
        .replace_all(vec![equipment("olt-1", vendor, datagram_enabled)])
        .expect("registry");
    let control = Arc::new(MockControlPlane::default());
    let dispatcher = Dispatcher::new(registry, control.clone(), Arc::new(factory));
    (dispatcher, control)
}

#[tokio::test]
async fn onu_list_prefers_datagram_and_strips_optical_without_detailed() {
    let device = Arc::new(Mutex::new(MockDeviceState::default()));
    let mut record = onu("0/1", 1, "VSOL00000001", "enabled", "online");
    record.rx_power_dbm = Some(-19.2);
    record.temperature_c = Some(41.0);
    let datagram = MockDatagram::with_list_script(vec![vec![record]]);
    let factory = MockFactory::with_datagram(Vendor::Vsol, Arc::clone(&device), datagram);
    let (dispatcher, control) = build(Vendor::Vsol, true, factory);

    let cmd = command(json!({
        "id": "r1",
        "type": "onu_list",
        "equipment_id": "olt-1",
        "payload": {}
    }));
    dispatcher.dispatch(&CancellationToken::new(), &cmd).await;

    let result = control.result_for("r1").unwrap();
    assert!(result.success);
    let payload = result.result.unwrap();
    assert_eq!(payload["count"], json!(1));
    let onus: Vec<OnuRecord> = serde_json::from_value(payload["onus"].clone()).unwrap();
    assert_eq!(onus[0].serial.as_deref(), Some("VSOL00000001"));
    assert_eq!(onus[0].rx_power_dbm, None, "optical stripped without detailed");

    // The CLI session was never opened for a satisfied datagram read.
    assert!(device.lock().op_log.is_empty());
}

#[tokio::test]
async fn onu_list_falls_back_to_cli_when_datagram_setup_fails() {
    let mut state = MockDeviceState::default();
    state.ports = vec![ponpulse_common::PonPortInfo {
        slot: 0,
        port: 1,
        status: Some("online".into()),
        ..Default::default()
    }];
    state
        .onus
        .insert("0/1".into(), vec![onu("0/1", 1, "HUAW00000001", "enabled", "online")]);
    let device = Arc::new(Mutex::new(state));
    // Huawei: no datagram surface at all, reads go straight to the CLI.
    let factory = MockFactory::cli_only(Vendor::Huawei, Arc::clone(&device));
    let (dispatcher, control) = build(Vendor::Huawei, false, factory);

    let cmd = command(json!({
        "id": "r2",
        "type": "onu_list",
        "equipment_id": "olt-1",
        "payload": {"ponPort": "0/1"}
    }));
    dispatcher.dispatch(&CancellationToken::new(), &cmd).await;

    let result = control.result_for("r2").unwrap();
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.result.unwrap()["count"], json!(1));
}

#[tokio::test]
async fn onu_list_with_no_pon_ports_is_empty_success() {
    let device = Arc::new(Mutex::new(MockDeviceState::default()));
    let factory = MockFactory::cli_only(Vendor::Huawei, Arc::clone(&device));
    let (dispatcher, control) = build(Vendor::Huawei, false, factory);

    let cmd = command(json!({
        "id": "r3",
        "type": "onu_list",
        "equipment_id": "olt-1",
        "payload": {}
    }));
    dispatcher.dispatch(&CancellationToken::new(), &cmd).await;

    let result = control.result_for("r3").unwrap();
    assert!(result.success);
    let payload = result.result.unwrap();
    assert_eq!(payload["onus"], json!([]));
    assert_eq!(payload["count"], json!(0));
}

#[tokio::test]
async fn olt_status_falls_back_to_cli_on_datagram_handler_failure() {
    let mut state = MockDeviceState::default();
    state.status = OltStatus {
        cpu_percent: Some(23.0),
        memory_percent: Some(41.0),
        temperature_c: Some(38.0),
        uptime: Some("35 days".into()),
        version: Some("MA5608T V800R018C10".into()),
    };
    let device = Arc::new(Mutex::new(state));
    let datagram = Arc::new(MockDatagram::default());
    *datagram.fail_status.lock() = true;
    let factory = MockFactory::with_datagram(Vendor::Vsol, Arc::clone(&device), datagram);
    let (dispatcher, control) = build(Vendor::Vsol, true, factory);

    let cmd = command(json!({
        "id": "r4",
        "type": "olt_status",
        "equipment_id": "olt-1",
        "payload": {}
    }));
    dispatcher.dispatch(&CancellationToken::new(), &cmd).await;

    let result = control.result_for("r4").unwrap();
    assert!(result.success, "error: {:?}", result.error);
    let payload = result.result.unwrap();
    assert_eq!(payload["status"]["cpu_percent"], json!(23.0));
    assert_eq!(payload["status"]["version"], json!("MA5608T V800R018C10"));
}

#[tokio::test]
async fn missing_equipment_config_is_fatal_for_the_command_only() {
    let device = Arc::new(Mutex::new(MockDeviceState::default()));
    let factory = MockFactory::cli_only(Vendor::Huawei, Arc::clone(&device));
    let (dispatcher, control) = build(Vendor::Huawei, false, factory);

    let unknown = command(json!({
        "id": "r5",
        "type": "olt_status",
        "equipment_id": "olt-unknown",
        "payload": {}
    }));
    let known = command(json!({
        "id": "r6",
        "type": "port_list",
        "equipment_id": "olt-1",
        "payload": {}
    }));
    dispatcher
        .run_batch(&CancellationToken::new(), vec![unknown, known])
        .await;

    let first = control.result_for("r5").unwrap();
    assert!(!first.success);
    assert!(first.error.unwrap().contains("no configuration"));

    // The failure did not suppress the next command in the batch.
    let second = control.result_for("r6").unwrap();
    assert!(second.success);
}

#[tokio::test]
async fn unknown_command_kind_yields_typed_failure() {
    let device = Arc::new(Mutex::new(MockDeviceState::default()));
    let factory = MockFactory::cli_only(Vendor::Vsol, Arc::clone(&device));
    let (dispatcher, control) = build(Vendor::Vsol, false, factory);

    let cmd = command(json!({
        "id": "r7",
        "type": "olt_firmware_upgrade",
        "equipment_id": "olt-1",
        "payload": {}
    }));
    dispatcher.dispatch(&CancellationToken::new(), &cmd).await;

    let result = control.result_for("r7").unwrap();
    assert!(!result.success);
    assert!(result
        .error
        .unwrap()
        .contains("command kind 'olt_firmware_upgrade'"));
}
