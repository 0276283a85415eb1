// VLAN, service-port, and PON-port command flows
mod support;

use parking_lot::Mutex;
use ponpulse_agent::dispatcher::Dispatcher;
use ponpulse_common::{EquipmentRegistry, PendingCommand, PonPortInfo, Vendor, VlanRecord};
use serde_json::json;
use std::sync::Arc;
use support::{equipment, MockControlPlane, MockDeviceState, MockFactory};
use tokio_util::sync::CancellationToken;

fn command(value: serde_json::Value) -> PendingCommand {
    serde_json::from_value(value).expect("command fixture")
}

fn build(state: MockDeviceState) -> (Dispatcher, Arc<MockControlPlane>, Arc<Mutex<MockDeviceState>>) {
    let device = Arc::new(Mutex::new(state));
    let registry = Arc::new(EquipmentRegistry::new());
    registry
        .replace_all(vec![equipment("olt-1", Vendor::Huawei, false)])
        .expect("registry");
    let control = Arc::new(MockControlPlane::default());
    let factory = MockFactory::cli_only(Vendor::Huawei, Arc::clone(&device));
    let dispatcher = Dispatcher::new(registry, control.clone(), Arc::new(factory));
    (dispatcher, control, device)
}

#[tokio::test]
async fn vlan_create_and_delete_verify_against_the_table() {
    let (dispatcher, control, _device) = build(MockDeviceState::default());
    let cancel = CancellationToken::new();

    dispatcher
        .dispatch(
            &cancel,
            &command(json!({
                "id": "v1",
                "type": "vlan_create",
                "equipment_id": "olt-1",
                "payload": {"vlanId": 100, "name": "cust-vlan"}
            })),
        )
        .await;
    let created = control.result_for("v1").unwrap();
    assert!(created.success, "error: {:?}", created.error);
    let payload = created.result.unwrap();
    assert_eq!(payload["preState"]["present"], json!(false));
    assert_eq!(payload["postState"]["present"], json!(true));
    assert_eq!(payload["verified"], json!(true));

    dispatcher
        .dispatch(
            &cancel,
            &command(json!({
                "id": "v2",
                "type": "vlan_delete",
                "equipment_id": "olt-1",
                "payload": {"vlanId": 100}
            })),
        )
        .await;
    let deleted = control.result_for("v2").unwrap();
    assert!(deleted.success, "error: {:?}", deleted.error);
    let payload = deleted.result.unwrap();
    assert_eq!(payload["preState"]["present"], json!(true));
    assert_eq!(payload["postState"]["present"], json!(false));
}

#[tokio::test]
async fn vlan_delete_missing_without_force_fails() {
    let (dispatcher, control, _device) = build(MockDeviceState::default());
    dispatcher
        .dispatch(
            &CancellationToken::new(),
            &command(json!({
                "id": "v3",
                "type": "vlan_delete",
                "equipment_id": "olt-1",
                "payload": {"vlanId": 999}
            })),
        )
        .await;
    let result = control.result_for("v3").unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("not found"));
}

#[tokio::test]
async fn service_port_add_defaults_gem_port_and_verifies() {
    let mut state = MockDeviceState::default();
    state.vlans = vec![VlanRecord {
        vlan_id: 100,
        name: None,
        kind: None,
    }];
    let (dispatcher, control, device) = build(state);

    dispatcher
        .dispatch(
            &CancellationToken::new(),
            &command(json!({
                "id": "v4",
                "type": "service_port_add",
                "equipment_id": "olt-1",
                "payload": {"vlanId": 100, "ponPort": "0/0/1", "onuId": 5}
            })),
        )
        .await;

    let result = control.result_for("v4").unwrap();
    assert!(result.success, "error: {:?}", result.error);
    let payload = result.result.unwrap();
    assert_eq!(payload["gemPort"], json!(1));
    assert_eq!(payload["verified"], json!(true));
    assert_eq!(device.lock().service_ports.len(), 1);
}

#[tokio::test]
async fn port_disable_verifies_shutdown_state() {
    let mut state = MockDeviceState::default();
    state.ports = vec![PonPortInfo {
        slot: 0,
        port: 1,
        status: Some("online".into()),
        ..Default::default()
    }];
    let (dispatcher, control, _device) = build(state);

    dispatcher
        .dispatch(
            &CancellationToken::new(),
            &command(json!({
                "id": "v5",
                "type": "port_disable",
                "equipment_id": "olt-1",
                "payload": {"port": "0/0/1"}
            })),
        )
        .await;

    let result = control.result_for("v5").unwrap();
    assert!(result.success, "error: {:?}", result.error);
    let payload = result.result.unwrap();
    assert_eq!(payload["preState"]["status"], json!("online"));
    assert_eq!(payload["postState"]["status"], json!("shutdown"));
    assert_eq!(payload["verified"], json!(true));
}

#[tokio::test]
async fn port_power_reads_port_info() {
    let mut state = MockDeviceState::default();
    state.ports = vec![PonPortInfo {
        slot: 0,
        port: 1,
        status: Some("online".into()),
        tx_power_dbm: Some(3.5),
        ..Default::default()
    }];
    let (dispatcher, control, _device) = build(state);

    dispatcher
        .dispatch(
            &CancellationToken::new(),
            &command(json!({
                "id": "v6",
                "type": "port_power",
                "equipment_id": "olt-1",
                "payload": {"port": "0/1"}
            })),
        )
        .await;

    let result = control.result_for("v6").unwrap();
    assert!(result.success);
    assert_eq!(result.result.unwrap()["port"]["tx_power_dbm"], json!(3.5));
}
