// Loopback exercises for the real transports: a scripted TCP CLI device
// and a scripted UDP datagram responder on 127.0.0.1
mod support;

use ponpulse_agent::driver::{DatagramPoller, OltDriver, TcpLineSession, VsolDriver};
use ponpulse_agent::DatagramOlt;
use ponpulse_common::Vendor;
use serde_json::json;
use support::equipment;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;

const PROMPT: &str = "V1600D# ";

async fn read_line(stream: &mut tokio::net::TcpStream) -> String {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.expect("device read");
        if n == 0 || byte[0] == b'\n' {
            break;
        }
        if byte[0] != b'\r' {
            line.push(byte[0]);
        }
    }
    String::from_utf8_lossy(&line).into_owned()
}

/// A scripted V-SOL-ish device: login challenge, then canned answers.
async fn fake_cli_device(listener: TcpListener) {
    let (mut stream, _) = listener.accept().await.expect("accept");
    stream.write_all(b"Login: ").await.unwrap();
    let _user = read_line(&mut stream).await;
    stream.write_all(b"Password: ").await.unwrap();
    let _pass = read_line(&mut stream).await;
    stream.write_all(PROMPT.as_bytes()).await.unwrap();

    loop {
        let command = read_line(&mut stream).await;
        let body: String = match command.as_str() {
            "terminal length 0" => String::new(),
            "show pon port" => "\
  PON    Status   ONUs   TxPower(dBm)\n\
  ----   ------   ----   ------------\n\
  0/1    enable   2      3.50\n\
  0/2    disable  0      -\n"
                .into(),
            "show onu info 0/1" => "\
  OnuId  SerialNum      AdminState  OperState  RxPower(dBm)  Distance(m)\n\
  -----  -------------  ----------  ---------  ------------  -----------\n\
  1      VSOL00000001   enabled     online     -19.20        800\n\
  2      VSOL00000002   disabled    offline    -             -\n"
                .into(),
            "quit" => break,
            other => format!("Error: Unknown command '{other}'\n"),
        };
        // Echo the command the way a terminal does, then answer.
        let response = format!("{command}\r\n{body}{PROMPT}");
        stream.write_all(response.as_bytes()).await.unwrap();
    }
}

#[tokio::test]
async fn cli_session_logs_in_and_parses_vsol_tables() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(fake_cli_device(listener));

    let mut config = equipment("olt-1", Vendor::Vsol, false);
    config.cli.host = "127.0.0.1".into();
    config.cli.port = addr.port();

    let cancel = CancellationToken::new();
    let session = Box::new(TcpLineSession::new("olt-1", config.cli.clone()));
    let mut driver = VsolDriver::new("olt-1", session);
    driver.connect(&cancel).await?;

    let ports = driver.list_pon_ports(&cancel).await?;
    assert_eq!(ports.len(), 2);
    assert_eq!((ports[0].slot, ports[0].port), (0, 1));
    assert_eq!(ports[0].onu_count, Some(2));

    let onus = driver.list_onus(&cancel, "0/1").await?;
    assert_eq!(onus.len(), 2);
    assert_eq!(onus[0].serial.as_deref(), Some("VSOL00000001"));
    assert_eq!(onus[0].rx_power_dbm, Some(-19.2));
    assert_eq!(onus[1].status.as_deref(), Some("offline"));

    // Device error output surfaces as an execute error with the text.
    let err = driver.execute(&cancel, "bogus nonsense").await.unwrap_err();
    assert!(err.to_string().contains("Unknown command"));

    driver.close().await?;
    Ok(())
}

/// A scripted datagram responder speaking the management poll codec.
async fn fake_datagram_device(socket: UdpSocket) {
    let mut buffer = vec![0u8; 65_507];
    loop {
        let (received, peer) = match socket.recv_from(&mut buffer).await {
            Ok(v) => v,
            Err(_) => return,
        };
        let request: serde_json::Value = match serde_json::from_slice(&buffer[..received]) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let response = if request["community"] != json!("public") {
            json!({"ok": false, "error": "bad community"})
        } else {
            match request["op"].as_str().unwrap_or_default() {
                "ping" => json!({"ok": true, "data": {}}),
                "onu.list" => json!({"ok": true, "data": {"onus": [
                    {"pon_port": "0/1", "onu_id": 5, "serial": "VSOL00000005",
                     "admin_state": "enabled", "status": "online", "rx_power_dbm": -18.7}
                ]}}),
                "olt.status" => json!({"ok": true, "data": {"status": {
                    "cpu_percent": 18.0, "memory_percent": 52.0, "version": "V1600D-MGMT 2.1.3"
                }}}),
                _ => json!({"ok": false, "error": "unsupported op"}),
            }
        };
        let _ = socket
            .send_to(serde_json::to_vec(&response).unwrap().as_slice(), peer)
            .await;
    }
}

#[tokio::test]
async fn datagram_poller_probes_and_polls() -> anyhow::Result<()> {
    let server = UdpSocket::bind("127.0.0.1:0").await?;
    let addr = server.local_addr()?;
    tokio::spawn(fake_datagram_device(server));

    let mut config = equipment("olt-1", Vendor::Vsol, true);
    config.address = "127.0.0.1".into();
    config.datagram.port = addr.port();

    let cancel = CancellationToken::new();
    let poller = DatagramPoller::open(&cancel, &config).await?;

    let onus = poller.list_onus(&cancel, Some("0/1")).await?;
    assert_eq!(onus.len(), 1);
    assert_eq!(onus[0].serial.as_deref(), Some("VSOL00000005"));
    assert_eq!(onus[0].rx_power_dbm, Some(-18.7));

    let status = poller.olt_status(&cancel).await?;
    assert_eq!(status.cpu_percent, Some(18.0));
    assert_eq!(status.version.as_deref(), Some("V1600D-MGMT 2.1.3"));

    // Unsupported op comes back as a device-side execute error.
    let err = poller.alarms(&cancel).await.unwrap_err();
    assert!(err.to_string().contains("unsupported op"));
    Ok(())
}
