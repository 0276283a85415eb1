//! PonPulse edge-node agent.
//!
//! Bridges the control plane's HTTP/JSON command surface (northbound) to
//! heterogeneous OLTs speaking interactive CLI sessions and a management
//! datagram protocol (southbound). The agent fetches pending commands,
//! executes them through per-vendor drivers, verifies that device state
//! actually changed, and pushes results, ONU updates, and telemetry back.

pub mod client;
pub mod dispatcher;
pub mod driver;
pub mod handlers;
pub mod parser;
pub mod poller;
pub mod verify;

pub use client::{ControlPlane, ControlPlaneClient, EnrollResponse, SharedControlPlaneClient};
pub use dispatcher::Dispatcher;
pub use driver::{DatagramOlt, DriverFactory, LineSession, NetworkDriverFactory, OltDriver};
