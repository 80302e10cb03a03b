//! Single-shot execution of a catalog action against a device.
//!
//! This is the only path through which a device RPC may happen; both the
//! automation engine and the `/execute` endpoint come through here, so the
//! per-device lock below is the process-wide serialization point.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::rpc::{JsonRpcResponse, RpcError};
use super::Engine;
use crate::repository::{Catalog, CatalogError};

#[derive(Debug)]
pub enum ExecuteError {
    Device(CatalogError),
    Action(CatalogError),
    DeviceActions(serde_json::Error),
    NotLinked { action_id: i32, device_id: i32 },
    PublicIp,
    Rpc(RpcError),
}

impl std::fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecuteError::Device(e) => write!(f, "getting device: {}", e),
            ExecuteError::Action(e) => write!(f, "getting action: {}", e),
            ExecuteError::DeviceActions(e) => write!(f, "decoding device actions: {}", e),
            ExecuteError::NotLinked {
                action_id,
                device_id,
            } => write!(
                f,
                "action {} does not belong to device {}",
                action_id, device_id
            ),
            ExecuteError::PublicIp => write!(f, "device IP must be in private range"),
            ExecuteError::Rpc(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ExecuteError {}

impl Engine {
    /// Runs one catalog action against one device: loads both records,
    /// verifies the action is linked to the device, enforces the private-IP
    /// policy and performs the RPC. Holds the device's lock for the whole
    /// call so a device never sees two requests at once from this process.
    pub async fn execute(
        &self,
        device_id: i32,
        action_id: i32,
    ) -> Result<JsonRpcResponse, ExecuteError> {
        let lock = self.device_lock(device_id).await;
        let _guard = lock.lock().await;

        let device = self
            .catalog
            .device(device_id)
            .await
            .map_err(ExecuteError::Device)?;
        let action = self
            .catalog
            .action(action_id)
            .await
            .map_err(ExecuteError::Action)?;

        let linked: Vec<i32> =
            serde_json::from_str(&device.actions).map_err(ExecuteError::DeviceActions)?;
        if !linked.contains(&action_id) {
            return Err(ExecuteError::NotLinked {
                action_id,
                device_id,
            });
        }

        if !is_private_ip(&device.ip) {
            return Err(ExecuteError::PublicIp);
        }

        self.call_json_rpc(&device.ip, &action.path, &action.params)
            .await
            .map_err(ExecuteError::Rpc)
    }

    /// Returns the mutex for a device, creating it on first use. Entries are
    /// never removed; the table is bounded by the device count.
    async fn device_lock(&self, device_id: i32) -> Arc<Mutex<()>> {
        let mut locks = self.device_locks.lock().await;
        locks
            .entry(device_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Accepts loopback, RFC1918, carrier-grade NAT, link-local and IPv6
/// unique-local addresses. The port is optional; without one the RPC call
/// targets port 80.
fn is_private_ip(ip: &str) -> bool {
    let host = match ip.parse::<SocketAddr>() {
        Ok(addr) => addr.ip(),
        Err(_) => match ip.parse::<IpAddr>() {
            Ok(host) => host,
            Err(_) => return false,
        },
    };

    match host {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || is_cgnat(v4)
        }
        IpAddr::V6(v6) => v6.is_loopback() || is_unique_local(v6) || is_ipv6_link_local(v6),
    }
}

// 100.64.0.0/10
fn is_cgnat(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 100 && (octets[1] & 0xc0) == 0x40
}

// fc00::/7
fn is_unique_local(ip: Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

// fe80::/10
fn is_ipv6_link_local(ip: Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{
        mock_engine, test_action, test_device, RecordingServer,
    };
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_is_private_ip() {
        let cases = [
            ("192.168.1.10:8080", true),
            ("192.168.1.10", true),
            ("10.0.0.1:80", true),
            ("172.16.4.2", true),
            ("100.64.0.1", true),
            ("100.127.255.254", true),
            ("100.128.0.1", false),
            ("169.254.1.1", true),
            ("127.0.0.1:9000", true),
            ("8.8.8.8:80", false),
            ("1.1.1.1", false),
            ("[::1]:8080", true),
            ("::1", true),
            ("fc00::1", true),
            ("fd12:3456::1", true),
            ("fe80::1", true),
            ("2001:4860:4860::8888", false),
            ("not-an-ip", false),
            ("example.com:80", false),
            ("", false),
        ];

        for (ip, want) in cases {
            assert_eq!(is_private_ip(ip), want, "ip {:?}", ip);
        }
    }

    #[actix_web::test]
    async fn test_execute_device_not_found() {
        let engine = mock_engine(vec![], vec![], vec![]);
        let err = engine.execute(1, 1).await.unwrap_err();
        assert_eq!(err.to_string(), "getting device: device 1 not found");
    }

    #[actix_web::test]
    async fn test_execute_action_not_found() {
        let engine = mock_engine(
            vec![test_device(1, "plug1", "192.168.1.10", "[1]")],
            vec![],
            vec![],
        );
        let err = engine.execute(1, 1).await.unwrap_err();
        assert_eq!(err.to_string(), "getting action: action 1 not found");
    }

    #[actix_web::test]
    async fn test_execute_action_not_linked() {
        let engine = mock_engine(
            vec![test_device(1, "plug1", "192.168.1.10", "[2,3]")],
            vec![test_action(1, "toggle", "toggle", "")],
            vec![],
        );
        let err = engine.execute(1, 1).await.unwrap_err();
        assert_eq!(err.to_string(), "action 1 does not belong to device 1");
    }

    #[actix_web::test]
    async fn test_execute_bad_actions_json() {
        let engine = mock_engine(
            vec![test_device(1, "plug1", "192.168.1.10", "oops")],
            vec![test_action(1, "toggle", "toggle", "")],
            vec![],
        );
        let err = engine.execute(1, 1).await.unwrap_err();
        assert!(err.to_string().starts_with("decoding device actions:"));
    }

    #[actix_web::test]
    async fn test_execute_rejects_public_ip() {
        let server = RecordingServer::start(200, r#"{"jsonrpc":"2.0","result":{},"id":1}"#).await;
        let engine = mock_engine(
            vec![test_device(1, "plug1", "8.8.8.8:80", "[1]")],
            vec![test_action(1, "toggle", "toggle", "")],
            vec![],
        );

        let err = engine.execute(1, 1).await.unwrap_err();
        assert_eq!(err.to_string(), "device IP must be in private range");
        // The guard fires before any HTTP call is made.
        assert_eq!(server.call_count(), 0);
    }

    #[actix_web::test]
    async fn test_execute_success() {
        let server =
            RecordingServer::start(200, r#"{"jsonrpc":"2.0","result":{"on":true},"id":1}"#).await;
        let engine = mock_engine(
            vec![test_device(1, "plug1", &server.addr, "[1]")],
            vec![test_action(1, "turn_on", "relay_on", r#"{"channel":0}"#)],
            vec![],
        );

        let response = engine.execute(1, 1).await.unwrap();
        assert_eq!(response.result.unwrap()["on"], true);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "relay_on");
        assert_eq!(requests[0].body["params"]["channel"], 0);
    }

    #[actix_web::test]
    async fn test_execute_surfaces_rpc_error() {
        let server = RecordingServer::start(
            200,
            r#"{"jsonrpc":"2.0","error":{"code":-32600,"message":"Invalid Request"},"id":1}"#,
        )
        .await;
        let engine = mock_engine(
            vec![test_device(1, "plug1", &server.addr, "[1]")],
            vec![test_action(1, "toggle", "toggle", "")],
            vec![],
        );

        let err = engine.execute(1, 1).await.unwrap_err();
        assert!(err.to_string().contains("-32600"));
        assert!(err.to_string().contains("Invalid Request"));
    }

    #[actix_web::test]
    async fn test_same_device_executions_are_serialized() {
        let delay = Duration::from_millis(100);
        let server = RecordingServer::start_with(
            200,
            r#"{"jsonrpc":"2.0","result":{},"id":1}"#,
            Some(delay),
        )
        .await;
        let engine = mock_engine(
            vec![test_device(1, "plug1", &server.addr, "[1,2]")],
            vec![
                test_action(1, "turn_on", "turn_on", ""),
                test_action(2, "turn_off", "turn_off", ""),
            ],
            vec![],
        );

        let (a, b) = tokio::join!(engine.execute(1, 1), engine.execute(1, 2));
        a.unwrap();
        b.unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        // The second request may only arrive after the first response.
        assert!(requests[1].at.duration_since(requests[0].at) >= delay);
    }

    #[actix_web::test]
    async fn test_different_devices_run_concurrently() {
        let delay = Duration::from_millis(200);
        let server = RecordingServer::start_with(
            200,
            r#"{"jsonrpc":"2.0","result":{},"id":1}"#,
            Some(delay),
        )
        .await;
        let engine = mock_engine(
            vec![
                test_device(1, "plug1", &server.addr, "[1]"),
                test_device(2, "plug2", &server.addr, "[1]"),
            ],
            vec![test_action(1, "toggle", "toggle", "")],
            vec![],
        );

        let (a, b) = tokio::join!(engine.execute(1, 1), engine.execute(2, 1));
        a.unwrap();
        b.unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        // Both arrive while the first is still being served.
        assert!(requests[1].at.duration_since(requests[0].at) < delay);
    }
}
