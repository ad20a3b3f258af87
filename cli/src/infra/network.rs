//! Network infrastructure — implements `PortProbe` with a loopback bind.

use std::net::{Ipv4Addr, TcpListener};

use crate::application::ports::PortProbe;

/// Production probe: bind `127.0.0.1:<port>` and release it immediately.
pub struct TcpPortProbe;

impl PortProbe for TcpPortProbe {
    fn try_bind(&self, port: u16) -> bool {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
            Ok(_listener) => true,
            Err(e) => {
                tracing::debug!(port, error = %e, "port unavailable");
                false
            }
        }
    }
}
