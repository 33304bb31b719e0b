//! Gateway wire protocol
//!
//! Opcodes, close codes, the frame envelope and the handshake payloads.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseClass, CloseCode};
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    HelloPayload, IdentifyPayload, IdentifyProperties, PresenceUpdatePayload, ReadyPayload,
    ResumePayload, UnavailableGuild,
};

/// Gateway protocol version
pub const GATEWAY_VERSION: u8 = 10;

/// Append the version and encoding query to a gateway URL
pub fn gateway_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}v={GATEWAY_VERSION}&encoding=json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_url() {
        assert_eq!(
            gateway_url("wss://gateway.example"),
            "wss://gateway.example?v=10&encoding=json"
        );
        assert_eq!(
            gateway_url("wss://gateway.example/"),
            "wss://gateway.example?v=10&encoding=json"
        );
        assert_eq!(
            gateway_url("ws://127.0.0.1:9000/?a=b"),
            "ws://127.0.0.1:9000/?a=b&v=10&encoding=json"
        );
    }
}
