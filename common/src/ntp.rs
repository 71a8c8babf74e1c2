//! SNTP request/reply codec.

use crate::error::NtpError;

pub const NTP_PORT: u16 = 123;
pub const NTP_PACKET_SIZE: usize = 48;

/// Seconds between 1900-01-01 and 1970-01-01.
pub const NTP_UNIX_OFFSET: u32 = 2_208_988_800;

const TRANSMIT_SECS_OFFSET: usize = 40;

pub fn build_request() -> [u8; NTP_PACKET_SIZE] {
    let mut packet = [0_u8; NTP_PACKET_SIZE];
    packet[0] = 0xE3; // LI unsynchronized, version 4, client mode
    packet[1] = 0; // stratum
    packet[2] = 6; // poll interval
    packet[3] = 0xEC; // precision
    packet[12] = 49;
    packet[13] = 0x4E;
    packet[14] = 49;
    packet[15] = 52;
    packet
}

/// Extracts the transmit timestamp of a server reply as unix seconds.
/// Zero is reserved for unknown time, so a reply carrying it is refused.
pub fn parse_reply(reply: &[u8]) -> Result<u32, NtpError> {
    if reply.len() < NTP_PACKET_SIZE {
        return Err(NtpError::ShortReply(reply.len()));
    }

    let field: [u8; 4] = [
        reply[TRANSMIT_SECS_OFFSET],
        reply[TRANSMIT_SECS_OFFSET + 1],
        reply[TRANSMIT_SECS_OFFSET + 2],
        reply[TRANSMIT_SECS_OFFSET + 3],
    ];
    let secs_since_1900 = u32::from_be_bytes(field);

    match secs_since_1900.checked_sub(NTP_UNIX_OFFSET) {
        None => Err(NtpError::BeforeUnixEpoch(secs_since_1900)),
        Some(0) => Err(NtpError::EpochZero),
        Some(unix) => Ok(unix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_with(secs_since_1900: u32) -> [u8; NTP_PACKET_SIZE] {
        let mut reply = [0_u8; NTP_PACKET_SIZE];
        reply[0] = 0x24;
        reply[40..44].copy_from_slice(&secs_since_1900.to_be_bytes());
        reply
    }

    #[test]
    fn request_header_is_client_mode() {
        let request = build_request();
        assert_eq!(request.len(), 48);
        assert_eq!(request[0], 0xE3);
        assert_eq!(request[2], 6);
        assert_eq!(request[3], 0xEC);
        assert_eq!(&request[12..16], &[49, 0x4E, 49, 52]);
        assert!(request[16..].iter().all(|b| *b == 0));
    }

    #[test]
    fn canned_reply_converts_to_unix_seconds() {
        // 2026-01-05T00:00:00Z
        let unix = 1_767_571_200_u32;
        let reply = reply_with(unix + NTP_UNIX_OFFSET);
        assert_eq!(parse_reply(&reply), Ok(unix));
    }

    #[test]
    fn epoch_boundary_is_not_a_valid_time() {
        assert_eq!(parse_reply(&reply_with(NTP_UNIX_OFFSET)), Err(NtpError::EpochZero));
        assert_eq!(parse_reply(&reply_with(NTP_UNIX_OFFSET + 1)), Ok(1));
    }

    #[test]
    fn truncated_reply_is_rejected() {
        assert_eq!(parse_reply(&[0_u8; 47]), Err(NtpError::ShortReply(47)));
    }

    #[test]
    fn zero_timestamp_is_rejected() {
        assert_eq!(parse_reply(&reply_with(0)), Err(NtpError::BeforeUnixEpoch(0)));
    }
}
