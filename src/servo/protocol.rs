//! Wire protocol for the USB servo board (§4.9): 4-byte set-commands and a
//! 2-byte get-position query, little-endian 7-bit split of quarter-
//! microsecond values.

pub const CMD_SET_POSITION: u8 = 0x84;
pub const CMD_SET_SPEED: u8 = 0x87;
pub const CMD_SET_ACCEL: u8 = 0x89;
pub const CMD_GET_POSITION: u8 = 0x90;

fn split_7bit(value: u16) -> (u8, u8) {
    ((value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8)
}

/// `pos_q = commanded microseconds * 4`, split little-endian 7-bit.
pub fn encode_set_position(channel: u8, us: u32) -> [u8; 4] {
    let pos_q = (us * 4).min(u16::MAX as u32) as u16;
    let (lo, hi) = split_7bit(pos_q);
    [CMD_SET_POSITION, channel, lo, hi]
}

pub fn encode_set_speed(channel: u8, value: u16) -> [u8; 4] {
    let (lo, hi) = split_7bit(value);
    [CMD_SET_SPEED, channel, lo, hi]
}

pub fn encode_set_accel(channel: u8, value: u16) -> [u8; 4] {
    let (lo, hi) = split_7bit(value);
    [CMD_SET_ACCEL, channel, lo, hi]
}

pub fn encode_get_position(channel: u8) -> [u8; 2] {
    [CMD_GET_POSITION, channel]
}

/// `position_us = ((b1 << 8) | b0) / 4`.
pub fn decode_position(b0: u8, b1: u8) -> u32 {
    (((b1 as u32) << 8) | b0 as u32) / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_position_matches_s6_wire_bytes() {
        // S6: commanded 2000us clamped, pos_q = 2000*4 = 8000.
        let bytes = encode_set_position(3, 2000);
        let pos_q: u16 = 2000 * 4;
        assert_eq!(bytes, [CMD_SET_POSITION, 3, (pos_q & 0x7F) as u8, ((pos_q >> 7) & 0x7F) as u8]);
    }

    #[test]
    fn decode_position_round_trips_through_encode() {
        let bytes = encode_set_position(0, 1500);
        // decode expects the get-position reply shape: low byte, high byte of pos_q.
        let decoded = decode_position(bytes[2], bytes[3]);
        assert_eq!(decoded, 1500);
    }

    #[test]
    fn split_7bit_keeps_each_half_under_128() {
        let (lo, hi) = split_7bit(8000);
        assert!(lo < 128);
        assert!(hi < 128);
    }
}
