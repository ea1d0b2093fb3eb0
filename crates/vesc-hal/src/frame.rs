//! Fixed-layout `cansend` command frames for the VESC motor controller.
//!
//! Every frame is 18 bytes:
//!
//! | Bytes | Content |
//! |---|---|
//! | 0–3 | constant header `0000` |
//! | 4–5 | command-kind code (`03` throttle, `3F` steering) |
//! | 6–7 | constant suffix `33` |
//! | 8 | separator `#` |
//! | 9–16 | eight hexadecimal payload characters |
//! | 17 | null terminator |
//!
//! Bytes 0–16 are exactly what the `cansend` utility expects
//! (`<can_id>#<data>`), so [`CommandFrame::to_cansend_string`] can be handed to
//! it directly.
//!
//! Encoding never fails: values that do not fit a field are truncated to the
//! field's low bits, because the downstream register has a fixed width.

use std::fmt;

use vesc_types::CommandKind;

/// Total frame length including the null terminator.
pub const FRAME_LEN: usize = 18;

/// Byte written to every position the builders do not overwrite.
pub const IDLE_FILLER: u8 = b'0';

pub const KIND_OFFSET: usize = 4;
pub const SUFFIX_OFFSET: usize = 6;
pub const SEPARATOR_OFFSET: usize = 8;
pub const PAYLOAD_OFFSET: usize = 9;
pub const PAYLOAD_LEN: usize = 8;
pub const TERMINATOR_OFFSET: usize = 17;

pub const SEPARATOR: u8 = b'#';
pub const TERMINATOR: u8 = b'\0';

/// Hex digits used by the throttle payload (full payload region).
pub const THROTTLE_DIGITS: usize = 8;
/// Hex digits used by the steering payload (last half of the payload region).
pub const STEERING_DIGITS: usize = 4;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// The idle frame every builder starts from.
pub const FRAME_TEMPLATE: [u8; FRAME_LEN] = {
    let mut t = [IDLE_FILLER; FRAME_LEN];
    t[SUFFIX_OFFSET] = b'3';
    t[SUFFIX_OFFSET + 1] = b'3';
    t[SEPARATOR_OFFSET] = SEPARATOR;
    t[TERMINATOR_OFFSET] = TERMINATOR;
    t
};

/// Encode `value` as exactly `width` uppercase hex digits, most significant
/// first.
///
/// Values wider than `width * 4` bits keep only their low bits; negative
/// values are written in two's complement.
///
/// ```
/// use vesc_hal::frame::encode_hex;
///
/// assert_eq!(encode_hex(255, 4), "00FF");
/// assert_eq!(encode_hex(-1, 4), "FFFF");
/// assert_eq!(encode_hex(0x12345, 4), "2345");
/// ```
pub fn encode_hex(value: i64, width: usize) -> String {
    let mut out = String::with_capacity(width);
    for i in 0..width {
        let shift = ((width - 1 - i) * 4) as u32;
        // Shifting past the sign bit leaves only sign-extension nibbles.
        let shifted = value
            .checked_shr(shift)
            .unwrap_or(if value < 0 { -1 } else { 0 });
        out.push(HEX_DIGITS[(shifted & 0x0f) as usize] as char);
    }
    out
}

/// One immutable bus message.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame {
    kind: CommandKind,
    bytes: [u8; FRAME_LEN],
}

impl CommandFrame {
    fn build(kind: CommandKind, payload: &str) -> Self {
        let mut bytes = FRAME_TEMPLATE;
        bytes[KIND_OFFSET..KIND_OFFSET + 2].copy_from_slice(kind.code().as_bytes());
        // Right-align so a short payload leaves the leading filler in place.
        let start = PAYLOAD_OFFSET + PAYLOAD_LEN - payload.len();
        bytes[start..PAYLOAD_OFFSET + PAYLOAD_LEN].copy_from_slice(payload.as_bytes());
        Self { kind, bytes }
    }

    /// Raw frame including the trailing null terminator.
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }

    /// Which register this frame addresses (encoded in bytes 4–5).
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// The eight payload characters (bytes 9–16).
    pub fn payload(&self) -> String {
        ascii(&self.bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + PAYLOAD_LEN])
    }

    /// Bytes 0–16 as `cansend` expects them, e.g. `00003F33#000001F4`.
    pub fn to_cansend_string(&self) -> String {
        ascii(&self.bytes[..TERMINATOR_OFFSET])
    }
}

fn ascii(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cansend_string())
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandFrame({})", self.to_cansend_string())
    }
}

/// Build a motor RPM frame carrying `value` as eight hex digits.
pub fn build_throttle_frame(value: i32) -> CommandFrame {
    CommandFrame::build(
        CommandKind::Throttle,
        &encode_hex(i64::from(value), THROTTLE_DIGITS),
    )
}

/// Build a steering servo frame carrying `value` as four hex digits in the
/// last four payload positions.
pub fn build_steering_frame(value: i32) -> CommandFrame {
    CommandFrame::build(
        CommandKind::Steering,
        &encode_hex(i64::from(value), STEERING_DIGITS),
    )
}
