//! [`SocketCanSink`] – writes frames straight to a Linux SocketCAN interface.
//!
//! The frame text is read the way `cansend` reads its argument: a 3-digit id
//! is a standard frame, an 8-digit id is an extended frame, and the data
//! field is hex byte pairs (optionally `.`-separated). Every write is bounded
//! by the socket's send timeout.

use std::time::Duration;

use vesc_types::VescError;

/// Upper bound on one frame write unless configured otherwise.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

const MAX_DATA_LEN: usize = 8;
const STANDARD_ID_DIGITS: usize = 3;
const EXTENDED_ID_DIGITS: usize = 8;
const STANDARD_ID_MAX: u32 = 0x7FF;
const EXTENDED_ID_MAX: u32 = 0x1FFF_FFFF;

/// Identifier and payload of one `<can_id>#<data>` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCanFrame {
    pub id: u32,
    pub extended: bool,
    pub data: Vec<u8>,
}

/// Parse `cansend`-style frame text.
///
/// # Errors
///
/// [`VescError::Serialization`] when the text is not a data frame `cansend`
/// would accept.
pub fn parse_cansend(text: &str) -> Result<RawCanFrame, VescError> {
    let malformed = |why: &str| VescError::Serialization(format!("{why} in frame {text:?}"));

    let (id_text, data_text) = text.split_once('#').ok_or_else(|| malformed("missing '#'"))?;

    let extended = match id_text.len() {
        STANDARD_ID_DIGITS => false,
        EXTENDED_ID_DIGITS => true,
        _ => return Err(malformed("id must be 3 or 8 hex digits")),
    };
    let id = u32::from_str_radix(id_text, 16).map_err(|_| malformed("non-hex id"))?;
    let id_max = if extended { EXTENDED_ID_MAX } else { STANDARD_ID_MAX };
    if id > id_max {
        return Err(malformed("id out of range"));
    }

    let digits: Vec<u8> = data_text.bytes().filter(|&b| b != b'.').collect();
    if digits.len() % 2 != 0 {
        return Err(malformed("odd number of data digits"));
    }
    let data = digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| malformed("non-hex data"))
        })
        .collect::<Result<Vec<u8>, _>>()?;
    if data.len() > MAX_DATA_LEN {
        return Err(malformed("more than 8 data bytes"));
    }

    Ok(RawCanFrame { id, extended, data })
}

#[cfg(target_os = "linux")]
pub use linux::SocketCanSink;

#[cfg(target_os = "linux")]
mod linux {
    use std::time::Duration;

    use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, StandardId};
    use tracing::{debug, info, warn};
    use vesc_types::VescError;

    use super::{RawCanFrame, parse_cansend};
    use crate::frame::CommandFrame;
    use crate::sink::FrameSink;

    /// [`FrameSink`] that owns a raw CAN socket bound to one interface.
    pub struct SocketCanSink {
        id: String,
        interface: String,
        socket: CanSocket,
    }

    impl SocketCanSink {
        /// Open `interface` (e.g. `"can0"`) with a bounded send timeout.
        ///
        /// # Errors
        ///
        /// [`VescError::Configuration`] if the interface cannot be opened or
        /// the timeout cannot be applied.
        pub fn open(interface: &str, write_timeout: Duration) -> Result<Self, VescError> {
            let socket = CanSocket::open(interface).map_err(|e| {
                VescError::Configuration(format!("cannot open CAN interface {interface}: {e}"))
            })?;
            socket.set_write_timeout(write_timeout).map_err(|e| {
                VescError::Configuration(format!(
                    "cannot set write timeout on {interface}: {e}"
                ))
            })?;
            info!(
                interface,
                write_timeout_ms = write_timeout.as_millis() as u64,
                "CAN socket open"
            );
            Ok(Self {
                id: format!("socketcan:{interface}"),
                interface: interface.to_string(),
                socket,
            })
        }

        pub fn interface(&self) -> &str {
            &self.interface
        }
    }

    fn to_can_frame(raw: &RawCanFrame) -> Option<CanFrame> {
        let id: Id = if raw.extended {
            ExtendedId::new(raw.id)?.into()
        } else {
            StandardId::new(u16::try_from(raw.id).ok()?)?.into()
        };
        CanFrame::new(id, &raw.data)
    }

    impl FrameSink for SocketCanSink {
        fn id(&self) -> &str {
            &self.id
        }

        fn transmit(&self, frame: &CommandFrame) -> Result<(), VescError> {
            let kind = frame.kind();
            let text = frame.to_cansend_string();

            let raw = parse_cansend(&text).map_err(|e| VescError::Transmit {
                kind,
                details: e.to_string(),
            })?;
            let can_frame = to_can_frame(&raw).ok_or_else(|| VescError::Transmit {
                kind,
                details: format!("{text} is not a valid CAN frame"),
            })?;

            if let Err(e) = self.socket.write_frame(&can_frame) {
                warn!(sink = %self.id, frame = %text, error = %e, "CAN write failed");
                return Err(VescError::Transmit {
                    kind,
                    details: format!("write to {} failed: {e}", self.interface),
                });
            }

            debug!(sink = %self.id, frame = %text, "frame sent");
            Ok(())
        }
    }

}
