//! Negotiable wire protocols.

use std::fmt;

/// A wire protocol the client can propose during the connection handshake.
///
/// The code is the exact UTF-8 tag written on the wire, with no length
/// prefix and no terminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WireProtocol {
    NativeV1,
    NativeV2,
    NativeV3,
    ProtoBuf,
}

impl WireProtocol {
    /// The on-wire tag proposed to the server.
    pub fn code(self) -> &'static str {
        match self {
            WireProtocol::NativeV1 => "vp1",
            WireProtocol::NativeV2 => "vp2",
            WireProtocol::NativeV3 => "vp3",
            WireProtocol::ProtoBuf => "pb0",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            WireProtocol::NativeV1 => "native-v1",
            WireProtocol::NativeV2 => "native-v2",
            WireProtocol::NativeV3 => "native-v3",
            WireProtocol::ProtoBuf => "protobuf",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "vp1" => Some(WireProtocol::NativeV1),
            "vp2" => Some(WireProtocol::NativeV2),
            "vp3" => Some(WireProtocol::NativeV3),
            "pb0" => Some(WireProtocol::ProtoBuf),
            _ => None,
        }
    }
}

impl fmt::Display for WireProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
