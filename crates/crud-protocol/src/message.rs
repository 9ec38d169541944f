use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest object the store accepts, in bytes.
pub const MAX_OBJECT_SIZE: u32 = 0xF_FFFF;

/// Identifier of an object in the store.
///
/// OIDs are allocated by the store. `Oid::NONE` (zero) means "no object".
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Oid(u32);

impl Oid {
    /// The "no object" identifier.
    pub const NONE: Oid = Oid(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.0)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Oid {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Operation named by the 4-bit request field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RequestType {
    Init = 0,
    Format = 1,
    Create = 2,
    Read = 3,
    Update = 4,
    Delete = 5,
    Close = 6,
    Unknown = 7,
}

impl RequestType {
    pub const ALL: [RequestType; 8] = [
        Self::Init,
        Self::Format,
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
        Self::Close,
        Self::Unknown,
    ];

    /// Decode a 4-bit request code. Codes without a meaning map to `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Init,
            1 => Self::Format,
            2 => Self::Create,
            3 => Self::Read,
            4 => Self::Update,
            5 => Self::Delete,
            6 => Self::Close,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Requests of this type are followed by `length` payload bytes.
    pub fn carries_request_payload(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }

    /// Successful responses of this type are followed by `length` payload bytes.
    pub fn carries_response_payload(self) -> bool {
        matches!(self, Self::Read)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Format => "FORMAT",
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Close => "CLOSE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The 3-bit flags field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Marks the object holding the file allocation table.
    pub const PRIORITY_OBJECT: Flags = Flags(1);
    /// Highest value the field can hold.
    pub const MAX: u8 = 0b111;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn is_priority(self) -> bool {
        self.0 & Self::PRIORITY_OBJECT.0 != 0
    }
}

/// One decoded bus value: a request on the way out, a response on the way back.
///
/// `failed` is the result bit. When it is set the other fields carry no
/// meaning and must not be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    pub oid: Oid,
    pub request: RequestType,
    pub length: u32,
    pub flags: Flags,
    pub failed: bool,
}

impl BusMessage {
    pub fn new(oid: Oid, request: RequestType, length: u32, flags: Flags) -> Self {
        Self {
            oid,
            request,
            length,
            flags,
            failed: false,
        }
    }

    pub fn init() -> Self {
        Self::new(Oid::NONE, RequestType::Init, 0, Flags::NONE)
    }

    pub fn format() -> Self {
        Self::new(Oid::NONE, RequestType::Format, 0, Flags::NONE)
    }

    pub fn create(length: u32, flags: Flags) -> Self {
        Self::new(Oid::NONE, RequestType::Create, length, flags)
    }

    pub fn read(oid: Oid, length: u32, flags: Flags) -> Self {
        Self::new(oid, RequestType::Read, length, flags)
    }

    pub fn update(oid: Oid, length: u32, flags: Flags) -> Self {
        Self::new(oid, RequestType::Update, length, flags)
    }

    pub fn delete(oid: Oid) -> Self {
        Self::new(oid, RequestType::Delete, 0, Flags::NONE)
    }

    pub fn close() -> Self {
        Self::new(Oid::NONE, RequestType::Close, 0, Flags::NONE)
    }

    /// Successful response to `self`, reporting `oid` and `length`.
    pub fn success(&self, oid: Oid, length: u32) -> Self {
        Self {
            oid,
            request: self.request,
            length,
            flags: self.flags,
            failed: false,
        }
    }

    /// Failed response to `self`. Failures never carry a payload.
    pub fn failure(&self) -> Self {
        Self {
            oid: self.oid,
            request: self.request,
            length: 0,
            flags: self.flags,
            failed: true,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.failed
    }

    /// Number of payload bytes following this value when sent as a request.
    pub fn request_payload_len(&self) -> usize {
        if self.request.carries_request_payload() {
            self.length as usize
        } else {
            0
        }
    }

    /// Number of payload bytes following this value when sent as a response.
    pub fn response_payload_len(&self) -> usize {
        if self.request.carries_response_payload() && !self.failed {
            self.length as usize
        } else {
            0
        }
    }
}

impl fmt::Display for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} oid={} len={} flags={:#x}{}",
            self.request,
            self.oid,
            self.length,
            self.flags.bits(),
            if self.failed { " FAILED" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_collapse() {
        for code in 7..16u8 {
            assert_eq!(RequestType::from_code(code), RequestType::Unknown);
        }
        for t in RequestType::ALL {
            assert_eq!(RequestType::from_code(t.code()), t);
        }
    }

    #[test]
    fn payload_direction() {
        assert!(RequestType::Create.carries_request_payload());
        assert!(RequestType::Update.carries_request_payload());
        assert!(!RequestType::Read.carries_request_payload());
        assert!(RequestType::Read.carries_response_payload());
        assert!(!RequestType::Create.carries_response_payload());
    }

    #[test]
    fn failed_read_has_no_payload() {
        let req = BusMessage::read(Oid::new(4), MAX_OBJECT_SIZE, Flags::NONE);
        assert_eq!(req.request_payload_len(), 0);
        assert_eq!(req.success(Oid::new(4), 12).response_payload_len(), 12);
        assert_eq!(req.failure().response_payload_len(), 0);
    }

    #[test]
    fn priority_flag() {
        assert!(Flags::PRIORITY_OBJECT.is_priority());
        assert!(!Flags::NONE.is_priority());
    }

    #[test]
    fn display() {
        let msg = BusMessage::create(5, Flags::NONE);
        assert_eq!(msg.to_string(), "CREATE oid=0 len=5 flags=0x0");
        assert!(msg.failure().to_string().ends_with("FAILED"));
    }
}
