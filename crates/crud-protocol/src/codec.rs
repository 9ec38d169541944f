use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{BusMessage, Flags, Oid, RequestType, MAX_OBJECT_SIZE};

/// Size of an encoded bus value on the wire.
pub const HEADER_SIZE: usize = 8;

const OID_SHIFT: u32 = 32;
const REQUEST_SHIFT: u32 = 28;
const LENGTH_SHIFT: u32 = 4;
const FLAGS_SHIFT: u32 = 1;

const REQUEST_MASK: u64 = 0xF;
const LENGTH_MASK: u64 = 0xFF_FFFF;
const FLAGS_MASK: u64 = 0x7;
const RESULT_MASK: u64 = 0x1;

/// Packs and unpacks 64-bit bus values.
pub struct BusCodec;

impl BusCodec {
    /// Pack a message: OID(32) | Req(4) | Length(24) | Flags(3) | Result(1), MSB first.
    pub fn encode(msg: &BusMessage) -> ProtocolResult<u64> {
        if msg.length > MAX_OBJECT_SIZE {
            return Err(ProtocolError::LengthOutOfRange {
                length: msg.length,
                max: MAX_OBJECT_SIZE,
            });
        }
        if msg.flags.bits() > Flags::MAX {
            return Err(ProtocolError::FlagsOutOfRange(msg.flags.bits()));
        }
        Ok((u64::from(msg.oid.get()) << OID_SHIFT)
            | (u64::from(msg.request.code()) << REQUEST_SHIFT)
            | (u64::from(msg.length) << LENGTH_SHIFT)
            | (u64::from(msg.flags.bits()) << FLAGS_SHIFT)
            | u64::from(msg.failed))
    }

    /// Unpack a bus value. Unassigned request codes decode to `Unknown`.
    pub fn decode(value: u64) -> ProtocolResult<BusMessage> {
        let length = ((value >> LENGTH_SHIFT) & LENGTH_MASK) as u32;
        if length > MAX_OBJECT_SIZE {
            return Err(ProtocolError::LengthOutOfRange {
                length,
                max: MAX_OBJECT_SIZE,
            });
        }
        Ok(BusMessage {
            oid: Oid::new((value >> OID_SHIFT) as u32),
            request: RequestType::from_code(((value >> REQUEST_SHIFT) & REQUEST_MASK) as u8),
            length,
            flags: Flags::from_bits(((value >> FLAGS_SHIFT) & FLAGS_MASK) as u8),
            failed: value & RESULT_MASK == 1,
        })
    }

    /// Encode into network byte order.
    pub fn to_wire(msg: &BusMessage) -> ProtocolResult<[u8; HEADER_SIZE]> {
        Ok(Self::encode(msg)?.to_be_bytes())
    }

    /// Decode from network byte order.
    pub fn from_wire(bytes: [u8; HEADER_SIZE]) -> ProtocolResult<BusMessage> {
        Self::decode(u64::from_be_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn msg(oid: u32, request: RequestType, length: u32, flags: u8, failed: bool) -> BusMessage {
        BusMessage {
            oid: Oid::new(oid),
            request,
            length,
            flags: Flags::from_bits(flags),
            failed,
        }
    }

    #[test]
    fn field_layout() {
        let value = BusCodec::encode(&msg(0xDEAD_BEEF, RequestType::Update, 0xABCDE, 0b101, true)).unwrap();
        assert_eq!(value >> 32, 0xDEAD_BEEF);
        assert_eq!((value >> 28) & 0xF, 4);
        assert_eq!((value >> 4) & 0xFF_FFFF, 0xABCDE);
        assert_eq!((value >> 1) & 0x7, 0b101);
        assert_eq!(value & 1, 1);
    }

    #[test]
    fn known_value() {
        // CREATE of 5 bytes flagged as priority object.
        let value = BusCodec::encode(&BusMessage::create(5, Flags::PRIORITY_OBJECT)).unwrap();
        assert_eq!(value, 0x0000_0000_2000_0052);
    }

    #[test]
    fn wire_is_big_endian() {
        let m = msg(1, RequestType::Read, 0, 0, false);
        let wire = BusCodec::to_wire(&m).unwrap();
        assert_eq!(wire, [0, 0, 0, 1, 0x30, 0, 0, 0]);
        assert_eq!(BusCodec::from_wire(wire).unwrap(), m);
    }

    #[test]
    fn encode_rejects_oversized_length() {
        let err = BusCodec::encode(&BusMessage::create(MAX_OBJECT_SIZE + 1, Flags::NONE)).unwrap_err();
        assert!(matches!(err, ProtocolError::LengthOutOfRange { .. }));
        assert!(BusCodec::encode(&BusMessage::create(MAX_OBJECT_SIZE, Flags::NONE)).is_ok());
    }

    #[test]
    fn encode_rejects_wide_flags() {
        let err = BusCodec::encode(&msg(0, RequestType::Init, 0, 8, false)).unwrap_err();
        assert_eq!(err, ProtocolError::FlagsOutOfRange(8));
    }

    #[test]
    fn decode_rejects_oversized_length() {
        let value = 0xFF_FFFFu64 << 4;
        assert!(matches!(
            BusCodec::decode(value),
            Err(ProtocolError::LengthOutOfRange { length: 0xFF_FFFF, .. })
        ));
    }

    #[test]
    fn decode_unknown_request_code() {
        let value = 0xCu64 << 28;
        assert_eq!(BusCodec::decode(value).unwrap().request, RequestType::Unknown);
    }

    fn any_request() -> impl Strategy<Value = RequestType> {
        (0u8..8).prop_map(RequestType::from_code)
    }

    proptest! {
        #[test]
        fn roundtrip(
            oid in any::<u32>(),
            request in any_request(),
            length in 0..=MAX_OBJECT_SIZE,
            flags in 0u8..=7,
            failed in any::<bool>(),
        ) {
            let m = msg(oid, request, length, flags, failed);
            let value = BusCodec::encode(&m).unwrap();
            prop_assert_eq!(BusCodec::decode(value).unwrap(), m);
            prop_assert_eq!(BusCodec::encode(&BusCodec::decode(value).unwrap()).unwrap(), value);
        }
    }
}
