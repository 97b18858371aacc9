//! The CTAP1/U2F raw-message shapes the translator speaks (spec.md §4.5,
//! §6). These are APDU-shaped requests decoded from whatever the HID
//! transport hands the translator — this crate doesn't parse USB HID
//! reports itself, that's `hid::HidChannel`'s job.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlByte {
    CheckOnly,
    EnforceUserPresenceAndSign,
    DontEnforceUserPresenceAndSign,
}

impl ControlByte {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x07 => Some(Self::CheckOnly),
            0x03 => Some(Self::EnforceUserPresenceAndSign),
            0x08 => Some(Self::DontEnforceUserPresenceAndSign),
            _ => None,
        }
    }

    pub fn check_user(self) -> bool {
        matches!(self, Self::EnforceUserPresenceAndSign)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWord {
    NoError,
    ConditionsNotSatisfied,
    WrongData,
    ClaNotSupported,
}

impl StatusWord {
    pub fn to_bytes(self) -> [u8; 2] {
        match self {
            Self::NoError => [0x90, 0x00],
            Self::ConditionsNotSatisfied => [0x69, 0x85],
            Self::WrongData => [0x6a, 0x80],
            Self::ClaNotSupported => [0x6e, 0x00],
        }
    }
}

#[derive(Debug, Clone)]
pub enum RawMessage {
    Version,
    Register { chall_param: [u8; 32], app_param: [u8; 32] },
    Authenticate { control: ControlByte, chall_param: [u8; 32], app_param: [u8; 32], key_handle: Vec<u8> },
    Unknown { ins: u8 },
}

/// ISO7816-ish APDU instruction bytes for the three U2F raw commands
/// (spec.md §4.5).
mod ins {
    pub const REGISTER: u8 = 0x01;
    pub const AUTHENTICATE: u8 = 0x02;
    pub const VERSION: u8 = 0x03;
}

impl RawMessage {
    /// Decodes an APDU: `cla ins p1 p2 [lc data] [le]`. Only the fields the
    /// U2F raw protocol defines are interpreted; `cla` is ignored here
    /// (the translator checks it separately and replies `ClaNotSupported`).
    pub fn decode(ins_byte: u8, p1: u8, data: &[u8]) -> RawMessage {
        match ins_byte {
            ins::VERSION => RawMessage::Version,
            ins::REGISTER => {
                if data.len() < 64 {
                    return RawMessage::Unknown { ins: ins_byte };
                }
                let mut chall_param = [0u8; 32];
                let mut app_param = [0u8; 32];
                chall_param.copy_from_slice(&data[0..32]);
                app_param.copy_from_slice(&data[32..64]);
                RawMessage::Register { chall_param, app_param }
            }
            ins::AUTHENTICATE => {
                let Some(control) = ControlByte::from_byte(p1) else {
                    return RawMessage::Unknown { ins: ins_byte };
                };
                if data.len() < 65 {
                    return RawMessage::Unknown { ins: ins_byte };
                }
                let mut chall_param = [0u8; 32];
                let mut app_param = [0u8; 32];
                chall_param.copy_from_slice(&data[0..32]);
                app_param.copy_from_slice(&data[32..64]);
                let kh_len = data[64] as usize;
                let key_handle = data.get(65..65 + kh_len).unwrap_or(&[]).to_vec();
                RawMessage::Authenticate { control, chall_param, app_param, key_handle }
            }
            other => RawMessage::Unknown { ins: other },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_register() {
        let mut data = vec![1u8; 32];
        data.extend_from_slice(&[2u8; 32]);
        let msg = RawMessage::decode(ins::REGISTER, 0, &data);
        assert!(matches!(msg, RawMessage::Register { .. }));
    }

    #[test]
    fn decodes_authenticate_with_control_byte() {
        let mut data = vec![1u8; 64];
        data.push(64); // key handle length
        data.extend_from_slice(&[9u8; 64]);
        let msg = RawMessage::decode(ins::AUTHENTICATE, 0x03, &data);
        match msg {
            RawMessage::Authenticate { control, key_handle, .. } => {
                assert_eq!(control, ControlByte::EnforceUserPresenceAndSign);
                assert_eq!(key_handle.len(), 64);
            }
            _ => panic!("expected Authenticate"),
        }
    }

    #[test]
    fn unknown_ins_is_preserved() {
        let msg = RawMessage::decode(0xAB, 0, &[]);
        assert!(matches!(msg, RawMessage::Unknown { ins: 0xAB }));
    }

    #[test]
    fn status_word_bytes() {
        assert_eq!(StatusWord::NoError.to_bytes(), [0x90, 0x00]);
        assert_eq!(StatusWord::ConditionsNotSatisfied.to_bytes(), [0x69, 0x85]);
    }
}
