//! Command codes, status codes, and the fixed-width payload layouts of
//! spec.md §4.3.
//!
//! Every payload here rides inside a `Frame` whose length is one of
//! `{1, 4, 32, 128}` bytes (see `frame.rs`); unused trailing bytes in a
//! frame are zero. These are hand-rolled fixed-width encodings, not
//! `serde`, because they describe a firmware ABI rather than a
//! self-describing document format.

use thiserror::Error;

pub const NAME0: [u8; 4] = *b"tk1 ";
pub const NAME1: [u8; 4] = *b"fido";
pub const APP_VERSION: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload too short: need {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("unrecognized status byte {0}")]
    BadStatus(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandCode {
    GetNameVersion = 0x01,
    U2fRegister = 0x03,
    U2fCheckOnly = 0x05,
    U2fAuthenticateSet = 0x07,
    U2fAuthenticateGo = 0x08,
}

impl CommandCode {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::GetNameVersion),
            0x03 => Some(Self::U2fRegister),
            0x05 => Some(Self::U2fCheckOnly),
            0x07 => Some(Self::U2fAuthenticateSet),
            0x08 => Some(Self::U2fAuthenticateGo),
            _ => None,
        }
    }
}

/// Reply sent for a one-byte command code the dispatcher doesn't recognize.
pub const RSP_UNKNOWN_CMD: u8 = 0xff;

/// Sub-codes riding in byte 1 of a `BAD` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubCode {
    /// No sub-code; `BAD` without further detail.
    None = 0x00,
    /// `p256_keypair_from_bytes` rejected the derived scalar.
    ScalarOutOfRange = 0x01,
    /// `p256_ecdsa_sign` failed.
    SignFailure = 0x02,
    /// AUTHENTICATE_GO arrived without a live SET session (spec.md §9).
    StaleGo = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Bad(SubCode),
}

impl Status {
    pub fn write_into(self, buf: &mut [u8]) {
        match self {
            Status::Ok => buf[0] = 0,
            Status::Bad(sub) => {
                buf[0] = 1;
                buf[1] = sub as u8;
            }
        }
    }

    pub fn read_from(buf: &[u8]) -> Result<Self, PayloadError> {
        if buf.is_empty() {
            return Err(PayloadError::TooShort { need: 1, got: 0 });
        }
        match buf[0] {
            0 => Ok(Status::Ok),
            1 => {
                let sub = *buf.get(1).unwrap_or(&0);
                let sub = match sub {
                    0x00 => SubCode::None,
                    0x01 => SubCode::ScalarOutOfRange,
                    0x02 => SubCode::SignFailure,
                    0x03 => SubCode::StaleGo,
                    _ => SubCode::None,
                };
                Ok(Status::Bad(sub))
            }
            other => Err(PayloadError::BadStatus(other)),
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}

fn require(buf: &[u8], need: usize) -> Result<(), PayloadError> {
    if buf.len() < need {
        Err(PayloadError::TooShort { need, got: buf.len() })
    } else {
        Ok(())
    }
}

/// Response to `GET_NAMEVERSION`: one 32-byte frame.
pub struct NameVersionResponse {
    pub status: Status,
    pub name0: [u8; 4],
    pub name1: [u8; 4],
    pub version: u32,
}

impl NameVersionResponse {
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut buf = [0u8; 32];
        self.status.write_into(&mut buf[0..2]);
        buf[2..6].copy_from_slice(&self.name0);
        buf[6..10].copy_from_slice(&self.name1);
        buf[10..14].copy_from_slice(&self.version.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, PayloadError> {
        require(buf, 14)?;
        let status = Status::read_from(&buf[0..2])?;
        let mut name0 = [0u8; 4];
        name0.copy_from_slice(&buf[2..6]);
        let mut name1 = [0u8; 4];
        name1.copy_from_slice(&buf[6..10]);
        let version = u32::from_le_bytes(buf[10..14].try_into().unwrap());
        Ok(Self { status, name0, name1, version })
    }

    pub fn is_identity(&self) -> bool {
        self.name0 == NAME0 && self.name1 == NAME1 && self.version == APP_VERSION
    }
}

/// Request payload for `U2F_REGISTER`: 128-byte frame, only the first 32
/// bytes (app_param) are meaningful.
pub struct RegisterRequest {
    pub app_param: [u8; 32],
}

impl RegisterRequest {
    pub fn to_bytes(&self) -> [u8; 128] {
        let mut buf = [0u8; 128];
        buf[0..32].copy_from_slice(&self.app_param);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, PayloadError> {
        require(buf, 32)?;
        let mut app_param = [0u8; 32];
        app_param.copy_from_slice(&buf[0..32]);
        Ok(Self { app_param })
    }
}

/// First of the two 128-byte frames returned for `U2F_REGISTER`.
pub struct RegisterResponse1 {
    pub status: Status,
    pub user_presence: u8,
    pub keyhandle: [u8; 64],
}

impl RegisterResponse1 {
    pub fn to_bytes(&self) -> [u8; 128] {
        let mut buf = [0u8; 128];
        self.status.write_into(&mut buf[0..2]);
        buf[2] = self.user_presence;
        buf[3..67].copy_from_slice(&self.keyhandle);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, PayloadError> {
        require(buf, 67)?;
        let status = Status::read_from(&buf[0..2])?;
        let user_presence = buf[2];
        let mut keyhandle = [0u8; 64];
        keyhandle.copy_from_slice(&buf[3..67]);
        Ok(Self { status, user_presence, keyhandle })
    }
}

/// Second of the two 128-byte frames returned for `U2F_REGISTER`.
pub struct RegisterResponse2 {
    pub status: Status,
    pub pub_key: [u8; 64],
}

impl RegisterResponse2 {
    pub fn to_bytes(&self) -> [u8; 128] {
        let mut buf = [0u8; 128];
        self.status.write_into(&mut buf[0..2]);
        buf[2..66].copy_from_slice(&self.pub_key);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, PayloadError> {
        require(buf, 66)?;
        let status = Status::read_from(&buf[0..2])?;
        let mut pub_key = [0u8; 64];
        pub_key.copy_from_slice(&buf[2..66]);
        Ok(Self { status, pub_key })
    }
}

/// Request payload for `U2F_CHECKONLY`: 128-byte frame, first 32+64 bytes
/// are app_param ‖ keyhandle.
pub struct CheckOnlyRequest {
    pub app_param: [u8; 32],
    pub keyhandle: [u8; 64],
}

impl CheckOnlyRequest {
    pub fn to_bytes(&self) -> [u8; 128] {
        let mut buf = [0u8; 128];
        buf[0..32].copy_from_slice(&self.app_param);
        buf[32..96].copy_from_slice(&self.keyhandle);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, PayloadError> {
        require(buf, 96)?;
        let mut app_param = [0u8; 32];
        app_param.copy_from_slice(&buf[0..32]);
        let mut keyhandle = [0u8; 64];
        keyhandle.copy_from_slice(&buf[32..96]);
        Ok(Self { app_param, keyhandle })
    }
}

/// Response to `U2F_CHECKONLY`: one 4-byte frame.
pub struct CheckOnlyResponse {
    pub status: Status,
    pub valid: bool,
}

impl CheckOnlyResponse {
    pub fn to_bytes(&self) -> [u8; 4] {
        let mut buf = [0u8; 4];
        self.status.write_into(&mut buf[0..2]);
        buf[2] = self.valid as u8;
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, PayloadError> {
        require(buf, 3)?;
        let status = Status::read_from(&buf[0..2])?;
        Ok(Self { status, valid: buf[2] != 0 })
    }
}

/// Request payload for `U2F_AUTHENTICATE_SET`: first 64 bytes are
/// app_param ‖ chall_param.
pub struct AuthenticateSetRequest {
    pub app_param: [u8; 32],
    pub chall_param: [u8; 32],
}

impl AuthenticateSetRequest {
    pub fn to_bytes(&self) -> [u8; 128] {
        let mut buf = [0u8; 128];
        buf[0..32].copy_from_slice(&self.app_param);
        buf[32..64].copy_from_slice(&self.chall_param);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, PayloadError> {
        require(buf, 64)?;
        let mut app_param = [0u8; 32];
        app_param.copy_from_slice(&buf[0..32]);
        let mut chall_param = [0u8; 32];
        chall_param.copy_from_slice(&buf[32..64]);
        Ok(Self { app_param, chall_param })
    }
}

pub struct AuthenticateSetResponse {
    pub status: Status,
}

impl AuthenticateSetResponse {
    pub fn to_bytes(&self) -> [u8; 128] {
        let mut buf = [0u8; 128];
        self.status.write_into(&mut buf[0..2]);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, PayloadError> {
        Ok(Self { status: Status::read_from(buf)? })
    }
}

/// Request payload for `U2F_AUTHENTICATE_GO`: first 69 bytes are
/// keyhandle ‖ check_user ‖ counter (big-endian).
pub struct AuthenticateGoRequest {
    pub keyhandle: [u8; 64],
    pub check_user: bool,
    pub counter: u32,
}

impl AuthenticateGoRequest {
    pub fn to_bytes(&self) -> [u8; 128] {
        let mut buf = [0u8; 128];
        buf[0..64].copy_from_slice(&self.keyhandle);
        buf[64] = self.check_user as u8;
        buf[65..69].copy_from_slice(&self.counter.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, PayloadError> {
        require(buf, 69)?;
        let mut keyhandle = [0u8; 64];
        keyhandle.copy_from_slice(&buf[0..64]);
        let check_user = buf[64] != 0;
        let counter = u32::from_be_bytes(buf[65..69].try_into().unwrap());
        Ok(Self { keyhandle, check_user, counter })
    }
}

pub struct AuthenticateGoResponse {
    pub status: Status,
    pub valid: bool,
    pub user_presence: u8,
    pub signature: [u8; 64],
}

impl AuthenticateGoResponse {
    pub fn to_bytes(&self) -> [u8; 128] {
        let mut buf = [0u8; 128];
        self.status.write_into(&mut buf[0..2]);
        buf[2] = self.valid as u8;
        buf[3] = self.user_presence;
        buf[4..68].copy_from_slice(&self.signature);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, PayloadError> {
        require(buf, 68)?;
        let status = Status::read_from(&buf[0..2])?;
        let valid = buf[2] != 0;
        let user_presence = buf[3];
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&buf[4..68]);
        Ok(Self { status, valid, user_presence, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_version_roundtrip() {
        let resp = NameVersionResponse {
            status: Status::Ok,
            name0: NAME0,
            name1: NAME1,
            version: APP_VERSION,
        };
        let bytes = resp.to_bytes();
        let back = NameVersionResponse::from_bytes(&bytes).unwrap();
        assert!(back.is_identity());
    }

    #[test]
    fn status_bad_subcode_roundtrip() {
        let mut buf = [0u8; 4];
        Status::Bad(SubCode::StaleGo).write_into(&mut buf);
        let back = Status::read_from(&buf).unwrap();
        assert_eq!(back, Status::Bad(SubCode::StaleGo));
    }

    #[test]
    fn authenticate_go_request_roundtrip() {
        let req = AuthenticateGoRequest {
            keyhandle: [7u8; 64],
            check_user: true,
            counter: 0xdead_beef,
        };
        let bytes = req.to_bytes();
        let back = AuthenticateGoRequest::from_bytes(&bytes).unwrap();
        assert_eq!(back.keyhandle, req.keyhandle);
        assert_eq!(back.check_user, req.check_user);
        assert_eq!(back.counter, req.counter);
    }
}
