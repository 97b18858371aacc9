//! The device protocol engine: single-threaded frame dispatch loop
//! (spec.md §4.3, §5).
//!
//! One frame in, at most two frames out (`U2F_REGISTER`'s two-part
//! response), never more — the device does not pipeline operations
//! (spec.md §1 Non-goals). Framing errors resynchronize silently by
//! dropping a byte; frames addressed to an unknown endpoint are dropped
//! without a reply; the firmware endpoint always answers `BAD` (the app
//! never answers on behalf of the bootloader).

use crate::session::{SessionSlot, SigningSession};
use tkey_device_core::keyhandle::{self, AppParam, AuthenticateOutcome, ChallengeParam, KeyHandle, RegisterOutcome};
use tkey_device_core::{Cdi, HardwareIo};
use tkey_proto::command::{
    AuthenticateGoRequest, AuthenticateGoResponse, AuthenticateSetRequest, AuthenticateSetResponse,
    CheckOnlyRequest, CheckOnlyResponse, CommandCode, NameVersionResponse, RegisterRequest,
    RegisterResponse1, RegisterResponse2, Status, SubCode, APP_VERSION, NAME0, NAME1,
    RSP_UNKNOWN_CMD,
};
use tkey_proto::frame::{Endpoint, Frame, FrameHeader, FrameLen};

/// Drives one device app instance: owns the CDI (read once at
/// construction) and the hardware handle, and holds the single in-flight
/// SET/GO session.
pub struct Engine<H: HardwareIo> {
    hw: H,
    cdi: Cdi,
    session: SessionSlot,
}

impl<H: HardwareIo> Engine<H> {
    pub fn new(mut hw: H) -> Self {
        let cdi = hw.read_cdi();
        Self { hw, cdi, session: SessionSlot::default() }
    }

    /// Processes exactly one inbound frame, returning zero or more response
    /// frames to write back in order. A framing error produces no response
    /// and is silently swallowed by the caller (which resyncs by consuming
    /// one byte and trying again) — see `step_bytes`.
    pub fn handle_frame(&mut self, frame: &Frame) -> Vec<Frame> {
        match frame.header.endpoint {
            Endpoint::Unknown(_) => vec![],
            Endpoint::Firmware => vec![nok_frame(frame.header)],
            Endpoint::App => self.dispatch_app(frame),
        }
    }

    /// Consumes one frame's worth of bytes (if any) from the front of
    /// `buf`, returning the responses and the number of bytes consumed.
    /// On a framing error, one byte is dropped and zero responses are
    /// returned, matching spec.md §4.3/§7's resync rule.
    pub fn step_bytes(&mut self, buf: &[u8]) -> (Vec<Frame>, usize) {
        match Frame::decode(buf) {
            Ok((frame, consumed)) => (self.handle_frame(&frame), consumed),
            Err(_) => (vec![], 1.min(buf.len().max(1))),
        }
    }

    fn dispatch_app(&mut self, frame: &Frame) -> Vec<Frame> {
        let Some(&cmd_byte) = frame.payload.first() else {
            return vec![unknown_cmd_frame(frame.header)];
        };
        let Some(cmd) = CommandCode::from_byte(cmd_byte) else {
            return vec![unknown_cmd_frame(frame.header)];
        };
        let body = &frame.payload[1.min(frame.payload.len())..];
        match cmd {
            CommandCode::GetNameVersion => vec![self.handle_name_version(frame.header)],
            CommandCode::U2fRegister => self.handle_register(frame.header, body),
            CommandCode::U2fCheckOnly => vec![self.handle_check_only(frame.header, body)],
            CommandCode::U2fAuthenticateSet => vec![self.handle_authenticate_set(frame.header, body)],
            CommandCode::U2fAuthenticateGo => vec![self.handle_authenticate_go(frame.header, body)],
        }
    }

    fn handle_name_version(&self, header: FrameHeader) -> Frame {
        let payload = NameVersionResponse {
            status: Status::Ok,
            name0: NAME0,
            name1: NAME1,
            version: APP_VERSION,
        }
        .to_bytes();
        Frame::new(FrameHeader::new(header.id, Endpoint::App, FrameLen::Len32), payload.to_vec())
            .expect("payload length matches FrameLen::Len32")
    }

    fn handle_register(&mut self, header: FrameHeader, body: &[u8]) -> Vec<Frame> {
        let Ok(req) = RegisterRequest::from_bytes(body) else {
            return vec![unknown_cmd_frame(header)];
        };
        let app_param = AppParam(req.app_param);
        let outcome = keyhandle::register(&mut self.hw, &self.cdi, &app_param);
        let (status, user_presence, keyhandle_bytes, pub_key) = match outcome {
            Ok(RegisterOutcome::Registered { keyhandle, pub_key }) => {
                (Status::Ok, 1u8, keyhandle.to_bytes(), pub_key)
            }
            Ok(RegisterOutcome::NoPresence) => {
                // spec.md §7: user-presence negative is not an error.
                (Status::Ok, 0u8, [0u8; 64], [0u8; 65])
            }
            Err(_) => (Status::Bad(SubCode::ScalarOutOfRange), 0u8, [0u8; 64], [0u8; 65]),
        };
        let resp1 = RegisterResponse1 { status, user_presence, keyhandle: keyhandle_bytes }.to_bytes();
        let mut pub_key64 = [0u8; 64];
        pub_key64.copy_from_slice(&pub_key[1..]);
        let resp2 = RegisterResponse2 { status, pub_key: pub_key64 }.to_bytes();
        vec![
            frame128(header, resp1),
            frame128(header, resp2),
        ]
    }

    fn handle_check_only(&self, header: FrameHeader, body: &[u8]) -> Frame {
        let Ok(req) = CheckOnlyRequest::from_bytes(body) else {
            return unknown_cmd_frame(header);
        };
        let app_param = AppParam(req.app_param);
        let keyhandle = KeyHandle::from_bytes(&req.keyhandle);
        let valid = keyhandle::check_only(&self.cdi, &app_param, &keyhandle);
        let payload = CheckOnlyResponse { status: Status::Ok, valid }.to_bytes();
        Frame::new(FrameHeader::new(header.id, Endpoint::App, FrameLen::Len4), payload.to_vec())
            .expect("payload length matches FrameLen::Len4")
    }

    fn handle_authenticate_set(&mut self, header: FrameHeader, body: &[u8]) -> Frame {
        let Ok(req) = AuthenticateSetRequest::from_bytes(body) else {
            return unknown_cmd_frame(header);
        };
        self.session.set(SigningSession {
            app_param: AppParam(req.app_param),
            chall_param: ChallengeParam(req.chall_param),
        });
        let payload = AuthenticateSetResponse { status: Status::Ok }.to_bytes();
        frame128(header, payload)
    }

    fn handle_authenticate_go(&mut self, header: FrameHeader, body: &[u8]) -> Frame {
        let Ok(req) = AuthenticateGoRequest::from_bytes(body) else {
            return unknown_cmd_frame(header);
        };
        let Some(session) = self.session.take() else {
            let payload = AuthenticateGoResponse {
                status: Status::Bad(SubCode::StaleGo),
                valid: false,
                user_presence: 0,
                signature: [0u8; 64],
            }
            .to_bytes();
            return frame128(header, payload);
        };

        let keyhandle = KeyHandle::from_bytes(&req.keyhandle);
        let outcome = keyhandle::authenticate(
            &mut self.hw,
            &self.cdi,
            &session.app_param,
            &session.chall_param,
            &keyhandle,
            req.check_user,
            req.counter,
        );
        let (status, valid, user_presence, signature) = match outcome {
            Ok(AuthenticateOutcome::Signed { signature, user_presence }) => {
                (Status::Ok, true, user_presence, signature)
            }
            Ok(AuthenticateOutcome::Invalid) => (Status::Ok, false, 0u8, [0u8; 64]),
            // spec.md §4.2/§7: timeout is `(true, 0, —)`, not an error.
            Ok(AuthenticateOutcome::NoPresence) => (Status::Ok, true, 0u8, [0u8; 64]),
            Err(_) => (Status::Bad(SubCode::SignFailure), false, 0u8, [0u8; 64]),
        };
        let payload = AuthenticateGoResponse { status, valid, user_presence, signature }.to_bytes();
        frame128(header, payload)
    }
}

fn frame128(header: FrameHeader, payload: [u8; 128]) -> Frame {
    Frame::new(FrameHeader::new(header.id, Endpoint::App, FrameLen::Len128), payload.to_vec())
        .expect("payload length matches FrameLen::Len128")
}

fn unknown_cmd_frame(header: FrameHeader) -> Frame {
    Frame::new(
        FrameHeader::new(header.id, Endpoint::App, FrameLen::Len1),
        vec![RSP_UNKNOWN_CMD],
    )
    .expect("payload length matches FrameLen::Len1")
}

fn nok_frame(header: FrameHeader) -> Frame {
    Frame::new(FrameHeader::new(header.id, Endpoint::Firmware, FrameLen::Len1), vec![RSP_UNKNOWN_CMD])
        .expect("payload length matches FrameLen::Len1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::sim::{SimHardware, TouchLatch};
    use tkey_device_core::Cdi;
    use tkey_proto::command::CommandCode;

    fn engine_with_touch() -> (Engine<SimHardware>, TouchLatch) {
        let latch = TouchLatch::new();
        latch.press();
        let hw = SimHardware::new(Cdi::new([4u8; 32]), latch.clone());
        (Engine::new(hw), latch)
    }

    /// Builds an app-endpoint request frame: command byte followed by
    /// `body`, zero-padded out to the smallest frame length that fits.
    /// `body` here carries only the meaningful field bytes (not a
    /// pre-padded `to_bytes()` output) — the frame's own padding covers the
    /// rest, exactly as a real client would send it.
    fn app_frame(id: u8, cmd: CommandCode, body: &[u8]) -> Frame {
        let total_needed = 1 + body.len();
        let len = if total_needed <= 1 {
            FrameLen::Len1
        } else if total_needed <= 32 {
            FrameLen::Len32
        } else {
            FrameLen::Len128
        };
        let mut payload = vec![0u8; len.bytes()];
        payload[0] = cmd as u8;
        payload[1..1 + body.len()].copy_from_slice(body);
        Frame::new(FrameHeader::new(id, Endpoint::App, len), payload).unwrap()
    }

    #[test]
    fn unknown_endpoint_is_dropped() {
        let (mut engine, _latch) = engine_with_touch();
        let frame = Frame::new(FrameHeader::new(0, Endpoint::Unknown(2), FrameLen::Len1), vec![0]).unwrap();
        assert!(engine.handle_frame(&frame).is_empty());
    }

    #[test]
    fn firmware_endpoint_always_nok() {
        let (mut engine, _latch) = engine_with_touch();
        let frame = Frame::new(FrameHeader::new(0, Endpoint::Firmware, FrameLen::Len1), vec![0]).unwrap();
        let resp = engine.handle_frame(&frame);
        assert_eq!(resp.len(), 1);
        assert_eq!(resp[0].header.endpoint, Endpoint::Firmware);
    }

    #[test]
    fn name_version_reports_identity() {
        let (mut engine, _latch) = engine_with_touch();
        let frame = app_frame(0, CommandCode::GetNameVersion, &[]);
        let resp = engine.handle_frame(&frame);
        assert_eq!(resp.len(), 1);
        let nv = NameVersionResponse::from_bytes(&resp[0].payload).unwrap();
        assert!(nv.is_identity());
    }

    #[test]
    fn register_then_check_only_roundtrip() {
        let (mut engine, _latch) = engine_with_touch();
        let app_param = [9u8; 32];
        let frame = app_frame(0, CommandCode::U2fRegister, &app_param);
        let resp = engine.handle_frame(&frame);
        assert_eq!(resp.len(), 2);
        let r1 = RegisterResponse1::from_bytes(&resp[0].payload).unwrap();
        assert!(r1.status.is_ok());

        let mut body = Vec::new();
        body.extend_from_slice(&app_param);
        body.extend_from_slice(&r1.keyhandle);
        let check_frame = app_frame(0, CommandCode::U2fCheckOnly, &body);
        let check_resp = engine.handle_frame(&check_frame);
        let parsed = CheckOnlyResponse::from_bytes(&check_resp[0].payload).unwrap();
        assert!(parsed.valid);
    }

    #[test]
    fn go_without_set_is_stale() {
        let (mut engine, _latch) = engine_with_touch();
        let mut body = vec![0u8; 64];
        body.push(1); // check_user
        body.extend_from_slice(&1u32.to_be_bytes());
        let frame = app_frame(0, CommandCode::U2fAuthenticateGo, &body);
        let resp = engine.handle_frame(&frame);
        let parsed = AuthenticateGoResponse::from_bytes(&resp[0].payload).unwrap();
        assert_eq!(parsed.status, Status::Bad(SubCode::StaleGo));
    }

    #[test]
    fn set_then_go_signs() {
        let (mut engine, _latch) = engine_with_touch();
        let app_param = [9u8; 32];
        let reg = engine.handle_frame(&app_frame(0, CommandCode::U2fRegister, &app_param));
        let r1 = RegisterResponse1::from_bytes(&reg[0].payload).unwrap();

        let mut set_body = Vec::new();
        set_body.extend_from_slice(&app_param);
        set_body.extend_from_slice(&[5u8; 32]);
        engine.handle_frame(&app_frame(0, CommandCode::U2fAuthenticateSet, &set_body));

        let mut go_body = Vec::new();
        go_body.extend_from_slice(&r1.keyhandle);
        go_body.push(1); // check_user
        go_body.extend_from_slice(&1u32.to_be_bytes());
        let go_resp = engine.handle_frame(&app_frame(0, CommandCode::U2fAuthenticateGo, &go_body));
        let parsed = AuthenticateGoResponse::from_bytes(&go_resp[0].payload).unwrap();
        assert!(parsed.status.is_ok());
        assert!(parsed.valid);
    }

    #[test]
    fn go_times_out_reports_ok_valid_zero_presence() {
        let (mut engine, _latch) = engine_with_touch();
        let app_param = [9u8; 32];
        let reg = engine.handle_frame(&app_frame(0, CommandCode::U2fRegister, &app_param));
        let r1 = RegisterResponse1::from_bytes(&reg[0].payload).unwrap();

        let mut set_body = Vec::new();
        set_body.extend_from_slice(&app_param);
        set_body.extend_from_slice(&[5u8; 32]);
        engine.handle_frame(&app_frame(0, CommandCode::U2fAuthenticateSet, &set_body));

        // The touch latch was already consumed by registration above, so
        // this GO times out without a fresh press.
        let mut go_body = Vec::new();
        go_body.extend_from_slice(&r1.keyhandle);
        go_body.push(1); // check_user
        go_body.extend_from_slice(&1u32.to_be_bytes());
        let go_resp = engine.handle_frame(&app_frame(0, CommandCode::U2fAuthenticateGo, &go_body));
        let parsed = AuthenticateGoResponse::from_bytes(&go_resp[0].payload).unwrap();
        assert!(parsed.status.is_ok());
        assert!(parsed.valid);
        assert_eq!(parsed.user_presence, 0);
    }
}
