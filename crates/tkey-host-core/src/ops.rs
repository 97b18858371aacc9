//! The three U2F operations the host client exposes (spec.md §4.4): encode
//! a request, transact it over the wire, decode and interpret the
//! response(s).

use crate::connection::{ClientError, DeviceClient, FirmwareLoader, PortLocator};
use tkey_proto::command::{
    AuthenticateGoRequest, AuthenticateGoResponse, AuthenticateSetRequest, AuthenticateSetResponse,
    CheckOnlyRequest, CheckOnlyResponse, CommandCode, RegisterRequest, RegisterResponse1,
    RegisterResponse2,
};
use tkey_proto::frame::{Endpoint, Frame, FrameHeader, FrameLen};

/// Uncompressed SEC1 point marker prepended to the public key on the wire
/// (spec.md §4.4).
const UNCOMPRESSED_POINT_MARKER: u8 = 0x04;

pub struct RegisterResult {
    pub keyhandle: [u8; 64],
    pub pub_key: [u8; 65],
    /// `0` if the user never touched the device before the timeout
    /// (spec.md §7) — the caller still gets a well-formed (if unusable)
    /// result rather than an error in that case.
    pub user_presence: u8,
}

fn request_frame(cmd: CommandCode, body: &[u8]) -> Frame {
    let total = 1 + body.len();
    let len = if total <= 1 {
        FrameLen::Len1
    } else if total <= 4 {
        FrameLen::Len4
    } else if total <= 32 {
        FrameLen::Len32
    } else {
        FrameLen::Len128
    };
    let mut payload = vec![0u8; len.bytes()];
    payload[0] = cmd as u8;
    payload[1..1 + body.len()].copy_from_slice(body);
    Frame::new(FrameHeader::new(0, Endpoint::App, len), payload)
        .expect("body sized to fit the chosen frame length")
}

pub async fn u2f_register<P: PortLocator, F: FirmwareLoader>(
    client: &DeviceClient<P, F>,
    app_param: &[u8; 32],
) -> Result<RegisterResult, ClientError> {
    let req = RegisterRequest { app_param: *app_param };
    let frame = request_frame(CommandCode::U2fRegister, &req.app_param);
    let responses = client.transact(&frame, 2).await?;

    let r1 = RegisterResponse1::from_bytes(&responses[0].payload)?;
    if !r1.status.is_ok() {
        return Err(ClientError::UnexpectedResponse);
    }
    let r2 = RegisterResponse2::from_bytes(&responses[1].payload)?;
    if !r2.status.is_ok() {
        return Err(ClientError::UnexpectedResponse);
    }

    let mut pub_key = [0u8; 65];
    pub_key[0] = UNCOMPRESSED_POINT_MARKER;
    pub_key[1..].copy_from_slice(&r2.pub_key);

    Ok(RegisterResult { keyhandle: r1.keyhandle, pub_key, user_presence: r1.user_presence })
}

pub async fn u2f_check_only<P: PortLocator, F: FirmwareLoader>(
    client: &DeviceClient<P, F>,
    app_param: &[u8; 32],
    keyhandle: &[u8; 64],
) -> Result<bool, ClientError> {
    let req = CheckOnlyRequest { app_param: *app_param, keyhandle: *keyhandle };
    let mut body = Vec::with_capacity(96);
    body.extend_from_slice(&req.app_param);
    body.extend_from_slice(&req.keyhandle);
    let frame = request_frame(CommandCode::U2fCheckOnly, &body);
    let responses = client.transact(&frame, 1).await?;
    let resp = CheckOnlyResponse::from_bytes(&responses[0].payload)?;
    Ok(resp.valid)
}

pub async fn u2f_authenticate<P: PortLocator, F: FirmwareLoader>(
    client: &DeviceClient<P, F>,
    app_param: &[u8; 32],
    chall_param: &[u8; 32],
    keyhandle: &[u8; 64],
    check_user: bool,
    counter: u32,
) -> Result<AuthenticateGoResponse, ClientError> {
    let set_req = AuthenticateSetRequest { app_param: *app_param, chall_param: *chall_param };
    let mut set_body = Vec::with_capacity(64);
    set_body.extend_from_slice(&set_req.app_param);
    set_body.extend_from_slice(&set_req.chall_param);
    let set_frame = request_frame(CommandCode::U2fAuthenticateSet, &set_body);
    let set_responses = client.transact(&set_frame, 1).await?;
    let set_resp = AuthenticateSetResponse::from_bytes(&set_responses[0].payload)?;
    if !set_resp.status.is_ok() {
        return Err(ClientError::UnexpectedResponse);
    }

    let go_req = AuthenticateGoRequest { keyhandle: *keyhandle, check_user, counter };
    let mut go_body = Vec::with_capacity(69);
    go_body.extend_from_slice(&go_req.keyhandle);
    go_body.push(go_req.check_user as u8);
    go_body.extend_from_slice(&go_req.counter.to_be_bytes());
    let go_frame = request_frame(CommandCode::U2fAuthenticateGo, &go_body);
    let go_responses = client.transact(&go_frame, 1).await?;
    Ok(AuthenticateGoResponse::from_bytes(&go_responses[0].payload)?)
}
