//! Translates decoded U2F raw messages into device-client operations and
//! back into U2F raw responses (spec.md §4.5).
//!
//! Holds the outer, browser-semantics operation lock — the teacher's
//! two-layer locking pattern (`guard-core`'s inner IPC mutex, the
//! connected-state machine's outer serialization) generalized here to
//! "the inner `tokio::sync::Mutex` in `DeviceClient` serializes wire
//! operations; this outer mutex serializes logical HID operations so two
//! concurrent U2F requests from the browser never interleave."

use crate::attestation::AttestationKey;
use crate::counters::CounterStore;
use crate::hid::HidChannel;
use crate::u2f::{ControlByte, RawMessage, StatusWord};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tkey_host_core::connection::{ClientError, FirmwareLoader, PortLocator};
use tkey_host_core::{ops, DeviceClient};

#[derive(Debug, Error)]
pub enum TranslatorError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Counter(#[from] crate::counters::CounterError),
}

/// U2F protocol version string returned for the `U2F_VERSION` raw message.
const U2F_VERSION: &[u8] = b"U2F_V2";

/// Key-handle length the wire protocol fixes (spec.md §4.2/§4.5) — an
/// `Authenticate` request whose key handle isn't this length can't be one
/// this device minted.
const KEY_HANDLE_LEN: usize = 64;

pub struct Translator<P: PortLocator, F: FirmwareLoader> {
    lock: Mutex<()>,
    client: DeviceClient<P, F>,
    attestation: AttestationKey,
    counters: Mutex<CounterStore>,
}

impl<P: PortLocator, F: FirmwareLoader> Translator<P, F> {
    pub fn new(client: DeviceClient<P, F>, attestation: AttestationKey, counters: CounterStore) -> Self {
        Self { lock: Mutex::new(()), client, attestation, counters: Mutex::new(counters) }
    }

    /// Runs one HID channel to completion: pulls requests until the
    /// channel closes, handling each one serialized against every other
    /// logical operation on this translator.
    pub async fn serve(&self, channel: &mut (dyn HidChannel + '_)) {
        while let Some((ins, p1, data)) = channel.recv_request().await {
            let msg = RawMessage::decode(ins, p1, &data);
            let (body, status) = self.handle(msg).await;
            channel.send_response(body, status.to_bytes()).await;
        }
    }

    pub async fn handle(&self, msg: RawMessage) -> (Vec<u8>, StatusWord) {
        let _guard = self.lock.lock().await;
        match msg {
            RawMessage::Version => (U2F_VERSION.to_vec(), StatusWord::NoError),
            RawMessage::Register { chall_param, app_param } => {
                self.handle_register(&chall_param, &app_param).await
            }
            RawMessage::Authenticate { control, chall_param, app_param, key_handle } => {
                self.handle_authenticate(control, &chall_param, &app_param, &key_handle).await
            }
            RawMessage::Unknown { .. } => (Vec::new(), StatusWord::ClaNotSupported),
        }
    }

    async fn handle_register(&self, chall_param: &[u8; 32], app_param: &[u8; 32]) -> (Vec<u8>, StatusWord) {
        match ops::u2f_register(&self.client, app_param).await {
            // spec.md §4.5/S2: no touch before the timeout reports back as
            // ConditionsNotSatisfied, not an error.
            Ok(result) if result.user_presence == 0 => {
                (Vec::new(), StatusWord::ConditionsNotSatisfied)
            }
            Ok(result) => {
                let resp = self.attestation.build_registration_response(
                    app_param,
                    chall_param,
                    &result.keyhandle,
                    &result.pub_key,
                );
                (resp, StatusWord::NoError)
            }
            Err(_) => (Vec::new(), StatusWord::WrongData),
        }
    }

    async fn handle_authenticate(
        &self,
        control: ControlByte,
        chall_param: &[u8; 32],
        app_param: &[u8; 32],
        key_handle: &[u8],
    ) -> (Vec<u8>, StatusWord) {
        if key_handle.len() != KEY_HANDLE_LEN {
            return (Vec::new(), StatusWord::WrongData);
        }
        let mut handle_arr = [0u8; KEY_HANDLE_LEN];
        handle_arr.copy_from_slice(key_handle);

        if control == ControlByte::CheckOnly {
            return match ops::u2f_check_only(&self.client, app_param, &handle_arr).await {
                // U2F's CheckOnly quirk: a *valid* handle is reported back
                // to the relying party as ConditionsNotSatisfied, not
                // NoError — spec.md §4.5, S5.
                Ok(true) => (Vec::new(), StatusWord::ConditionsNotSatisfied),
                Ok(false) => (Vec::new(), StatusWord::WrongData),
                Err(_) => (Vec::new(), StatusWord::WrongData),
            };
        }

        let counter = {
            let mut counters = self.counters.lock().await;
            match counters.next(key_handle) {
                Ok(c) => c,
                Err(_) => return (Vec::new(), StatusWord::WrongData),
            }
        };

        let check_user = control.check_user();
        match ops::u2f_authenticate(&self.client, app_param, chall_param, &handle_arr, check_user, counter)
            .await
        {
            Ok(resp) if !resp.status.is_ok() || !resp.valid => (Vec::new(), StatusWord::WrongData),
            // spec.md §4.5: presence required but not given reports back as
            // ConditionsNotSatisfied, not a signed response.
            Ok(resp) if check_user && resp.user_presence == 0 => {
                (Vec::new(), StatusWord::ConditionsNotSatisfied)
            }
            Ok(resp) => {
                let Ok(der_sig) = tkey_host_core::der::raw_to_der(&resp.signature) else {
                    return (Vec::new(), StatusWord::WrongData);
                };
                let mut body = Vec::with_capacity(1 + 4 + der_sig.len());
                body.push(resp.user_presence);
                body.extend_from_slice(&counter.to_be_bytes());
                body.extend_from_slice(&der_sig);
                (body, StatusWord::NoError)
            }
            Err(_) => (Vec::new(), StatusWord::WrongData),
        }
    }
}
