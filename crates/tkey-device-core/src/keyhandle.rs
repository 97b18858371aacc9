//! Key-handle core: stateless per-site derivation, registration and
//! authentication (spec.md §4.2).
//!
//! Every operation here is a pure function of the CDI, the relying party's
//! `app_param`, and (for authentication) the key handle presented back to
//! the device — nothing is stored across calls, which is what lets the
//! device be stateless (spec.md §3, Invariant 3).

use crate::cdi::Cdi;
use crate::crypto::{self, CryptoError};
use crate::hal::{Deadline, HardwareIo, HwTrng, LedColor, TouchResult};
use crate::rng::Drbg;
use blake2::{Blake2s256, Digest};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

/// Opaque 32-byte relying-party identifier (SHA-256 of the party's
/// identity, computed host-side; the device never hashes it itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppParam(pub [u8; 32]);

/// Opaque 32-byte per-request challenge, supplied by the relying party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeParam(pub [u8; 32]);

/// A self-authenticating key handle: a nonce plus a MAC over
/// `app_param ‖ k`, both computed under the CDI. Carries no secret state of
/// its own — the private key `k` is re-derived from it on every use.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeyHandle {
    pub nonce: [u8; 32],
    pub mac: [u8; 32],
}

impl KeyHandle {
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.nonce);
        out[32..].copy_from_slice(&self.mac);
        out
    }

    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        let mut nonce = [0u8; 32];
        let mut mac = [0u8; 32];
        nonce.copy_from_slice(&bytes[..32]);
        mac.copy_from_slice(&bytes[32..]);
        Self { nonce, mac }
    }
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHandle")
            .field("nonce", &hex::encode(self.nonce))
            .field("mac", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum KeyHandleError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("user did not touch the device before the timeout elapsed")]
    NoPresence,
}

#[derive(Debug)]
pub enum RegisterOutcome {
    Registered { keyhandle: KeyHandle, pub_key: [u8; 65] },
    NoPresence,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthenticateOutcome {
    Signed { signature: [u8; 64], user_presence: u8 },
    Invalid,
    NoPresence,
}

/// `k = BLAKE2s-256(key = CDI, msg = app_param ‖ nonce)` — the private
/// scalar candidate for this site, zeroized by the caller once consumed.
pub fn derive_k(cdi: &Cdi, app_param: &AppParam, nonce: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let mut hasher = <Blake2s256 as blake2::digest::KeyInit>::new_from_slice(cdi.as_bytes())
        .expect("CDI is exactly the BLAKE2s key size");
    hasher.update(app_param.0);
    hasher.update(nonce);
    let digest: [u8; 32] = hasher.finalize().into();
    Zeroizing::new(digest)
}

/// `mac = BLAKE2s-256(key = CDI, msg = app_param ‖ k)` — binds the key
/// handle to both the relying party and the derived secret, so a key
/// handle only verifies under the CDI and app_param it was minted for.
pub fn compute_mac(cdi: &Cdi, app_param: &AppParam, k: &Zeroizing<[u8; 32]>) -> [u8; 32] {
    let mut hasher = <Blake2s256 as blake2::digest::KeyInit>::new_from_slice(cdi.as_bytes())
        .expect("CDI is exactly the BLAKE2s key size");
    hasher.update(app_param.0);
    hasher.update(k.as_slice());
    hasher.finalize().into()
}

const TOUCH_TIMEOUT_TICKS: u64 = 10_000;

fn await_presence(hw: &mut impl HardwareIo, color: LedColor) -> TouchResult {
    hw.clear_touch_event();
    hw.await_touch(Deadline(TOUCH_TIMEOUT_TICKS), color)
}

pub fn register(
    hw: &mut impl HardwareIo,
    cdi: &Cdi,
    app_param: &AppParam,
) -> Result<RegisterOutcome, KeyHandleError> {
    if await_presence(hw, LedColor::Register) == TouchResult::TimedOut {
        hw.set_led(LedColor::Off);
        return Ok(RegisterOutcome::NoPresence);
    }

    let mut drbg = Drbg::init(cdi, &mut HwTrng(hw));
    let nonce = drbg.generate_nonce(&mut HwTrng(hw));
    let k = derive_k(cdi, app_param, &nonce);
    let (signing_key, verifying_key) = crypto::keypair_from_bytes(&k)?;
    let mac = compute_mac(cdi, app_param, &k);
    drop(k);
    drop(signing_key);

    hw.set_led(LedColor::Off);
    Ok(RegisterOutcome::Registered {
        keyhandle: KeyHandle { nonce, mac },
        pub_key: crypto::encode_uncompressed_point(&verifying_key),
    })
}

/// Verifies that `keyhandle` was minted for `app_param` under `cdi`, with
/// no touch and no RNG draw — used both standalone (U2F `CheckOnly`) and as
/// the first step of `authenticate`.
pub fn check_only(cdi: &Cdi, app_param: &AppParam, keyhandle: &KeyHandle) -> bool {
    let k = derive_k(cdi, app_param, &keyhandle.nonce);
    let expected = compute_mac(cdi, app_param, &k);
    expected.ct_eq(&keyhandle.mac).into()
}

/// Verifies `keyhandle`, gates on touch when `check_user` is set, and signs
/// `app_param ‖ user_presence ‖ counter (big-endian) ‖ chall_param` (69
/// bytes total, spec.md §4.2) with the re-derived key `k`. A touch timeout
/// is not a failure: it reports back as `user_presence=0` with no
/// signature, per spec.md §7's "user-presence negative is not an error".
pub fn authenticate(
    hw: &mut impl HardwareIo,
    cdi: &Cdi,
    app_param: &AppParam,
    chall_param: &ChallengeParam,
    keyhandle: &KeyHandle,
    check_user: bool,
    counter: u32,
) -> Result<AuthenticateOutcome, KeyHandleError> {
    if !check_only(cdi, app_param, keyhandle) {
        return Ok(AuthenticateOutcome::Invalid);
    }

    let user_presence: u8 = if check_user {
        if await_presence(hw, LedColor::Authenticate) == TouchResult::TimedOut {
            hw.set_led(LedColor::Off);
            return Ok(AuthenticateOutcome::NoPresence);
        }
        1
    } else {
        0
    };

    let k = derive_k(cdi, app_param, &keyhandle.nonce);
    let (signing_key, _) = crypto::keypair_from_bytes(&k)?;

    let mut message = Vec::with_capacity(69);
    message.extend_from_slice(&app_param.0);
    message.push(user_presence);
    message.extend_from_slice(&counter.to_be_bytes());
    message.extend_from_slice(&chall_param.0);
    let signature = crypto::sign_raw(&signing_key, &message)?;

    hw.set_led(LedColor::Off);
    Ok(AuthenticateOutcome::Signed { signature, user_presence })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::TouchResult;

    struct FixedHw {
        cdi: Cdi,
        trng: u32,
        touch: TouchResult,
    }

    impl HardwareIo for FixedHw {
        fn read_cdi(&mut self) -> Cdi {
            self.cdi.clone()
        }
        fn next_trng_word(&mut self) -> u32 {
            self.trng = self.trng.wrapping_add(1);
            self.trng
        }
        fn await_touch(&mut self, _timeout: Deadline, _color: LedColor) -> TouchResult {
            self.touch
        }
        fn set_led(&mut self, _color: LedColor) {}
        fn clear_touch_event(&mut self) {}
    }

    fn hw(touch: TouchResult) -> FixedHw {
        FixedHw { cdi: Cdi::new([4u8; 32]), trng: 0, touch }
    }

    #[test]
    fn derivation_is_deterministic() {
        let cdi = Cdi::new([1u8; 32]);
        let app = AppParam([2u8; 32]);
        let nonce = [3u8; 32];
        let k1 = derive_k(&cdi, &app, &nonce);
        let k2 = derive_k(&cdi, &app, &nonce);
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn different_cdi_gives_different_mac() {
        let app = AppParam([2u8; 32]);
        let nonce = [3u8; 32];
        let cdi_a = Cdi::new([1u8; 32]);
        let cdi_b = Cdi::new([9u8; 32]);
        let k_a = derive_k(&cdi_a, &app, &nonce);
        let k_b = derive_k(&cdi_b, &app, &nonce);
        let mac_a = compute_mac(&cdi_a, &app, &k_a);
        let mac_b = compute_mac(&cdi_b, &app, &k_b);
        assert_ne!(mac_a, mac_b);
    }

    #[test]
    fn register_then_check_only_accepts() {
        let mut device = hw(TouchResult::Touched);
        let cdi = device.cdi.clone();
        let app = AppParam([6u8; 32]);
        let outcome = register(&mut device, &cdi, &app).unwrap();
        let RegisterOutcome::Registered { keyhandle, .. } = outcome else {
            panic!("expected registration");
        };
        assert!(check_only(&cdi, &app, &keyhandle));
    }

    #[test]
    fn check_only_rejects_wrong_app_param() {
        let mut device = hw(TouchResult::Touched);
        let cdi = device.cdi.clone();
        let app = AppParam([6u8; 32]);
        let other_app = AppParam([7u8; 32]);
        let outcome = register(&mut device, &cdi, &app).unwrap();
        let RegisterOutcome::Registered { keyhandle, .. } = outcome else {
            panic!("expected registration");
        };
        assert!(!check_only(&cdi, &other_app, &keyhandle));
    }

    #[test]
    fn register_times_out_without_touch() {
        let mut device = hw(TouchResult::TimedOut);
        let cdi = device.cdi.clone();
        let app = AppParam([6u8; 32]);
        let outcome = register(&mut device, &cdi, &app).unwrap();
        assert!(matches!(outcome, RegisterOutcome::NoPresence));
    }

    #[test]
    fn authenticate_signs_for_valid_handle() {
        let mut device = hw(TouchResult::Touched);
        let cdi = device.cdi.clone();
        let app = AppParam([6u8; 32]);
        let chall = ChallengeParam([8u8; 32]);
        let RegisterOutcome::Registered { keyhandle, .. } =
            register(&mut device, &cdi, &app).unwrap()
        else {
            panic!("expected registration");
        };
        let outcome = authenticate(&mut device, &cdi, &app, &chall, &keyhandle, true, 0).unwrap();
        assert!(matches!(outcome, AuthenticateOutcome::Signed { user_presence: 1, .. }));
    }

    #[test]
    fn authenticate_rejects_tampered_handle() {
        let mut device = hw(TouchResult::Touched);
        let cdi = device.cdi.clone();
        let app = AppParam([6u8; 32]);
        let chall = ChallengeParam([8u8; 32]);
        let RegisterOutcome::Registered { mut keyhandle, .. } =
            register(&mut device, &cdi, &app).unwrap()
        else {
            panic!("expected registration");
        };
        keyhandle.mac[0] ^= 0xff;
        let outcome = authenticate(&mut device, &cdi, &app, &chall, &keyhandle, true, 0).unwrap();
        assert_eq!(outcome, AuthenticateOutcome::Invalid);
    }

    #[test]
    fn authenticate_times_out_reports_ok_with_zero_presence() {
        let mut device = hw(TouchResult::Touched);
        let cdi = device.cdi.clone();
        let app = AppParam([6u8; 32]);
        let chall = ChallengeParam([8u8; 32]);
        let RegisterOutcome::Registered { keyhandle, .. } =
            register(&mut device, &cdi, &app).unwrap()
        else {
            panic!("expected registration");
        };
        device.touch = TouchResult::TimedOut;
        let outcome = authenticate(&mut device, &cdi, &app, &chall, &keyhandle, true, 0).unwrap();
        assert_eq!(outcome, AuthenticateOutcome::NoPresence);
    }

    #[test]
    fn authenticate_without_check_user_signs_with_zero_presence() {
        let mut device = hw(TouchResult::Touched);
        let cdi = device.cdi.clone();
        let app = AppParam([6u8; 32]);
        let chall = ChallengeParam([8u8; 32]);
        let RegisterOutcome::Registered { keyhandle, .. } =
            register(&mut device, &cdi, &app).unwrap()
        else {
            panic!("expected registration");
        };
        // check_user=false must never await touch, so a timed-out latch
        // still signs rather than reporting NoPresence.
        device.touch = TouchResult::TimedOut;
        let outcome = authenticate(&mut device, &cdi, &app, &chall, &keyhandle, false, 3).unwrap();
        assert!(matches!(outcome, AuthenticateOutcome::Signed { user_presence: 0, .. }));
    }
}
