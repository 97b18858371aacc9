//! Stateless key derivation and signing core rooted in the Compound Device
//! Identifier (spec.md §3, §4.1, §4.2). Every secret this crate touches —
//! the CDI itself and the per-site derived scalar `k` — is zeroized on
//! drop and never appears in a `Debug` or log line.

pub mod cdi;
pub mod crypto;
pub mod hal;
pub mod keyhandle;
pub mod rng;

pub use cdi::Cdi;
pub use crypto::CryptoError;
pub use hal::{Deadline, HardwareIo, HwTrng, LedColor, TouchResult};
pub use keyhandle::{
    authenticate, check_only, compute_mac, derive_k, register, AppParam, AuthenticateOutcome,
    ChallengeParam, KeyHandle, KeyHandleError, RegisterOutcome,
};
pub use rng::{Drbg, RngError, TrngSource};
