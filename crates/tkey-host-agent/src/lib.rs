//! USB-HID U2F translator: raw-message dispatch, attestation signing, and
//! persistent counters sitting on top of `tkey-host-core`'s device client
//! (spec.md §4.5).

pub mod attestation;
pub mod counters;
pub mod hid;
pub mod translator;
pub mod u2f;
