//! Hardware backends implementing `tkey_device_core::HardwareIo`.
//!
//! `sim` is the only backend shipped here: a host-testable stand-in driven
//! by an `OsRng`-backed TRNG and an atomic touch latch. A genuine embedded
//! backend (memory-mapped touch sensor and TRNG registers) implements the
//! same trait and is out of scope for this workspace (spec.md §1).

pub mod sim;
