//! Hardware abstraction seam (spec.md §9 re-architecture guidance).
//!
//! The key-handle core never touches a peripheral directly — it calls
//! through `HardwareIo`, so the same derivation/signing logic runs against
//! a host-testable simulator (`tkey-device::hardware::sim::SimHardware`) and
//! a genuine embedded backend without duplication. Kept allocation-free and
//! without a dependency on `std::time` so a bare-metal implementor can back
//! `Deadline` with a hardware timer instead of a wall clock.

use crate::cdi::Cdi;

/// An opaque, monotonically-increasing tick count. `HardwareIo` implementors
/// decide what a "tick" is (milliseconds, timer ticks, poll counts); the
/// core only ever compares a `Deadline` against itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(pub u64);

/// The touch button LED colors used to distinguish registration from
/// authentication while a touch is pending (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Off,
    Register,
    Authenticate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchResult {
    Touched,
    TimedOut,
}

/// The boundary between the stateless key-handle core and a physical (or
/// simulated) TKey device.
pub trait HardwareIo {
    /// Read the CDI. Called once at startup by the owning engine; the core
    /// never re-reads it mid-session.
    fn read_cdi(&mut self) -> Cdi;

    /// Draw one 32-bit word of hardware entropy, for `rng::TrngSource`.
    fn next_trng_word(&mut self) -> u32;

    /// Light the touch button `color` and block until the user touches it
    /// or `timeout` ticks elapse, whichever comes first.
    fn await_touch(&mut self, timeout: Deadline, color: LedColor) -> TouchResult;

    fn set_led(&mut self, color: LedColor);

    /// Clear any touch event latched since the last `await_touch`, so a
    /// stray touch before a new request doesn't satisfy it immediately.
    fn clear_touch_event(&mut self);
}

/// Adapts any `HardwareIo` into a `rng::TrngSource` by borrowing it, so the
/// key-handle core can hand the same hardware handle to the RNG without the
/// two traits being coupled.
pub struct HwTrng<'a, H: HardwareIo + ?Sized>(pub &'a mut H);

impl<'a, H: HardwareIo + ?Sized> crate::rng::TrngSource for HwTrng<'a, H> {
    fn next_word(&mut self) -> u32 {
        self.0.next_trng_word()
    }
}
