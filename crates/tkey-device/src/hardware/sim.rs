//! A host-testable `HardwareIo` implementation. Not the production device
//! image — it's the seam that lets `tkey-device`'s binary and test suite
//! run on a development host without real silicon, standing in for the
//! touch sensor, TRNG, and status LED.

use rand::RngCore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tkey_device_core::{Cdi, Deadline, HardwareIo, LedColor, TouchResult};

/// Shared touch latch a test (or an interactive CLI prompt) can set from
/// outside the engine loop.
#[derive(Clone, Default)]
pub struct TouchLatch(Arc<AtomicBool>);

impl TouchLatch {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn press(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct SimHardware {
    cdi: Cdi,
    rng: rand::rngs::OsRng,
    touch: TouchLatch,
}

impl SimHardware {
    pub fn new(cdi: Cdi, touch: TouchLatch) -> Self {
        Self { cdi, rng: rand::rngs::OsRng, touch }
    }
}

impl HardwareIo for SimHardware {
    fn read_cdi(&mut self) -> Cdi {
        self.cdi.clone()
    }

    fn next_trng_word(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn await_touch(&mut self, _timeout: Deadline, color: LedColor) -> TouchResult {
        tracing::info!(?color, "awaiting touch");
        // The host-testable backend has no real timer; a test or CLI
        // session presses `touch` to simulate user presence, or leaves it
        // unset to simulate a timeout.
        if self.touch.0.load(Ordering::SeqCst) {
            self.touch.0.store(false, Ordering::SeqCst);
            TouchResult::Touched
        } else {
            TouchResult::TimedOut
        }
    }

    fn set_led(&mut self, color: LedColor) {
        tracing::debug!(?color, "led");
    }

    fn clear_touch_event(&mut self) {
        self.touch.0.store(false, Ordering::SeqCst);
    }
}
