//! The SET/GO signing session. `AUTHENTICATE_SET` stages the parameters for
//! a signature; `AUTHENTICATE_GO` consumes them by value. There is no path
//! from GO back to a session that was never staged or was already consumed
//! — this is the fix for the unenforced ordering spec.md §9 calls out as an
//! open issue in the original firmware.

use tkey_device_core::keyhandle::{AppParam, ChallengeParam};

pub struct SigningSession {
    pub app_param: AppParam,
    pub chall_param: ChallengeParam,
}

#[derive(Default)]
pub struct SessionSlot(Option<SigningSession>);

impl SessionSlot {
    pub fn set(&mut self, session: SigningSession) {
        self.0 = Some(session);
    }

    /// Consumes the staged session, if any. A second call (or a call with
    /// nothing staged) returns `None` — the caller maps that to `StaleGo`.
    pub fn take(&mut self) -> Option<SigningSession> {
        self.0.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_without_set_is_none() {
        let mut slot = SessionSlot::default();
        assert!(slot.take().is_none());
    }

    #[test]
    fn go_consumes_session_once() {
        let mut slot = SessionSlot::default();
        slot.set(SigningSession {
            app_param: AppParam([1u8; 32]),
            chall_param: ChallengeParam([2u8; 32]),
        });
        assert!(slot.take().is_some());
        assert!(slot.take().is_none());
    }
}
