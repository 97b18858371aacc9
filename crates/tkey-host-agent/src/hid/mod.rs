//! The seam to the out-of-scope USB-HID gadget layer (spec.md §1): this
//! crate assumes something else decodes U2FHID framing into raw request
//! bytes and re-encodes raw responses back into HID reports. `HidChannel`
//! is that boundary; `mock` is the only implementation shipped here.

pub mod mock;

/// Delivers a decoded U2F raw-message request (`ins`, `p1`, `data`) and
/// accepts the raw response bytes plus status word. A real implementation
/// would sit on top of a USB HID gadget driver; that driver itself is out
/// of scope here.
#[async_trait::async_trait]
pub trait HidChannel: Send + Sync {
    async fn recv_request(&mut self) -> Option<(u8, u8, Vec<u8>)>;
    async fn send_response(&mut self, body: Vec<u8>, status: [u8; 2]);
}
