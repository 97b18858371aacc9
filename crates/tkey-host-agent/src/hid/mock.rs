//! An in-process `HidChannel` test double: requests are pushed in by a
//! test and responses are collected, with no real HID transport involved.
//! Sufficient for the end-to-end scenarios in spec.md §8.

use super::HidChannel;
use std::collections::VecDeque;

pub struct MockHidChannel {
    requests: VecDeque<(u8, u8, Vec<u8>)>,
    pub responses: Vec<(Vec<u8>, [u8; 2])>,
}

impl MockHidChannel {
    pub fn new() -> Self {
        Self { requests: VecDeque::new(), responses: Vec::new() }
    }

    pub fn push_request(&mut self, ins: u8, p1: u8, data: Vec<u8>) {
        self.requests.push_back((ins, p1, data));
    }
}

impl Default for MockHidChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HidChannel for MockHidChannel {
    async fn recv_request(&mut self) -> Option<(u8, u8, Vec<u8>)> {
        self.requests.pop_front()
    }

    async fn send_response(&mut self, body: Vec<u8>, status: [u8; 2]) {
        self.responses.push((body, status));
    }
}
