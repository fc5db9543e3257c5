use crate::net::poll::PollBridge;
use crate::net::stream::Producer;
use crate::net::streaming::StreamingBridge;

/// Moves whatever the transport has made available into the byte stream.
pub trait Feed {
    fn feed(&mut self, producer: &Producer);
}

/// The bridge active for a response. Exactly one exists per response and it never changes.
pub enum Bridge {
    Poll(PollBridge),
    Streaming(StreamingBridge),
}

impl Feed for Bridge {
    fn feed(&mut self, producer: &Producer) {
        match self {
            Bridge::Poll(bridge) => bridge.feed(producer),
            Bridge::Streaming(bridge) => bridge.feed(producer),
        }
    }
}
