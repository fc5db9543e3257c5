mod bridge;
#[cfg(feature = "reqwest_transport")]
mod fetch;
pub mod headers;
pub mod poll;
mod response;
pub mod stream;
pub mod streaming;
pub mod timer;

pub use bridge::{Bridge, Feed};
#[cfg(feature = "reqwest_transport")]
pub use fetch::fetch;
pub use response::{IncomingResponse, ProgressHandle, Transport};
