pub mod capability;
pub mod config;
pub mod errors;
pub mod event;
pub mod net;
pub mod runtime;

pub use capability::{Capabilities, HostFacts, HostProbe, ResponseMode};
pub use config::{BridgeConfig, ResponseContext};
pub use errors::ResponseError;
pub use event::{ResponseEvent, ResponseId, ResponseState};
pub use net::IncomingResponse;
