//! Continuation scheduling.
//!
//! Work that must happen on a later turn of the host's event loop (the deferred `Close`
//! notification, the streaming bridge's pipe) is handed to a [`Spawner`]. On tokio a spawned
//! task never runs inside the call that spawned it, which is exactly the guarantee needed.
//!
//! A consumer may drain a response from any executor. Outside a tokio runtime the
//! [`TokioSpawner`] runs the work on a short-lived thread through `futures::executor`, which
//! still keeps it out of the spawning call.

use futures::future::BoxFuture;

pub trait Spawner: Send + Sync {
    /// Run `fut` on a later turn of the event loop
    fn spawn(&self, fut: BoxFuture<'static, ()>);
}

/// Spawns onto the ambient tokio runtime, or a helper thread when there is none.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

impl Spawner for TokioSpawner {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(fut);
            }
            Err(_) => {
                log::debug!("no tokio runtime, running continuation on a helper thread");
                let spawned = std::thread::Builder::new()
                    .name("http-bridge-continuation".into())
                    .spawn(move || futures::executor::block_on(fut));
                if let Err(e) = spawned {
                    log::error!("cannot schedule continuation: {}", e);
                }
            }
        }
    }
}
