use tokio_util::sync::CancellationToken;

pub mod batch;
pub mod config;
pub mod deps;
pub mod list;
pub mod run;

/// Token that fires on Ctrl-C.
///
/// Installing the listener replaces the default SIGINT behaviour, so only call
/// this once the dependency prompt is out of the way.
pub fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });
    cancel
}
