//! Core primitives for a restartable DNS client: the wire-format codec
//! (name compression, packet assembly/parsing), the record type registry,
//! resolver configuration, and the hints database used to track nameserver
//! reachability.
//!
//! This crate is a library only — it has no transport and no CLI. Callers
//! supply sockets, the resolution state machine, and the hostname/wall-clock
//! primitives the platform provides.
#[macro_use]
pub mod macros;

pub mod clock;
pub mod error;
pub mod hints;
pub mod name;
pub mod packet;
pub mod resolv;
pub mod rr;
pub mod util;

/// Test-only logging setup, so `RUST_LOG=trace cargo test` surfaces the
/// `log::trace!`/`debug!` call sites scattered through the codec and hints
/// layers instead of them going nowhere.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub(crate) fn init_logging() {
        INIT.call_once(|| {
            let _ = env_logger::try_init();
        });
    }
}
