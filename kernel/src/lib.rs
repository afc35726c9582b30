// src/lib.rs
// Point d'entrée de la bibliothèque du runtime EK
#![cfg_attr(not(test), no_std)] // Pas de bibliothèque standard sur cible

//! Runtime core for small microcontrollers.
//!
//! - [`memory`]: first-fit arena with split/coalesce and [`memory::ArenaBox`]
//! - [`collections`]: ownership-checked intrusive list, byte ring queue, byte stack
//! - [`flow`]: multi-channel output controller with coalesced, rate-limited draining
//! - [`logger`]: `log` backend over a board byte sink
//!
//! Nothing here locks or allocates from a global heap. Every structure is
//! either built over caller-owned memory or carved from a
//! [`memory::MemoryArena`].

// Modules du runtime
pub mod collections;
pub mod flow;
pub mod logger;
pub mod memory;

pub use ek_types::{EkError, ErrorCode, Result, Ticks};

/// Macro d'écriture formatée sur un canal du contrôleur de flux
///
/// `flow_write!(controller, channel, "fmt", args...)` expands to
/// [`FlowController::write`](flow::FlowController::write) with `format_args!`.
#[macro_export]
macro_rules! flow_write {
    ($ctl:expr, $channel:expr, $($arg:tt)*) => {
        $ctl.write($channel, format_args!($($arg)*))
    };
}
