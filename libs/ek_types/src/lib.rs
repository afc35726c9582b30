#![cfg_attr(not(test), no_std)]

pub mod error;

// Réexportations
pub use error::{EkError, ErrorCode, Result};

/// Unité de temps fournie par la source de ticks (ms sur la plupart des cibles).
///
/// Les comparaisons se font toujours en arithmétique modulaire
/// (`wrapping_sub`) pour survivre au débordement du compteur.
pub type Ticks = u32;
