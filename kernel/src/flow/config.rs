//! Configuration du contrôleur de flux

use ek_types::{EkError, ErrorCode, Result, Ticks};

/// What a write does when the channel queue cannot take the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the new payload, keep the backlog
    RejectNew,
    /// Drop the oldest queued bytes until the payload fits
    EvictOld,
}

/// Tunables of one [`FlowController`](super::FlowController)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowConfig {
    /// Taille du tampon de formatage; un message est tronqué à `scratch_size - 1`
    pub scratch_size: usize,
    /// Délai de regroupement armé quand une file vide reçoit des données
    pub quiescent_interval: Ticks,
    /// Période minimale entre deux passes de `poll`
    pub poll_interval: Ticks,
    /// Octets maximum envoyés par canal et par passe
    pub max_chunk: usize,
    /// Octets maximum évincés par étape sous `EvictOld`
    pub evict_chunk: usize,
    pub policy: OverflowPolicy,
}

impl FlowConfig {
    /// Configuration par défaut (UART de télémétrie)
    pub const fn default_config() -> Self {
        FlowConfig {
            scratch_size: 256,
            quiescent_interval: 50,
            poll_interval: 5,
            max_chunk: 128,
            evict_chunk: 64,
            policy: OverflowPolicy::EvictOld,
        }
    }

    pub const fn with_policy(mut self, policy: OverflowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Reject values that would make a write or a drain impossible.
    pub fn validate(&self) -> Result<()> {
        if self.scratch_size < 2 {
            return Err(EkError::with_message(ErrorCode::InvalidParameter, "scratch_size"));
        }
        if self.poll_interval == 0 {
            return Err(EkError::with_message(ErrorCode::InvalidParameter, "poll_interval"));
        }
        if self.max_chunk == 0 || self.evict_chunk == 0 {
            return Err(EkError::with_message(ErrorCode::InvalidParameter, "chunk size"));
        }
        Ok(())
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self::default_config()
    }
}
