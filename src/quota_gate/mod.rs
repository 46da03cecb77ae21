//! QuotaGate - Usage Quota Capability
//!
//! The orchestration core consumes exactly two operations: `can_upload`
//! (checked before the device is opened and before a file-based image is
//! accepted) and `decrement_uploads` (invoked once per fully successful
//! run, never on failure). The gate is injected, not ambient, so runs can
//! be exercised with fakes.

use tokio::sync::RwLock;

/// Capability interface consumed by the orchestration core
#[allow(async_fn_in_trait)]
pub trait QuotaGate: Send + Sync + 'static {
    /// Whether a new capture/analysis attempt may start
    async fn can_upload(&self) -> bool;

    /// Consume one operation after a fully successful run
    async fn decrement_uploads(&self);
}

#[derive(Debug)]
struct QuotaState {
    remaining: u32,
    authenticated: bool,
}

/// In-memory quota: authenticated users are unlimited, anonymous users get
/// a finite allowance of free operations
pub struct QuotaService {
    state: RwLock<QuotaState>,
}

/// Free operations granted to anonymous users
pub const DEFAULT_FREE_UPLOADS: u32 = 3;

impl QuotaService {
    /// Create new anonymous quota with the given allowance
    pub fn new(remaining: u32) -> Self {
        Self {
            state: RwLock::new(QuotaState {
                remaining,
                authenticated: false,
            }),
        }
    }

    /// Mark the session authenticated (unlimited operations)
    pub async fn set_authenticated(&self, authenticated: bool) {
        let mut state = self.state.write().await;
        state.authenticated = authenticated;
        tracing::info!(authenticated, "Quota authentication changed");
    }

    /// Remaining free operations (meaningful for anonymous sessions)
    pub async fn remaining(&self) -> u32 {
        self.state.read().await.remaining
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.authenticated
    }
}

impl Default for QuotaService {
    fn default() -> Self {
        Self::new(DEFAULT_FREE_UPLOADS)
    }
}

impl QuotaGate for QuotaService {
    async fn can_upload(&self) -> bool {
        let state = self.state.read().await;
        state.authenticated || state.remaining > 0
    }

    async fn decrement_uploads(&self) {
        let mut state = self.state.write().await;
        if state.authenticated {
            return;
        }
        state.remaining = state.remaining.saturating_sub(1);
        tracing::debug!(remaining = state.remaining, "Upload quota consumed");
    }
}
