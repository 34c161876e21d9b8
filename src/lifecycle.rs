//! Shared init/cleanup contract for components that own a network handle
//! Every fetcher, provider and generator goes Uninitialized -> Ready -> Closed

use async_trait::async_trait;
use std::future::Future;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{component} has been cleaned up and cannot be used")]
    Closed { component: String },

    #[error("Failed to initialize {component}: {message}")]
    InitFailed { component: String, message: String },
}

impl LifecycleError {
    pub fn init_failed<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        LifecycleError::InitFailed {
            component: component.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Ready,
    Closed,
}

/// Capability every component exposes to its owner.
///
/// `initialize` acquires shared resources and must be idempotent. `cleanup`
/// releases them unconditionally and never fails; it is safe to call on a
/// component whose `initialize` never ran or failed halfway.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    fn name(&self) -> &str;

    async fn initialize(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn cleanup(&self) {}
}

enum Slot<T> {
    Uninitialized,
    Ready(T),
    Closed,
}

/// A process-scoped handle (HTTP client, model connection) behind the lifecycle
/// state machine.
///
/// Handles are cheap to clone and shared read-only, so callers get their own
/// copy and the lock is never held across a request.
pub struct Resource<T> {
    component: String,
    slot: RwLock<Slot<T>>,
}

impl<T: Clone + Send + Sync> Resource<T> {
    pub fn new<S: Into<String>>(component: S) -> Self {
        Self {
            component: component.into(),
            slot: RwLock::new(Slot::Uninitialized),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        match &*self.slot.read().await {
            Slot::Uninitialized => LifecycleState::Uninitialized,
            Slot::Ready(_) => LifecycleState::Ready,
            Slot::Closed => LifecycleState::Closed,
        }
    }

    /// Explicit acquisition. A ready resource is returned as-is; a closed one is
    /// re-opened.
    pub async fn acquire<F, Fut>(&self, init: F) -> Result<T, LifecycleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LifecycleError>>,
    {
        let mut slot = self.slot.write().await;
        if let Slot::Ready(handle) = &*slot {
            return Ok(handle.clone());
        }

        let handle = init().await?;
        *slot = Slot::Ready(handle.clone());
        info!(component = %self.component, "Resource acquired");
        Ok(handle)
    }

    /// Lazy acquisition on first use. Refuses to resurrect a released resource.
    pub async fn get_or_acquire<F, Fut>(&self, init: F) -> Result<T, LifecycleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LifecycleError>>,
    {
        {
            let slot = self.slot.read().await;
            match &*slot {
                Slot::Ready(handle) => return Ok(handle.clone()),
                Slot::Closed => return Err(self.closed()),
                Slot::Uninitialized => {}
            }
        }

        // Double-checked: another task may have won the race for the write lock
        let mut slot = self.slot.write().await;
        match &*slot {
            Slot::Ready(handle) => return Ok(handle.clone()),
            Slot::Closed => return Err(self.closed()),
            Slot::Uninitialized => {}
        }

        debug!(component = %self.component, "Lazily acquiring resource on first use");
        let handle = init().await?;
        *slot = Slot::Ready(handle.clone());
        info!(component = %self.component, "Resource acquired");
        Ok(handle)
    }

    /// Drop the handle and mark the resource closed. Returns whether a live
    /// handle was released.
    pub async fn release(&self) -> bool {
        let mut slot = self.slot.write().await;
        let was_ready = matches!(*slot, Slot::Ready(_));
        *slot = Slot::Closed;
        if was_ready {
            info!(component = %self.component, "Resource released");
        }
        was_ready
    }

    fn closed(&self) -> LifecycleError {
        LifecycleError::Closed {
            component: self.component.clone(),
        }
    }
}
