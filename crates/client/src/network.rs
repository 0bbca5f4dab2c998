//! Host network signal.
//!
//! The host (desktop shell, webview bridge, OS hook) owns the real
//! online/offline flag and pushes changes into a [`HostNetwork`]. The probe
//! reads it through the [`NetworkSignal`] trait.

use std::sync::atomic::{AtomicBool, Ordering};

/// The platform's native "do we have a network at all" flag.
pub trait NetworkSignal: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Flag set by the host whenever the platform reports a change.
#[derive(Debug)]
pub struct HostNetwork {
    online: AtomicBool,
}

impl HostNetwork {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Record a native online/offline event. Returns the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::AcqRel)
    }
}

impl Default for HostNetwork {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkSignal for HostNetwork {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}
