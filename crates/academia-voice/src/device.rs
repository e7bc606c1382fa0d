//! Exclusive ownership of the microphone and the audio output.
//!
//! A live session holds one guard per device; a second session asking for the
//! same device id through the same registry is refused until the guard drops.

use crate::error::{VoiceError, VoiceResult};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

static GLOBAL_REGISTRY: Lazy<Arc<DeviceRegistry>> = Lazy::new(|| Arc::new(DeviceRegistry::default()));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Microphone,
    Speaker,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Microphone => f.write_str("microphone"),
            DeviceKind::Speaker => f.write_str("speaker"),
        }
    }
}

/// Set of device ids currently held by live sessions.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    held: Mutex<HashSet<(DeviceKind, String)>>,
}

impl DeviceRegistry {
    /// A fresh registry to hand to the controllers that should contend with each other.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide registry shared by every controller that does not inject its own.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    pub fn acquire(self: &Arc<Self>, kind: DeviceKind, id: &str) -> VoiceResult<DeviceGuard> {
        let key = (kind, id.to_string());
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(key.clone()) {
            return Err(VoiceError::DeviceBusy(format!("{} {:?}", kind, id)));
        }
        debug!(target: "academia::voice", %kind, id, "device acquired");
        Ok(DeviceGuard {
            registry: Arc::clone(self),
            key,
        })
    }

    pub fn is_held(&self, kind: DeviceKind, id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(kind, id.to_string()))
    }
}

/// Releases the device when dropped.
#[derive(Debug)]
pub struct DeviceGuard {
    registry: Arc<DeviceRegistry>,
    key: (DeviceKind, String),
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        let mut held = self.registry.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.key);
        debug!(target: "academia::voice", kind = %self.key.0, id = %self.key.1, "device released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let registry = DeviceRegistry::shared();
        let guard = registry.acquire(DeviceKind::Microphone, "default").unwrap();
        assert!(matches!(
            registry.acquire(DeviceKind::Microphone, "default"),
            Err(VoiceError::DeviceBusy(_))
        ));
        drop(guard);
        assert!(!registry.is_held(DeviceKind::Microphone, "default"));
        assert!(registry.acquire(DeviceKind::Microphone, "default").is_ok());
    }

    #[test]
    fn kinds_do_not_collide() {
        let registry = DeviceRegistry::shared();
        let _mic = registry.acquire(DeviceKind::Microphone, "default").unwrap();
        assert!(registry.acquire(DeviceKind::Speaker, "default").is_ok());
    }
}
