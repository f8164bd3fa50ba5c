//! One-shot microphone permission query.

use cpal::traits::{DeviceTrait, HostTrait};
use log::{info, warn};

use crate::pending::Pending;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionResult {
    Granted,
    Denied,
}

/// Cached outcome of the startup query
///
/// Not blocked until the query says otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionState {
    blocked: bool,
    resolved: bool,
}

impl PermissionState {
    pub fn blocked(&self) -> bool {
        self.blocked
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub(crate) fn apply(&mut self, result: PermissionResult) {
        self.blocked = result == PermissionResult::Denied;
        self.resolved = true;
    }
}

/// Asynchronous user-media permission query
pub trait PermissionQuery {
    fn request(&mut self) -> Pending<PermissionResult>;
}

impl<F> PermissionQuery for F
where
    F: FnMut() -> Pending<PermissionResult>,
{
    fn request(&mut self) -> Pending<PermissionResult> {
        self()
    }
}

/// Grants access when a default input device with a usable config exists
#[derive(Debug, Default, Clone, Copy)]
pub struct MicrophoneProbe;

impl PermissionQuery for MicrophoneProbe {
    fn request(&mut self) -> Pending<PermissionResult> {
        Pending::spawn("mic-permission", || {
            let host = cpal::default_host();
            let Some(device) = host.default_input_device() else {
                warn!("Microphone unavailable: no input device");
                return PermissionResult::Denied;
            };

            match device.default_input_config() {
                Ok(config) => {
                    info!(
                        "Microphone available: {} @ {}Hz",
                        device.name().unwrap_or_else(|_| "Unknown".to_string()),
                        config.sample_rate().0
                    );
                    PermissionResult::Granted
                }
                Err(e) => {
                    warn!("Microphone unavailable: {}", e);
                    PermissionResult::Denied
                }
            }
        })
    }
}
