//! Lifecycle-scoped device registry.
//!
//! The registry owns every opened device instance and the factories that
//! create backends for each device type. It is an explicitly owned value
//! passed by reference into signature extraction and dispatch; there is no
//! process-wide singleton.
//!
//! Instance indices are positions in the registry and index the per-device
//! resident-address tables of [`MemObject`](crate::MemObject).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::{Device, DeviceBackend, HostBackend};
use crate::error::{InvalidDeviceSnafu, Result, UnsupportedDeviceSnafu};

/// Parsed device specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceSpec {
    /// Host reference device.
    Host { index: usize },
}

impl DeviceSpec {
    /// Parse a device string into a spec.
    ///
    /// Examples:
    /// - "host" -> `DeviceSpec::Host { index: 0 }`
    /// - "HOST:1" -> `DeviceSpec::Host { index: 1 }`
    pub fn parse(s: &str) -> Result<Self> {
        let upper = s.to_uppercase();
        let mut parts = upper.split(':');

        match parts.next() {
            Some("HOST") => {
                let index = match parts.next() {
                    Some(index) => {
                        index.parse().map_err(|_| crate::Error::InvalidDevice { device: s.to_string() })?
                    }
                    None => 0,
                };
                Ok(DeviceSpec::Host { index })
            }
            _ => InvalidDeviceSnafu { device: s }.fail(),
        }
    }

    /// Base device type, stripping the instance suffix.
    pub fn base_type(&self) -> &'static str {
        match self {
            DeviceSpec::Host { .. } => "HOST",
        }
    }
}

impl std::fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceSpec::Host { index } => write!(f, "HOST:{index}"),
        }
    }
}

/// Factory creating a backend for a device specification.
pub type BackendFactory = Arc<dyn Fn(&DeviceSpec) -> Result<Arc<dyn DeviceBackend>> + Send + Sync>;

/// Registry of opened devices with factory registration and caching.
///
/// # Thread Safety
///
/// Uses `parking_lot::RwLock` with double-checked locking: readers resolve
/// cached instances concurrently, writers take the exclusive lock only to
/// open a new device.
pub struct DeviceRegistry {
    /// Opened devices; a device's instance index is its position here.
    devices: RwLock<Vec<Arc<Device>>>,
    /// Registered factories (device type string -> factory).
    factories: RwLock<HashMap<String, BackendFactory>>,
}

impl DeviceRegistry {
    /// Create a registry with the built-in host factory registered.
    pub fn new() -> Self {
        let registry = Self { devices: RwLock::new(Vec::new()), factories: RwLock::new(HashMap::new()) };
        registry.register_factory("HOST", Arc::new(|_spec| Ok(Arc::new(HostBackend::new()) as Arc<dyn DeviceBackend>)));
        registry
    }

    /// Register a backend factory for a device type.
    ///
    /// The type string is case-insensitive. Registering a type again
    /// replaces the previous factory.
    pub fn register_factory(&self, device_type: &str, factory: BackendFactory) {
        self.factories.write().insert(device_type.to_uppercase(), factory);
    }

    /// Open (or return the already opened) device for a specification.
    pub fn open(&self, spec: &DeviceSpec) -> Result<Arc<Device>> {
        // Fast path: read lock to check for an existing instance.
        if let Some(device) = self.devices.read().iter().find(|d| d.spec() == spec) {
            return Ok(Arc::clone(device));
        }

        // Slow path: write lock to open.
        let mut devices = self.devices.write();

        // Double-check after acquiring the write lock.
        if let Some(device) = devices.iter().find(|d| d.spec() == spec) {
            return Ok(Arc::clone(device));
        }

        let factory = self
            .factories
            .read()
            .get(spec.base_type())
            .cloned()
            .ok_or_else(|| UnsupportedDeviceSnafu { device: spec.base_type() }.build())?;

        let backend = factory(spec)?;
        let device = Arc::new(Device::new(spec.clone(), devices.len(), backend));
        tracing::debug!(device.spec = %spec, device.instance = device.instance(), "device opened");
        devices.push(Arc::clone(&device));
        Ok(device)
    }

    /// Open a device by parsing a device string.
    pub fn open_str(&self, device: &str) -> Result<Arc<Device>> {
        self.open(&DeviceSpec::parse(device)?)
    }

    /// Snapshot of all opened devices, in instance order.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.read().clone()
    }

    /// Number of opened devices.
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Whether no device has been opened yet.
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
