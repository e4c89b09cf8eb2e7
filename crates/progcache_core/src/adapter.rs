//! Seam between the cache and a native compute runtime.

use crate::DeviceIdentity;

/// Runtime operations the cache needs.
///
/// The cache never inspects programs, contexts or devices itself; it only
/// moves binaries between an implementation of this trait and a store.
/// Implementations must be usable from several threads at once.
pub trait CompileAdapter: Send + Sync {
    /// Runtime device handle.
    type Device;
    /// Runtime context the program is created in.
    type Context;
    /// Built program object.
    type Program;
    /// Runtime error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reports the identity fields of `device`.
    fn device_identity(&self, device: &Self::Device) -> Result<DeviceIdentity, Self::Error>;

    /// Identifies the runtime build. Entries written under a different
    /// fingerprint are not loaded.
    fn runtime_fingerprint(&self) -> String {
        String::new()
    }

    /// Compiles `source` for `devices`. The error carries the build log.
    fn compile(
        &self,
        context: &Self::Context,
        devices: &[Self::Device],
        source: &str,
        options: &str,
    ) -> Result<Self::Program, Self::Error>;

    /// Per-device binaries of `program`, in the order of the devices it was
    /// built for. An empty blob means the device has no binary.
    fn binaries(&self, program: &Self::Program) -> Result<Vec<Vec<u8>>, Self::Error>;

    /// Recreates a ready-to-use program from binaries, one per device.
    fn from_binaries(
        &self,
        context: &Self::Context,
        devices: &[Self::Device],
        binaries: &[&[u8]],
    ) -> Result<Self::Program, Self::Error>;
}
