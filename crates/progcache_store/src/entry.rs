//! Cache entry record and its on-disk encoding.

use rkyv::util::AlignedVec;

use crate::StoreError;

/// Leading bytes of every encoded entry.
pub const ENTRY_MAGIC: [u8; 4] = *b"PCBN";

/// Version of the encoded layout. Entries with another version are
/// reported as corrupt and get recompiled.
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = ENTRY_MAGIC.len() + std::mem::size_of::<u32>();

/// Compiled binary for one device of an entry.
#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct DeviceBinary {
    /// Canonical identity of the device the binary was built for.
    pub device: String,

    /// Recorded length of `bytes`.
    pub size: u64,

    /// Opaque runtime binary.
    pub bytes: Vec<u8>,
}

impl DeviceBinary {
    pub fn new(device: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            device: device.into(),
            size: bytes.len() as u64,
            bytes,
        }
    }
}

/// One stored set of per-device binaries.
#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct CacheEntry {
    /// Signature of the ordered device list the binaries were built for.
    pub device_signature: String,

    /// Fingerprint of the runtime that produced the binaries.
    pub runtime: String,

    /// Binaries, in device order.
    pub binaries: Vec<DeviceBinary>,

    /// Timestamp when this entry was created.
    pub created_at: u64,
}

impl CacheEntry {
    /// Creates a new cache entry.
    pub fn new(
        device_signature: impl Into<String>,
        runtime: impl Into<String>,
        binaries: Vec<DeviceBinary>,
    ) -> Self {
        Self {
            device_signature: device_signature.into(),
            runtime: runtime.into(),
            binaries,
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Total size of all binaries.
    pub fn binary_size(&self) -> u64 {
        self.binaries.iter().map(|b| b.size).sum()
    }

    /// Borrowed view of the binaries, in device order.
    pub fn blobs(&self) -> Vec<&[u8]> {
        self.binaries.iter().map(|b| b.bytes.as_slice()).collect()
    }

    /// Checks that this entry was produced for the given device signature
    /// and runtime.
    pub fn is_valid(&self, device_signature: &str, runtime: &str) -> bool {
        self.device_signature == device_signature && self.runtime == runtime
    }

    /// Encodes the entry as `magic ‖ version ‖ rkyv archive`.
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let archived = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + archived.len());
        bytes.extend_from_slice(&ENTRY_MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&archived);
        Ok(bytes)
    }

    /// Decodes and validates an encoded entry.
    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() < HEADER_LEN {
            return Err(StoreError::corrupted(format!(
                "entry is {} bytes, shorter than its header",
                bytes.len()
            )));
        }

        let (header, payload) = bytes.split_at(HEADER_LEN);
        if header[..ENTRY_MAGIC.len()] != ENTRY_MAGIC {
            return Err(StoreError::corrupted("invalid entry magic"));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&header[ENTRY_MAGIC.len()..]);
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(StoreError::corrupted(format!(
                "unsupported format version {version}"
            )));
        }

        // The archive is read from an aligned copy; the payload sits at an
        // arbitrary offset in the file buffer.
        let mut aligned = AlignedVec::<16>::with_capacity(payload.len());
        aligned.extend_from_slice(payload);

        let entry = rkyv::from_bytes::<CacheEntry, rkyv::rancor::Error>(&aligned)
            .map_err(|e| StoreError::corrupted(e.to_string()))?;

        for binary in &entry.binaries {
            if binary.size != binary.bytes.len() as u64 {
                return Err(StoreError::corrupted(format!(
                    "binary for {} records {} bytes but holds {}",
                    binary.device,
                    binary.size,
                    binary.bytes.len()
                )));
            }
        }

        Ok(entry)
    }
}
