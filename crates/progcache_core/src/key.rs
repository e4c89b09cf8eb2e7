//! Cache key derivation.

use std::fmt;

use progcache_store::EntryId;

use crate::DeviceSignature;

/// Address of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// BLAKE3 hex digest of source, options and device signature.
    Derived(String),
    /// Caller tag, kept readable, scoped by a short signature digest.
    Tagged { tag: String, scope: String },
}

impl CacheKey {
    /// Store id for this key. Derived and tagged keys land in different
    /// namespaces, so their file names may coincide without clashing.
    pub fn entry_id(&self) -> EntryId {
        match self {
            CacheKey::Derived(hash) => EntryId::derived(hash.as_str()),
            CacheKey::Tagged { tag, scope } => {
                EntryId::tagged(format!("{}@{}", KeyDeriver::tag_stem(tag), scope))
            }
        }
    }

    pub fn is_tagged(&self) -> bool {
        matches!(self, CacheKey::Tagged { .. })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entry_id())
    }
}

/// Computes cache keys.
pub struct KeyDeriver;

impl KeyDeriver {
    /// Hex characters of the signature digest kept in tagged file names.
    const SCOPE_LEN: usize = 16;

    /// Longest escaped tag kept verbatim in a file name. Longer tags are
    /// cut and suffixed with a digest of the whole tag, which keeps the
    /// name and its temporary sibling under the usual 255 byte limit.
    const MAX_STEM_LEN: usize = 160;

    /// Derives the content key of `source` built with `options` for the
    /// devices in `signature`. Unset options hash like empty options.
    ///
    /// Each field is length-prefixed, so moving bytes between source and
    /// options cannot produce the same key.
    pub fn derive(source: &str, options: Option<&str>, signature: &DeviceSignature) -> CacheKey {
        let options = options.unwrap_or_default();

        let mut hasher = blake3::Hasher::new();
        for field in [source, options, signature.as_str()] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }

        CacheKey::Derived(hasher.finalize().to_hex().to_string())
    }

    /// Key for an explicit tag. The tag text is not hashed.
    pub fn tag(tag: &str, signature: &DeviceSignature) -> CacheKey {
        let digest = blake3::hash(signature.as_str().as_bytes()).to_hex();
        CacheKey::Tagged {
            tag: tag.to_string(),
            scope: digest.as_str()[..Self::SCOPE_LEN].to_string(),
        }
    }

    /// Readable file-name stem for `tag`.
    ///
    /// This is [`escape_tag`](Self::escape_tag) for tags that fit in
    /// `MAX_STEM_LEN`. Longer ones keep an escaped prefix followed by `~`
    /// and a digest of the full tag. `escape_tag` never emits `~`, so cut
    /// stems cannot collide with verbatim ones.
    pub fn tag_stem(tag: &str) -> String {
        let escaped = Self::escape_tag(tag);
        if escaped.len() <= Self::MAX_STEM_LEN {
            return escaped;
        }

        // Do not split a `%XX` sequence.
        let mut cut = Self::MAX_STEM_LEN;
        if let Some(pos) = escaped[cut - 2..cut].find('%') {
            cut = cut - 2 + pos;
        }

        let digest = blake3::hash(tag.as_bytes()).to_hex();
        format!("{}~{}", &escaped[..cut], &digest.as_str()[..Self::SCOPE_LEN])
    }

    /// Maps a tag onto a single safe file-name component.
    ///
    /// ASCII alphanumerics, `-`, `_` and non-leading `.` pass through; every
    /// other byte becomes `%XX`. The mapping is injective, and `@` is always
    /// escaped so it can separate the tag from its scope.
    pub fn escape_tag(tag: &str) -> String {
        let mut escaped = String::with_capacity(tag.len());
        for (i, byte) in tag.bytes().enumerate() {
            let keep = byte.is_ascii_alphanumeric()
                || byte == b'-'
                || byte == b'_'
                || (byte == b'.' && i > 0);
            if keep {
                escaped.push(byte as char);
            } else {
                escaped.push_str(&format!("%{byte:02X}"));
            }
        }
        escaped
    }
}
