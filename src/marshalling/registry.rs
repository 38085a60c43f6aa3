use std::collections::HashMap;

use parking_lot::RwLock;

use super::{frame::SigningKey, FramedMessage, Scheme};

/// Validation data for one message id of a frame dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageEntry {
    pub msg_id: u32,
    pub crc_extra: u8,
    pub name: &'static str,
    pub min_len: u8,
    pub max_len: u8,
}

impl MessageEntry {
    pub fn of<T: FramedMessage>() -> Self {
        Self {
            msg_id: T::MSG_ID,
            crc_extra: T::CRC_EXTRA,
            name: T::NAME,
            min_len: T::MIN_LEN,
            max_len: T::MAX_LEN,
        }
    }

    pub fn accepts_len(
        &self,
        len: usize,
    ) -> bool {
        (self.min_len as usize..=self.max_len as usize).contains(&len)
    }
}

#[derive(Debug, Default)]
struct Dialect {
    entries: HashMap<u32, MessageEntry>,
    signing_key: Option<SigningKey>,
}

/// Runtime table of known schemes and their frame dialects.
///
/// Shared through an `Arc` by whoever needs it; there is no process-wide
/// instance. Lookups take a read lock, registration a write lock, so the
/// table can grow while parsers are running.
#[derive(Debug, Default)]
pub struct SchemeRegistry {
    dialects: RwLock<HashMap<Scheme, Dialect>>,
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in schemes (no dialect entries).
    pub fn with_builtin_schemes() -> Self {
        let registry = Self::new();
        for scheme in [
            Scheme::CSTR,
            Scheme::BINCODE,
            Scheme::CBOR,
            Scheme::MSGPACK,
            Scheme::FRAMED,
            Scheme::JSON,
        ] {
            registry.register_scheme(scheme);
        }
        registry
    }

    /// Makes `scheme` known without adding message entries.
    pub fn register_scheme(
        &self,
        scheme: Scheme,
    ) {
        self.dialects.write().entry(scheme).or_default();
    }

    /// Adds (or replaces) message entries under `scheme`.
    pub fn register_dialect<I>(
        &self,
        scheme: Scheme,
        entries: I,
    ) where
        I: IntoIterator<Item = MessageEntry>,
    {
        let mut dialects = self.dialects.write();
        let dialect = dialects.entry(scheme).or_default();
        for entry in entries {
            dialect.entries.insert(entry.msg_id, entry);
        }
    }

    /// Registers a statically typed frame message under [`Scheme::FRAMED`].
    pub fn register<T: FramedMessage>(&self) {
        self.register_dialect(Scheme::FRAMED, [MessageEntry::of::<T>()]);
    }

    pub fn set_signing_key(
        &self,
        scheme: Scheme,
        key: SigningKey,
    ) {
        self.dialects.write().entry(scheme).or_default().signing_key = Some(key);
    }

    pub fn signing_key(
        &self,
        scheme: Scheme,
    ) -> Option<SigningKey> {
        self.dialects
            .read()
            .get(&scheme)
            .and_then(|d| d.signing_key.clone())
    }

    pub fn knows_scheme(
        &self,
        scheme: Scheme,
    ) -> bool {
        self.dialects.read().contains_key(&scheme)
    }

    pub fn entry(
        &self,
        scheme: Scheme,
        msg_id: u32,
    ) -> Option<MessageEntry> {
        self.dialects
            .read()
            .get(&scheme)
            .and_then(|d| d.entries.get(&msg_id).copied())
    }

    /// Number of message entries under `scheme`.
    pub fn len(
        &self,
        scheme: Scheme,
    ) -> usize {
        self.dialects
            .read()
            .get(&scheme)
            .map_or(0, |d| d.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use super::*;
    use crate::marshalling::frame::tests::Heartbeat;

    #[test]
    fn test_register_typed_message() {
        let registry = SchemeRegistry::new();
        registry.register::<Heartbeat>();
        let entry = registry.entry(Scheme::FRAMED, 0).unwrap();
        assert_eq!(entry.crc_extra, 50);
        assert_eq!(entry.name, "HEARTBEAT");
        assert!(entry.accepts_len(9));
        assert!(!entry.accepts_len(8));
        assert!(registry.knows_scheme(Scheme::FRAMED));
        assert!(!registry.knows_scheme(Scheme::JSON));
    }

    #[test]
    fn test_builtin_schemes_have_no_entries() {
        let registry = SchemeRegistry::with_builtin_schemes();
        assert!(registry.knows_scheme(Scheme::CBOR));
        assert_eq!(registry.len(Scheme::FRAMED), 0);
        assert!(registry.entry(Scheme::FRAMED, 0).is_none());
    }

    #[test]
    fn test_dialect_entry_replaced() {
        let registry = SchemeRegistry::new();
        let mut entry = MessageEntry::of::<Heartbeat>();
        registry.register_dialect(Scheme::FRAMED, [entry]);
        entry.crc_extra = 99;
        registry.register_dialect(Scheme::FRAMED, [entry]);
        assert_eq!(registry.len(Scheme::FRAMED), 1);
        assert_eq!(registry.entry(Scheme::FRAMED, 0).unwrap().crc_extra, 99);
    }

    /// One thread registers while others read.
    #[test]
    fn test_concurrent_register_and_lookup() {
        let registry = Arc::new(SchemeRegistry::new());
        let barrier = Arc::new(Barrier::new(5));

        let writer = {
            let registry = registry.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                for id in 0..200u32 {
                    registry.register_dialect(
                        Scheme::FRAMED,
                        [MessageEntry {
                            msg_id: id,
                            crc_extra: id as u8,
                            name: "GENERATED",
                            min_len: 0,
                            max_len: 255,
                        }],
                    );
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    for id in 0..200u32 {
                        if let Some(entry) = registry.entry(Scheme::FRAMED, id) {
                            assert_eq!(entry.crc_extra, id as u8);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(registry.len(Scheme::FRAMED), 200);
    }
}
