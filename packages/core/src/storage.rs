//! Slot-addressed word storage.
//!
//! A proxy owns exactly one storage. Module code reads and writes it through
//! a [`StorageTx`], which journals writes so a failed call can be undone as a
//! whole.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Address;

/// A storage slot index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub u64);

impl Slot {
    /// The slot `n` positions after this one.
    #[must_use]
    pub fn offset(self, n: u64) -> Slot {
        Slot(self.0.wrapping_add(n))
    }

    /// The slot holding `key` in a mapping anchored at this slot.
    ///
    /// First 8 bytes of `SHA-256(key || anchor)`, anchor big-endian.
    #[must_use]
    pub fn mapping(self, key: &[u8]) -> Slot {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update(self.0.to_be_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Slot(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// A 32-byte storage word. Unwritten slots read as [`Word::ZERO`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Word(pub [u8; 32]);

impl Word {
    pub const ZERO: Word = Word([0u8; 32]);

    /// Right-align `bytes` in a word. Longer inputs keep their last 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut word = [0u8; 32];
        let take = bytes.len().min(32);
        word[32 - take..].copy_from_slice(&bytes[bytes.len() - take..]);
        Word(word)
    }

    pub fn from_u64(n: u64) -> Self {
        Word::from_slice(&n.to_be_bytes())
    }

    /// The low 8 bytes as an integer.
    pub fn to_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[24..]);
        u64::from_be_bytes(bytes)
    }

    pub fn from_address(address: &Address) -> Self {
        Word::from_slice(address.as_bytes())
    }

    /// The low 20 bytes as an address.
    pub fn to_address(&self) -> Address {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&self.0[12..]);
        Address::from_bytes(bytes)
    }

    pub fn from_bool(b: bool) -> Self {
        Word::from_u64(u64::from(b))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word(0x")?;
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

/// Read words from slots.
pub trait SlotReader {
    fn load(&self, slot: Slot) -> Word;
}

/// Write words to slots.
pub trait SlotWriter {
    fn store(&mut self, slot: Slot, word: Word);
}

/// Combined read/write storage.
pub trait Storage: SlotReader + SlotWriter {}
impl<T: SlotReader + SlotWriter + ?Sized> Storage for T {}

impl<T: SlotReader + ?Sized> SlotReader for &T {
    fn load(&self, slot: Slot) -> Word {
        (**self).load(slot)
    }
}

impl<T: SlotReader + ?Sized> SlotReader for &mut T {
    fn load(&self, slot: Slot) -> Word {
        (**self).load(slot)
    }
}

impl<T: SlotWriter + ?Sized> SlotWriter for &mut T {
    fn store(&mut self, slot: Slot, word: Word) {
        (**self).store(slot, word)
    }
}

impl<T: SlotReader + ?Sized> SlotReader for Box<T> {
    fn load(&self, slot: Slot) -> Word {
        self.as_ref().load(slot)
    }
}

impl<T: SlotWriter + ?Sized> SlotWriter for Box<T> {
    fn store(&mut self, slot: Slot, word: Word) {
        self.as_mut().store(slot, word)
    }
}

/// In-memory storage. Zero words are not kept, so two storages with the same
/// observable contents compare equal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStorage {
    slots: BTreeMap<Slot, Word>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-zero slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate non-zero slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, Word)> + '_ {
        self.slots.iter().map(|(s, w)| (*s, *w))
    }
}

impl SlotReader for MemoryStorage {
    fn load(&self, slot: Slot) -> Word {
        self.slots.get(&slot).copied().unwrap_or(Word::ZERO)
    }
}

impl SlotWriter for MemoryStorage {
    fn store(&mut self, slot: Slot, word: Word) {
        if word.is_zero() {
            self.slots.remove(&slot);
        } else {
            self.slots.insert(slot, word);
        }
    }
}

/// Buffered writes over a read-only base storage.
///
/// Reads see pending writes first. Nothing reaches the base until the
/// journal returned by [`StorageTx::into_journal`] is applied.
pub struct StorageTx<'a> {
    base: &'a dyn SlotReader,
    pending: BTreeMap<Slot, Word>,
}

impl<'a> StorageTx<'a> {
    pub fn new(base: &'a dyn SlotReader) -> Self {
        Self {
            base,
            pending: BTreeMap::new(),
        }
    }

    /// Number of distinct slots written so far.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    pub fn into_journal(self) -> Journal {
        Journal {
            writes: self.pending,
        }
    }
}

impl SlotReader for StorageTx<'_> {
    fn load(&self, slot: Slot) -> Word {
        match self.pending.get(&slot) {
            Some(word) => *word,
            None => self.base.load(slot),
        }
    }
}

impl SlotWriter for StorageTx<'_> {
    fn store(&mut self, slot: Slot, word: Word) {
        self.pending.insert(slot, word);
    }
}

/// The writes of a finished [`StorageTx`], ready to commit.
#[derive(Debug, Default)]
pub struct Journal {
    writes: BTreeMap<Slot, Word>,
}

impl Journal {
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Commit every write to `storage`.
    pub fn apply<S: SlotWriter + ?Sized>(self, storage: &mut S) {
        for (slot, word) in self.writes {
            storage.store(slot, word);
        }
    }
}
