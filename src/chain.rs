//! Delta-encoded, immutable per-field version history.
//!
//! A chain stores `(date, tx, value)` entries newest first, ordered by
//! `(date desc, tx desc)`. The head is written in absolute form:
//!
//! ```text
//! zigzag(date) | tx | zigzag(value)
//! ```
//!
//! and every older entry as a delta from the entry stored before it:
//!
//! ```text
//! prev.date - date | prev.tx - tx (same date) or zigzag(prev.tx - tx) | zigzag(prev.value - value)
//! ```
//!
//! Adding a version builds a new buffer; bytes of entries that are not
//! neighbours of the insertion point are copied verbatim, and the old chain
//! keeps answering exactly as before.

use crate::error::{Error, Result};
use crate::slim::SetSlim;
use crate::types::{Date, EntityId, TxId, Vint};
use crate::varint::{self, Reader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One version of a field: the value in effect from `date`, recorded by `tx`.
///
/// `Entry::default()` is the sentinel returned for fields that were never set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub date: Date,
    pub tx: TxId,
    pub value: Vint,
}

impl Entry {
    pub fn new(date: Date, tx: TxId, value: Vint) -> Self {
        Entry { date, tx, value }
    }

    /// Storage order key; larger is newer.
    pub fn key(&self) -> (Date, TxId) {
        (self.date, self.tx)
    }

    pub fn is_visible_at(&self, date: Date, tx: TxId) -> bool {
        self.date <= date && self.tx <= tx
    }
}

impl From<Entry> for (Date, TxId, Vint) {
    fn from(e: Entry) -> Self {
        (e.date, e.tx, e.value)
    }
}

/// The complete history of one field slot.
///
/// Cheap to clone: the encoded buffer is shared and never modified.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct VersionChain {
    data: Option<Arc<[u8]>>,
}

pub(crate) static EMPTY: VersionChain = VersionChain { data: None };

impl fmt::Debug for VersionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl VersionChain {
    /// The chain of a field that has never been set.
    pub fn empty() -> Self {
        VersionChain::default()
    }

    pub fn single(date: Date, tx: TxId, value: Vint) -> Self {
        let mut buf = Vec::with_capacity(3 * varint::MAX_LEN);
        write_head(&mut buf, Entry::new(date, tx, value));
        VersionChain::from_vec(buf)
    }

    /// Adopt a persisted buffer after decoding it end to end.
    ///
    /// An empty slice yields the empty chain.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(bytes);
        while decoder.next_entry()?.is_some() {}
        Ok(VersionChain::from_vec(bytes.to_vec()))
    }

    fn from_vec(buf: Vec<u8>) -> Self {
        if buf.is_empty() {
            VersionChain { data: None }
        } else {
            VersionChain {
                data: Some(buf.into()),
            }
        }
    }

    /// The encoded buffer; empty for the empty chain.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    /// Number of stored versions.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Newest entry, ignoring visibility.
    pub fn head(&self) -> Option<Entry> {
        self.iter().next()
    }

    /// All versions, newest first.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            decoder: Decoder::new(self.as_bytes()),
        }
    }

    pub fn to_vec(&self) -> Vec<Entry> {
        self.iter().collect()
    }

    /// A chain with one more version. `self` is left untouched.
    ///
    /// An entry whose `(date, tx)` equals an existing one is placed ahead of
    /// it, so the latest write within a transaction wins.
    pub fn add(&self, date: Date, tx: TxId, value: Vint) -> VersionChain {
        let new = Entry::new(date, tx, value);
        let data = self.as_bytes();
        if data.is_empty() {
            return VersionChain::single(date, tx, value);
        }

        let mut decoder = Decoder::new(data);
        let mut prev: Option<Entry> = None;
        let mut start = 0;
        while let Some(cur) = decoder.next_valid() {
            if new.key() >= cur.key() {
                let end = decoder.position();
                let mut buf = Vec::with_capacity(data.len() + 6 * varint::MAX_LEN);
                match prev {
                    None => write_head(&mut buf, new),
                    Some(p) => {
                        buf.extend_from_slice(&data[..start]);
                        write_delta(&mut buf, p, new);
                    }
                }
                write_delta(&mut buf, new, cur);
                buf.extend_from_slice(&data[end..]);
                return VersionChain::from_vec(buf);
            }
            prev = Some(cur);
            start = decoder.position();
        }

        // older than everything stored
        let mut buf = Vec::with_capacity(data.len() + 3 * varint::MAX_LEN);
        buf.extend_from_slice(data);
        match prev {
            Some(p) => write_delta(&mut buf, p, new),
            None => write_head(&mut buf, new),
        }
        VersionChain::from_vec(buf)
    }

    /// The version in effect at `date` as known at `tx`, if any.
    pub fn find(&self, date: Date, tx: TxId) -> Option<Entry> {
        self.iter().find(|e| e.is_visible_at(date, tx))
    }

    /// Like [`find`](Self::find), but an unset field reads as the zero entry.
    pub fn get(&self, date: Date, tx: TxId) -> Entry {
        self.find(date, tx).unwrap_or_default()
    }

    /// Every version visible at `(date, tx)`, newest first.
    pub fn audit(&self, date: Date, tx: TxId) -> Vec<Entry> {
        self.iter().filter(|e| e.is_visible_at(date, tx)).collect()
    }

    /// True when every version was recorded after `tx`.
    pub fn after(&self, tx: TxId) -> bool {
        self.iter().all(|e| e.tx > tx)
    }

    pub fn set_add(&self, date: Date, tx: TxId, member: EntityId) -> VersionChain {
        self.add(date, tx, Vint::from(member))
    }

    pub fn set_remove(&self, date: Date, tx: TxId, member: EntityId) -> VersionChain {
        self.add(date, tx, Vint::from(member).complement())
    }

    /// Members of a set-valued field at `(date, tx)`.
    ///
    /// The newest visible entry for each member decides: an add makes it a
    /// member, a tombstone hides every older add. Members come out newest
    /// decision first, each once.
    pub fn set_get(&self, date: Date, tx: TxId) -> Vec<EntityId> {
        let mut decided = SetSlim::new();
        let mut members = Vec::new();
        for e in self.iter().filter(|e| e.is_visible_at(date, tx)) {
            let v = e.value.get();
            let id = if v < 0 { !v } else { v };
            if decided.contains(&id) {
                continue;
            }
            decided.add(id);
            if v >= 0 {
                if let Ok(id) = EntityId::try_from(id) {
                    members.push(id);
                }
            }
        }
        members
    }
}

/// Iterator over a chain's versions, newest first.
pub struct Iter<'a> {
    decoder: Decoder<'a>,
}

impl Iterator for Iter<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        self.decoder.next_valid()
    }
}

fn write_head(buf: &mut Vec<u8>, e: Entry) {
    varint::write(buf, varint::zigzag(i64::from(e.date.0)));
    varint::write(buf, u64::from(e.tx.0));
    varint::write(buf, varint::zigzag(e.value.get()));
}

// `prev` must not be older than `cur`.
fn write_delta(buf: &mut Vec<u8>, prev: Entry, cur: Entry) {
    let date_delta = i64::from(prev.date.0) - i64::from(cur.date.0);
    varint::write(buf, date_delta as u64);
    if date_delta == 0 {
        varint::write(buf, u64::from(prev.tx.0 - cur.tx.0));
    } else {
        varint::write(
            buf,
            varint::zigzag(i64::from(prev.tx.0) - i64::from(cur.tx.0)),
        );
    }
    varint::write(buf, varint::zigzag(prev.value.get() - cur.value.get()));
}

struct Decoder<'a> {
    reader: Reader<'a>,
    prev: Option<Entry>,
    failed: bool,
}

impl<'a> Decoder<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Decoder {
            reader: Reader::new(bytes),
            prev: None,
            failed: false,
        }
    }

    fn position(&self) -> usize {
        self.reader.position()
    }

    fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.reader.is_empty() {
            return Ok(None);
        }
        let (date, tx, value) = match self.prev {
            None => (
                self.reader.read_signed()?,
                self.reader.read()? as i64,
                self.reader.read_signed()?,
            ),
            Some(p) => {
                let date_delta = self.reader.read()? as i64;
                let tx_delta = if date_delta == 0 {
                    self.reader.read()? as i64
                } else {
                    self.reader.read_signed()?
                };
                let value_delta = self.reader.read_signed()?;
                (
                    i64::from(p.date.0) - date_delta,
                    i64::from(p.tx.0) - tx_delta,
                    p.value.get() - value_delta,
                )
            }
        };
        let entry = Entry {
            date: Date(
                i32::try_from(date)
                    .map_err(|_| Error::format(format!("chain date {date} out of range")))?,
            ),
            tx: TxId(
                u32::try_from(tx)
                    .map_err(|_| Error::format(format!("chain transaction {tx} out of range")))?,
            ),
            value: Vint::try_from(value)
                .map_err(|_| Error::format(format!("chain value {value} out of range")))?,
        };
        self.prev = Some(entry);
        Ok(Some(entry))
    }

    // Chains are validated when they enter the process (`from_bytes`) or are
    // built by `add`, so a decode failure here means the buffer ended; the
    // decoder stays exhausted afterwards.
    fn next_valid(&mut self) -> Option<Entry> {
        if self.failed {
            return None;
        }
        match self.next_entry() {
            Ok(e) => e,
            Err(_) => {
                self.failed = true;
                None
            }
        }
    }
}
