use crate::chain::{self, VersionChain};
use crate::error::{Error, Result};
use crate::schema::{FieldSlot, Schema};
use crate::snapshot::Snapshot;
use crate::store::{self, ArchiveOptions};
use crate::text::TextTable;
use crate::types::{Date, EntityId, EntityType, TxId, Vint};
use crate::varint::{self, Reader};
use log::{debug, info};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// The committed store: every version chain, the entity counts and the
/// canonical text table.
///
/// Storage is a structure of arrays, one array of chains per field slot
/// indexed by entity id. Arrays and the text table are shared with snapshots
/// and copied on write, so the only way the archive changes is
/// [`commit`](Self::commit).
#[derive(Clone)]
pub struct Archive {
    schema: Arc<Schema>,
    counts: Vec<u32>,
    text: Arc<TextTable>,
    chains: Vec<Arc<Vec<VersionChain>>>,
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("counts", &self.counts)
            .field("strings", &self.text.len())
            .field("slots", &self.chains.len())
            .finish()
    }
}

impl Archive {
    /// An archive with no transactions.
    pub fn new(schema: impl Into<Arc<Schema>>) -> Self {
        let schema = schema.into();
        Archive {
            counts: vec![0; schema.entity_count()],
            text: Arc::new(TextTable::new()),
            chains: vec![Arc::new(Vec::new()); schema.slot_count()],
            schema,
        }
    }

    /// Read an archive file written by [`save`](Self::save) or an
    /// [`ArchiveFile`](crate::ArchiveFile) with default options.
    pub fn open(path: impl AsRef<Path>, schema: impl Into<Arc<Schema>>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let archive = store::decode_file(&bytes, &ArchiveOptions::default(), schema.into())?;
        info!(
            "opened archive {}: {} transactions",
            path.display(),
            archive.transaction_count()
        );
        Ok(archive)
    }

    /// Write the archive to `path` atomically with default options.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        store::write_atomic(path.as_ref(), self, &ArchiveOptions::default())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Entity counts, one per entity type.
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn count(&self, entity: EntityType) -> u32 {
        self.counts[entity.index()]
    }

    /// Number of committed transactions.
    pub fn transaction_count(&self) -> u32 {
        self.counts[0]
    }

    pub fn latest_tx(&self) -> Option<TxId> {
        self.counts[0].checked_sub(1).map(TxId)
    }

    pub fn text(&self) -> &TextTable {
        &self.text
    }

    pub fn chain(&self, slot: FieldSlot, id: EntityId) -> &VersionChain {
        self.chains[slot.index()]
            .get(id as usize)
            .unwrap_or(&chain::EMPTY)
    }

    /// Snapshot of everything committed so far.
    pub fn snapshot_latest(&self) -> Snapshot {
        debug!("snapshot at latest transaction {:?}", self.latest_tx());
        self.snapshot_with(self.counts.clone())
    }

    /// Snapshot of the state as known right after transaction `tx`.
    ///
    /// Entities are created in transaction order, so each type's historical
    /// count is found by walking back from the current count while the
    /// entity's first field was only ever written after `tx`.
    pub fn snapshot_at(&self, tx: TxId) -> Result<Snapshot> {
        if tx.0 >= self.counts[0] {
            return Err(Error::UnknownTransaction(tx));
        }
        let mut counts = self.counts.clone();
        counts[0] = tx.0 + 1;
        for e in 1..counts.len() {
            let entity = EntityType(e as u32);
            let chains = &self.chains[self.schema.anchor(entity).index()];
            let mut i = counts[e];
            while i > 0 && chains.get(i as usize - 1).is_none_or(|c| c.after(tx)) {
                i -= 1;
            }
            counts[e] = i;
        }
        debug!("snapshot at transaction {tx}: counts {counts:?}");
        Ok(self.snapshot_with(counts))
    }

    fn snapshot_with(&self, counts: Vec<u32>) -> Snapshot {
        Snapshot::new(
            Arc::clone(&self.schema),
            counts,
            Arc::clone(&self.text),
            self.chains.clone(),
        )
    }

    /// Merge `snapshot` into the archive as a new transaction.
    ///
    /// Creates the transaction-log entity from `tx_values` (one value per
    /// non-set field of entity type 0) valid from `date`, appends the
    /// snapshot's new strings, and stores every chain it wrote. The merged
    /// state is staged completely before it replaces the current one, so an
    /// error leaves the archive untouched.
    ///
    /// The transaction record is written here alone: a snapshot that wrote
    /// any transaction-log field is rejected with [`Error::TransactionLog`],
    /// and an entity id of `u32::MAX` with [`Error::OutOfRange`].
    ///
    /// Only a snapshot of the current state can be committed: one taken
    /// before another commit, or taken at a past transaction, is rejected
    /// with [`Error::StaleSnapshot`].
    pub fn commit(&mut self, mut snapshot: Snapshot, date: Date, tx_values: &[Vint]) -> Result<TxId> {
        if !Arc::ptr_eq(&snapshot.schema, &self.schema) && *snapshot.schema != *self.schema {
            return Err(Error::Schema(
                "snapshot was taken from an archive with a different schema".into(),
            ));
        }
        if snapshot.counts != self.counts || snapshot.text.len() != self.text.len() {
            return Err(Error::StaleSnapshot {
                snapshot: snapshot.counts[0],
                archive: self.counts[0],
            });
        }

        if let Some(slot) = self
            .schema
            .slots(EntityType::TRANSACTIONS)
            .find(|s| snapshot.overlay[s.index()].is_some())
        {
            let (_, field) = self.schema.names(slot);
            return Err(Error::TransactionLog(format!(
                "snapshot wrote transaction field `{field}` directly"
            )));
        }

        let tx = snapshot.next_tx();
        snapshot.create_entity(date, EntityType::TRANSACTIONS, tx_values)?;

        let mut counts = snapshot.counts;
        let mut text = Arc::clone(&self.text);
        let mut chains = self.chains.clone();

        let mut new_strings = 0;
        if let Some(pending) = &snapshot.pending {
            let table = Arc::make_mut(&mut text);
            for s in pending.iter() {
                table.add(s);
            }
            new_strings = pending.len();
        }

        let mut touched = 0;
        for (slot, overlay) in self.schema.all_slots().zip(snapshot.overlay) {
            let Some(overlay) = overlay else { continue };
            let Some(&max_id) = overlay.keys().max() else {
                continue;
            };
            let end = max_id
                .checked_add(1)
                .ok_or(Error::OutOfRange(i64::from(max_id)))?;
            touched += 1;
            let array = Arc::make_mut(&mut chains[slot.index()]);
            if array.len() < end as usize {
                array.resize(end as usize, VersionChain::empty());
            }
            let count = &mut counts[slot.entity().index()];
            *count = (*count).max(end);
            for (&id, chain) in overlay.iter() {
                array[id as usize] = chain.clone();
            }
        }

        // every slot array of a type spans the type's full count
        for slot in self.schema.all_slots() {
            let count = counts[slot.entity().index()] as usize;
            if chains[slot.index()].len() < count {
                Arc::make_mut(&mut chains[slot.index()]).resize(count, VersionChain::empty());
            }
        }

        self.counts = counts;
        self.text = text;
        self.chains = chains;
        debug!("committed transaction {tx}: {touched} slots, {new_strings} new strings");
        Ok(tx)
    }

    /// Encode in the archive file format: counts, text table, then every
    /// chain slot by slot.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        varint::write(&mut buf, self.counts.len() as u64);
        for &c in &self.counts {
            varint::write(&mut buf, u64::from(c));
        }

        varint::write(&mut buf, self.text.len() as u64);
        for s in self.text.iter() {
            varint::write(&mut buf, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }

        for slot in self.schema.all_slots() {
            let count = self.counts[slot.entity().index()];
            for id in 0..count {
                let bytes = self.chain(slot, id).as_bytes();
                varint::write(&mut buf, bytes.len() as u64);
                buf.extend_from_slice(bytes);
            }
        }
        buf
    }

    /// Decode bytes produced by [`to_bytes`](Self::to_bytes). The whole input
    /// must be consumed.
    pub fn from_bytes(schema: impl Into<Arc<Schema>>, bytes: &[u8]) -> Result<Self> {
        let schema = schema.into();
        let mut reader = Reader::new(bytes);

        let entity_count = reader.read()?;
        if entity_count != schema.entity_count() as u64 {
            return Err(Error::format(format!(
                "archive has {entity_count} entity types, schema declares {}",
                schema.entity_count()
            )));
        }
        let counts = (0..entity_count)
            .map(|_| reader.read_u32())
            .collect::<Result<Vec<_>>>()?;

        let string_count = read_len(&mut reader)?;
        let mut text = TextTable::with_capacity(string_count.min(reader.remaining().len()));
        for _ in 0..string_count {
            let len = read_len(&mut reader)?;
            let s = std::str::from_utf8(reader.read_bytes(len)?)
                .map_err(|e| Error::format(format!("text entry is not UTF-8: {e}")))?;
            let before = text.len();
            if text.add(s) != before {
                return Err(Error::format(format!("duplicate text entry `{s}`")));
            }
        }

        let mut chains = Vec::with_capacity(schema.slot_count());
        for slot in schema.all_slots() {
            let count = counts[slot.entity().index()] as usize;
            let mut array = Vec::with_capacity(count.min(reader.remaining().len()));
            for _ in 0..count {
                let len = read_len(&mut reader)?;
                array.push(VersionChain::from_bytes(reader.read_bytes(len)?)?);
            }
            chains.push(Arc::new(array));
        }

        if !reader.is_empty() {
            return Err(Error::format(format!(
                "{} trailing bytes after archive",
                reader.remaining().len()
            )));
        }

        Ok(Archive {
            schema,
            counts,
            text: Arc::new(text),
            chains,
        })
    }
}

fn read_len(reader: &mut Reader<'_>) -> Result<usize> {
    let v = reader.read()?;
    usize::try_from(v).map_err(|_| Error::format(format!("length {v} does not fit in memory")))
}
