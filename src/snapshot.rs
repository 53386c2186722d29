//! Isolated, fixed-transaction views of an archive with a writable overlay.

use crate::chain::{self, VersionChain};
use crate::error::{Error, Result};
use crate::schema::{FieldSlot, Schema};
use crate::slim::MapSlim;
use crate::text::TextTable;
use crate::types::{Date, EntityId, EntityType, TxId, Vint};
use crate::view::{DatedView, DatedViewMut};
use std::fmt;
use std::sync::Arc;

/// A consistent state of an [`Archive`](crate::Archive) as of one transaction.
///
/// The snapshot owns its counts and shares the archive's committed chain
/// arrays and text table copy-on-write, so later commits never change what it
/// reads. Writes go to an overlay that is created slot by slot on first use
/// and merged by [`Archive::commit`](crate::Archive::commit); dropping the
/// snapshot discards them.
///
/// Reads resolve at [`tx_id`](Self::tx_id), the last transaction visible to
/// the snapshot; writes are stamped with [`next_tx`](Self::next_tx) and so
/// only become visible to snapshots taken after the commit.
#[derive(Clone)]
pub struct Snapshot {
    pub(crate) schema: Arc<Schema>,
    pub(crate) counts: Vec<u32>,
    pub(crate) text: Arc<TextTable>,
    pub(crate) chains: Vec<Arc<Vec<VersionChain>>>,
    pub(crate) overlay: Vec<Option<MapSlim<EntityId, VersionChain>>>,
    pub(crate) pending: Option<TextTable>,
    // one past the highest id known per type, committed or overlaid
    next_ids: Vec<u64>,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("tx_id", &self.tx_id())
            .field("counts", &self.counts)
            .field("touched_slots", &self.touched_slots().count())
            .field("pending_strings", &self.pending.as_ref().map_or(0, TextTable::len))
            .finish()
    }
}

impl Snapshot {
    pub(crate) fn new(
        schema: Arc<Schema>,
        counts: Vec<u32>,
        text: Arc<TextTable>,
        chains: Vec<Arc<Vec<VersionChain>>>,
    ) -> Self {
        let overlay = vec![None; chains.len()];
        let next_ids = counts.iter().map(|&c| u64::from(c)).collect();
        Snapshot {
            schema,
            counts,
            text,
            chains,
            overlay,
            pending: None,
            next_ids,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Last transaction visible to this snapshot; `None` before the first
    /// commit.
    pub fn tx_id(&self) -> Option<TxId> {
        self.counts[0].checked_sub(1).map(TxId)
    }

    /// Transaction id writes through this snapshot are stamped with.
    pub fn next_tx(&self) -> TxId {
        TxId(self.counts[0])
    }

    /// Entity counts as of this snapshot, one per entity type.
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn count(&self, entity: EntityType) -> u32 {
        self.counts[entity.index()]
    }

    /// Narrow to a valid date for reading.
    pub fn at(&self, date: Date) -> DatedView<'_> {
        DatedView::new(self, date)
    }

    /// Narrow to a valid date for reading and writing.
    pub fn at_mut(&mut self, date: Date) -> DatedViewMut<'_> {
        DatedViewMut::new(self, date)
    }

    /// Chain for `(slot, id)`: the overlay if written here, else the
    /// committed chain.
    pub fn chain(&self, slot: FieldSlot, id: EntityId) -> &VersionChain {
        if let Some(chain) = self.overlay[slot.index()]
            .as_ref()
            .and_then(|m| m.get(&id))
        {
            return chain;
        }
        self.chains[slot.index()]
            .get(id as usize)
            .unwrap_or(&chain::EMPTY)
    }

    pub(crate) fn put_chain(&mut self, slot: FieldSlot, id: EntityId, chain: VersionChain) {
        let next = &mut self.next_ids[slot.entity().index()];
        *next = (*next).max(u64::from(id) + 1);
        self.overlay[slot.index()]
            .get_or_insert_with(MapSlim::new)
            .insert(id, chain);
    }

    /// Record a new version of `(slot, id)` at `date`.
    pub fn write(&mut self, slot: FieldSlot, id: EntityId, date: Date, value: Vint) {
        let chain = self.chain(slot, id).add(date, self.next_tx(), value);
        self.put_chain(slot, id, chain);
    }

    pub fn set_add(&mut self, slot: FieldSlot, id: EntityId, date: Date, member: EntityId) {
        let chain = self.chain(slot, id).set_add(date, self.next_tx(), member);
        self.put_chain(slot, id, chain);
    }

    pub fn set_remove(&mut self, slot: FieldSlot, id: EntityId, date: Date, member: EntityId) {
        let chain = self.chain(slot, id).set_remove(date, self.next_tx(), member);
        self.put_chain(slot, id, chain);
    }

    /// Create an entity of type `entity` valid from `date`.
    ///
    /// `values` holds one value per non-set field, in declaration order; set
    /// fields start empty and are filled with [`set_add`](Self::set_add).
    /// The new id is one past the highest id this snapshot knows of,
    /// including ids only written through the overlay.
    ///
    /// Transaction records are created by
    /// [`Archive::commit`](crate::Archive::commit) only; asking for one here
    /// is [`Error::TransactionLog`].
    pub fn create(&mut self, date: Date, entity: EntityType, values: &[Vint]) -> Result<EntityId> {
        if entity == EntityType::TRANSACTIONS {
            return Err(Error::TransactionLog(
                "transaction records are created by commit".into(),
            ));
        }
        self.create_entity(date, entity, values)
    }

    pub(crate) fn create_entity(
        &mut self,
        date: Date,
        entity: EntityType,
        values: &[Vint],
    ) -> Result<EntityId> {
        let schema = Arc::clone(&self.schema);
        let def = schema.entity(entity);
        let expected = def.fields.iter().filter(|f| !f.kind.is_set()).count();
        if values.len() != expected {
            return Err(Error::Arity {
                entity: def.name.clone(),
                expected,
                found: values.len(),
            });
        }

        let next = self.next_ids[entity.index()];
        let id = EntityId::try_from(next).map_err(|_| Error::OutOfRange(next as i64))?;
        let tx = self.next_tx();
        let slots = schema.slots(entity).filter(|s| !schema.field(*s).kind.is_set());
        for (slot, &value) in slots.zip(values) {
            self.put_chain(slot, id, VersionChain::single(date, tx, value));
        }
        Ok(id)
    }

    /// Intern `s`, reusing the committed index when the archive already has
    /// it. New strings are numbered after the committed table.
    pub fn add_string(&mut self, s: &str) -> Vint {
        if let Some(i) = self.text.index_of(s) {
            return Vint::from(i as u32);
        }
        let base = self.text.len();
        let i = self.pending.get_or_insert_with(TextTable::new).add(s);
        Vint::from((base + i) as u32)
    }

    pub fn string(&self, v: Vint) -> Option<&str> {
        let i = usize::try_from(v.get()).ok()?;
        let base = self.text.len();
        if i < base {
            self.text.get(i)
        } else {
            self.pending.as_ref()?.get(i - base)
        }
    }

    /// Slots written through this snapshot.
    pub fn touched_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.overlay
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.as_ref().map(|_| i))
    }

    /// True when committing would merge anything besides the transaction
    /// record.
    pub fn is_dirty(&self) -> bool {
        self.touched_slots().next().is_some() || self.pending.is_some()
    }
}
