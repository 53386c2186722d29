use crate::chain::{Entry, VersionChain};
use crate::error::Result;
use crate::schema::FieldSlot;
use crate::snapshot::Snapshot;
use crate::types::{Date, EntityId, EntityType, TxId, Vint};

/// A snapshot bound to a valid date: the unit of field reads.
///
/// Reads answer "what was in effect on this date, as known at the snapshot's
/// transaction". Cheap to copy; create one per query.
#[derive(Debug, Clone, Copy)]
pub struct DatedView<'a> {
    snapshot: &'a Snapshot,
    date: Date,
}

impl<'a> DatedView<'a> {
    pub(crate) fn new(snapshot: &'a Snapshot, date: Date) -> Self {
        DatedView { snapshot, date }
    }

    pub fn date(&self) -> Date {
        self.date
    }

    pub fn snapshot(&self) -> &'a Snapshot {
        self.snapshot
    }

    pub fn tx_id(&self) -> Option<TxId> {
        self.snapshot.tx_id()
    }

    pub fn count(&self, entity: EntityType) -> u32 {
        self.snapshot.count(entity)
    }

    pub fn chain(&self, slot: FieldSlot, id: EntityId) -> &'a VersionChain {
        self.snapshot.chain(slot, id)
    }

    /// The version in effect, or `None` if the field was unset at this point.
    pub fn find(&self, slot: FieldSlot, id: EntityId) -> Option<Entry> {
        let tx = self.tx_id()?;
        self.chain(slot, id).find(self.date, tx)
    }

    /// The version in effect; an unset field reads as `Entry::default()`.
    pub fn get(&self, slot: FieldSlot, id: EntityId) -> Entry {
        self.find(slot, id).unwrap_or_default()
    }

    /// Every version visible from here, newest first.
    pub fn audit(&self, slot: FieldSlot, id: EntityId) -> Vec<Entry> {
        match self.tx_id() {
            Some(tx) => self.chain(slot, id).audit(self.date, tx),
            None => Vec::new(),
        }
    }

    /// Members of a set-valued field.
    pub fn members(&self, slot: FieldSlot, id: EntityId) -> Vec<EntityId> {
        match self.tx_id() {
            Some(tx) => self.chain(slot, id).set_get(self.date, tx),
            None => Vec::new(),
        }
    }

    pub fn string(&self, v: Vint) -> Option<&'a str> {
        self.snapshot.string(v)
    }
}

/// A snapshot bound to a valid date, with write access.
///
/// Writes are stamped with this date and the snapshot's next transaction id.
#[derive(Debug)]
pub struct DatedViewMut<'a> {
    snapshot: &'a mut Snapshot,
    date: Date,
}

impl<'a> DatedViewMut<'a> {
    pub(crate) fn new(snapshot: &'a mut Snapshot, date: Date) -> Self {
        DatedViewMut { snapshot, date }
    }

    pub fn date(&self) -> Date {
        self.date
    }

    /// Read-only view of the same snapshot and date.
    pub fn view(&self) -> DatedView<'_> {
        DatedView::new(&*self.snapshot, self.date)
    }

    pub fn snapshot(&mut self) -> &mut Snapshot {
        &mut *self.snapshot
    }

    pub fn get(&self, slot: FieldSlot, id: EntityId) -> Entry {
        self.view().get(slot, id)
    }

    pub fn find(&self, slot: FieldSlot, id: EntityId) -> Option<Entry> {
        self.view().find(slot, id)
    }

    pub fn audit(&self, slot: FieldSlot, id: EntityId) -> Vec<Entry> {
        self.view().audit(slot, id)
    }

    pub fn members(&self, slot: FieldSlot, id: EntityId) -> Vec<EntityId> {
        self.view().members(slot, id)
    }

    pub fn set(&mut self, slot: FieldSlot, id: EntityId, value: Vint) {
        self.snapshot.write(slot, id, self.date, value);
    }

    pub fn set_add(&mut self, slot: FieldSlot, id: EntityId, member: EntityId) {
        self.snapshot.set_add(slot, id, self.date, member);
    }

    pub fn set_remove(&mut self, slot: FieldSlot, id: EntityId, member: EntityId) {
        self.snapshot.set_remove(slot, id, self.date, member);
    }

    /// See [`Snapshot::create`].
    pub fn create(&mut self, entity: EntityType, values: &[Vint]) -> Result<EntityId> {
        self.snapshot.create(self.date, entity, values)
    }

    pub fn add_string(&mut self, s: &str) -> Vint {
        self.snapshot.add_string(s)
    }
}
