//! Named, typed access to entities.
//!
//! The engine addresses fields by [`FieldSlot`] and stores raw [`Vint`]s. This
//! layer resolves entity and field names against the schema and converts
//! between [`FieldValue`]s and stored values, so callers get collection and
//! row views per entity type without generated code:
//!
//! ```
//! use bitemporal::{Archive, Date, EntityDef, FieldKind, FieldValue, Schema};
//!
//! let schema = Schema::new(vec![
//!     EntityDef::new("Tx").field("Note", FieldKind::Text),
//!     EntityDef::new("Asset")
//!         .field("Name", FieldKind::Text)
//!         .field("Price", FieldKind::Int),
//! ])?;
//! let mut archive = Archive::new(schema);
//! let d1 = Date::from_ymd(2024, 1, 2).unwrap();
//!
//! let mut snapshot = archive.snapshot_latest();
//! let id = snapshot
//!     .at_mut(d1)
//!     .collection_mut("Asset")?
//!     .create(&[("Name", "ABC".into()), ("Price", 100.into())])?;
//! archive.commit_record(snapshot, d1, &[("Note", "listing".into())])?;
//!
//! let snapshot = archive.snapshot_latest();
//! let asset = snapshot.at(d1).collection("Asset")?.row(id);
//! assert_eq!(asset.get("Price")?, Some(FieldValue::Int(100)));
//! # Ok::<(), bitemporal::Error>(())
//! ```

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::schema::{FieldKind, FieldSlot};
use crate::snapshot::Snapshot;
use crate::types::{Date, EntityId, EntityType, TxId, Vint};
use crate::view::{DatedView, DatedViewMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i64),
    Bool(bool),
    Date(Date),
    Text(String),
    /// Id of an entity of the field's target type.
    Ref(EntityId),
}

impl FieldValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Int(_) => "int",
            FieldValue::Bool(_) => "bool",
            FieldValue::Date(_) => "Date",
            FieldValue::Text(_) => "string",
            FieldValue::Ref(_) => "reference",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<Date> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<EntityId> {
        match self {
            FieldValue::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Date(d) => write!(f, "{d}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Ref(id) => write!(f, "#{id}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i64::from(i))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<Date> for FieldValue {
    fn from(d: Date) -> Self {
        FieldValue::Date(d)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

/// One `(date, tx, value)` version of a typed field.
pub type Version = (Date, TxId, FieldValue);

fn mismatch(snapshot: &Snapshot, slot: FieldSlot, found: &FieldValue) -> Error {
    let (entity, field) = snapshot.schema().names(slot);
    Error::TypeMismatch {
        entity,
        field,
        expected: snapshot.schema().field(slot).kind.to_string(),
        found: found.kind_name().to_owned(),
    }
}

// Validates only; interning happens in `encode`.
fn check(snapshot: &Snapshot, slot: FieldSlot, value: &FieldValue) -> Result<()> {
    let ok = match (&snapshot.schema().field(slot).kind, value) {
        (FieldKind::Int, FieldValue::Int(i)) => {
            Vint::try_from(*i)?;
            true
        }
        (FieldKind::Bool, FieldValue::Bool(_))
        | (FieldKind::Date, FieldValue::Date(_))
        | (FieldKind::Text, FieldValue::Text(_))
        | (FieldKind::Ref(_), FieldValue::Ref(_)) => true,
        (FieldKind::Set(_), _) => {
            let (entity, field) = snapshot.schema().names(slot);
            return Err(Error::IsASet { entity, field });
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(mismatch(snapshot, slot, value))
    }
}

fn encode(snapshot: &mut Snapshot, slot: FieldSlot, value: &FieldValue) -> Result<Vint> {
    check(snapshot, slot, value)?;
    Ok(match value {
        FieldValue::Int(i) => Vint::try_from(*i)?,
        FieldValue::Bool(b) => Vint::from(*b),
        FieldValue::Date(d) => Vint::from(*d),
        FieldValue::Text(s) => snapshot.add_string(s),
        FieldValue::Ref(id) => Vint::from(*id),
    })
}

fn decode(view: &DatedView<'_>, slot: FieldSlot, v: Vint) -> Result<FieldValue> {
    let snapshot = view.snapshot();
    Ok(match &snapshot.schema().field(slot).kind {
        FieldKind::Int => FieldValue::Int(v.get()),
        FieldKind::Bool => FieldValue::Bool(v.get() != 0),
        FieldKind::Date => FieldValue::Date(Date(i32::try_from(v.get()).map_err(|_| {
            Error::format(format!("date value {v} out of range"))
        })?)),
        FieldKind::Text => FieldValue::Text(
            view.string(v)
                .ok_or_else(|| Error::format(format!("text index {v} is not in the table")))?
                .to_owned(),
        ),
        FieldKind::Ref(_) => FieldValue::Ref(
            EntityId::try_from(v.get())
                .map_err(|_| Error::format(format!("reference {v} out of range")))?,
        ),
        FieldKind::Set(_) => {
            let (entity, field) = snapshot.schema().names(slot);
            return Err(Error::IsASet { entity, field });
        }
    })
}

/// Stored values for a constructor call: one per non-set field, in
/// declaration order.
fn constructor_values(
    snapshot: &mut Snapshot,
    entity: EntityType,
    fields: &[(&str, FieldValue)],
) -> Result<Vec<Vint>> {
    let schema = Arc::clone(&snapshot.schema);
    let def = schema.entity(entity);

    for (name, value) in fields {
        let slot = schema.field_slot(entity, name)?;
        if schema.field(slot).kind.is_set() {
            return Err(Error::SetFieldInConstructor {
                entity: def.name.clone(),
                field: (*name).to_owned(),
            });
        }
        check(snapshot, slot, value)?;
    }

    let mut ordered = Vec::new();
    for slot in schema.slots(entity) {
        let field = schema.field(slot);
        if field.kind.is_set() {
            continue;
        }
        let Some((_, value)) = fields.iter().rev().find(|(n, _)| *n == field.name) else {
            return Err(Error::MissingField {
                entity: def.name.clone(),
                field: field.name.clone(),
            });
        };
        ordered.push((slot, value));
    }
    ordered
        .into_iter()
        .map(|(slot, value)| encode(snapshot, slot, value))
        .collect()
}

impl<'a> DatedView<'a> {
    pub fn collection(&self, entity: &str) -> Result<Collection<'a>> {
        let entity = self.snapshot().schema().entity_type(entity)?;
        Ok(Collection { view: *self, entity })
    }

    pub fn row(&self, entity: &str, id: EntityId) -> Result<Row<'a>> {
        Ok(self.collection(entity)?.row(id))
    }
}

impl DatedViewMut<'_> {
    pub fn collection_mut(&mut self, entity: &str) -> Result<CollectionMut<'_>> {
        let date = self.date();
        let snapshot = self.snapshot();
        let entity = snapshot.schema().entity_type(entity)?;
        Ok(CollectionMut {
            snapshot,
            date,
            entity,
        })
    }

    pub fn row_mut(&mut self, entity: &str, id: EntityId) -> Result<RowMut<'_>> {
        let date = self.date();
        let snapshot = self.snapshot();
        let entity = snapshot.schema().entity_type(entity)?;
        Ok(RowMut {
            snapshot,
            date,
            entity,
            id,
        })
    }
}

/// All entities of one type, as seen by a dated view.
#[derive(Debug, Clone, Copy)]
pub struct Collection<'a> {
    view: DatedView<'a>,
    entity: EntityType,
}

impl<'a> Collection<'a> {
    pub fn entity_type(&self) -> EntityType {
        self.entity
    }

    pub fn name(&self) -> &'a str {
        &self.view.snapshot().schema().entity(self.entity).name
    }

    pub fn len(&self) -> u32 {
        self.view.count(self.entity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> std::ops::Range<EntityId> {
        0..self.len()
    }

    pub fn rows(self) -> impl Iterator<Item = Row<'a>> {
        let Collection { view, entity } = self;
        self.ids().map(move |id| Row { view, entity, id })
    }

    pub fn row(&self, id: EntityId) -> Row<'a> {
        Row {
            view: self.view,
            entity: self.entity,
            id,
        }
    }
}

/// One entity as seen by a dated view.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    view: DatedView<'a>,
    entity: EntityType,
    id: EntityId,
}

impl<'a> Row<'a> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity
    }

    fn slot(&self, field: &str) -> Result<FieldSlot> {
        self.view.snapshot().schema().field_slot(self.entity, field)
    }

    /// Value in effect, `None` if the field was unset.
    pub fn get(&self, field: &str) -> Result<Option<FieldValue>> {
        Ok(self.detail(field)?.map(|(_, _, v)| v))
    }

    /// The version in effect with its date and transaction.
    pub fn detail(&self, field: &str) -> Result<Option<Version>> {
        let slot = self.slot(field)?;
        self.view
            .find(slot, self.id)
            .map(|e| -> Result<Version> {
                Ok((e.date, e.tx, decode(&self.view, slot, e.value)?))
            })
            .transpose()
    }

    /// Every version visible from this view, newest first.
    pub fn audit(&self, field: &str) -> Result<Vec<Version>> {
        let slot = self.slot(field)?;
        self.view
            .audit(slot, self.id)
            .into_iter()
            .map(|e| -> Result<Version> {
                Ok((e.date, e.tx, decode(&self.view, slot, e.value)?))
            })
            .collect()
    }

    /// Members of a set-valued field.
    pub fn members(&self, field: &str) -> Result<Vec<EntityId>> {
        let slot = self.slot(field)?;
        let schema = self.view.snapshot().schema();
        if !schema.field(slot).kind.is_set() {
            let (entity, field) = schema.names(slot);
            return Err(Error::NotASet { entity, field });
        }
        Ok(self.view.members(slot, self.id))
    }

    /// Row a reference field points at, `None` if unset.
    pub fn follow(&self, field: &str) -> Result<Option<Row<'a>>> {
        let slot = self.slot(field)?;
        let schema = self.view.snapshot().schema();
        let FieldKind::Ref(target) = &schema.field(slot).kind else {
            return Err(mismatch(self.view.snapshot(), slot, &FieldValue::Ref(0)));
        };
        let target = schema.entity_type(target)?;
        Ok(match self.get(field)? {
            Some(FieldValue::Ref(id)) => Some(Row {
                view: self.view,
                entity: target,
                id,
            }),
            _ => None,
        })
    }
}

/// Entities of one type, writable.
#[derive(Debug)]
pub struct CollectionMut<'a> {
    snapshot: &'a mut Snapshot,
    date: Date,
    entity: EntityType,
}

impl CollectionMut<'_> {
    pub fn len(&self) -> u32 {
        self.snapshot.count(self.entity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create an entity from named values.
    ///
    /// Every non-set field must be given; set-valued fields are rejected and
    /// are filled with [`RowMut::insert`] afterwards.
    pub fn create(&mut self, fields: &[(&str, FieldValue)]) -> Result<EntityId> {
        if self.entity == EntityType::TRANSACTIONS {
            return Err(Error::TransactionLog(
                "transaction records are created by commit".into(),
            ));
        }
        let values = constructor_values(self.snapshot, self.entity, fields)?;
        self.snapshot.create(self.date, self.entity, &values)
    }

    pub fn row_mut(&mut self, id: EntityId) -> RowMut<'_> {
        RowMut {
            snapshot: &mut *self.snapshot,
            date: self.date,
            entity: self.entity,
            id,
        }
    }

    pub fn view(&self) -> Collection<'_> {
        Collection {
            view: self.snapshot.at(self.date),
            entity: self.entity,
        }
    }
}

/// One entity, writable. Writes are stamped with the view's date and the
/// snapshot's next transaction.
#[derive(Debug)]
pub struct RowMut<'a> {
    snapshot: &'a mut Snapshot,
    date: Date,
    entity: EntityType,
    id: EntityId,
}

impl RowMut<'_> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn view(&self) -> Row<'_> {
        Row {
            view: self.snapshot.at(self.date),
            entity: self.entity,
            id: self.id,
        }
    }

    fn slot(&self, field: &str) -> Result<FieldSlot> {
        self.snapshot.schema().field_slot(self.entity, field)
    }

    fn set_slot(&self, field: &str) -> Result<FieldSlot> {
        let slot = self.slot(field)?;
        let schema = self.snapshot.schema();
        if !schema.field(slot).kind.is_set() {
            let (entity, field) = schema.names(slot);
            return Err(Error::NotASet { entity, field });
        }
        Ok(slot)
    }

    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        let slot = self.slot(field)?;
        let value = encode(self.snapshot, slot, &value.into())?;
        self.snapshot.write(slot, self.id, self.date, value);
        Ok(())
    }

    /// Add `member` to a set-valued field.
    pub fn insert(&mut self, field: &str, member: EntityId) -> Result<()> {
        let slot = self.set_slot(field)?;
        self.snapshot.set_add(slot, self.id, self.date, member);
        Ok(())
    }

    /// Remove `member` from a set-valued field.
    pub fn remove(&mut self, field: &str, member: EntityId) -> Result<()> {
        let slot = self.set_slot(field)?;
        self.snapshot.set_remove(slot, self.id, self.date, member);
        Ok(())
    }
}

impl Archive {
    /// [`commit`](Self::commit) with a named transaction record.
    pub fn commit_record(
        &mut self,
        mut snapshot: Snapshot,
        date: Date,
        fields: &[(&str, FieldValue)],
    ) -> Result<TxId> {
        let values = constructor_values(&mut snapshot, EntityType::TRANSACTIONS, fields)?;
        self.commit(snapshot, date, &values)
    }
}
