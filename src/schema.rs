//! Entity and field declarations.
//!
//! The schema fixes the slot layout of an archive: slots are numbered entity
//! by entity, field by field, in declaration order, and the file format relies
//! on that order because the file itself carries no metadata.
//!
//! Schemas can be written in the line-oriented `.bitemporal` format:
//!
//! ```text
//! Tx
//! Time Date
//! User string
//!
//! Asset
//! Name string
//! Price int
//! Positions Position Set
//!
//! Position
//! Asset Asset
//! Quantity int
//! ```
//!
//! or as JSON through serde. The first entity is always the transaction log.

use crate::error::{Error, Result};
use crate::types::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Type of a field as declared in the schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldKind {
    Int,
    Bool,
    Date,
    Text,
    /// Reference to one entity of the named type.
    Ref(String),
    /// Many-valued relationship to entities of the named type.
    Set(String),
}

impl FieldKind {
    pub fn is_set(&self) -> bool {
        matches!(self, FieldKind::Set(_))
    }

    /// Referenced entity type name for `Ref` and `Set`.
    pub fn target(&self) -> Option<&str> {
        match self {
            FieldKind::Ref(t) | FieldKind::Set(t) => Some(t),
            _ => None,
        }
    }

    /// Parse a declared type name such as `int`, `string` or `Position Set`.
    pub fn parse(s: &str) -> Result<FieldKind> {
        let s = s.trim();
        if let Some(target) = s.strip_suffix(" Set") {
            let target = target.trim();
            if !is_identifier(target) {
                return Err(Error::Schema(format!("invalid set target `{target}`")));
            }
            return Ok(FieldKind::Set(target.to_owned()));
        }
        Ok(match s {
            "int" | "long" | "i64" => FieldKind::Int,
            "bool" => FieldKind::Bool,
            "Date" | "date" => FieldKind::Date,
            "string" | "String" => FieldKind::Text,
            other if is_identifier(other) => FieldKind::Ref(other.to_owned()),
            other => return Err(Error::Schema(format!("invalid field type `{other}`"))),
        })
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Int => f.write_str("int"),
            FieldKind::Bool => f.write_str("bool"),
            FieldKind::Date => f.write_str("Date"),
            FieldKind::Text => f.write_str("string"),
            FieldKind::Ref(t) => f.write_str(t),
            FieldKind::Set(t) => write!(f, "{t} Set"),
        }
    }
}

impl TryFrom<String> for FieldKind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        FieldKind::parse(&s)
    }
}

impl From<FieldKind> for String {
    fn from(kind: FieldKind) -> Self {
        kind.to_string()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        EntityDef {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Storage address of one field of one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldSlot {
    entity: EntityType,
    field: usize,
    index: usize,
}

impl FieldSlot {
    pub fn entity(self) -> EntityType {
        self.entity
    }

    /// Position of the field within its entity.
    pub fn field(self) -> usize {
        self.field
    }

    /// Position of the slot across the whole schema.
    pub fn index(self) -> usize {
        self.index
    }
}

#[derive(Serialize, Deserialize)]
struct SchemaFile {
    entities: Vec<EntityDef>,
}

/// Validated list of entity types and their fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaFile", into = "SchemaFile")]
pub struct Schema {
    entities: Vec<EntityDef>,
    // slot index of each entity's first field
    offsets: Vec<usize>,
    slot_count: usize,
}

impl TryFrom<SchemaFile> for Schema {
    type Error = Error;

    fn try_from(file: SchemaFile) -> Result<Self> {
        Schema::new(file.entities)
    }
}

impl From<Schema> for SchemaFile {
    fn from(schema: Schema) -> Self {
        SchemaFile {
            entities: schema.entities,
        }
    }
}

impl Schema {
    /// Validate `entities` and lay out their slots. The first entity is the
    /// transaction log.
    pub fn new(entities: Vec<EntityDef>) -> Result<Schema> {
        if entities.is_empty() {
            return Err(Error::Schema(
                "at least the transaction log entity is required".into(),
            ));
        }
        if u32::try_from(entities.len()).is_err() {
            return Err(Error::Schema("too many entity types".into()));
        }

        let mut names = HashSet::new();
        for e in &entities {
            if !is_identifier(&e.name) {
                return Err(Error::Schema(format!("invalid entity name `{}`", e.name)));
            }
            if !names.insert(e.name.as_str()) {
                return Err(Error::Schema(format!("duplicate entity `{}`", e.name)));
            }
        }

        let mut offsets = Vec::with_capacity(entities.len());
        let mut slot_count = 0;
        for e in &entities {
            let Some(first) = e.fields.first() else {
                return Err(Error::Schema(format!("entity `{}` has no fields", e.name)));
            };
            if first.kind.is_set() {
                return Err(Error::Schema(format!(
                    "first field of `{}` must not be set-valued",
                    e.name
                )));
            }
            let mut field_names = HashSet::new();
            for f in &e.fields {
                if !is_identifier(&f.name) {
                    return Err(Error::Schema(format!(
                        "invalid field name `{}` on `{}`",
                        f.name, e.name
                    )));
                }
                if !field_names.insert(f.name.as_str()) {
                    return Err(Error::Schema(format!(
                        "duplicate field `{}.{}`",
                        e.name, f.name
                    )));
                }
                if let Some(target) = f.kind.target() {
                    if !names.contains(target) {
                        return Err(Error::Schema(format!(
                            "`{}.{}` refers to unknown entity `{target}`",
                            e.name, f.name
                        )));
                    }
                }
            }
            offsets.push(slot_count);
            slot_count += e.fields.len();
        }

        Ok(Schema {
            entities,
            offsets,
            slot_count,
        })
    }

    /// Parse the line-oriented `.bitemporal` format shown in the module docs.
    pub fn parse(text: &str) -> Result<Schema> {
        let mut entities = Vec::new();
        let mut lines = text.lines().enumerate().peekable();
        while let Some((_, line)) = lines.next() {
            let name = line.trim();
            if name.is_empty() {
                continue;
            }
            let mut entity = EntityDef::new(name);
            while let Some((n, line)) = lines.next_if(|(_, l)| !l.trim().is_empty()) {
                let line = line.trim();
                let Some((field, kind)) = line.split_once(char::is_whitespace) else {
                    return Err(Error::Schema(format!(
                        "line {}: expected `FieldName Type`, found `{line}`",
                        n + 1
                    )));
                };
                entity = entity.field(field, FieldKind::parse(kind)?);
            }
            entities.push(entity);
        }
        Schema::new(entities)
    }

    pub fn from_json(json: &str) -> Result<Schema> {
        serde_json::from_str(json).map_err(|e| Error::Schema(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Schema(e.to_string()))
    }

    pub fn entities(&self) -> &[EntityDef] {
        &self.entities
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// # Panics
    ///
    /// Panics if `entity` does not belong to this schema.
    pub fn entity(&self, entity: EntityType) -> &EntityDef {
        &self.entities[entity.index()]
    }

    pub fn entity_type(&self, name: &str) -> Result<EntityType> {
        self.entities
            .iter()
            .position(|e| e.name == name)
            .map(|i| EntityType(i as u32))
            .ok_or_else(|| Error::UnknownEntity(name.to_owned()))
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Slot of field number `field` of `entity`, if both exist.
    pub fn slot_at(&self, entity: EntityType, field: usize) -> Option<FieldSlot> {
        let def = self.entities.get(entity.index())?;
        (field < def.fields.len()).then(|| FieldSlot {
            entity,
            field,
            index: self.offsets[entity.index()] + field,
        })
    }

    pub fn slot(&self, entity: &str, field: &str) -> Result<FieldSlot> {
        let ty = self.entity_type(entity)?;
        self.field_slot(ty, field)
    }

    pub fn field_slot(&self, entity: EntityType, field: &str) -> Result<FieldSlot> {
        let def = self.entity(entity);
        def.field_index(field)
            .and_then(|i| self.slot_at(entity, i))
            .ok_or_else(|| Error::UnknownField {
                entity: def.name.clone(),
                field: field.to_owned(),
            })
    }

    /// Field 0 of `entity`, whose history dates the entity's creation.
    pub fn anchor(&self, entity: EntityType) -> FieldSlot {
        FieldSlot {
            entity,
            field: 0,
            index: self.offsets[entity.index()],
        }
    }

    /// Slots of `entity` in declaration order.
    pub fn slots(&self, entity: EntityType) -> impl Iterator<Item = FieldSlot> + '_ {
        let offset = self.offsets[entity.index()];
        (0..self.entity(entity).fields.len()).map(move |field| FieldSlot {
            entity,
            field,
            index: offset + field,
        })
    }

    /// Every slot of the schema, in file order.
    pub fn all_slots(&self) -> impl Iterator<Item = FieldSlot> + '_ {
        (0..self.entities.len()).flat_map(move |e| self.slots(EntityType(e as u32)))
    }

    pub fn field(&self, slot: FieldSlot) -> &FieldDef {
        &self.entity(slot.entity).fields[slot.field]
    }

    pub(crate) fn names(&self, slot: FieldSlot) -> (String, String) {
        (
            self.entity(slot.entity).name.clone(),
            self.field(slot).name.clone(),
        )
    }
}
