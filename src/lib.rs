//! Bitemporal archive: every field of every entity keeps its full history
//! along valid time (dates) and transaction time (commits).

mod archive;
mod chain;
mod error;
mod record;
mod schema;
pub mod slim;
mod snapshot;
mod store;
mod text;
mod types;
pub mod varint;
mod view;

pub use archive::Archive;
pub use chain::{Entry, Iter, VersionChain};
pub use error::{Error, Result};
pub use record::{Collection, CollectionMut, FieldValue, Row, RowMut, Version};
pub use schema::{EntityDef, FieldDef, FieldKind, FieldSlot, Schema};
pub use snapshot::Snapshot;
pub use store::{ArchiveFile, ArchiveOptions, LockMode};
pub use text::TextTable;
pub use types::{Date, EntityId, EntityType, TxId, Vint};
pub use view::{DatedView, DatedViewMut};
