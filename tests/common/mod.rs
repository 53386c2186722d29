#![allow(dead_code)]

use bitemporal::{Archive, Date, EntityDef, FieldKind, FieldValue, Schema, Snapshot, TxId};

pub const ASSET_SCHEMA: &str = "\
Tx
Time Date
User string

Asset
Name string
Price int
Positions Position Set

Position
Asset Asset
Quantity int
";

pub fn asset_schema() -> Schema {
    Schema::parse(ASSET_SCHEMA).unwrap()
}

/// Transaction log plus a two-field Asset, no relationships.
pub fn simple_schema() -> Schema {
    Schema::new(vec![
        EntityDef::new("Tx").field("User", FieldKind::Text),
        EntityDef::new("Asset")
            .field("Name", FieldKind::Text)
            .field("Price", FieldKind::Int),
    ])
    .unwrap()
}

pub fn date(year: i32, month: u32, day: u32) -> Date {
    Date::from_ymd(year, month, day).unwrap()
}

pub fn d1() -> Date {
    date(2024, 1, 2)
}

pub fn d2() -> Date {
    date(2024, 3, 15)
}

pub fn commit_as(archive: &mut Archive, snapshot: Snapshot, date: Date, user: &str) -> TxId {
    archive
        .commit_record(
            snapshot,
            date,
            &[("Time", FieldValue::Date(date)), ("User", user.into())],
        )
        .unwrap()
}

pub fn commit_simple(archive: &mut Archive, snapshot: Snapshot, date: Date) -> TxId {
    archive
        .commit_record(snapshot, date, &[("User", "test".into())])
        .unwrap()
}

/// Creates one Asset per name in its own transaction, returning the ids.
pub fn create_assets(archive: &mut Archive, names: &[&str]) -> Vec<u32> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mut snapshot = archive.snapshot_latest();
            let id = snapshot
                .at_mut(d1())
                .collection_mut("Asset")
                .unwrap()
                .create(&[("Name", (*name).into()), ("Price", (i as i64).into())])
                .unwrap();
            commit_simple(archive, snapshot, d1());
            id
        })
        .collect()
}
