mod common;

use bitemporal::{Archive, Date, Error, FieldValue, Schema, TxId};
use common::{asset_schema, commit_as, commit_simple, d1, d2, date, simple_schema};

#[test]
fn test_end_to_end_price_history() {
    let schema = Schema::parse("Tx\nUser string\n\nAsset\nName string\nPrice int\n").unwrap();
    let mut archive = Archive::new(schema);

    let snapshot = archive.snapshot_latest();
    let tx0 = commit_simple(&mut archive, snapshot, d1());

    let mut snapshot = archive.snapshot_latest();
    let id = snapshot
        .at_mut(d1())
        .collection_mut("Asset")
        .unwrap()
        .create(&[("Name", "ABC".into()), ("Price", 100.into())])
        .unwrap();
    let tx1 = commit_simple(&mut archive, snapshot, d1());

    let snapshot = archive.snapshot_latest();
    let asset = snapshot.at(d1()).row("Asset", id).unwrap();
    assert_eq!(asset.get("Price").unwrap(), Some(FieldValue::Int(100)));
    assert_eq!(asset.get("Name").unwrap(), Some(FieldValue::Text("ABC".into())));

    let mut snapshot = archive.snapshot_latest();
    snapshot
        .at_mut(d2())
        .row_mut("Asset", id)
        .unwrap()
        .set("Price", 150)
        .unwrap();
    let tx2 = commit_simple(&mut archive, snapshot, d2());
    assert_eq!((tx0, tx1, tx2), (TxId(0), TxId(1), TxId(2)));

    let snapshot = archive.snapshot_latest();
    let at_d1 = snapshot.at(d1()).row("Asset", id).unwrap();
    let at_d2 = snapshot.at(d2()).row("Asset", id).unwrap();
    assert_eq!(at_d1.get("Price").unwrap(), Some(FieldValue::Int(100)));
    assert_eq!(at_d2.get("Price").unwrap(), Some(FieldValue::Int(150)));
    assert_eq!(
        at_d2.audit("Price").unwrap(),
        vec![
            (d2(), tx2, FieldValue::Int(150)),
            (d1(), tx1, FieldValue::Int(100)),
        ]
    );
    assert_eq!(
        at_d2.detail("Price").unwrap(),
        Some((d2(), tx2, FieldValue::Int(150)))
    );
}

#[test]
fn test_collection_rows() {
    let mut archive = Archive::new(simple_schema());
    common::create_assets(&mut archive, &["A", "B", "C"]);

    let snapshot = archive.snapshot_latest();
    let assets = snapshot.at(d1()).collection("Asset").unwrap();
    assert_eq!(assets.name(), "Asset");
    assert_eq!(assets.len(), 3);
    assert!(!assets.is_empty());
    assert_eq!(assets.ids(), 0..3);

    let names: Vec<String> = assets
        .rows()
        .map(|row| row.get("Name").unwrap().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["A", "B", "C"]);
}

#[test]
fn test_unset_field_reads_none() {
    let mut archive = Archive::new(simple_schema());
    common::create_assets(&mut archive, &["A"]);
    let snapshot = archive.snapshot_latest();

    let before = snapshot.at(date(2000, 1, 1)).row("Asset", 0).unwrap();
    assert_eq!(before.get("Price").unwrap(), None);
    assert_eq!(before.detail("Price").unwrap(), None);
    assert!(before.audit("Price").unwrap().is_empty());

    let missing = snapshot.at(d1()).row("Asset", 42).unwrap();
    assert_eq!(missing.get("Name").unwrap(), None);
}

#[test]
fn test_create_validates_fields() {
    let archive = Archive::new(asset_schema());
    let mut snapshot = archive.snapshot_latest();
    let mut view = snapshot.at_mut(d1());
    let mut assets = view.collection_mut("Asset").unwrap();

    assert!(matches!(
        assets.create(&[("Name", "A".into())]),
        Err(Error::MissingField { field, .. }) if field == "Price"
    ));
    assert!(matches!(
        assets.create(&[("Name", "A".into()), ("Price", 1.into()), ("Colour", 1.into())]),
        Err(Error::UnknownField { field, .. }) if field == "Colour"
    ));
    assert!(matches!(
        assets.create(&[
            ("Name", "A".into()),
            ("Price", 1.into()),
            ("Positions", FieldValue::Ref(0)),
        ]),
        Err(Error::SetFieldInConstructor { field, .. }) if field == "Positions"
    ));
    assert!(matches!(
        assets.create(&[("Name", 5.into()), ("Price", 1.into())]),
        Err(Error::TypeMismatch { field, .. }) if field == "Name"
    ));
    assert!(matches!(
        assets.create(&[("Name", "A".into()), ("Price", (1i64 << 60).into())]),
        Err(Error::OutOfRange(_))
    ));
    assert!(assets.is_empty());
    drop(view);
    // failed constructors intern nothing
    assert!(!snapshot.is_dirty());
}

#[test]
fn test_unknown_collection() {
    let archive = Archive::new(asset_schema());
    let snapshot = archive.snapshot_latest();
    assert!(matches!(
        snapshot.at(d1()).collection("Trade"),
        Err(Error::UnknownEntity(name)) if name == "Trade"
    ));
}

#[test]
fn test_set_fields_through_rows() {
    let mut archive = Archive::new(asset_schema());

    let mut snapshot = archive.snapshot_latest();
    let mut view = snapshot.at_mut(d1());
    let asset = view
        .collection_mut("Asset")
        .unwrap()
        .create(&[("Name", "ABC".into()), ("Price", 100.into())])
        .unwrap();
    let mut positions = Vec::new();
    for quantity in [10, 20] {
        let id = view
            .collection_mut("Position")
            .unwrap()
            .create(&[("Asset", FieldValue::Ref(asset)), ("Quantity", quantity.into())])
            .unwrap();
        positions.push(id);
    }
    let mut row = view.row_mut("Asset", asset).unwrap();
    for &p in &positions {
        row.insert("Positions", p).unwrap();
    }
    assert!(matches!(
        row.insert("Price", 0),
        Err(Error::NotASet { field, .. }) if field == "Price"
    ));
    assert!(matches!(
        row.set("Positions", FieldValue::Ref(0)),
        Err(Error::IsASet { .. })
    ));
    commit_as(&mut archive, snapshot, d1(), "alice");

    let mut snapshot = archive.snapshot_latest();
    snapshot
        .at_mut(d2())
        .row_mut("Asset", asset)
        .unwrap()
        .remove("Positions", positions[0])
        .unwrap();
    commit_as(&mut archive, snapshot, d2(), "bob");

    let snapshot = archive.snapshot_latest();
    let at_d1 = snapshot.at(d1()).row("Asset", asset).unwrap();
    let mut members = at_d1.members("Positions").unwrap();
    members.sort();
    assert_eq!(members, positions);
    let at_d2 = snapshot.at(d2()).row("Asset", asset).unwrap();
    assert_eq!(at_d2.members("Positions").unwrap(), vec![positions[1]]);
    assert!(matches!(
        at_d2.members("Name"),
        Err(Error::NotASet { .. })
    ));

    let position = snapshot.at(d2()).row("Position", positions[1]).unwrap();
    let owner = position.follow("Asset").unwrap().unwrap();
    assert_eq!(owner.id(), asset);
    assert_eq!(owner.get("Name").unwrap(), Some(FieldValue::Text("ABC".into())));
}

#[test]
fn test_transaction_records() {
    let mut archive = Archive::new(asset_schema());
    let snapshot = archive.snapshot_latest();
    commit_as(&mut archive, snapshot, d1(), "alice");
    let snapshot = archive.snapshot_latest();
    commit_as(&mut archive, snapshot, d2(), "bob");

    let snapshot = archive.snapshot_latest();
    let txs = snapshot.at(d2()).collection("Tx").unwrap();
    let users: Vec<FieldValue> = txs.rows().map(|r| r.get("User").unwrap().unwrap()).collect();
    assert_eq!(users, vec!["alice".into(), "bob".into()]);
    assert_eq!(
        txs.row(1).get("Time").unwrap(),
        Some(FieldValue::Date(d2()))
    );

    // the second transaction is dated d2, so it is not in effect at d1
    let at_d1 = snapshot.at(d1()).collection("Tx").unwrap();
    assert_eq!(at_d1.row(1).get("User").unwrap(), None);
}

#[test]
fn test_commit_record_rejects_bad_fields() {
    let mut archive = Archive::new(asset_schema());
    let snapshot = archive.snapshot_latest();
    let err = archive
        .commit_record(snapshot, d1(), &[("User", "alice".into())])
        .unwrap_err();
    assert!(matches!(err, Error::MissingField { field, .. } if field == "Time"));
    assert_eq!(archive.transaction_count(), 0);
}

#[test]
fn test_bool_and_date_fields() {
    let schema = Schema::parse("Tx\nUser string\n\nBond\nActive bool\nMaturity Date\n").unwrap();
    let mut archive = Archive::new(schema);
    let maturity = date(2031, 6, 30);

    let mut snapshot = archive.snapshot_latest();
    let id = snapshot
        .at_mut(d1())
        .collection_mut("Bond")
        .unwrap()
        .create(&[("Active", true.into()), ("Maturity", maturity.into())])
        .unwrap();
    commit_simple(&mut archive, snapshot, d1());

    let mut snapshot = archive.snapshot_latest();
    snapshot
        .at_mut(d2())
        .row_mut("Bond", id)
        .unwrap()
        .set("Active", false)
        .unwrap();
    commit_simple(&mut archive, snapshot, d2());

    let snapshot = archive.snapshot_latest();
    let bond = snapshot.at(d1()).row("Bond", id).unwrap();
    assert_eq!(bond.get("Active").unwrap(), Some(FieldValue::Bool(true)));
    assert_eq!(bond.get("Maturity").unwrap().and_then(|v| v.as_date()), Some(maturity));
    let bond = snapshot.at(d2()).row("Bond", id).unwrap();
    assert_eq!(bond.get("Active").unwrap().and_then(|v| v.as_bool()), Some(false));
}

#[test]
fn test_field_value_display() {
    assert_eq!(FieldValue::Int(-3).to_string(), "-3");
    assert_eq!(FieldValue::Ref(7).to_string(), "#7");
    assert_eq!(FieldValue::from(Date::from_ymd(2024, 1, 2).unwrap()).to_string(), "2024-01-02");
    assert_eq!(FieldValue::from("x").as_text(), Some("x"));
    assert_eq!(FieldValue::Int(4).as_int(), Some(4));
    assert_eq!(FieldValue::Bool(true).as_int(), None);
}
