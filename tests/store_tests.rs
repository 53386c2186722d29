mod common;

use bitemporal::{Archive, ArchiveFile, ArchiveOptions, Error, FieldValue, LockMode, TxId};
use common::{asset_schema, commit_as, create_assets, d1, d2, simple_schema};
use std::fs;
use tempfile::tempdir;

fn populated() -> Archive {
    let mut archive = Archive::new(simple_schema());
    create_assets(&mut archive, &["A", "B", "C"]);
    let mut snapshot = archive.snapshot_latest();
    snapshot
        .at_mut(d2())
        .row_mut("Asset", 1)
        .unwrap()
        .set("Price", 77)
        .unwrap();
    archive
        .commit_record(snapshot, d2(), &[("User", "zoe".into())])
        .unwrap();
    archive
}

fn price(archive: &Archive, id: u32) -> Option<FieldValue> {
    let snapshot = archive.snapshot_latest();
    snapshot
        .at(d2())
        .row("Asset", id)
        .unwrap()
        .get("Price")
        .unwrap()
}

#[test]
fn test_bytes_round_trip() {
    let archive = populated();
    let bytes = archive.to_bytes();
    let loaded = Archive::from_bytes(simple_schema(), &bytes).unwrap();

    assert_eq!(loaded.counts(), archive.counts());
    assert_eq!(
        loaded.text().iter().collect::<Vec<_>>(),
        archive.text().iter().collect::<Vec<_>>()
    );
    assert_eq!(price(&loaded, 1), Some(FieldValue::Int(77)));
    assert_eq!(loaded.to_bytes(), bytes);
}

#[test]
fn test_empty_archive_bytes() {
    let archive = Archive::new(simple_schema());
    let bytes = archive.to_bytes();
    // two counts of zero, then an empty text table
    assert_eq!(bytes, vec![0x05, 0x01, 0x01, 0x01]);
    let loaded = Archive::from_bytes(simple_schema(), &bytes).unwrap();
    assert_eq!(loaded.latest_tx(), None);
}

#[test]
fn test_from_bytes_rejects_trailing_bytes() {
    let mut bytes = populated().to_bytes();
    bytes.push(0x01);
    assert!(matches!(
        Archive::from_bytes(simple_schema(), &bytes),
        Err(Error::Format(_))
    ));
}

#[test]
fn test_from_bytes_rejects_truncation() {
    let bytes = populated().to_bytes();
    for cut in [1, bytes.len() / 2, bytes.len() - 1] {
        assert!(
            matches!(
                Archive::from_bytes(simple_schema(), &bytes[..cut]),
                Err(Error::Format(_))
            ),
            "cut at {cut}"
        );
    }
}

#[test]
fn test_from_bytes_rejects_other_schema() {
    let bytes = populated().to_bytes();
    assert!(matches!(
        Archive::from_bytes(asset_schema(), &bytes),
        Err(Error::Format(_))
    ));
}

#[test]
fn test_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("assets.bt");
    let archive = populated();

    let file = ArchiveFile::open(&path, ArchiveOptions::default()).unwrap();
    file.save(&archive).unwrap();
    assert!(file.exists());

    let loaded = file.load(simple_schema()).unwrap();
    assert_eq!(loaded.counts(), archive.counts());
    assert_eq!(price(&loaded, 1), Some(FieldValue::Int(77)));
    assert_eq!(fs::read(&path).unwrap(), archive.to_bytes());
}

#[test]
fn test_load_missing_file_is_empty() {
    let dir = tempdir().unwrap();
    let file = ArchiveFile::open(dir.path().join("new.bt"), ArchiveOptions::default()).unwrap();
    assert!(!file.exists());
    let archive = file.load(simple_schema()).unwrap();
    assert_eq!(archive.transaction_count(), 0);
}

#[test]
fn test_open_creates_parent_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("deeper").join("a.bt");
    let file = ArchiveFile::open(&path, ArchiveOptions::default()).unwrap();
    file.save(&Archive::new(simple_schema())).unwrap();
    assert!(path.exists());
}

#[test]
fn test_no_tmp_file_after_save() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("assets.bt");
    let file = ArchiveFile::open(&path, ArchiveOptions::default()).unwrap();
    file.save(&populated()).unwrap();

    assert!(path.exists());
    assert!(!dir.path().join("assets.bt.tmp").exists());
}

#[test]
fn test_save_replaces_previous_contents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("assets.bt");
    let file = ArchiveFile::open(&path, ArchiveOptions::default()).unwrap();

    let mut archive = Archive::new(asset_schema());
    file.save(&archive).unwrap();
    let snapshot = archive.snapshot_latest();
    commit_as(&mut archive, snapshot, d1(), "alice");
    file.save(&archive).unwrap();

    let loaded = file.load(asset_schema()).unwrap();
    assert_eq!(loaded.latest_tx(), Some(TxId(0)));
}

#[test]
fn test_compressed_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("assets.bt.zst");
    let archive = populated();

    let options = ArchiveOptions::default().compression(3);
    let file = ArchiveFile::open(&path, options).unwrap();
    file.save(&archive).unwrap();

    let raw = fs::read(&path).unwrap();
    assert_eq!(&raw[..4], &[0x28, 0xB5, 0x2F, 0xFD]);

    let loaded = file.load(simple_schema()).unwrap();
    assert_eq!(loaded.to_bytes(), archive.to_bytes());
    drop(file);

    // compression is detected regardless of the reader's options
    let loaded = Archive::open(&path, simple_schema()).unwrap();
    assert_eq!(price(&loaded, 1), Some(FieldValue::Int(77)));
}

#[test]
fn test_checksum_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("assets.bt");
    let options = ArchiveOptions::default().checksum(true);
    let file = ArchiveFile::open(&path, options).unwrap();
    let archive = populated();
    file.save(&archive).unwrap();

    assert_eq!(
        fs::read(&path).unwrap().len(),
        archive.to_bytes().len() + 8
    );
    let loaded = file.load(simple_schema()).unwrap();
    assert_eq!(loaded.counts(), archive.counts());
}

#[test]
fn test_checksum_detects_corruption() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("assets.bt");
    let options = ArchiveOptions::default().checksum(true);
    let file = ArchiveFile::open(&path, options).unwrap();
    file.save(&populated()).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x40;
    fs::write(&path, &bytes).unwrap();

    let err = file.load(simple_schema()).unwrap_err();
    assert!(matches!(err, Error::Format(msg) if msg.contains("checksum")));
}

#[test]
fn test_compressed_and_checksummed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("assets.bt");
    let options = ArchiveOptions::default().compression(1).checksum(true);
    let file = ArchiveFile::open(&path, options).unwrap();
    let archive = populated();
    file.save(&archive).unwrap();
    let loaded = file.load(simple_schema()).unwrap();
    assert_eq!(loaded.to_bytes(), archive.to_bytes());
}

#[test]
fn test_corrupt_compressed_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("assets.bt");
    let mut bytes = zstd::encode_all(&populated().to_bytes()[..], 3).unwrap();
    bytes.truncate(bytes.len() - 3);
    fs::write(&path, &bytes).unwrap();

    let file = ArchiveFile::open(&path, ArchiveOptions::default()).unwrap();
    assert!(matches!(
        file.load(simple_schema()),
        Err(Error::Format(_))
    ));
}

#[test]
fn test_lock_is_exclusive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("assets.bt");

    let first = ArchiveFile::open(&path, ArchiveOptions::default()).unwrap();
    let err = ArchiveFile::open(&path, ArchiveOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Locked { .. }));

    drop(first);
    assert!(ArchiveFile::open(&path, ArchiveOptions::default()).is_ok());
}

#[test]
fn test_lock_mode_none() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("assets.bt");
    let options = ArchiveOptions::default().lock(LockMode::None);

    let _first = ArchiveFile::open(&path, options.clone()).unwrap();
    let second = ArchiveFile::open(&path, options).unwrap();
    assert_eq!(second.options().lock, LockMode::None);
    assert!(!dir.path().join("assets.bt.lock").exists());
}

#[test]
fn test_options_from_json() {
    let options =
        ArchiveOptions::from_json(r#"{"compression": 5, "checksum": true, "lock": "none"}"#)
            .unwrap();
    assert_eq!(
        options,
        ArchiveOptions::default()
            .compression(5)
            .checksum(true)
            .lock(LockMode::None)
    );
    assert_eq!(ArchiveOptions::from_json("{}").unwrap(), ArchiveOptions::default());
    assert!(matches!(
        ArchiveOptions::from_json(r#"{"lock": "shared"}"#),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_archive_save_and_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.bt");
    let archive = populated();
    archive.save(&path).unwrap();
    let loaded = Archive::open(&path, simple_schema()).unwrap();
    assert_eq!(loaded.to_bytes(), archive.to_bytes());
}

#[test]
fn test_open_missing_archive_is_io_error() {
    let dir = tempdir().unwrap();
    let err = Archive::open(dir.path().join("absent.bt"), simple_schema()).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
