//! Integration tests for offset table promotion through the attribute writer

use attrstore::attribute::{OffsetTable, OffsetWidth, VarLenAttributeWriter};
use attrstore::config::{AttributeConfig, StorageConfig, ValueType};
use attrstore::store::{MemStore, ByteStore};

#[test]
fn test_promotion_is_transparent() {
    let mut promoted = OffsetTable::new();
    let mut wide = OffsetTable::with_capacity(0, true);

    let mut offsets: Vec<u64> = (0..64u64).map(|i| i * 10).collect();
    offsets.push(u32::MAX as u64 + 17);
    offsets.push(u32::MAX as u64 + 40);

    for &offset in &offsets {
        promoted.append(offset);
        wide.append(offset);
    }

    assert!(promoted.is_wide());
    assert_eq!(promoted.width(), OffsetWidth::Eight);
    for (ordinal, &offset) in offsets.iter().enumerate() {
        assert_eq!(promoted.get(ordinal), Some(offset));
        assert_eq!(promoted.get(ordinal), wide.get(ordinal));
    }
    assert_eq!(promoted.to_bytes(), wide.to_bytes());
    assert_eq!(
        promoted.record_range(64),
        Some(u32::MAX as u64 + 17..u32::MAX as u64 + 40)
    );
}

#[test]
fn test_stored_width_is_inferred() {
    let config = AttributeConfig::new("tags", 1, ValueType::String).with_multi_value(true);

    for wide in [false, true] {
        let storage = StorageConfig::default().with_wide_offsets(wide);
        let mut writer = VarLenAttributeWriter::new(config.clone(), &storage);
        writer.add_text("a\x1Dbb").unwrap();
        writer.add_empty().unwrap();

        let mut data = MemStore::new();
        let mut offsets = MemStore::new();
        writer.dump(&mut data, &mut offsets).unwrap();

        let entry = if wide { 8 } else { 4 };
        assert_eq!(offsets.len(), 3 * entry);

        let table = OffsetTable::open(&offsets, 2).unwrap();
        assert_eq!(table.is_wide(), wide);
        assert_eq!(table.last(), Some(data.len()));
    }
}

#[test]
fn test_offset_length_mismatch_is_format_error() {
    let offsets = MemStore::from(vec![0u8; 20]);
    let err = OffsetTable::open(&offsets, 3).unwrap_err();
    assert!(err.is_fatal_format());
}
