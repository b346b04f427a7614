//! Integration tests for merging pack patches stored in patch files

use attrstore::attribute::{PackAttributeFormatter, VarLenAttributeWriter};
use attrstore::config::{AttributeConfig, PackAttributeConfig, StorageConfig, ValueType};
use attrstore::patch::{apply_pack_patches, merged_pack_value, PatchFileIterator, PatchMerger};
use attrstore::segment::SegmentId;
use attrstore::store::{AppendStore, FileStore, MemStore, SegmentStore};
use attrstore::AttrError;
use tempfile::TempDir;

const DOC_COUNT: u32 = 6;

fn pack_config() -> PackAttributeConfig {
    PackAttributeConfig::new(
        "product",
        100,
        vec![
            AttributeConfig::new("price", 1, ValueType::Int32),
            AttributeConfig::new("title", 2, ValueType::String),
            AttributeConfig::new("sizes", 3, ValueType::UInt16).with_multi_value(true),
        ],
    )
}

fn encode(config: &AttributeConfig, text: &str) -> Vec<u8> {
    let mut out = Vec::new();
    attrstore::attribute::AttributeEncoder::new(config)
        .encode_text(text, &mut out)
        .unwrap();
    out
}

/// Field A patches docs {1,3,5}, B patches {2,3}, C patches {3,4}
fn patch_plan() -> Vec<(usize, Vec<(u32, &'static str)>)> {
    vec![
        (0, vec![(1, "10"), (3, "30"), (5, "50")]),
        (1, vec![(2, "two"), (3, "three")]),
        (2, vec![(3, "1\x1D2"), (4, "4")]),
    ]
}

fn open_streams<'a>(
    pack: &PackAttributeConfig,
    stores: &'a [MemStore],
) -> Vec<PatchFileIterator<&'a MemStore>> {
    pack.sub_fields
        .iter()
        .zip(stores)
        .map(|(config, store)| PatchFileIterator::open_store(config, store, DOC_COUNT).unwrap())
        .collect()
}

fn write_mem_patches(pack: &PackAttributeConfig) -> Vec<MemStore> {
    patch_plan()
        .into_iter()
        .map(|(index, entries)| {
            let config = &pack.sub_fields[index];
            let mut writer = attrstore::patch::PatchFileWriter::new(config, MemStore::new());
            for (doc_id, text) in entries {
                writer.append_text(doc_id, text).unwrap();
            }
            writer.finish().unwrap()
        })
        .collect()
}

#[test]
fn test_merge_order_and_touched_fields() {
    let pack = pack_config();
    let formatter = PackAttributeFormatter::new(&pack);
    let stores = write_mem_patches(&pack);

    let mut merger = PatchMerger::for_pack(&formatter, open_streams(&pack, &stores)).unwrap();
    let mut emitted = Vec::new();
    while let Some(patch) = merger.next_patch().unwrap() {
        emitted.push((patch.doc_id, patch.touched().collect::<Vec<_>>()));
    }

    assert_eq!(
        emitted,
        vec![
            (1, vec![0]),
            (2, vec![1]),
            (3, vec![0, 1, 2]),
            (4, vec![2]),
            (5, vec![0]),
        ]
    );
    assert_eq!(merger.emitted(), 5);
    let patched: Vec<u32> = merger.patched_docs().iter().collect();
    assert_eq!(patched, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_untouched_fields_take_empty_defaults() {
    let pack = pack_config();
    let formatter = PackAttributeFormatter::new(&pack);
    let stores = write_mem_patches(&pack);
    let mut merger = PatchMerger::for_pack(&formatter, open_streams(&pack, &stores)).unwrap();

    let first = merger.next_patch().unwrap().unwrap();
    assert_eq!(first.doc_id, 1);
    let value = merged_pack_value(&formatter, &first, None).unwrap();
    let fields = formatter.split(&value).unwrap();

    assert_eq!(fields[0], &encode(&pack.sub_fields[0], "10")[..]);
    assert_eq!(fields[1], &formatter.encoder(1).unwrap().empty_record().unwrap()[..]);
    assert_eq!(fields[2], &formatter.encoder(2).unwrap().empty_record().unwrap()[..]);

    let second = merger.next_patch().unwrap().unwrap();
    let value = merged_pack_value(&formatter, &second, None).unwrap();
    let fields = formatter.split(&value).unwrap();
    assert_eq!(fields[0], &[0u8; 4][..]);
    assert_eq!(fields[1], &encode(&pack.sub_fields[1], "two")[..]);
}

#[test]
fn test_apply_pack_patches_from_files() {
    let temp_dir = TempDir::new().unwrap();
    let store = SegmentStore::new(temp_dir.path()).unwrap();
    let segment = SegmentId::new(0);
    let pack = pack_config();
    let formatter = PackAttributeFormatter::new(&pack);

    let mut base = VarLenAttributeWriter::new(pack.storage_config(), &StorageConfig::default());
    for doc in 0..DOC_COUNT {
        let price = (doc * 100).to_string();
        let title = format!("doc{}", doc);
        base.add_record(&formatter.encode_text(&[price.as_str(), title.as_str(), "7"]).unwrap())
            .unwrap();
    }
    store.write_attribute(segment, &base).unwrap();

    for (index, entries) in patch_plan() {
        let config = &pack.sub_fields[index];
        let mut writer = store.create_patch_writer(segment, config, 0).unwrap();
        for (doc_id, text) in entries {
            writer.append_text(doc_id, text).unwrap();
        }
        writer.finish().unwrap();
    }

    let mut streams = Vec::new();
    for config in &pack.sub_fields {
        let file = FileStore::open(store.patch_path(segment, &config.name, 0)).unwrap();
        streams.push(PatchFileIterator::open_store(config, file, DOC_COUNT).unwrap());
    }

    let reader = store
        .open_attribute(segment, &pack.storage_config(), DOC_COUNT)
        .unwrap();
    let result =
        apply_pack_patches(&reader, &formatter, streams, &StorageConfig::default()).unwrap();
    assert_eq!(result.patched_docs.len(), 5);

    let patched = result.writer.into_reader().unwrap();
    assert_eq!(patched.doc_count(), DOC_COUNT);

    let field = |doc: u32, index: usize| -> Vec<u8> {
        let value = patched.record(doc).unwrap();
        formatter.sub_field(&value, index).unwrap().to_vec()
    };

    // Untouched document keeps every base value
    assert_eq!(field(0, 1), encode(&pack.sub_fields[1], "doc0"));
    // Doc 1: price patched, title and sizes from base
    assert_eq!(field(1, 0), encode(&pack.sub_fields[0], "10"));
    assert_eq!(field(1, 1), encode(&pack.sub_fields[1], "doc1"));
    assert_eq!(field(1, 2), encode(&pack.sub_fields[2], "7"));
    // Doc 3: all three patched
    assert_eq!(field(3, 0), encode(&pack.sub_fields[0], "30"));
    assert_eq!(field(3, 1), encode(&pack.sub_fields[1], "three"));
    assert_eq!(field(3, 2), encode(&pack.sub_fields[2], "1\x1D2"));
    // Doc 4: only sizes
    assert_eq!(field(4, 0), encode(&pack.sub_fields[0], "400"));
    assert_eq!(field(4, 2), encode(&pack.sub_fields[2], "4"));
}

#[test]
fn test_corrupt_patch_file_fails_pack_apply() {
    let temp_dir = TempDir::new().unwrap();
    let store = SegmentStore::new(temp_dir.path()).unwrap();
    let segment = SegmentId::new(3);
    let pack = pack_config();
    let formatter = PackAttributeFormatter::new(&pack);

    let mut base = VarLenAttributeWriter::new(pack.storage_config(), &StorageConfig::default());
    for _ in 0..DOC_COUNT {
        base.add_record(&formatter.empty_value().unwrap()).unwrap();
    }
    store.write_attribute(segment, &base).unwrap();

    let mut streams = Vec::new();
    for (index, entries) in patch_plan() {
        let config = &pack.sub_fields[index];
        let mut writer = store.create_patch_writer(segment, config, 0).unwrap();
        for (doc_id, text) in entries {
            writer.append_text(doc_id, text).unwrap();
        }
        let mut file = writer.finish().unwrap();
        if index == 1 {
            // A dangling doc id after the last title record
            file.append(&[4, 0]).unwrap();
            file.flush().unwrap();
        }
        drop(file);
        let file = FileStore::open(store.patch_path(segment, &config.name, 0)).unwrap();
        streams.push(PatchFileIterator::open_store(config, file, DOC_COUNT).unwrap());
    }

    let reader = store
        .open_attribute(segment, &pack.storage_config(), DOC_COUNT)
        .unwrap();
    let err = apply_pack_patches(&reader, &formatter, streams, &StorageConfig::default())
        .unwrap_err();
    assert!(matches!(err, AttrError::CorruptPatchStream { ref field, .. } if field == "title"));
}
