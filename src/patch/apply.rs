//! Applying merged patches to a segment attribute
//!
//! Patch application rewrites the attribute into a fresh writer: documents
//! without a patch keep their base record, patched documents take the merged
//! value. For packs, untouched sub-fields keep the base document's value.

use std::ops::Range;

use roaring::RoaringBitmap;
use tracing::info;

use super::file::PatchStream;
use super::merger::{MergedPatch, PatchMerger};
use crate::attribute::{PackAttributeFormatter, VarLenAttributeReader, VarLenAttributeWriter};
use crate::config::StorageConfig;
use crate::error::{AttrError, Result};
use crate::store::ByteStore;

/// Rewritten attribute plus the set of patched documents
#[derive(Debug)]
pub struct PatchApplyResult {
    pub writer: VarLenAttributeWriter,
    pub patched_docs: RoaringBitmap,
}

fn copy_base<S: ByteStore>(
    base: &VarLenAttributeReader<S>,
    writer: &mut VarLenAttributeWriter,
    ordinals: Range<u32>,
) -> Result<()> {
    for ordinal in ordinals {
        let record = base.record(ordinal)?;
        writer.push_record(&record);
    }
    Ok(())
}

fn check_bound<S: ByteStore>(base: &VarLenAttributeReader<S>, doc_id: u32) -> Result<()> {
    if doc_id >= base.doc_count() {
        return Err(AttrError::format(
            format!("doc id bound of patches for attribute {}", base.name()),
            base.doc_count() as u64,
            doc_id as u64,
        ));
    }
    Ok(())
}

/// Apply one field's patches (usually a [`super::FieldPatchReader`]) to
/// its base attribute
pub fn apply_field_patches<S: ByteStore, P: PatchStream>(
    base: &VarLenAttributeReader<S>,
    patches: P,
    storage: &StorageConfig,
) -> Result<PatchApplyResult> {
    if patches.field_id() != base.config().field_id {
        return Err(AttrError::InvalidRequest(format!(
            "patches of field {} cannot apply to attribute {}",
            patches.field_id(),
            base.name()
        )));
    }

    let mut writer = VarLenAttributeWriter::new(base.config().clone(), storage);
    let mut merger = PatchMerger::for_field(patches)?;
    let mut next_ordinal = 0u32;

    while let Some(patch) = merger.next_patch()? {
        check_bound(base, patch.doc_id)?;
        copy_base(base, &mut writer, next_ordinal..patch.doc_id)?;
        match patch.get(0) {
            Some(record) => writer.add_record(record)?,
            None => writer.push_record(&base.record(patch.doc_id)?),
        }
        next_ordinal = patch.doc_id + 1;
    }
    copy_base(base, &mut writer, next_ordinal..base.doc_count())?;

    let patched_docs = merger.into_patched_docs();
    info!(
        field = %base.name(),
        patched = patched_docs.len(),
        docs = base.doc_count(),
        "applied field patches"
    );
    Ok(PatchApplyResult {
        writer,
        patched_docs,
    })
}

/// Build a full pack value for a merged patch.
///
/// Untouched sub-fields come from `base` when given, otherwise they take the
/// sub-field's empty record.
pub fn merged_pack_value(
    formatter: &PackAttributeFormatter,
    patch: &MergedPatch<'_>,
    base: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let replacements = patch.slots();
    match base {
        Some(base) => formatter.rebuild(base, &replacements),
        None => formatter.rebuild(&formatter.empty_value()?, &replacements),
    }
}

/// Apply per-sub-field patch streams to a pack attribute
pub fn apply_pack_patches<S: ByteStore, P: PatchStream>(
    base: &VarLenAttributeReader<S>,
    formatter: &PackAttributeFormatter,
    streams: Vec<P>,
    storage: &StorageConfig,
) -> Result<PatchApplyResult> {
    let mut writer = VarLenAttributeWriter::new(base.config().clone(), storage);
    let mut merger = PatchMerger::for_pack(formatter, streams)?;
    let mut next_ordinal = 0u32;

    while let Some(patch) = merger.next_patch()? {
        check_bound(base, patch.doc_id)?;
        copy_base(base, &mut writer, next_ordinal..patch.doc_id)?;
        let base_value = base.record(patch.doc_id)?;
        let value = merged_pack_value(formatter, &patch, Some(&*base_value))?;
        writer.push_record(&value);
        next_ordinal = patch.doc_id + 1;
    }
    copy_base(base, &mut writer, next_ordinal..base.doc_count())?;

    let patched_docs = merger.into_patched_docs();
    info!(
        pack = %formatter.config().name,
        patched = patched_docs.len(),
        docs = base.doc_count(),
        "applied pack patches"
    );
    Ok(PatchApplyResult {
        writer,
        patched_docs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeEncoder;
    use crate::config::{AttributeConfig, FieldId, PackAttributeConfig, ValueType};
    use crate::patch::{FieldPatchReader, PatchFileIterator, PatchFileWriter};
    use crate::store::MemStore;

    fn title() -> AttributeConfig {
        AttributeConfig::new("title", 1, ValueType::String)
    }

    fn base_reader(config: &AttributeConfig, values: &[&str]) -> VarLenAttributeReader<MemStore> {
        let mut writer = VarLenAttributeWriter::new(config.clone(), &StorageConfig::default());
        for value in values {
            writer.add_text(value).unwrap();
        }
        writer.into_reader().unwrap()
    }

    fn decode_title(reader: &VarLenAttributeReader<MemStore>, doc: u32) -> String {
        let record = reader.record(doc).unwrap();
        match reader.encoder() {
            AttributeEncoder::VarLen(enc) => enc.decode(&record).unwrap().as_str().unwrap().to_string(),
            other => panic!("unexpected encoder {:?}", other),
        }
    }

    #[test]
    fn test_apply_field_patches() {
        let config = title();
        let base = base_reader(&config, &["a", "b", "c", "d"]);

        let mut patch = PatchFileWriter::new(&config, MemStore::new());
        patch.append_text(1, "bee").unwrap();
        patch.append_text(3, "dee").unwrap();
        let store = patch.finish().unwrap();

        let mut reader = FieldPatchReader::new(config.field_id);
        reader.add_generation(&config, 0, &store, base.doc_count()).unwrap();

        let result = apply_field_patches(&base, reader, &StorageConfig::default()).unwrap();
        assert_eq!(result.patched_docs.iter().collect::<Vec<_>>(), vec![1, 3]);

        let patched = result.writer.into_reader().unwrap();
        let values: Vec<String> = (0..4).map(|d| decode_title(&patched, d)).collect();
        assert_eq!(values, vec!["a", "bee", "c", "dee"]);
    }

    #[test]
    fn test_apply_rejects_foreign_field() {
        let base = base_reader(&title(), &["a"]);
        let other = AttributeConfig::new("other", 9, ValueType::String);
        let stream = PatchFileIterator::open_store(&other, MemStore::new(), 1).unwrap();
        assert!(apply_field_patches(&base, stream, &StorageConfig::default()).is_err());
    }

    #[test]
    fn test_apply_pack_patches_keeps_untouched() {
        let pack = PackAttributeConfig::new(
            "pack",
            10,
            vec![
                AttributeConfig::new("price", 11, ValueType::Int32),
                AttributeConfig::new("name", 12, ValueType::String),
            ],
        );
        let formatter = PackAttributeFormatter::new(&pack);

        let mut writer = VarLenAttributeWriter::new(pack.storage_config(), &StorageConfig::default());
        for (price, name) in [("1", "one"), ("2", "two"), ("3", "three")] {
            writer.add_record(&formatter.encode_text(&[price, name]).unwrap()).unwrap();
        }
        let base = writer.into_reader().unwrap();

        let mut price_patch = PatchFileWriter::new(&pack.sub_fields[0], MemStore::new());
        price_patch.append_text(0, "100").unwrap();
        price_patch.append_text(2, "300").unwrap();
        let price_store = price_patch.finish().unwrap();

        let mut name_patch = PatchFileWriter::new(&pack.sub_fields[1], MemStore::new());
        name_patch.append_text(2, "THREE").unwrap();
        let name_store = name_patch.finish().unwrap();

        let streams = vec![
            PatchFileIterator::open_store(&pack.sub_fields[0], &price_store, 3).unwrap(),
            PatchFileIterator::open_store(&pack.sub_fields[1], &name_store, 3).unwrap(),
        ];
        let result = apply_pack_patches(&base, &formatter, streams, &StorageConfig::default()).unwrap();
        assert_eq!(result.patched_docs.len(), 2);

        let patched = result.writer.into_reader().unwrap();
        let doc0 = patched.record(0).unwrap();
        let parts = formatter.split(&doc0).unwrap();
        assert_eq!(parts[0], &100i32.to_le_bytes()[..]);
        let base0 = base.record(0).unwrap();
        assert_eq!(parts[1], formatter.split(&base0).unwrap()[1]);

        assert_eq!(&*patched.record(1).unwrap(), &*base.record(1).unwrap());

        let doc2 = patched.record(2).unwrap();
        let expected = formatter.encode_text(&["300", "THREE"]).unwrap();
        assert_eq!(&*doc2, &expected[..]);
    }

    /// Yields its good entries, then reports the next one as corrupt
    struct BrokenStream {
        field_id: FieldId,
        good: Vec<(u32, Vec<u8>)>,
        cursor: usize,
    }

    impl PatchStream for BrokenStream {
        fn field_id(&self) -> FieldId {
            self.field_id
        }

        fn peek_doc_id(&self) -> Result<Option<u32>> {
            match self.good.get(self.cursor) {
                Some((doc_id, _)) => Ok(Some(*doc_id)),
                None => Err(AttrError::corrupt_patch("title", 99, "undecodable record")),
            }
        }

        fn consume_into(&mut self, buf: &mut Vec<u8>) -> Result<Option<u32>> {
            let doc_id = self.peek_doc_id()?;
            buf.clear();
            buf.extend_from_slice(&self.good[self.cursor].1);
            self.cursor += 1;
            Ok(doc_id)
        }

        fn max_record_len(&self) -> usize {
            self.good.iter().map(|(_, r)| r.len()).max().unwrap_or(0)
        }
    }

    #[test]
    fn test_apply_fails_on_stream_error() {
        let config = title();
        let base = base_reader(&config, &["a", "b", "c", "d"]);
        let mut record = Vec::new();
        base.encoder().encode_text("bee", &mut record).unwrap();

        let stream = BrokenStream {
            field_id: config.field_id,
            good: vec![(1, record)],
            cursor: 0,
        };
        let err = apply_field_patches(&base, stream, &StorageConfig::default()).unwrap_err();
        assert!(matches!(err, AttrError::CorruptPatchStream { offset: 99, .. }));
    }

    #[test]
    fn test_apply_fails_on_truncated_patch_file() {
        let config = title();
        let base = base_reader(&config, &["a", "b", "c", "d"]);

        let mut patch = PatchFileWriter::new(&config, MemStore::new());
        patch.append_text(0, "ay").unwrap();
        patch.append_text(2, "sea").unwrap();
        let mut bytes = patch.finish().unwrap().into_inner();
        bytes.pop();

        let mut reader = FieldPatchReader::new(config.field_id);
        reader.add_generation(&config, 0, MemStore::from(bytes), base.doc_count()).unwrap();
        let err = apply_field_patches(&base, reader, &StorageConfig::default()).unwrap_err();
        assert!(err.is_fatal_format());
    }
}
