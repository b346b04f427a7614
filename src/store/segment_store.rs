use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::byte_store::FileStore;
use crate::attribute::{VarLenAttributeReader, VarLenAttributeWriter};
use crate::config::AttributeConfig;
use crate::error::{AttrError, Result};
use crate::patch::{FieldPatchReader, PatchFileWriter};
use crate::segment::{ManifestEntry, SegmentId, SegmentManifest};

const MANIFEST_FILE: &str = "segments.manifest";
const ATTRIBUTE_DIR: &str = "attribute";
const PATCH_DIR: &str = "patch";
const DATA_FILE: &str = "data";
const OFFSET_FILE: &str = "offset";

/// Persistent storage for segment attribute files, patch files and the manifest.
///
/// Layout under the base directory:
///
/// ```text
/// segments.manifest
/// segment_{id}/attribute/{name}/data
/// segment_{id}/attribute/{name}/offset
/// segment_{id}/patch/{name}.{generation}
/// ```
pub struct SegmentStore {
    base_dir: PathBuf,
}

impl SegmentStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn segment_dir(&self, id: SegmentId) -> PathBuf {
        self.base_dir.join(id.to_string())
    }

    pub fn attribute_dir(&self, id: SegmentId, name: &str) -> PathBuf {
        self.segment_dir(id).join(ATTRIBUTE_DIR).join(name)
    }

    pub fn patch_path(&self, id: SegmentId, name: &str, generation: u64) -> PathBuf {
        self.segment_dir(id)
            .join(PATCH_DIR)
            .join(format!("{}.{}", name, generation))
    }

    /// Dump an attribute into a segment and return the checksum of its files
    pub fn write_attribute(&self, id: SegmentId, writer: &VarLenAttributeWriter) -> Result<u64> {
        let dir = self.attribute_dir(id, &writer.config().name);
        if dir.exists() {
            return Err(AttrError::InvalidRequest(format!(
                "attribute {} already written in {}",
                writer.config().name,
                id
            )));
        }

        let mut data = FileStore::create(dir.join(DATA_FILE))?;
        let mut offsets = FileStore::create(dir.join(OFFSET_FILE))?;
        writer.dump(&mut data, &mut offsets)?;
        data.sync()?;
        offsets.sync()?;

        self.attribute_checksum(id, &writer.config().name)
    }

    /// CRC32 over an attribute's data file followed by its offset file
    pub fn attribute_checksum(&self, id: SegmentId, name: &str) -> Result<u64> {
        let dir = self.attribute_dir(id, name);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&fs::read(dir.join(DATA_FILE))?);
        hasher.update(&fs::read(dir.join(OFFSET_FILE))?);
        Ok(hasher.finalize() as u64)
    }

    /// Open one attribute of one segment.
    ///
    /// Every failure is reported as a `SegmentOpen` naming the segment.
    pub fn open_attribute(
        &self,
        id: SegmentId,
        config: &AttributeConfig,
        doc_count: u32,
    ) -> Result<VarLenAttributeReader<FileStore>> {
        self.try_open_attribute(id, config, doc_count).map_err(|e| {
            warn!(segment = %id, field = %config.name, error = %e, "failed to open attribute");
            e.in_segment(id)
        })
    }

    fn try_open_attribute(
        &self,
        id: SegmentId,
        config: &AttributeConfig,
        doc_count: u32,
    ) -> Result<VarLenAttributeReader<FileStore>> {
        let dir = self.attribute_dir(id, &config.name);
        let data = FileStore::open(dir.join(DATA_FILE))?;
        let offsets = FileStore::open(dir.join(OFFSET_FILE))?;
        VarLenAttributeReader::open(config, data, &offsets, doc_count)
    }

    /// Open an attribute across every segment of the manifest, in order.
    ///
    /// Fails as a whole if any segment fails; the error names that segment.
    pub fn open_partition(
        &self,
        manifest: &SegmentManifest,
        config: &AttributeConfig,
    ) -> Result<Vec<VarLenAttributeReader<FileStore>>> {
        let readers = manifest
            .iter()
            .map(|entry| self.open_attribute(entry.id, config, entry.doc_count))
            .collect::<Result<Vec<_>>>()?;

        debug!(field = %config.name, segments = readers.len(), "opened attribute partition");
        Ok(readers)
    }

    /// Check an attribute's files against the checksum recorded in the manifest
    pub fn verify_attribute(&self, entry: &ManifestEntry, name: &str) -> Result<()> {
        let actual = self
            .attribute_checksum(entry.id, name)
            .map_err(|e| e.in_segment(entry.id))?;
        if actual != entry.checksum {
            return Err(AttrError::format(
                format!("checksum of attribute {}", name),
                entry.checksum,
                actual,
            )
            .in_segment(entry.id));
        }
        Ok(())
    }

    /// Start a new patch file; an existing generation is never appended to
    pub fn create_patch_writer(
        &self,
        id: SegmentId,
        config: &AttributeConfig,
        generation: u64,
    ) -> Result<PatchFileWriter<FileStore>> {
        let path = self.patch_path(id, &config.name, generation);
        if path.exists() {
            return Err(AttrError::InvalidRequest(format!(
                "patch generation {} of {} already exists in {}",
                generation, config.name, id
            )));
        }
        Ok(PatchFileWriter::new(config, FileStore::create(path)?))
    }

    /// Patch generations present for a field, ascending
    pub fn patch_generations(&self, id: SegmentId, name: &str) -> Result<Vec<u64>> {
        let dir = self.segment_dir(id).join(PATCH_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}.", name);
        let mut generations = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let file_name = entry?.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(generation) = file_name
                .strip_prefix(&prefix)
                .and_then(|g| g.parse::<u64>().ok())
            {
                generations.push(generation);
            }
        }
        generations.sort_unstable();
        Ok(generations)
    }

    /// Open every patch generation of a field into one merged stream
    pub fn open_field_patches(
        &self,
        id: SegmentId,
        config: &AttributeConfig,
        doc_count: u32,
    ) -> Result<FieldPatchReader<FileStore>> {
        let open = || -> Result<FieldPatchReader<FileStore>> {
            let mut reader = FieldPatchReader::new(config.field_id);
            for generation in self.patch_generations(id, &config.name)? {
                let store = FileStore::open(self.patch_path(id, &config.name, generation))?;
                reader.add_generation(config, generation, store, doc_count)?;
            }
            Ok(reader)
        };
        open().map_err(|e| {
            warn!(segment = %id, field = %config.name, error = %e, "failed to open patches");
            e.in_segment(id)
        })
    }

    /// Delete a segment's directory
    pub fn remove_segment(&self, id: SegmentId) -> Result<()> {
        let dir = self.segment_dir(id);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn save_manifest(&self, manifest: &SegmentManifest) -> Result<()> {
        let bytes = manifest.to_bincode()?;
        fs::write(self.base_dir.join(MANIFEST_FILE), bytes)?;
        Ok(())
    }

    pub fn load_manifest(&self) -> Result<SegmentManifest> {
        let path = self.base_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(SegmentManifest::new());
        }
        let bytes = fs::read(path)?;
        SegmentManifest::from_bincode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeEncoder;
    use crate::config::{StorageConfig, ValueType};
    use crate::patch::PatchStream;
    use tempfile::TempDir;

    fn title_config() -> AttributeConfig {
        AttributeConfig::new("title", 3, ValueType::String)
    }

    fn encoded(text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        AttributeEncoder::new(&title_config())
            .encode_text(text, &mut out)
            .unwrap();
        out
    }

    fn write_titles(store: &SegmentStore, id: SegmentId, titles: &[&str]) -> u64 {
        let mut writer = VarLenAttributeWriter::new(title_config(), &StorageConfig::default());
        for title in titles {
            writer.add_text(title).unwrap();
        }
        store.write_attribute(id, &writer).unwrap()
    }

    #[test]
    fn test_write_and_open_attribute() {
        let temp_dir = TempDir::new().unwrap();
        let store = SegmentStore::new(temp_dir.path()).unwrap();
        let id = SegmentId::new(0);

        let checksum = write_titles(&store, id, &["alpha", "beta"]);
        assert_eq!(checksum, store.attribute_checksum(id, "title").unwrap());
        assert!(store.attribute_dir(id, "title").join("offset").exists());

        let reader = store.open_attribute(id, &title_config(), 2).unwrap();
        assert_eq!(reader.doc_count(), 2);
        assert_eq!(&*reader.record(1).unwrap(), &encoded("beta")[..]);

        let again = VarLenAttributeWriter::new(title_config(), &StorageConfig::default());
        assert!(store.write_attribute(id, &again).is_err());
    }

    #[test]
    fn test_open_names_segment() {
        let temp_dir = TempDir::new().unwrap();
        let store = SegmentStore::new(temp_dir.path()).unwrap();
        let id = SegmentId::new(4);
        write_titles(&store, id, &["alpha"]);

        // Wrong doc count makes the offset file inconsistent
        let err = store.open_attribute(id, &title_config(), 3).unwrap_err();
        match &err {
            AttrError::SegmentOpen { segment, .. } => assert_eq!(*segment, id),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_fatal_format());
        assert!(err.to_string().contains("segment_4"));
    }

    #[test]
    fn test_checksum_verification() {
        let temp_dir = TempDir::new().unwrap();
        let store = SegmentStore::new(temp_dir.path()).unwrap();
        let id = SegmentId::new(1);
        let checksum = write_titles(&store, id, &["alpha"]);

        let entry = ManifestEntry::new(id, 1).with_checksum(checksum);
        store.verify_attribute(&entry, "title").unwrap();

        let bad = ManifestEntry::new(id, 1).with_checksum(checksum ^ 1);
        assert!(store.verify_attribute(&bad, "title").is_err());
    }

    #[test]
    fn test_patch_generations() {
        let temp_dir = TempDir::new().unwrap();
        let store = SegmentStore::new(temp_dir.path()).unwrap();
        let id = SegmentId::new(2);
        let config = title_config();

        assert!(store.patch_generations(id, "title").unwrap().is_empty());

        for (generation, text) in [(3, "newer"), (1, "older")] {
            let mut writer = store.create_patch_writer(id, &config, generation).unwrap();
            writer.append_text(0, text).unwrap();
            writer.finish().unwrap();
        }
        assert!(store.create_patch_writer(id, &config, 1).is_err());
        assert_eq!(store.patch_generations(id, "title").unwrap(), vec![1, 3]);

        let mut patches = store.open_field_patches(id, &config, 1).unwrap();
        let value = patches.consume_one().unwrap().unwrap();
        assert_eq!(value.doc_id, 0);
        assert_eq!(value.record, encoded("newer"));
        assert!(patches.consume_one().unwrap().is_none());
    }

    #[test]
    fn test_manifest_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let store = SegmentStore::new(temp_dir.path()).unwrap();

        assert!(store.load_manifest().unwrap().is_empty());

        let mut manifest = SegmentManifest::new();
        let id = manifest.allocate_segment_id();
        manifest.add_segment(ManifestEntry::new(id, 10));
        store.save_manifest(&manifest).unwrap();

        let loaded = store.load_manifest().unwrap();
        assert_eq!(loaded, manifest);

        write_titles(&store, id, &["alpha"]);
        store.remove_segment(id).unwrap();
        assert!(!store.attribute_dir(id, "title").exists());
    }
}
