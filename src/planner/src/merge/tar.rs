//! Streaming tar concatenation.
//!
//! A merged layer is the ordered concatenation of its constituents'
//! uncompressed tar entries. Whiteout markers and duplicate paths are
//! preserved verbatim; the overlay consumer resolves them (later wins).
//! Constituent readers are opened one at a time and read sequentially, so
//! memory stays O(1) in layer count.

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use flate2::read::GzDecoder;

use stratum_core::error::{PlanError, Result};

/// A source of one layer's uncompressed tar stream.
///
/// Implementations follow an open-read-close contract: `open` returns a
/// fresh sequential reader, and the reader is dropped before the next
/// layer is opened.
pub trait LayerReader {
    fn open(&self) -> Result<Box<dyn Read>>;
}

/// A memory-backed layer (synthetic layers, tests).
pub struct MemoryLayer {
    data: Vec<u8>,
}

impl MemoryLayer {
    pub fn new(data: Vec<u8>) -> Self {
        MemoryLayer { data }
    }
}

impl LayerReader for MemoryLayer {
    fn open(&self) -> Result<Box<dyn Read>> {
        Ok(Box::new(std::io::Cursor::new(self.data.clone())))
    }
}

/// A file-backed layer blob, optionally gzip-compressed.
pub struct BlobLayer {
    path: PathBuf,
    gzip: bool,
}

impl BlobLayer {
    pub fn new(path: impl Into<PathBuf>, gzip: bool) -> Self {
        BlobLayer {
            path: path.into(),
            gzip,
        }
    }
}

impl LayerReader for BlobLayer {
    fn open(&self) -> Result<Box<dyn Read>> {
        let file = File::open(&self.path)
            .map_err(|e| PlanError::MergeError(format!("opening layer {}: {e}", self.path.display())))?;
        if self.gzip {
            Ok(Box::new(GzDecoder::new(file)))
        } else {
            Ok(Box::new(file))
        }
    }
}

/// Concatenate the tar entries of `sources`, in order, into `out` as a
/// single uncompressed tar stream.
///
/// Entries are copied as-is: no deduplication, no content hashing, no
/// timestamp normalization. Whiteouts (`.wh.` basenames) are ordinary
/// entries here and pass through untouched.
pub fn merge_layer_streams<W: Write>(sources: &[Box<dyn LayerReader>], out: W) -> Result<W> {
    let mut builder = tar::Builder::new(out);

    for source in sources {
        let reader = source.open()?;
        let mut archive = tar::Archive::new(reader);

        let entries = archive
            .entries()
            .map_err(|e| PlanError::MergeError(format!("reading layer: {e}")))?;
        for entry in entries {
            let mut entry =
                entry.map_err(|e| PlanError::MergeError(format!("reading layer entry: {e}")))?;
            let mut header = entry.header().clone();
            let path = entry
                .path()
                .map_err(|e| PlanError::MergeError(format!("reading entry path: {e}")))?
                .into_owned();

            let entry_type = header.entry_type();
            if entry_type.is_symlink() || entry_type.is_hard_link() {
                let target = entry
                    .link_name()
                    .map_err(|e| PlanError::MergeError(format!("reading link target: {e}")))?
                    .ok_or_else(|| {
                        PlanError::MergeError(format!(
                            "link entry {} has no target",
                            path.display()
                        ))
                    })?
                    .into_owned();
                builder
                    .append_link(&mut header, &path, &target)
                    .map_err(|e| PlanError::MergeError(format!("writing link entry: {e}")))?;
            } else {
                builder
                    .append_data(&mut header, &path, &mut entry)
                    .map_err(|e| PlanError::MergeError(format!("writing entry: {e}")))?;
            }
        }
        // The constituent reader closes here, before the next one opens.
    }

    builder
        .into_inner()
        .map_err(|e| PlanError::MergeError(format!("finalizing merged layer: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Build a small tar stream from (name, content) pairs.
    fn make_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }

    // Read back (name, content) pairs in archive order.
    fn read_entries(data: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(std::io::Cursor::new(data));
        let mut entries = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            entries.push((name, content));
        }
        entries
    }

    fn sources(tars: Vec<Vec<u8>>) -> Vec<Box<dyn LayerReader>> {
        tars.into_iter()
            .map(|data| Box::new(MemoryLayer::new(data)) as Box<dyn LayerReader>)
            .collect()
    }

    #[test]
    fn test_merge_combines_entries_in_order() {
        let layer1 = make_tar(&[("a.txt", b"hello"), ("b.txt", b"world")]);
        let layer2 = make_tar(&[("c.txt", b"foo")]);

        let merged = merge_layer_streams(&sources(vec![layer1, layer2]), Vec::new()).unwrap();
        let entries = read_entries(&merged);

        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(entries[2].1, b"foo");
    }

    #[test]
    fn test_merge_preserves_duplicates_later_wins() {
        let layer1 = make_tar(&[("b.txt", b"original")]);
        let layer2 = make_tar(&[("b.txt", b"overwritten")]);

        let merged = merge_layer_streams(&sources(vec![layer1, layer2]), Vec::new()).unwrap();
        let entries = read_entries(&merged);

        // Both copies survive; the extractor applies the later one.
        let copies: Vec<&(String, Vec<u8>)> =
            entries.iter().filter(|(n, _)| n == "b.txt").collect();
        assert_eq!(copies.len(), 2);
        assert_eq!(copies[0].1, b"original");
        assert_eq!(copies[1].1, b"overwritten");
    }

    #[test]
    fn test_merge_preserves_whiteouts() {
        let layer1 = make_tar(&[("usr/bin/app", b"binary")]);
        let layer2 = make_tar(&[("usr/bin/.wh.app", b""), ("usr/bin/app2", b"new binary")]);

        let merged = merge_layer_streams(&sources(vec![layer1, layer2]), Vec::new()).unwrap();
        let entries = read_entries(&merged);
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();

        assert!(names.contains(&"usr/bin/.wh.app"));
        assert!(names.contains(&"usr/bin/app2"));
        assert!(names.contains(&"usr/bin/app"));
    }

    #[test]
    fn test_merge_single_source_is_passthrough() {
        let layer = make_tar(&[("only.txt", b"content")]);

        let merged = merge_layer_streams(&sources(vec![layer]), Vec::new()).unwrap();
        let entries = read_entries(&merged);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "only.txt");
        assert_eq!(entries[0].1, b"content");
    }

    #[test]
    fn test_blob_layer_gzip_round_trip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("layer.tar.gz");

        let tar_data = make_tar(&[("f.txt", b"zipped")]);
        let file = File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&tar_data).unwrap();
        encoder.finish().unwrap();

        let blob = BlobLayer::new(&path, true);
        let merged = merge_layer_streams(
            &[Box::new(blob) as Box<dyn LayerReader>],
            Vec::new(),
        )
        .unwrap();
        let entries = read_entries(&merged);
        assert_eq!(entries[0].0, "f.txt");
        assert_eq!(entries[0].1, b"zipped");
    }
}
