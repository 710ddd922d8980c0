//! OCI image layout access.
//!
//! Minimal serde models for the documents the merge pass touches (image
//! index, manifest, config with rootfs and history) plus blob read/write
//! helpers for an on-disk OCI layout directory.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use stratum_core::error::{PlanError, Result};

/// Media type of an uncompressed tar layer, used for merged layers.
pub const MEDIA_TYPE_LAYER_TAR: &str = "application/vnd.oci.image.layer.v1.tar";

/// A content descriptor as it appears in the index and manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// `index.json` of an OCI image layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageIndex {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
}

/// An image manifest blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageManifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

/// One history record of an image config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub empty_layer: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl HistoryRecord {
    /// A non-empty record for a command (carries a filesystem diff).
    pub fn run(created_by: &str) -> Self {
        HistoryRecord {
            created_by: Some(created_by.to_string()),
            ..Default::default()
        }
    }

    /// An empty-layer record (ENV, USER, WORKDIR and friends).
    pub fn empty(created_by: &str) -> Self {
        HistoryRecord {
            created_by: Some(created_by.to_string()),
            empty_layer: true,
            ..Default::default()
        }
    }
}

/// The rootfs section of an image config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub fs_type: String,
    pub diff_ids: Vec<String>,
}

/// An image config blob.
///
/// Only the sections the merge rewrites are modeled; everything else
/// (architecture-specific fields, the runtime `config` section, ...) is
/// carried through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfigFile {
    pub rootfs: RootFs,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An OCI image layout directory opened for reading and rewriting.
#[derive(Debug)]
pub struct ImageLayout {
    root: PathBuf,
    pub index: ImageIndex,
    pub manifest: ImageManifest,
    pub config: ImageConfigFile,
}

impl ImageLayout {
    /// Open an OCI layout directory and load its first manifest.
    ///
    /// # Errors
    ///
    /// Returns an error when the layout markers (`oci-layout`,
    /// `index.json`, `blobs/`) are missing or a document fails to parse.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        for marker in ["oci-layout", "index.json", "blobs"] {
            if !root.join(marker).exists() {
                return Err(PlanError::MergeError(format!(
                    "not a valid OCI layout: missing {} in {}",
                    marker,
                    root.display()
                )));
            }
        }

        let index: ImageIndex = read_json(&root.join("index.json"))?;
        let manifest_digest = index
            .manifests
            .first()
            .ok_or_else(|| PlanError::MergeError("no manifests in index.json".to_string()))?
            .digest
            .clone();

        let manifest: ImageManifest = read_json(&blob_path(&root, &manifest_digest))?;
        let config: ImageConfigFile = read_json(&blob_path(&root, &manifest.config.digest))?;

        Ok(ImageLayout {
            root,
            index,
            manifest,
            config,
        })
    }

    /// Path of a blob by digest.
    pub fn blob_path(&self, digest: &str) -> PathBuf {
        blob_path(&self.root, digest)
    }

    /// Serialize a document as a new blob, returning its descriptor
    /// fields.
    pub fn write_json_blob<T: Serialize>(&self, value: &T) -> Result<(String, u64)> {
        let data = serde_json::to_vec(value)?;
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(&data)));

        let path = self.blob_path(&digest);
        fs::write(&path, &data).map_err(|e| PlanError::io(&path, e))?;
        Ok((digest, data.len() as u64))
    }

    /// Open a writer for a new blob at a temporary path; the caller
    /// renames it into place once the digest is known.
    pub fn blob_writer(&self) -> Result<(PathBuf, fs::File)> {
        let path = self.root.join("blobs").join("sha256").join(".merge-tmp");
        let file = fs::File::create(&path).map_err(|e| PlanError::io(&path, e))?;
        Ok((path, file))
    }

    /// Move a finished temporary blob to its content address.
    pub fn commit_blob(&self, tmp: &Path, digest: &str) -> Result<()> {
        let path = self.blob_path(digest);
        fs::rename(tmp, &path).map_err(|e| PlanError::io(&path, e))?;
        Ok(())
    }

    /// Rewrite `index.json` in place.
    pub fn write_index(&self, index: &ImageIndex) -> Result<()> {
        let path = self.root.join("index.json");
        let data = serde_json::to_vec(index)?;
        fs::write(&path, data).map_err(|e| PlanError::io(&path, e))
    }
}

fn blob_path(root: &Path, digest: &str) -> PathBuf {
    let (algorithm, hash) = digest.split_once(':').unwrap_or(("sha256", digest));
    root.join("blobs").join(algorithm).join(hash)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| PlanError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// A writer that hashes everything passing through it.
///
/// Used to compute a merged layer's digest while streaming it to disk.
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        HashingWriter {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Flush the inner writer and return the hex digest and byte count.
    pub fn finish(mut self) -> std::io::Result<(String, u64)> {
        self.inner.flush()?;
        Ok((hex::encode(self.hasher.finalize()), self.written))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_path() {
        let root = PathBuf::from("/images/test");
        assert_eq!(
            blob_path(&root, "sha256:abc123"),
            PathBuf::from("/images/test/blobs/sha256/abc123")
        );
        assert_eq!(
            blob_path(&root, "abc123"),
            PathBuf::from("/images/test/blobs/sha256/abc123")
        );
    }

    #[test]
    fn test_history_record_serde() {
        let record = HistoryRecord::empty("ENV FOO=bar");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"empty_layer\":true"));

        let run = HistoryRecord::run("RUN step1");
        let json = serde_json::to_string(&run).unwrap();
        assert!(!json.contains("empty_layer"));

        let parsed: HistoryRecord =
            serde_json::from_str(r#"{"created_by":"RUN x"}"#).unwrap();
        assert!(!parsed.empty_layer);
    }

    #[test]
    fn test_config_extra_fields_round_trip() {
        let json = r#"{
            "architecture": "amd64",
            "os": "linux",
            "config": {"Env": ["PATH=/usr/bin"], "User": "user"},
            "rootfs": {"type": "layers", "diff_ids": ["sha256:aa"]},
            "history": [{"created_by": "RUN x"}]
        }"#;

        let config: ImageConfigFile = serde_json::from_str(json).unwrap();
        assert_eq!(config.rootfs.diff_ids, vec!["sha256:aa".to_string()]);
        assert_eq!(config.history.len(), 1);

        let out = serde_json::to_string(&config).unwrap();
        assert!(out.contains("\"architecture\":\"amd64\""));
        assert!(out.contains("\"User\":\"user\""));
    }

    #[test]
    fn test_hashing_writer() {
        let mut buf = Vec::new();
        let mut writer = HashingWriter::new(&mut buf);
        writer.write_all(b"hello").unwrap();
        let (digest, written) = writer.finish().unwrap();

        assert_eq!(written, 5);
        // Known SHA256 of "hello"
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn test_open_rejects_missing_layout() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = ImageLayout::open(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("oci-layout"));
    }
}
