use crate::SearchableRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Snapshot format version written to `meta.json`.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_users: u32,
    pub created_at: String,
    pub version: u32,
}

/// On-disk layout of a directory snapshot. Only user records are stored;
/// the inverted index is always rebuilt from them.
pub struct SnapshotPaths {
    pub root: PathBuf,
}

impl SnapshotPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn users(&self) -> PathBuf { self.root.join("users.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

pub fn save_users(paths: &SnapshotPaths, users: &[SearchableRecord]) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.users())?;
    let bytes = bincode::serialize(users)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_users(paths: &SnapshotPaths) -> Result<Vec<SearchableRecord>> {
    let path = paths.users();
    let mut f = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let users = bincode::deserialize(&buf).with_context(|| format!("decoding {}", path.display()))?;
    Ok(users)
}

pub fn save_meta(paths: &SnapshotPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &SnapshotPaths) -> Result<MetaFile> {
    let path = paths.meta();
    let mut f = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Load users and metadata, warning if the recorded count disagrees.
pub fn load_snapshot(paths: &SnapshotPaths) -> Result<(Vec<SearchableRecord>, MetaFile)> {
    let meta = load_meta(paths)?;
    if meta.version != SNAPSHOT_VERSION {
        anyhow::bail!("unsupported snapshot version {} (expected {SNAPSHOT_VERSION})", meta.version);
    }
    let users = load_users(paths)?;
    if users.len() != meta.num_users as usize {
        tracing::warn!(recorded = meta.num_users, loaded = users.len(), "snapshot user count mismatch");
    }
    Ok((users, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use tempfile::tempdir;

    #[test]
    fn snapshot_roundtrip_preserves_order() {
        let dir = tempdir().unwrap();
        let paths = SnapshotPaths::new(dir.path());
        let users = vec![
            SearchableRecord { id: 5, username: "zed".into(), role: Role::Faculty, batch_year: None, skills: None },
            SearchableRecord { id: 1, username: "amy".into(), role: Role::Alumni, batch_year: Some(2019), skills: Some("go, sql".into()) },
        ];
        save_users(&paths, &users).unwrap();
        save_meta(&paths, &MetaFile { num_users: 2, created_at: "2024-01-01T00:00:00Z".into(), version: SNAPSHOT_VERSION }).unwrap();

        let (loaded, meta) = load_snapshot(&paths).unwrap();
        assert_eq!(loaded, users);
        assert_eq!(meta.num_users, 2);
    }

    #[test]
    fn rejects_unknown_version() {
        let dir = tempdir().unwrap();
        let paths = SnapshotPaths::new(dir.path());
        save_users(&paths, &[]).unwrap();
        save_meta(&paths, &MetaFile { num_users: 0, created_at: String::new(), version: 99 }).unwrap();
        assert!(load_snapshot(&paths).is_err());
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load_snapshot(&SnapshotPaths::new(dir.path().join("nope"))).is_err());
    }
}
