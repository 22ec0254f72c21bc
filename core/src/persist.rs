use crate::tokenizer::Tokenizer;
use crate::Bm25Engine;
use anyhow::{Context, Result};
use bincode;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: usize,
    pub avg_doc_length: f64,
    pub tokenizer: Tokenizer,
    pub created_at: String,
    pub version: u32,
}

impl MetaFile {
    pub fn describe(engine: &Bm25Engine) -> Self {
        Self {
            num_docs: engine.num_docs(),
            num_terms: engine.index().num_terms(),
            avg_doc_length: engine.avg_doc_length(),
            tokenizer: engine.config().tokenizer,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
            version: SNAPSHOT_VERSION,
        }
    }
}

pub struct SnapshotPaths {
    pub root: PathBuf,
}

impl SnapshotPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn engine(&self) -> PathBuf { self.root.join("engine.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

pub fn save_engine(paths: &SnapshotPaths, engine: &Bm25Engine) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.engine())?;
    let bytes = bincode::serialize(engine)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_engine(paths: &SnapshotPaths) -> Result<Bm25Engine> {
    let mut f = File::open(paths.engine())?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let engine = bincode::deserialize(&buf)?;
    Ok(engine)
}

pub fn save_meta(paths: &SnapshotPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &SnapshotPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Write the engine and its metadata under `paths.root`.
pub fn save_snapshot(paths: &SnapshotPaths, engine: &Bm25Engine) -> Result<MetaFile> {
    let meta = MetaFile::describe(engine);
    save_engine(paths, engine).with_context(|| format!("writing snapshot to {}", paths.root.display()))?;
    save_meta(paths, &meta)?;
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, "snapshot saved");
    Ok(meta)
}

/// Load a snapshot written by [`save_snapshot`], rejecting other format versions.
pub fn load_snapshot(paths: &SnapshotPaths) -> Result<(Bm25Engine, MetaFile)> {
    let meta = load_meta(paths).with_context(|| format!("reading {}", paths.meta().display()))?;
    if meta.version != SNAPSHOT_VERSION {
        anyhow::bail!("unsupported snapshot version {} (expected {})", meta.version, SNAPSHOT_VERSION);
    }
    let engine = load_engine(paths).with_context(|| format!("reading {}", paths.engine().display()))?;
    if engine.num_docs() != meta.num_docs {
        anyhow::bail!("snapshot metadata lists {} documents but engine holds {}", meta.num_docs, engine.num_docs());
    }
    if engine.documents().len() != engine.num_docs() as usize {
        anyhow::bail!(
            "snapshot stores {} document texts but its index covers {} documents",
            engine.documents().len(),
            engine.num_docs()
        );
    }
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, created_at = %meta.created_at, "snapshot loaded");
    Ok((engine, meta))
}
