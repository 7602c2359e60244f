use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::DB_FILE;
use crate::storage::{self, BLOBS_DIR};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/pollup.sqlite3";
const BLOB_PREFIX: &str = "blobs/";
const STAGING_DIR: &str = ".importing";
pub const BUNDLE_FORMAT_V1: &str = "pollup-workspace-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    app_version: String,
    exported_at: String,
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub blob_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub blob_count: usize,
}

fn bundle_sources(workspace_path: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    let mut sources = vec![(DB_ENTRY.to_string(), db_path)];

    let blobs_dir = workspace_path.join(BLOBS_DIR);
    if blobs_dir.is_dir() {
        let mut blobs = Vec::new();
        for entry in std::fs::read_dir(&blobs_dir)
            .with_context(|| format!("failed to list {}", blobs_dir.to_string_lossy()))?
        {
            let entry = entry.context("failed to read blob directory entry")?;
            if entry.path().is_file() {
                let name = entry.file_name().to_string_lossy().to_string();
                blobs.push((format!("{}{}", BLOB_PREFIX, name), entry.path()));
            }
        }
        blobs.sort();
        sources.extend(blobs);
    }
    Ok(sources)
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let sources = bundle_sources(workspace_path)?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let mut entries = Vec::with_capacity(sources.len());
    for (name, path) in &sources {
        let (size, sha256) = storage::sha256_file(path)
            .with_context(|| format!("failed to hash {}", path.to_string_lossy()))?;
        entries.push(ManifestEntry {
            path: name.clone(),
            size,
            sha256,
        });
    }
    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: crate::store::now_ts(),
        entries,
    };

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for (name, path) in &sources {
        zip.start_file(name.as_str(), opts)
            .with_context(|| format!("failed to start entry {}", name))?;
        let mut src = File::open(path)
            .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
        std::io::copy(&mut src, &mut zip).with_context(|| format!("failed to write entry {}", name))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    let blob_count = sources.len() - 1;
    tracing::info!(
        out = %out_path.display(),
        blobs = blob_count,
        "exported workspace bundle"
    );
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: sources.len() + 1,
        blob_count,
    })
}

/// Entry names come from the archive; only the database and flat blob
/// names are accepted.
fn staged_path(staging: &Path, entry: &str) -> anyhow::Result<PathBuf> {
    if entry == DB_ENTRY {
        return Ok(staging.join(DB_FILE));
    }
    match entry.strip_prefix(BLOB_PREFIX) {
        Some(name)
            if !name.is_empty()
                && !name.contains('/')
                && !name.contains('\\')
                && name != "."
                && name != ".." =>
        {
            Ok(staging.join(BLOBS_DIR).join(name))
        }
        _ => Err(anyhow!("unexpected bundle entry: {}", entry)),
    }
}

fn extract_verified<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    entry: &ManifestEntry,
    dst: &Path,
) -> anyhow::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    {
        let mut out = File::create(dst)
            .with_context(|| format!("failed to create {}", dst.to_string_lossy()))?;
        let mut src = archive
            .by_name(&entry.path)
            .with_context(|| format!("bundle missing {}", entry.path))?;
        std::io::copy(&mut src, &mut out)
            .with_context(|| format!("failed to extract {}", entry.path))?;
        out.flush().context("failed to flush extracted entry")?;
    }
    let (size, sha256) = storage::sha256_file(dst)
        .with_context(|| format!("failed to hash {}", dst.to_string_lossy()))?;
    if size != entry.size || sha256 != entry.sha256 {
        return Err(anyhow!("checksum mismatch for {}", entry.path));
    }
    Ok(())
}

fn replace_path(staged: &Path, dst: &Path) -> anyhow::Result<()> {
    if dst.is_dir() {
        std::fs::remove_dir_all(dst)
            .with_context(|| format!("failed to remove {}", dst.to_string_lossy()))?;
    } else if dst.exists() {
        std::fs::remove_file(dst)
            .with_context(|| format!("failed to remove {}", dst.to_string_lossy()))?;
    }
    std::fs::rename(staged, dst)
        .with_context(|| format!("failed to move restored data to {}", dst.to_string_lossy()))
}

/// Restores a bundle into `workspace_path`. Every entry is verified against
/// the manifest before anything in the workspace is replaced. A bare SQLite
/// file is accepted as a database-only backup.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let dst = workspace_path.join(DB_FILE);

    if !is_zip_file(in_path)? {
        std::fs::copy(in_path, &dst).with_context(|| {
            format!(
                "failed to copy sqlite backup from {} to {}",
                in_path.to_string_lossy(),
                dst.to_string_lossy()
            )
        })?;
        return Ok(ImportSummary {
            bundle_format_detected: "sqlite3".to_string(),
            blob_count: 0,
        });
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: Manifest =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }
    if !manifest.entries.iter().any(|e| e.path == DB_ENTRY) {
        return Err(anyhow!("bundle missing {}", DB_ENTRY));
    }

    let staging = workspace_path.join(STAGING_DIR);
    if staging.exists() {
        let _ = std::fs::remove_dir_all(&staging);
    }
    let staged = manifest.entries.iter().try_for_each(|entry| {
        let path = staged_path(&staging, &entry.path)?;
        extract_verified(&mut archive, entry, &path)
    });
    if let Err(e) = staged {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }

    replace_path(&staging.join(DB_FILE), &dst)?;
    let staged_blobs = staging.join(BLOBS_DIR);
    let blob_count = manifest.entries.len() - 1;
    if staged_blobs.is_dir() {
        replace_path(&staged_blobs, &workspace_path.join(BLOBS_DIR))?;
    } else {
        let live = workspace_path.join(BLOBS_DIR);
        if live.is_dir() {
            std::fs::remove_dir_all(&live)
                .with_context(|| format!("failed to remove {}", live.to_string_lossy()))?;
        }
    }
    let _ = std::fs::remove_dir_all(&staging);

    tracing::info!(
        workspace = %workspace_path.display(),
        blobs = blob_count,
        "imported workspace bundle"
    );
    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        blob_count,
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
