//! Workspace-local blob storage backing image ids and file-upload answers.
//!
//! Uploads are two-step: a ticket names a path under `incoming/`, the host
//! writes the bytes there, and committing moves them under `blobs/` with
//! their size and sha256 recorded.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::store::now_ts;

pub const BLOBS_DIR: &str = "blobs";
pub const INCOMING_DIR: &str = "incoming";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMeta {
    pub storage_id: String,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub upload_id: String,
    pub upload_url: String,
    pub upload_path: String,
}

pub fn blob_path(workspace: &Path, storage_id: &str) -> PathBuf {
    workspace.join(BLOBS_DIR).join(storage_id)
}

fn incoming_path(workspace: &Path, upload_id: &str) -> PathBuf {
    workspace.join(INCOMING_DIR).join(upload_id)
}

fn file_url(path: &Path) -> ApiResult<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute)
        .map(|u| u.to_string())
        .map_err(|_| ApiError::Internal(format!("cannot express {} as a URL", absolute.display())))
}

pub fn sha256_file(path: &Path) -> std::io::Result<(u64, String)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size: u64 = 0;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        size += n as u64;
        hasher.update(&buf[..n]);
    }
    Ok((size, format!("{:x}", hasher.finalize())))
}

pub fn generate_upload(conn: &Connection, workspace: &Path) -> ApiResult<UploadTicket> {
    std::fs::create_dir_all(workspace.join(INCOMING_DIR))?;
    let upload_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO uploads(id, created_at) VALUES(?, ?)",
        params![upload_id, now_ts()],
    )?;
    let path = incoming_path(workspace, &upload_id);
    Ok(UploadTicket {
        upload_url: file_url(&path)?,
        upload_path: path.to_string_lossy().to_string(),
        upload_id,
    })
}

pub fn commit_upload(
    conn: &Connection,
    workspace: &Path,
    upload_id: &str,
    content_type: &str,
) -> ApiResult<BlobMeta> {
    let pending: Option<i64> = conn
        .query_row("SELECT 1 FROM uploads WHERE id = ?", [upload_id], |r| r.get(0))
        .optional()?;
    if pending.is_none() {
        return Err(ApiError::NotFound("upload"));
    }
    let src = incoming_path(workspace, upload_id);
    if !src.is_file() {
        return Err(ApiError::bad_params("nothing has been written to the upload path"));
    }

    let (size, sha256) = sha256_file(&src)?;
    let storage_id = Uuid::new_v4().to_string();
    std::fs::create_dir_all(workspace.join(BLOBS_DIR))?;
    std::fs::rename(&src, blob_path(workspace, &storage_id))?;

    conn.execute(
        "INSERT INTO blobs(id, content_type, size, sha256, created_at) VALUES(?, ?, ?, ?, ?)",
        params![storage_id, content_type, size as i64, sha256, now_ts()],
    )?;
    conn.execute("DELETE FROM uploads WHERE id = ?", [upload_id])?;
    tracing::info!(storage_id = %storage_id, size, "stored upload");

    Ok(BlobMeta {
        storage_id,
        content_type: content_type.to_string(),
        size,
        sha256,
    })
}

pub fn metadata(conn: &Connection, storage_id: &str) -> rusqlite::Result<Option<BlobMeta>> {
    conn.query_row(
        "SELECT id, content_type, size, sha256 FROM blobs WHERE id = ?",
        [storage_id],
        |r| {
            Ok(BlobMeta {
                storage_id: r.get(0)?,
                content_type: r.get(1)?,
                size: r.get::<_, i64>(2)?.max(0) as u64,
                sha256: r.get(3)?,
            })
        },
    )
    .optional()
}

/// Resolves stored ids to URLs. Unknown ids and missing files resolve to `None`.
pub struct UrlResolver<'a> {
    conn: &'a Connection,
    workspace: &'a Path,
}

impl<'a> UrlResolver<'a> {
    pub fn new(conn: &'a Connection, workspace: &'a Path) -> Self {
        Self { conn, workspace }
    }

    pub fn resolve(&self, storage_id: Option<&str>) -> ApiResult<Option<String>> {
        let Some(storage_id) = storage_id else {
            return Ok(None);
        };
        if metadata(self.conn, storage_id)?.is_none() {
            return Ok(None);
        }
        let path = blob_path(self.workspace, storage_id);
        if !path.is_file() {
            return Ok(None);
        }
        file_url(&path).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_workspace(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    #[test]
    fn upload_commit_records_size_and_checksum() {
        let ws = temp_workspace("pollupd-storage");
        let conn = db::open_db(&ws).expect("open db");

        let ticket = generate_upload(&conn, &ws).expect("ticket");
        assert!(ticket.upload_url.starts_with("file://"));
        std::fs::write(&ticket.upload_path, b"abc").expect("write upload");

        let meta = commit_upload(&conn, &ws, &ticket.upload_id, "text/plain").expect("commit");
        assert_eq!(meta.size, 3);
        assert_eq!(
            meta.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(metadata(&conn, &meta.storage_id).expect("meta"), Some(meta.clone()));

        let resolver = UrlResolver::new(&conn, &ws);
        let url = resolver.resolve(Some(&meta.storage_id)).expect("resolve");
        assert!(url.expect("url").ends_with(&meta.storage_id));
        assert_eq!(resolver.resolve(Some("unknown")).expect("resolve"), None);
        assert_eq!(resolver.resolve(None).expect("resolve"), None);

        // The ticket is spent.
        assert!(matches!(
            commit_upload(&conn, &ws, &ticket.upload_id, "text/plain"),
            Err(ApiError::NotFound("upload"))
        ));
    }

    #[test]
    fn commit_without_bytes_is_rejected() {
        let ws = temp_workspace("pollupd-storage-empty");
        let conn = db::open_db(&ws).expect("open db");
        let ticket = generate_upload(&conn, &ws).expect("ticket");
        assert!(matches!(
            commit_upload(&conn, &ws, &ticket.upload_id, "image/png"),
            Err(ApiError::BadParams(_))
        ));
    }
}
