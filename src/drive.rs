// ===============================
// src/drive.rs
// ===============================
//
// Google Drive v3 (REST) untuk arsip tagihan:
// - files.list  : cari folder bulan di bawah root
// - files.create: buat folder kalau belum ada
// - upload      : multipart/related (metadata JSON + PDF)
//
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::archive::{ArchiveStore, SyncError};
use crate::config::ArchiveConfig;
use crate::credentials::{authorize, loader_for, AuthorizedClient};

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
pub const PDF_MIME: &str = "application/pdf";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
}

pub struct DriveClient {
    auth: AuthorizedClient,
    api_base: Url,
    upload_base: Url,
}

impl DriveClient {
    pub fn new(auth: AuthorizedClient, api_base: Url, upload_base: Url) -> Self {
        Self { auth, api_base, upload_base }
    }

    /// Load credentials per config, exchange for a token, return a ready client.
    pub async fn connect(cfg: &ArchiveConfig) -> Result<Self, SyncError> {
        Self::connect_with(cfg, reqwest::Client::new()).await
    }

    pub async fn connect_with(cfg: &ArchiveConfig, http: reqwest::Client) -> Result<Self, SyncError> {
        let loader = loader_for(cfg);
        let auth = authorize(loader.as_ref(), http).await?;
        Ok(Self::new(auth, cfg.drive_api_url.clone(), cfg.drive_upload_url.clone()))
    }

    fn endpoint(base: &Url, path: &str) -> Result<Url, SyncError> {
        base.join(path).map_err(|e| SyncError::Malformed(format!("bad endpoint {path}: {e}")))
    }

    async fn find_folder(&self, parent_id: &str, name: &str) -> Result<Option<String>, SyncError> {
        let url = Self::endpoint(&self.api_base, "files")?;
        let rsp = self
            .auth
            .http()
            .get(url)
            .header("Authorization", self.auth.bearer())
            .query(&[
                ("q", folder_query(parent_id, name).as_str()),
                ("fields", "files(id,name)"),
                ("spaces", "drive"),
            ])
            .send()
            .await?;
        let list: FileList = check(rsp).await?.json().await?;
        if list.files.len() > 1 {
            warn!(%parent_id, %name, count = list.files.len(), "duplicate month folders found, using first");
        }
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, SyncError> {
        let url = Self::endpoint(&self.api_base, "files")?;
        let rsp = self
            .auth
            .http()
            .post(url)
            .header("Authorization", self.auth.bearer())
            .query(&[("fields", "id")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME, "parents": [parent_id] }))
            .send()
            .await?;
        let created: FileRef = check(rsp).await?.json().await?;
        info!(%parent_id, %name, folder_id = %created.id, "month folder created");
        Ok(created.id)
    }
}

#[async_trait]
impl ArchiveStore for DriveClient {
    async fn ensure_month_folder(&self, parent_id: &str, month_label: &str) -> Result<String, SyncError> {
        if let Some(id) = self.find_folder(parent_id, month_label).await? {
            debug!(%month_label, folder_id = %id, "month folder exists");
            return Ok(id);
        }
        self.create_folder(parent_id, month_label).await
    }

    async fn upload_document(&self, local_path: &Path, folder_id: &str) -> Result<String, SyncError> {
        let bytes = tokio::fs::read(local_path).await?;
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SyncError::Malformed(format!("no file name in {}", local_path.display())))?;

        let boundary = format!("tenant_bill_{}", Utc::now().timestamp_nanos_opt().unwrap_or(0));
        let metadata = json!({ "name": name, "parents": [folder_id], "mimeType": PDF_MIME });
        let body = multipart_related(&boundary, &metadata, PDF_MIME, &bytes);

        let url = Self::endpoint(&self.upload_base, "files")?;
        let rsp = self
            .auth
            .http()
            .post(url)
            .header("Authorization", self.auth.bearer())
            .header("Content-Type", format!("multipart/related; boundary={boundary}"))
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .body(body)
            .send()
            .await?;
        let uploaded: FileRef = check(rsp).await?.json().await?;
        info!(%name, %folder_id, file_id = %uploaded.id, size = bytes.len(), "document uploaded");
        Ok(uploaded.id)
    }
}

async fn check(rsp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    if rsp.status().is_success() {
        return Ok(rsp);
    }
    let status = rsp.status().as_u16();
    let body = rsp.text().await.unwrap_or_default();
    Err(SyncError::Api { status, body })
}

/// Escape untuk string literal di query Drive (`\` dan `'`).
pub fn escape_query_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

pub fn folder_query(parent_id: &str, name: &str) -> String {
    format!(
        "name = '{}' and '{}' in parents and mimeType = '{}' and trashed = false",
        escape_query_literal(name),
        escape_query_literal(parent_id),
        FOLDER_MIME
    )
}

pub fn multipart_related(boundary: &str, metadata: &serde_json::Value, mime: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n").as_bytes());
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\nContent-Type: {mime}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// Responder HTTP/1.1 mini di thread sendiri, untuk menguji DriveClient
/// dan token exchange tanpa jaringan.
#[cfg(test)]
pub mod stub_server {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::{Arc, Mutex};
    use std::thread;

    use url::Url;

    #[derive(Debug, Clone)]
    pub struct Recorded {
        pub method: String,
        pub target: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl Recorded {
        pub fn path(&self) -> &str {
            self.target.split('?').next().unwrap_or("")
        }

        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
        }

        pub fn body_text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }

    /// (status, JSON body) per request.
    pub type Handler = Box<dyn FnMut(&Recorded) -> (u16, String) + Send>;

    pub struct StubServer {
        base: String,
        requests: Arc<Mutex<Vec<Recorded>>>,
    }

    impl StubServer {
        pub fn start(mut handler: Handler) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let base = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let log = Arc::clone(&requests);

            thread::spawn(move || {
                for conn in listener.incoming() {
                    let Ok(stream) = conn else { break };
                    let Some(req) = read_request(&stream) else { continue };
                    let (status, body) = handler(&req);
                    log.lock().unwrap().push(req);
                    respond(&stream, status, &body);
                }
            });
            Self { base, requests }
        }

        pub fn url(&self, path: &str) -> Url {
            Url::parse(&format!("{}{}", self.base, path)).unwrap()
        }

        pub fn requests(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn read_request(stream: &TcpStream) -> Option<Recorded> {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let mut parts = line.split_whitespace();
        let method = parts.next()?.to_string();
        let target = parts.next()?.to_string();

        let mut headers = Vec::new();
        loop {
            let mut h = String::new();
            reader.read_line(&mut h).ok()?;
            let h = h.trim_end();
            if h.is_empty() {
                break;
            }
            if let Some((k, v)) = h.split_once(':') {
                headers.push((k.trim().to_string(), v.trim().to_string()));
            }
        }
        let len = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).ok()?;
        Some(Recorded { method, target, headers, body })
    }

    fn respond(mut stream: &TcpStream, status: u16, body: &str) {
        let reason = if (200..300).contains(&status) { "OK" } else { "Error" };
        let head = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(body.as_bytes());
        let _ = stream.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::stub_server::{Recorded, StubServer};
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn local_http() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    fn client_for(server: &StubServer) -> DriveClient {
        DriveClient::new(
            AuthorizedClient::with_token(local_http(), "test-token"),
            server.url("/drive/v3/"),
            server.url("/upload/drive/v3/"),
        )
    }

    /// Drive palsu: folder "March_2025" baru ada setelah dibuat lewat POST.
    fn folder_backend(created: Arc<AtomicBool>) -> Box<dyn FnMut(&Recorded) -> (u16, String) + Send> {
        Box::new(move |req: &Recorded| match (req.method.as_str(), req.path()) {
            ("GET", "/drive/v3/files") if created.load(Ordering::SeqCst) => {
                (200, r#"{"files":[{"id":"fold-1","name":"March_2025"}]}"#.to_string())
            }
            ("GET", "/drive/v3/files") => (200, r#"{"files":[]}"#.to_string()),
            ("POST", "/drive/v3/files") => {
                created.store(true, Ordering::SeqCst);
                (200, r#"{"id":"fold-1"}"#.to_string())
            }
            _ => (404, r#"{"error":"not found"}"#.to_string()),
        })
    }

    #[tokio::test]
    async fn drive_month_folder_is_looked_up_before_created() {
        let server = StubServer::start(folder_backend(Arc::new(AtomicBool::new(false))));
        let drive = client_for(&server);

        let first = drive.ensure_month_folder("root", "March_2025").await.unwrap();
        let second = drive.ensure_month_folder("root", "March_2025").await.unwrap();
        assert_eq!(first, "fold-1");
        assert_eq!(second, first);

        let reqs = server.requests();
        let calls: Vec<(&str, &str)> = reqs.iter().map(|r| (r.method.as_str(), r.path())).collect();
        assert_eq!(
            calls,
            vec![("GET", "/drive/v3/files"), ("POST", "/drive/v3/files"), ("GET", "/drive/v3/files")]
        );
        assert_eq!(reqs[0].header("authorization"), Some("Bearer test-token"));
        assert!(reqs[0].target.contains("March_2025"));

        let created: serde_json::Value = serde_json::from_slice(&reqs[1].body).unwrap();
        assert_eq!(created["name"], "March_2025");
        assert_eq!(created["mimeType"], FOLDER_MIME);
        assert_eq!(created["parents"][0], "root");
    }

    #[tokio::test]
    async fn drive_upload_sends_multipart_with_file_name() {
        let server = StubServer::start(Box::new(|_: &Recorded| (200, r#"{"id":"file-9"}"#.to_string())));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("March_2025_Ravi_Kumar.pdf");
        std::fs::write(&path, b"%PDF-1.7 bill").unwrap();

        let file_id = client_for(&server).upload_document(&path, "fold-1").await.unwrap();
        assert_eq!(file_id, "file-9");

        let reqs = server.requests();
        assert_eq!(reqs.len(), 1);
        let up = &reqs[0];
        assert_eq!(up.method, "POST");
        assert_eq!(up.path(), "/upload/drive/v3/files");
        assert!(up.target.contains("uploadType=multipart"));
        assert!(up.header("content-type").unwrap().starts_with("multipart/related; boundary=tenant_bill_"));
        let body = up.body_text();
        assert!(body.contains("\"name\":\"March_2025_Ravi_Kumar.pdf\""));
        assert!(body.contains("\"parents\":[\"fold-1\"]"));
        assert!(body.contains("%PDF-1.7 bill"));
    }

    #[tokio::test]
    async fn drive_error_status_maps_to_api_error() {
        let server = StubServer::start(Box::new(|_: &Recorded| {
            (403, r#"{"error":{"message":"insufficientPermissions"}}"#.to_string())
        }));

        let err = client_for(&server).ensure_month_folder("root", "March_2025").await.unwrap_err();
        match err {
            SyncError::Api { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("insufficientPermissions"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        // Lookup gagal: tidak boleh lanjut create.
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn connect_exchanges_token_then_uses_it_against_configured_urls() {
        let server = StubServer::start(Box::new(|req: &Recorded| match req.path() {
            "/token" => (200, r#"{"access_token":"ya29.stub","expires_in":3600,"token_type":"Bearer"}"#.to_string()),
            _ => (200, r#"{"files":[{"id":"fold-7"}]}"#.to_string()),
        }));
        let key = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(key.path(), crate::credentials::fixtures::key_json(server.url("/token").as_str())).unwrap();

        let cfg = ArchiveConfig {
            enabled: true,
            root_folder_id: "root".into(),
            credential_source: crate::config::CredentialSource::File,
            credential_env_var: "GCP_SERVICE_ACCOUNT".into(),
            credential_file: key.path().to_path_buf(),
            drive_api_url: server.url("/drive/v3/"),
            drive_upload_url: server.url("/upload/drive/v3/"),
        };
        let drive = DriveClient::connect_with(&cfg, local_http()).await.unwrap();
        assert_eq!(drive.ensure_month_folder("root", "March_2025").await.unwrap(), "fold-7");

        let reqs = server.requests();
        assert_eq!(reqs[0].path(), "/token");
        assert_eq!(reqs[1].path(), "/drive/v3/files");
        assert_eq!(reqs[1].header("authorization"), Some("Bearer ya29.stub"));
    }

    #[test]
    fn folder_query_matches_exact_name_under_parent() {
        assert_eq!(
            folder_query("root123", "March_2025"),
            "name = 'March_2025' and 'root123' in parents and mimeType = 'application/vnd.google-apps.folder' and trashed = false"
        );
    }

    #[test]
    fn query_literals_are_escaped() {
        assert_eq!(escape_query_literal("O'Brien"), "O\\'Brien");
        assert_eq!(escape_query_literal("a\\b"), "a\\\\b");
        assert!(folder_query("root", "Tenant's_Month").contains("name = 'Tenant\\'s_Month'"));
    }

    #[test]
    fn multipart_body_has_metadata_then_content() {
        let meta = json!({ "name": "March_2025_Ravi.pdf", "parents": ["f1"] });
        let body = multipart_related("XYZ", &meta, PDF_MIME, b"%PDF-1.7 data");
        let text = String::from_utf8(body).unwrap();

        let meta_at = text.find("\"name\":\"March_2025_Ravi.pdf\"").unwrap();
        let pdf_at = text.find("%PDF-1.7 data").unwrap();
        assert!(text.starts_with("--XYZ\r\nContent-Type: application/json"));
        assert!(meta_at < pdf_at);
        assert!(text.contains("\r\n--XYZ\r\nContent-Type: application/pdf\r\n\r\n"));
        assert!(text.ends_with("\r\n--XYZ--\r\n"));
    }

    #[test]
    fn endpoints_join_under_versioned_base() {
        let api = Url::parse("https://www.googleapis.com/drive/v3/").unwrap();
        let upload = Url::parse("https://www.googleapis.com/upload/drive/v3/").unwrap();
        assert_eq!(DriveClient::endpoint(&api, "files").unwrap().as_str(), "https://www.googleapis.com/drive/v3/files");
        assert_eq!(
            DriveClient::endpoint(&upload, "files").unwrap().as_str(),
            "https://www.googleapis.com/upload/drive/v3/files"
        );
    }
}
