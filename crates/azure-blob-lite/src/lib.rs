//! # azure-blob-lite
//!
//! A deliberately small Azure Blob Storage client: parse a storage
//! connection string, sign a single `Put Blob` request and upload a block
//! blob. It exists so the converter can offload embedded images without
//! pulling in the full Azure SDK.
//!
//! ## Supported credentials
//!
//! | Connection string contains        | Auth used                     |
//! |-----------------------------------|-------------------------------|
//! | `AccountName` + `AccountKey`      | `SharedKey` request signature |
//! | `SharedAccessSignature`           | SAS token appended to the URL |
//! | `UseDevelopmentStorage=true`      | Azurite well-known account    |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use azure_blob_lite::BlobContainerClient;
//!
//! # async fn run() -> Result<(), azure_blob_lite::BlobError> {
//! let conn = std::env::var("AZURE_STORAGE_CONNECTION_STRING").unwrap_or_default();
//! let client = BlobContainerClient::from_connection_string(&conn, "images")?;
//! let url = client
//!     .upload_block_blob("1718000000000-k3j2h1.png", vec![0x89, b'P', b'N', b'G'], "image/png")
//!     .await?;
//! println!("uploaded to {url}");
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

// ── Public constants ─────────────────────────────────────────────────────────

/// REST API version sent in `x-ms-version`.
pub const API_VERSION: &str = "2021-08-06";

/// Default endpoint suffix for public Azure.
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Azurite / storage emulator account.
const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

type HmacSha256 = Hmac<Sha256>;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by azure-blob-lite operations.
#[derive(Error, Debug)]
pub enum BlobError {
    /// The connection string could not be parsed.
    #[error("Invalid storage connection string: {0}")]
    InvalidConnectionString(String),

    /// Neither an account key nor a SAS token was found.
    #[error("Connection string has no AccountKey or SharedAccessSignature")]
    MissingCredential,

    /// `AccountKey` is not valid base64.
    #[error("AccountKey is not valid base64: {0}")]
    InvalidAccountKey(String),

    /// The container name is empty or malformed.
    #[error("Invalid container name '{0}'")]
    InvalidContainer(String),

    /// The HTTP request could not be sent or the response not read.
    #[error("Blob transport error: {0}")]
    Transport(String),

    /// The request did not complete within the client timeout.
    #[error("Blob upload timed out")]
    Timeout,

    /// The service answered with a non-success status.
    #[error("Blob service rejected the request: HTTP {status} {code}")]
    Rejected { status: u16, code: String },
}

// ── Connection string ────────────────────────────────────────────────────────

/// How requests are authorised.
#[derive(Clone)]
pub enum Credential {
    /// Account name + decoded account key.
    SharedKey { account: String, key: Vec<u8> },
    /// SAS token without the leading `?`.
    Sas(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .field("key", &"<redacted>")
                .finish(),
            Credential::Sas(_) => f.debug_tuple("Sas").field(&"<redacted>").finish(),
        }
    }
}

/// A parsed storage connection string.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    /// Blob service endpoint without a trailing slash.
    pub blob_endpoint: String,
    /// Credential used to authorise uploads.
    pub credential: Credential,
}

impl ConnectionString {
    /// Parse `Key=Value;Key=Value` pairs.
    ///
    /// Keys are matched case-insensitively; values keep their case (account
    /// keys and SAS tokens contain `=` so only the first `=` splits).
    pub fn parse(input: &str) -> Result<Self, BlobError> {
        let mut pairs: BTreeMap<String, String> = BTreeMap::new();
        for segment in input.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                BlobError::InvalidConnectionString(format!("segment '{segment}' has no '='"))
            })?;
            pairs.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        if pairs.is_empty() {
            return Err(BlobError::InvalidConnectionString("empty".into()));
        }

        if pairs
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Ok(Self {
                blob_endpoint: DEV_BLOB_ENDPOINT.to_string(),
                credential: Credential::SharedKey {
                    account: DEV_ACCOUNT_NAME.to_string(),
                    key: decode_key(DEV_ACCOUNT_KEY)?,
                },
            });
        }

        let account = pairs.get("accountname").cloned();

        let blob_endpoint = match pairs.get("blobendpoint") {
            Some(ep) => ep.trim_end_matches('/').to_string(),
            None => {
                let account = account.as_deref().ok_or_else(|| {
                    BlobError::InvalidConnectionString(
                        "needs AccountName or BlobEndpoint".into(),
                    )
                })?;
                let protocol = pairs
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                let suffix = pairs
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
                format!("{protocol}://{account}.blob.{suffix}")
            }
        };

        let credential = match (account, pairs.get("accountkey"), pairs.get("sharedaccesssignature")) {
            (_, _, Some(sas)) => Credential::Sas(sas.trim_start_matches('?').to_string()),
            (Some(account), Some(key), None) => Credential::SharedKey {
                account,
                key: decode_key(key)?,
            },
            _ => return Err(BlobError::MissingCredential),
        };

        Ok(Self {
            blob_endpoint,
            credential,
        })
    }
}

fn decode_key(key: &str) -> Result<Vec<u8>, BlobError> {
    STANDARD
        .decode(key)
        .map_err(|e| BlobError::InvalidAccountKey(e.to_string()))
}

// ── Container client ─────────────────────────────────────────────────────────

/// Uploads blobs into one container.
#[derive(Debug, Clone)]
pub struct BlobContainerClient {
    endpoint: String,
    container: String,
    credential: Credential,
    http: reqwest::Client,
}

impl BlobContainerClient {
    /// Build a client for `container` from a parsed connection string.
    pub fn new(conn: ConnectionString, container: impl Into<String>) -> Result<Self, BlobError> {
        let container = container.into();
        if container.is_empty()
            || !container
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(BlobError::InvalidContainer(container));
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BlobError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: conn.blob_endpoint,
            container,
            credential: conn.credential,
            http,
        })
    }

    /// Parse `connection_string` and build a client for `container`.
    pub fn from_connection_string(
        connection_string: &str,
        container: impl Into<String>,
    ) -> Result<Self, BlobError> {
        Self::new(ConnectionString::parse(connection_string)?, container)
    }

    /// Container name this client writes to.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Public URL of a blob (never carries the SAS token).
    pub fn blob_url(&self, blob_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            self.container,
            encode_blob_name(blob_name)
        )
    }

    /// Upload `bytes` as a block blob and return its public URL.
    ///
    /// `timeout` bounds the whole request; `None` leaves it to the caller.
    pub async fn upload_block_blob(
        &self,
        blob_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError> {
        self.upload_block_blob_with_timeout(blob_name, bytes, content_type, None)
            .await
    }

    /// [`Self::upload_block_blob`] with an explicit per-request timeout.
    pub async fn upload_block_blob_with_timeout(
        &self,
        blob_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
        timeout: Option<Duration>,
    ) -> Result<String, BlobError> {
        let url = self.blob_url(blob_name);
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let length = bytes.len();

        let mut request = self
            .http
            .put(self.request_url(&url))
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .header("Content-Type", content_type)
            .header("Content-Length", length.to_string())
            .body(bytes);

        if let Credential::SharedKey { account, key } = &self.credential {
            let ms_headers = [
                ("x-ms-blob-type", "BlockBlob"),
                ("x-ms-date", date.as_str()),
                ("x-ms-version", API_VERSION),
            ];
            let resource = canonical_resource(account, &url);
            let sts = string_to_sign("PUT", length, content_type, &ms_headers, &resource);
            let signature = sign(key, &sts)?;
            request = request.header("Authorization", format!("SharedKey {account}:{signature}"));
        }

        if let Some(t) = timeout {
            request = request.timeout(t);
        }

        debug!("PUT {} ({} bytes, {})", url, length, content_type);

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BlobError::Timeout
            } else {
                BlobError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let code = response
                .headers()
                .get("x-ms-error-code")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            return Err(BlobError::Rejected {
                status: status.as_u16(),
                code,
            });
        }

        Ok(url)
    }

    fn request_url(&self, url: &str) -> String {
        match &self.credential {
            Credential::Sas(token) => format!("{url}?{token}"),
            Credential::SharedKey { .. } => url.to_string(),
        }
    }
}

// ── SharedKey signing ────────────────────────────────────────────────────────

/// Percent-encode everything outside the RFC 3986 unreserved set, keeping `/`.
fn encode_blob_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// `/{account}{url-path}`; the emulator's path already starts with the
/// account, which the service expects to see twice.
fn canonical_resource(account: &str, url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let path = without_scheme
        .find('/')
        .map(|i| &without_scheme[i..])
        .unwrap_or("/");
    let path = path.split('?').next().unwrap_or(path);
    format!("/{account}{path}")
}

/// Blob service string-to-sign (API versions ≥ 2015-02-21: a zero
/// `Content-Length` is signed as the empty string).
fn string_to_sign(
    method: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, &str)],
    canonical_resource: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect();

    // VERB, Content-Encoding, Content-Language, Content-Length, Content-MD5,
    // Content-Type, Date, If-Modified-Since, If-Match, If-None-Match,
    // If-Unmodified-Since, Range
    format!(
        "{method}\n\n\n{length}\n\n{content_type}\n\n\n\n\n\n\n{canonical_headers}{canonical_resource}"
    )
}

fn sign(key: &[u8], string_to_sign: &str) -> Result<String, BlobError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| BlobError::InvalidAccountKey(e.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "c2VjcmV0LWtleS1mb3ItdGVzdHM=";

    #[test]
    fn parses_account_key_connection_string() {
        let cs = ConnectionString::parse(&format!(
            "DefaultEndpointsProtocol=https;AccountName=kloudvin;AccountKey={KEY};EndpointSuffix=core.windows.net"
        ))
        .unwrap();
        assert_eq!(cs.blob_endpoint, "https://kloudvin.blob.core.windows.net");
        match cs.credential {
            Credential::SharedKey { account, key } => {
                assert_eq!(account, "kloudvin");
                assert_eq!(key, b"secret-key-for-tests");
            }
            other => panic!("expected SharedKey, got {other:?}"),
        }
    }

    #[test]
    fn parses_sas_connection_string() {
        let cs = ConnectionString::parse(
            "BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=?sv=2021&sig=abc%3D",
        )
        .unwrap();
        assert_eq!(cs.blob_endpoint, "https://acct.blob.core.windows.net");
        assert!(matches!(cs.credential, Credential::Sas(ref t) if t == "sv=2021&sig=abc%3D"));
    }

    #[test]
    fn development_storage_uses_emulator() {
        let cs = ConnectionString::parse("UseDevelopmentStorage=true").unwrap();
        assert_eq!(cs.blob_endpoint, DEV_BLOB_ENDPOINT);
    }

    #[test]
    fn missing_credential_is_rejected() {
        let err = ConnectionString::parse("AccountName=kloudvin").unwrap_err();
        assert!(matches!(err, BlobError::MissingCredential));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(ConnectionString::parse("").is_err());
        assert!(ConnectionString::parse("not a connection string").is_err());
    }

    #[test]
    fn invalid_container_names_are_rejected() {
        let cs = ConnectionString::parse(&format!("AccountName=a;AccountKey={KEY}")).unwrap();
        assert!(BlobContainerClient::new(cs.clone(), "Images").is_err());
        assert!(BlobContainerClient::new(cs, "").is_err());
    }

    #[test]
    fn blob_url_encodes_name_and_omits_sas() {
        let client = BlobContainerClient::from_connection_string(
            "BlobEndpoint=https://acct.blob.core.windows.net;SharedAccessSignature=sv=1&sig=x",
            "images",
        )
        .unwrap();
        assert_eq!(
            client.blob_url("a b.png"),
            "https://acct.blob.core.windows.net/images/a%20b.png"
        );
        assert_eq!(
            client.request_url("https://acct.blob.core.windows.net/images/x.png"),
            "https://acct.blob.core.windows.net/images/x.png?sv=1&sig=x"
        );
    }

    #[test]
    fn canonical_resource_prefixes_account() {
        assert_eq!(
            canonical_resource("acct", "https://acct.blob.core.windows.net/images/x.png"),
            "/acct/images/x.png"
        );
        assert_eq!(
            canonical_resource("devstoreaccount1", "http://127.0.0.1:10000/devstoreaccount1/images/x.png"),
            "/devstoreaccount1/devstoreaccount1/images/x.png"
        );
    }

    #[test]
    fn string_to_sign_layout() {
        let sts = string_to_sign(
            "PUT",
            42,
            "image/png",
            &[("x-ms-version", API_VERSION), ("x-ms-blob-type", "BlockBlob")],
            "/acct/images/x.png",
        );
        let lines: Vec<&str> = sts.split('\n').collect();
        assert_eq!(lines[0], "PUT");
        assert_eq!(lines[3], "42");
        assert_eq!(lines[5], "image/png");
        // x-ms headers are sorted
        assert_eq!(lines[12], "x-ms-blob-type:BlockBlob");
        assert_eq!(lines[13], format!("x-ms-version:{API_VERSION}"));
        assert_eq!(lines[14], "/acct/images/x.png");
    }

    #[test]
    fn zero_length_is_signed_as_empty() {
        let sts = string_to_sign("PUT", 0, "", &[], "/a/b");
        assert_eq!(sts.split('\n').nth(3), Some(""));
    }

    #[test]
    fn signature_is_stable_base64() {
        let a = sign(b"key", "payload").unwrap();
        let b = sign(b"key", "payload").unwrap();
        assert_eq!(a, b);
        assert_eq!(STANDARD.decode(&a).unwrap().len(), 32);
        assert_ne!(a, sign(b"other", "payload").unwrap());
    }
}
