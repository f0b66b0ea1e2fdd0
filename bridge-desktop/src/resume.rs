//! Resume data for cancelled downloads.
//!
//! When a running download is cancelled after some of the body reached the
//! staging file, the task's cancellation error carries a small JSON document
//! describing where to pick up again. Callers treat it as opaque bytes and
//! hand it back through [`DownloadSource::ResumeData`].
//!
//! [`DownloadSource::ResumeData`]: bridge_traits::DownloadSource::ResumeData

use bridge_traits::{
    error::{BridgeError, Result},
    Request,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

const FORMAT_VERSION: u32 = 1;

/// Where a cancelled download stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeData {
    pub version: u32,
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Staging file holding the bytes received so far.
    pub partial_path: PathBuf,
    /// Number of valid bytes at the start of `partial_path`.
    pub offset: u64,
    /// `ETag` or `Last-Modified` of the interrupted response, sent back as
    /// `If-Range` so a changed resource restarts from scratch.
    pub validator: Option<String>,
}

impl ResumeData {
    pub fn new(request: &Request, partial_path: PathBuf, offset: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            url: request.url.clone(),
            headers: request.headers.clone(),
            partial_path,
            offset,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Option<String>) -> Self {
        self.validator = validator;
        self
    }

    pub fn encode(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to encode resume data: {}", e)))
    }

    /// # Errors
    ///
    /// Returns `InvalidRequest` for anything that was not produced by
    /// [`encode`](Self::encode) of the same format version.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let resume: ResumeData = serde_json::from_slice(data)
            .map_err(|e| BridgeError::InvalidRequest(format!("Malformed resume data: {}", e)))?;

        if resume.version != FORMAT_VERSION {
            return Err(BridgeError::InvalidRequest(format!(
                "Unsupported resume data version {}",
                resume.version
            )));
        }

        Ok(resume)
    }

    /// The request the interrupted download was made for.
    pub fn original_request(&self) -> Request {
        let mut request = Request::get(self.url.clone());
        request.headers = self.headers.clone();
        request
    }

    /// The original request asking only for the missing tail.
    pub fn range_request(&self) -> Request {
        let mut request = self
            .original_request()
            .header("Range", format!("bytes={}-", self.offset));
        if let Some(validator) = &self.validator {
            request = request.header("If-Range", validator.clone());
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResumeData {
        let request = Request::get("https://example.com/file.bin").header("Accept", "*/*");
        ResumeData::new(&request, PathBuf::from("/tmp/staging/abc.part"), 1024)
    }

    #[test]
    fn test_encoded_data_decodes() {
        let resume = sample().with_validator(Some("\"v1\"".to_string()));
        let encoded = resume.encode().unwrap();
        assert_eq!(ResumeData::decode(&encoded).unwrap(), resume);
    }

    #[test]
    fn test_garbage_is_invalid_request() {
        let err = ResumeData::decode(b"not resume data").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let mut resume = sample();
        resume.version = 99;
        let encoded = serde_json::to_vec(&resume).unwrap();
        let err = ResumeData::decode(&encoded).unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }

    #[test]
    fn test_range_request() {
        let request = sample().range_request();
        assert_eq!(request.url, "https://example.com/file.bin");
        assert_eq!(request.header_value("range"), Some("bytes=1024-"));
        assert_eq!(request.header_value("accept"), Some("*/*"));
        assert_eq!(request.header_value("if-range"), None);

        let guarded = sample()
            .with_validator(Some("\"v1\"".to_string()))
            .range_request();
        assert_eq!(guarded.header_value("if-range"), Some("\"v1\""));
    }
}
