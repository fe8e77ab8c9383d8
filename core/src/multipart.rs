//! `multipart/form-data` encoding for file uploads.
//!
//! Uploads carry exactly one file part, so the encoder is a few lines of
//! byte pushing rather than a general form builder.

pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";
pub const OCTET_STREAM: &str = "application/octet-stream";

const BOUNDARY_BASE: &str = "homehub-form-boundary-5f1d8a3c";

/// An encoded form ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    /// A form with one file part named `field`.
    ///
    /// The boundary is grown until it no longer occurs inside `data`.
    pub fn single_file(field: &str, filename: &str, data: &[u8]) -> Self {
        let boundary = pick_boundary(data);
        let mut body = Vec::with_capacity(data.len() + 256);
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                quote(field),
                quote(filename)
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {OCTET_STREAM}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Self { boundary, body }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("{MULTIPART_FORM_DATA}; boundary={}", self.boundary)
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

fn pick_boundary(data: &[u8]) -> String {
    let mut boundary = BOUNDARY_BASE.to_string();
    let mut n = 0u32;
    while contains(data, boundary.as_bytes()) {
        n += 1;
        boundary = format!("{BOUNDARY_BASE}-{n}");
    }
    boundary
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

// Quotes and line breaks would end the header parameter early.
fn quote(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '\r' | '\n' => ' ',
            c => c,
        })
        .collect()
}
