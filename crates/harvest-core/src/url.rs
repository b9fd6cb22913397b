//! Helpers for the `baseUrl` of an uploaded item.
//!
//! A base URL looks like
//! `https://s3.amazonaws.com/<bucket>/<submitter>/<item guid>/<title>/`, where
//! the submitter is usually an e-mail address and any segment may be
//! percent-encoded.

/// Decodes `%XX` escapes and `+` (as space). Invalid escapes are kept
/// verbatim; invalid UTF-8 is replaced.
pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Drops the trailing title segment, e.g. `.../guid/My Book/` → `.../guid`.
///
/// Expects an already-decoded URL. A URL without any `/` is returned as is.
pub fn remove_title_from_base_url(base_url: &str) -> String {
    if base_url.is_empty() {
        return String::new();
    }
    let trimmed = base_url.strip_suffix('/').unwrap_or(base_url);
    match trimmed.rfind('/') {
        Some(idx) => trimmed[..idx].to_string(),
        None => base_url.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlComponents {
    pub bucket: String,
    pub submitter: String,
    pub item_guid: String,
    pub title: String,
}

impl UrlComponents {
    /// Splits a decoded base URL into its components. Returns `None` when the
    /// path has fewer than bucket/submitter/guid/title segments.
    pub fn parse(base_url: &str) -> Option<Self> {
        let path = match base_url.split_once("://") {
            Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
            None => base_url,
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 4 {
            return None;
        }
        Some(Self {
            bucket: segments[0].to_string(),
            submitter: segments[1].to_string(),
            item_guid: segments[2].to_string(),
            title: segments[segments.len() - 1].to_string(),
        })
    }

    /// Destination folder for this item's artifacts in the output bucket.
    pub fn output_prefix(&self) -> String {
        format!("{}/{}", self.submitter, self.item_guid)
    }
}
