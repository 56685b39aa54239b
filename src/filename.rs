//! Local filename derivation
//!
//! A location's filename is its final `/`-separated segment, taken verbatim.
//! `https://example.com/images/image1.jpg` becomes `image1.jpg`.

use crate::error::FetchError;

/// Derive the local filename for `location`
///
/// Fails with [`FetchError::InvalidLocation`] when the last segment is empty
/// (empty location, trailing slash) or is `.`/`..`, which would point outside
/// the output directory.
///
/// # Examples
///
/// ```
/// use imgdl::filename::resolve;
///
/// assert_eq!(resolve("https://x.com/a/b/img.jpg").unwrap(), "img.jpg");
/// assert!(resolve("https://x.com/a/b/").is_err());
/// ```
pub fn resolve(location: &str) -> Result<String, FetchError> {
    let invalid = |reason: &str| FetchError::InvalidLocation {
        location: location.to_string(),
        reason: reason.to_string(),
    };

    if location.trim().is_empty() {
        return Err(invalid("location is empty"));
    }

    let segment = location.rsplit('/').next().unwrap_or_default();
    match segment {
        "" => Err(invalid("no filename after the last '/'")),
        "." | ".." => Err(invalid("filename would escape the output directory")),
        name => Ok(name.to_string()),
    }
}
