//! Checksum utilities for record deduplication

/// Joins the rendered line and the source file name inside a fingerprint.
pub const FINGERPRINT_SEPARATOR: &str = "_";

/// Compute the hex-encoded MD5 digest of bytes
pub fn compute_md5(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Fingerprint one data line of a source file.
///
/// `fields` is the line exactly as it was split, before any trimming or
/// header mapping. The digest covers the rendered field list followed by the
/// source basename, so the same line in two different files yields two
/// different fingerprints while re-reading an unchanged file reproduces them.
pub fn fingerprint(fields: &[&str], source: &str) -> String {
    let unhashed = format!("{:?}{}{}", fields, FINGERPRINT_SEPARATOR, source);
    compute_md5(unhashed.as_bytes())
}
