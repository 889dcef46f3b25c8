//! Success classification of free-text test reports.
//!
//! The tester agent writes prose, so the only signal available is whether the
//! report contains one of the configured success markers. Matching is
//! case-insensitive.

/// Returns `true` if `report` contains any of `markers` (ignoring case).
///
/// Empty markers are ignored so a stray `""` in config cannot match everything.
pub fn report_indicates_success<S: AsRef<str>>(report: &str, markers: &[S]) -> bool {
    let haystack = report.to_lowercase();
    markers
        .iter()
        .map(|marker| marker.as_ref().trim())
        .filter(|marker| !marker.is_empty())
        .any(|marker| haystack.contains(&marker.to_lowercase()))
}
