//! Deterministic storage-key derivation for both pipeline stages.
//!
//! Keys are plain POSIX-style strings built from the task namespace, a stage
//! marker segment, the optional bucket prefix, and a file name. Identical
//! inputs always yield the identical key; the download stage relies on this
//! to use the object store as its idempotency ledger.

/// Marker segment for objects produced by the download stage.
pub const DOWNLOAD_SEGMENT: &str = "download";

/// Marker segment for objects produced by the audio extraction stage.
pub const AUDIO_SEGMENT: &str = "extract-audio";

/// Extension substituted for the source stem when no audio name override is
/// given.
const AUDIO_SUFFIX: &str = ".audio.mka";

/// Build the storage key for a downloaded video:
/// `<task_id>/download/[<prefix>/]<file_name>`, skipping empty segments.
pub fn derive_download_key(task_id: &str, prefix: Option<&str>, file_name: &str) -> String {
    let prefix = prefix.map(|p| p.trim_matches('/')).unwrap_or("");
    [task_id, DOWNLOAD_SEGMENT, prefix, file_name]
        .iter()
        .filter(|segment| !segment.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

/// Derive the storage key for an extracted-audio artifact.
///
/// Strips a leading `task_id` segment and a leading `download` segment from
/// `source_key` when present (already-stripped input is tolerated), infers
/// `<stem>.audio.mka` from the source file name unless `override_name` is
/// given, and re-roots the remaining parent directory under `extract-audio/`
/// before re-applying the bucket prefix and the task namespace.
///
/// Returns `(relative_key, full_key)`, where the relative key omits the task
/// namespace.
pub fn derive_audio_key(
    source_key: &str,
    task_id: &str,
    prefix: Option<&str>,
    override_name: Option<&str>,
) -> (String, String) {
    let mut parts: Vec<&str> = source_key.split('/').filter(|s| !s.is_empty()).collect();

    if parts.first() == Some(&task_id) && !task_id.is_empty() {
        parts.remove(0);
    }
    if parts.first() == Some(&DOWNLOAD_SEGMENT) {
        parts.remove(0);
    }

    // Everything got stripped: fall back to the source file name alone.
    if parts.is_empty() {
        if let Some(name) = source_key.rsplit('/').find(|s| !s.is_empty()) {
            parts.push(name);
        }
    }

    let file_name = parts.last().copied().unwrap_or_default();
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    let inferred = format!("{stem}{AUDIO_SUFFIX}");
    let audio_name = override_name.unwrap_or(&inferred);

    let mut segments: Vec<&str> = Vec::new();
    if let Some(p) = prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        segments.push(p);
    }
    segments.push(AUDIO_SEGMENT);
    // An empty remaining parent means "no subdirectory", not a literal `.`.
    segments.extend(&parts[..parts.len().saturating_sub(1)]);
    segments.push(audio_name);
    let relative_key = segments.join("/");

    let full_key = if task_id.is_empty() {
        relative_key.clone()
    } else {
        format!("{task_id}/{relative_key}")
    };

    (relative_key, full_key)
}
