//! Output file naming for downloaded resources.

use std::collections::HashSet;
use std::path::{Component, Path};
use std::sync::atomic::{AtomicU64, Ordering};

use url::Url;

/// Name used when a URL has no usable final path segment.
const FALLBACK_FILENAME: &str = "download.bin";

/// Suffix of the scratch file a transfer writes before it is renamed.
pub(crate) const PARTIAL_SUFFIX: &str = ".part";

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// File name for a resource: the decoded, sanitized final path segment.
///
/// `https://w.wallhaven.cc/full/85/wallhaven-8586my.jpg` → `wallhaven-8586my.jpg`
pub(crate) fn filename_from_url(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty());

    let Some(last) = last else {
        return FALLBACK_FILENAME.to_string();
    };

    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |s| s.into_owned());
    let sanitized = sanitize_filename(&decoded);
    if sanitized.trim_matches('_').is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// File name for a URL given as text; unparseable URLs get the fallback.
pub(crate) fn filename_for_url(url: &str) -> String {
    Url::parse(url).map_or_else(|_| FALLBACK_FILENAME.to_string(), |u| filename_from_url(&u))
}

/// Claims `name` in `taken`, or a variant tagged with `tag` when another
/// transfer of the same run already holds it.
///
/// `img.jpg` claimed twice with tag `y` becomes `img-y.jpg`; a counter is
/// added if that is taken as well.
pub(crate) fn claim_filename(taken: &mut HashSet<String>, name: String, tag: &str) -> String {
    if taken.insert(name.clone()) {
        return name;
    }

    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name.as_str(), ""),
    };
    let tag = sanitize_filename(tag);
    let mut candidate = format!("{stem}-{tag}{ext}");
    let mut n = 2u32;
    while !taken.insert(candidate.clone()) {
        candidate = format!("{stem}-{tag}-{n}{ext}");
        n += 1;
    }
    candidate
}

static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Scratch name used while a transfer is in progress:
/// `.<name>.<pid>-<seq>.part`, distinct for every call.
pub(crate) fn partial_filename(final_name: &str) -> String {
    let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(".{final_name}.{}-{seq}{PARTIAL_SUFFIX}", std::process::id())
}
