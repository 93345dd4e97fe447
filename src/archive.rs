use crate::batch::{BatchResult, Outcome};
use crate::error::LaurelError;
use std::collections::HashSet;
use std::io::{Seek, Write};

const MAX_COMPONENT_CHARS: usize = 200;

/// Archive-safe path component: path separators and whitespace runs become
/// `_`, length capped at 200 characters.
pub fn sanitize_component(name: &str) -> String {
    let mut out = String::new();
    let mut pending_separator = false;
    for ch in name.chars() {
        if ch.is_whitespace() {
            pending_separator = true;
            continue;
        }
        if pending_separator {
            out.push('_');
            pending_separator = false;
        }
        if ch == '/' || ch == '\\' {
            out.push('_');
        } else {
            out.push(ch);
        }
    }
    if pending_separator && !out.is_empty() {
        out.push('_');
    }
    out.chars().take(MAX_COMPONENT_CHARS).collect()
}

/// Map a finished batch onto archive entries: one `.pdf` per success, one
/// `_ERROR.txt` per failure, collisions within a group suffixed `_2`, `_3`, …
pub fn archive_entries(result: &BatchResult) -> Vec<(String, Vec<u8>)> {
    let mut used: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(result.len());
    for entry in result.entries() {
        let group = fallback_if_empty(sanitize_component(&entry.group), "group");
        let base = fallback_if_empty(sanitize_component(&entry.name), "unnamed");
        let (stem, ext, bytes) = match &entry.outcome {
            Outcome::Success(bytes) => (base, ".pdf", bytes.clone()),
            Outcome::Failure(message) => {
                (format!("{base}_ERROR"), ".txt", message.clone().into_bytes())
            }
        };
        let mut path = format!("{group}/{stem}{ext}");
        let mut suffix = 2usize;
        while !used.insert(path.clone()) {
            path = format!("{group}/{stem}_{suffix}{ext}");
            suffix += 1;
        }
        out.push((path, bytes));
    }
    out
}

fn fallback_if_empty(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Stream the batch into a zip archive and hand the writer back.
pub fn write_zip<W: Write + Seek>(result: &BatchResult, writer: W) -> Result<W, LaurelError> {
    let mut zip = zip::ZipWriter::new(writer);
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
    for (path, bytes) in archive_entries(result) {
        zip.start_file(path, options)
            .map_err(|err| LaurelError::Archive(err.to_string()))?;
        zip.write_all(&bytes)?;
    }
    zip.finish()
        .map_err(|err| LaurelError::Archive(err.to_string()))
}
