//! Page-document helpers shared by the merge engine and the footer stamper.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId};
use tracing::debug;

use packetmaker_shared::{PacketError, Result};

/// US Letter media box, used when a page declares none.
pub const LETTER: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Page attributes a page may inherit from its ancestors in the page tree.
pub(crate) const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

/// Load a page document from disk.
pub fn load(path: &Path) -> Result<Document> {
    Document::load(path).map_err(|e| PacketError::pdf(path, e))
}

/// Number of pages in the document at `path`.
pub fn page_count(path: &Path) -> Result<u32> {
    let doc = load(path)?;
    Ok(doc.get_pages().len() as u32)
}

/// Look up an inheritable page attribute, walking up the page tree.
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok()?;
    }
    None
}

/// Follow a single level of indirection.
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Numeric value of an integer or real object.
pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Media box `[x0, y0, x1, y1]` of a page, defaulting to US Letter.
pub(crate) fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|mb| {
            let array = resolve(doc, &mb)?.as_array().ok()?;
            if array.len() != 4 {
                return None;
            }
            let mut rect = [0.0f32; 4];
            for (slot, value) in rect.iter_mut().zip(array) {
                *slot = number(resolve(doc, value)?)?;
            }
            Some(rect)
        })
        .unwrap_or(LETTER)
}

/// Write a document to `path` via a temporary sibling file and a rename.
///
/// The temporary file is removed if writing fails, so `path` either holds
/// the complete new document or is left as it was.
pub fn save_atomic(doc: &mut Document, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PacketError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| PacketError::pdf(path, "output path has no file name"))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    if let Err(e) = write_document(doc, &temp) {
        let _ = std::fs::remove_file(&temp);
        return Err(e);
    }

    std::fs::rename(&temp, path).map_err(|e| PacketError::io(path, e))?;
    debug!(path = %path.display(), "wrote page document");
    Ok(path.to_path_buf())
}

fn write_document(doc: &mut Document, temp: &Path) -> Result<()> {
    let file = File::create(temp).map_err(|e| PacketError::io(temp, e))?;
    let mut writer = BufWriter::new(file);
    doc.save_to(&mut writer).map_err(|e| PacketError::pdf(temp, e))?;
    writer.flush().map_err(|e| PacketError::io(temp, e))?;
    Ok(())
}
