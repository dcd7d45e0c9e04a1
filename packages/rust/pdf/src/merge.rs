//! Packet merge engine.
//!
//! Concatenates page documents in order. With padding enabled, every
//! appended source whose pages leave the running total odd is followed by a
//! single blank page, so each section starts on a fresh sheet side when the
//! packet is printed duplex.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, info, instrument};

use packetmaker_shared::{PacketError, Result};

use crate::document::{self, INHERITABLE_KEYS, LETTER};

// ---------------------------------------------------------------------------
// PacketWriter
// ---------------------------------------------------------------------------

/// Accumulates pages from several source documents into one output document.
pub struct PacketWriter {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    last_media_box: Option<Object>,
}

impl Default for PacketWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketWriter {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            last_media_box: None,
        }
    }

    /// Pages appended so far, padding included.
    pub fn page_count(&self) -> u32 {
        self.kids.len() as u32
    }

    /// Append every page of the document at `path`; returns the number added.
    pub fn append(&mut self, path: &Path) -> Result<u32> {
        let mut source = document::load(path)?;
        source.renumber_objects_with(self.doc.max_id + 1);

        let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
        for &page_id in &page_ids {
            let inherited: Vec<(&[u8], Object)> = INHERITABLE_KEYS
                .iter()
                .filter_map(|&key| {
                    document::inherited_attribute(&source, page_id, key).map(|v| (key, v))
                })
                .collect();

            let page = source
                .get_dictionary_mut(page_id)
                .map_err(|e| PacketError::pdf(path, e))?;
            for (key, value) in inherited {
                if !page.has(key) {
                    page.set(key, value);
                }
            }
            page.set("Parent", self.pages_id);
            if let Ok(media_box) = page.get(b"MediaBox") {
                self.last_media_box = Some(media_box.clone());
            }
        }

        // The source's own catalog and page-tree nodes are replaced by ours.
        let replaced: BTreeSet<ObjectId> = source
            .objects
            .iter()
            .filter(|(_, object)| {
                object
                    .as_dict()
                    .and_then(|d| d.get(b"Type"))
                    .and_then(|t| t.as_name())
                    .is_ok_and(|name| name == b"Catalog" || name == b"Pages")
            })
            .map(|(&id, _)| id)
            .collect();

        let source_max = source.objects.keys().map(|&(id, _)| id).max().unwrap_or(0);
        for (id, object) in source.objects {
            if !replaced.contains(&id) {
                self.doc.objects.insert(id, object);
            }
        }
        self.doc.max_id = self.doc.max_id.max(source_max);

        // Resolve an indirect MediaBox now; the object it points at may be
        // pruned on finish if no page keeps referring to it.
        if let Some(Object::Reference(id)) = self.last_media_box {
            self.last_media_box = self.doc.get_object(id).ok().cloned();
        }

        self.kids.extend(&page_ids);
        debug!(path = %path.display(), pages = page_ids.len(), "appended document");
        Ok(page_ids.len() as u32)
    }

    /// Append one empty page sized like the last appended page.
    pub fn add_blank_page(&mut self) {
        let media_box = self
            .last_media_box
            .clone()
            .unwrap_or_else(|| LETTER.iter().map(|&v| Object::Real(v.into())).collect::<Vec<_>>().into());
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => media_box,
            "Resources" => dictionary! {},
            "Contents" => content_id,
        });
        self.kids.push(page_id);
    }

    /// Build the page tree and write the document atomically to `output`.
    pub fn finish(mut self, output: &Path) -> Result<PathBuf> {
        let kids: Vec<Object> = self.kids.iter().map(|&id| id.into()).collect();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.kids.len() as i64,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.prune_objects();

        document::save_atomic(&mut self.doc, output)
    }
}

// ---------------------------------------------------------------------------
// merge
// ---------------------------------------------------------------------------

/// Merge the present entries of `parts`, in order, into `output`.
///
/// `None` entries are skipped. With `pad_to_even`, the running page count
/// is even after every appended source. An input with no present entries
/// produces a valid zero-page document.
#[instrument(skip_all, fields(output = %output.display(), parts = parts.len()))]
pub fn merge(parts: &[Option<PathBuf>], output: &Path, pad_to_even: bool) -> Result<PathBuf> {
    let mut writer = PacketWriter::new();

    for path in parts.iter().flatten() {
        writer.append(path)?;
        if pad_to_even && writer.page_count() % 2 == 1 {
            writer.add_blank_page();
            debug!(path = %path.display(), "padded section to even length");
        }
    }

    let pages = writer.page_count();
    let written = writer.finish(output)?;
    info!(pages, "merged packet");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::page_count;
    use crate::test_support::{page_texts, write_test_pdf};
    use proptest::prelude::*;

    fn fixtures(dir: &Path, sizes: &[u32]) -> Vec<PathBuf> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let path = dir.join(format!("part{i}.pdf"));
                write_test_pdf(&path, n, &format!("part{i}"));
                path
            })
            .collect()
    }

    #[test]
    fn odd_sections_are_padded_individually() {
        let dir = tempfile::tempdir().unwrap();
        let parts = fixtures(dir.path(), &[1, 3, 2]);
        let out = dir.path().join("packet.pdf");

        merge(&parts.into_iter().map(Some).collect::<Vec<_>>(), &out, true).unwrap();

        // 1 + pad, 3 + pad, 2
        assert_eq!(page_count(&out).unwrap(), 8);
        let texts = page_texts(&out);
        assert_eq!(texts[0], vec!["part0 1"]);
        assert!(texts[1].is_empty());
        assert_eq!(texts[2], vec!["part1 1"]);
        assert_eq!(texts[4], vec!["part1 3"]);
        assert!(texts[5].is_empty());
        assert_eq!(texts[6], vec!["part2 1"]);
    }

    #[test]
    fn without_padding_pages_are_concatenated() {
        let dir = tempfile::tempdir().unwrap();
        let parts = fixtures(dir.path(), &[1, 3]);
        let out = dir.path().join("packet.pdf");

        merge(&parts.into_iter().map(Some).collect::<Vec<_>>(), &out, false).unwrap();
        assert_eq!(page_count(&out).unwrap(), 4);
    }

    #[test]
    fn absent_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let parts = fixtures(dir.path(), &[3, 2]);
        let with_gaps = dir.path().join("gaps.pdf");
        let dense = dir.path().join("dense.pdf");

        merge(
            &[None, Some(parts[0].clone()), None, Some(parts[1].clone())],
            &with_gaps,
            true,
        )
        .unwrap();
        merge(&[Some(parts[0].clone()), Some(parts[1].clone())], &dense, true).unwrap();

        assert_eq!(page_texts(&with_gaps), page_texts(&dense));
        assert_eq!(page_count(&with_gaps).unwrap(), 6);
    }

    #[test]
    fn empty_input_yields_zero_page_document() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("empty.pdf");
        merge(&[None, None], &out, true).unwrap();
        assert!(out.exists());
        assert_eq!(page_count(&out).unwrap(), 0);
    }

    #[test]
    fn blank_page_matches_previous_page_size() {
        let dir = tempfile::tempdir().unwrap();
        let parts = fixtures(dir.path(), &[1]);
        let out = dir.path().join("packet.pdf");
        merge(&[Some(parts[0].clone())], &out, true).unwrap();

        let doc = document::load(&out).unwrap();
        let pages = doc.get_pages();
        let pad = pages[&2];
        assert_eq!(document::media_box(&doc, pad), [0.0, 0.0, 595.0, 842.0]);
    }

    #[test]
    fn missing_source_fails_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("packet.pdf");
        let err = merge(&[Some(dir.path().join("nope.pdf"))], &out, true).unwrap_err();
        assert!(err.to_string().contains("nope.pdf"));
        assert!(!out.exists());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn running_total_is_even_after_every_source(sizes in prop::collection::vec(1u32..5, 1..5)) {
            let dir = tempfile::tempdir().unwrap();
            let parts = fixtures(dir.path(), &sizes);

            let mut writer = PacketWriter::new();
            for path in &parts {
                writer.append(path).unwrap();
                if writer.page_count() % 2 == 1 {
                    writer.add_blank_page();
                }
                prop_assert_eq!(writer.page_count() % 2, 0);
            }

            let out = dir.path().join("packet.pdf");
            let expected: u32 = sizes.iter().map(|n| n + n % 2).sum();
            merge(&parts.into_iter().map(Some).collect::<Vec<_>>(), &out, true).unwrap();
            prop_assert_eq!(page_count(&out).unwrap(), expected);
        }
    }
}
