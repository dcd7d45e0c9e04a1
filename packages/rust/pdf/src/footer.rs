//! Running footer stamper.
//!
//! Overlays a centered "page i of n" style label near the bottom of every
//! page not listed in the skip set. Skipped pages keep their dictionaries and
//! content streams exactly as they were.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::{debug, info, instrument};

use packetmaker_shared::{PacketError, Result};

use crate::document::{self, resolve};
use crate::metrics::{encode_win_ansi, text_width};

/// Resource name of the footer font on stamped pages.
const FONT_RESOURCE: &str = "PmFooter";

/// Placement of the footer label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FooterStyle {
    /// Font size in points.
    pub font_size: f32,
    /// Baseline distance from the bottom edge, in points.
    pub bottom_margin: f32,
}

impl Default for FooterStyle {
    fn default() -> Self {
        Self {
            font_size: 8.0,
            bottom_margin: 20.0,
        }
    }
}

/// Substitute `{i}` and `{n}` in a footer template.
pub fn render_footer(template: &str, page: u32, total: u32) -> String {
    template
        .replace("{i}", &page.to_string())
        .replace("{n}", &total.to_string())
}

/// Stamp the footer on every page of `input` not in `skip_pages` (1-based).
///
/// The whole document is read before anything is written, so `output` may be
/// the same path as `input`.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn stamp_footer(
    input: &Path,
    output: &Path,
    template: &str,
    skip_pages: &BTreeSet<u32>,
    style: &FooterStyle,
) -> Result<PathBuf> {
    let mut doc = document::load(input)?;
    let pages = doc.get_pages();
    let total = pages.len() as u32;

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut stamped = 0u32;
    for (&number, &page_id) in &pages {
        if skip_pages.contains(&number) {
            continue;
        }
        let label = render_footer(template, number, total);
        stamp_page(&mut doc, page_id, font_id, &label, style)
            .map_err(|e| PacketError::pdf(input, format!("page {number}: {e}")))?;
        stamped += 1;
    }

    let written = document::save_atomic(&mut doc, output)?;
    info!(pages = total, stamped, "stamped footer");
    Ok(written)
}

fn stamp_page(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
    label: &str,
    style: &FooterStyle,
) -> std::result::Result<(), lopdf::Error> {
    let [x0, y0, x1, _] = document::media_box(doc, page_id);
    let width = text_width(label, style.font_size);
    let x = x0 + (x1 - x0 - width) / 2.0;
    let y = y0 + style.bottom_margin;

    let resources = resources_with_font(doc, page_id, font_id);
    let mut contents = existing_contents(doc, page_id);

    // Isolate the original content's graphics state from the label.
    let save_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let label_ops = Content {
        operations: vec![
            Operation::new("Q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(FONT_RESOURCE.as_bytes().to_vec()),
                    Object::Real(style.font_size.into()),
                ],
            ),
            Operation::new("Td", vec![Object::Real(x.into()), Object::Real(y.into())]),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(label), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    let mut label_bytes = b"\n".to_vec();
    label_bytes.extend(label_ops.encode()?);
    let label_id = doc.add_object(Stream::new(dictionary! {}, label_bytes));

    contents.insert(0, save_id.into());
    contents.push(label_id.into());

    let page = doc.get_dictionary_mut(page_id)?;
    page.set("Resources", resources);
    page.set("Contents", contents);
    debug!(?page_id, label, x, y, "stamped page");
    Ok(())
}

/// Copy of the page's effective resources with the footer font added.
fn resources_with_font(doc: &Document, page_id: ObjectId, font_id: ObjectId) -> Dictionary {
    let mut resources = document::inherited_attribute(doc, page_id, b"Resources")
        .and_then(|r| resolve(doc, &r).and_then(|o| o.as_dict().ok()).cloned())
        .unwrap_or_default();

    let mut fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|f| resolve(doc, f))
        .and_then(|f| f.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    fonts.set(FONT_RESOURCE, font_id);
    resources.set("Font", fonts);
    resources
}

/// Content stream references of a page, flattened to a list.
fn existing_contents(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Ok(contents) = doc.get_dictionary(page_id).and_then(|p| p.get(b"Contents")) else {
        return Vec::new();
    };
    match contents {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Object::Array(items) => items.clone(),
        _ => Vec::new(),
    }
}
