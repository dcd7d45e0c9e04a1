//! Fixture page documents for tests in this and dependent crates.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

/// Write an A4 document of `pages` pages, each showing `label` and its page number.
///
/// `MediaBox` and `Resources` live on the `Pages` node so that merging has
/// to carry inherited attributes over to each page.
pub fn write_test_pdf(path: &Path, pages: u32, label: &str) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for page in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("{label} {page}"))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode fixture content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save fixture pdf");
}

/// Raw content bytes of every page, in page order.
pub fn page_contents(path: &Path) -> Vec<Vec<u8>> {
    let doc = Document::load(path).expect("load pdf");
    doc.get_pages()
        .values()
        .map(|&page_id| doc.get_page_content(page_id).expect("page content"))
        .collect()
}

/// Text strings shown on each page, in page order.
pub fn page_texts(path: &Path) -> Vec<Vec<String>> {
    let doc = Document::load(path).expect("load pdf");
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let bytes = doc.get_page_content(page_id).expect("page content");
            let content = Content::decode(&bytes).expect("decode content");
            content
                .operations
                .iter()
                .filter(|op| op.operator == "Tj")
                .filter_map(|op| op.operands.first())
                .filter_map(|operand| operand.as_str().ok())
                .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                .collect()
        })
        .collect()
}
