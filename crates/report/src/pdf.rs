//! PDF rendering with lopdf

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use paperlens_common::models::ReportData;
use tracing::{debug, instrument};

use crate::layout::{encode_latin1, Font, Page, PageWriter, PAGE_HEIGHT, PAGE_WIDTH};
use crate::{ExportError, ExportOptions};

const PDF_VERSION: &str = "1.5";
const REGULAR_FONT: &str = "F1";
const BOLD_FONT: &str = "F2";

/// Section order is fixed; references follow as an appendix
fn sections(report: &ReportData) -> [(&'static str, &str); 4] {
    [
        ("Background", report.background.as_str()),
        ("Methods", report.methods.as_str()),
        ("Results", report.results.as_str()),
        ("Discussion", report.discussion.as_str()),
    ]
}

/// Lay out the report and return the encoded PDF
#[instrument(skip(report, options), fields(title = %options.title))]
pub fn render_report_pdf(report: &ReportData, options: &ExportOptions) -> Result<Vec<u8>, ExportError> {
    let pages = layout_report(report, options);
    let bytes = write_document(&pages)?;
    debug!(pages = pages.len(), bytes = bytes.len(), "Report rendered");
    Ok(bytes)
}

fn layout_report(report: &ReportData, options: &ExportOptions) -> Vec<Page> {
    let mut writer = PageWriter::new();

    writer.title(&options.title);
    if let Some(subtitle) = &options.subtitle {
        writer.subtitle(subtitle);
    }
    writer.subtitle(&format!(
        "Generated {}",
        options.generated_at.format("%Y-%m-%d %H:%M UTC")
    ));
    writer.space(12.0);

    for (heading, body) in sections(report) {
        writer.heading(heading);
        writer.body(body);
    }

    if !report.references.is_empty() {
        writer.heading("References");
        for (i, reference) in report.references.iter().enumerate() {
            writer.reference(i + 1, reference);
        }
    }

    writer.finish()
}

fn font(doc: &mut Document, base: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    })
}

fn page_content(page: &Page) -> Content {
    let mut operations = Vec::with_capacity(page.len() * 5);
    for line in page {
        let font = match line.font {
            Font::Regular => REGULAR_FONT,
            Font::Bold => BOLD_FONT,
        };
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![font.into(), Object::Integer(line.size.round() as i64)],
        ));
        operations.push(Operation::new(
            "Td",
            vec![
                Object::Integer(line.x.round() as i64),
                Object::Integer(line.y.round() as i64),
            ],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(encode_latin1(&line.text))],
        ));
        operations.push(Operation::new("ET", vec![]));
    }
    Content { operations }
}

fn write_document(pages: &[Page]) -> Result<Vec<u8>, ExportError> {
    let mut doc = Document::with_version(PDF_VERSION);
    let pages_id = doc.new_object_id();

    let regular = font(&mut doc, "Helvetica");
    let bold = font(&mut doc, "Helvetica-Bold");
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR_FONT => regular,
            BOLD_FONT => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let encoded = page_content(page)
            .encode()
            .map_err(|e| ExportError::Content(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Integer(PAGE_WIDTH as i64),
                Object::Integer(PAGE_HEIGHT as i64),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ExportError::Write(e.to_string()))?;
    Ok(bytes)
}
