//! Contract PDF compositing
//!
//! Signature fields are stored as percentages of the page measured from the
//! top-left corner; PDF user space starts at the bottom-left. [`field_rect`]
//! converts between the two.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDateTime;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use thiserror::Error;
use tracing::{debug, warn};

use crate::dto::SIGNATURE_DATA_PREFIX;
use crate::models::{Contract, SignatureField, SignatureParty};

/// US Letter, used when a page has no readable MediaBox
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);
const STAMP_FONT_SIZE: f32 = 8.0;
const STAMP_FONT_NAME: &str = "F47Stamp";

/// Where the client signature goes on contracts without signed fields
pub const LEGACY_CLIENT_BOX: PercentBox = PercentBox { x: 10.0, y: 78.0, width: 30.0, height: 8.0 };
/// Where the countersignature goes when no admin field was signed
pub const LEGACY_ADMIN_BOX: PercentBox = PercentBox { x: 60.0, y: 78.0, width: 30.0, height: 8.0 };

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("PDF could not be processed: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("PDF has no pages")]
    NoPages,
    #[error("PDF could not be written: {0}")]
    Io(#[from] std::io::Error),
}

/// A box in page percentages, origin top-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A box in PDF points, origin bottom-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Converts a top-left percentage box to PDF points on a `page_width` × `page_height` page
pub fn field_rect(page_width: f32, page_height: f32, field: PercentBox) -> Rect {
    let w = page_width as f64;
    let h = page_height as f64;
    Rect {
        x: (field.x * w / 100.0) as f32,
        y: (h - (field.y + field.height) * h / 100.0) as f32,
        width: (field.width * w / 100.0) as f32,
        height: (field.height * h / 100.0) as f32,
    }
}

/// Decodes a `data:image/png;base64,` URL to the PNG bytes
pub fn decode_signature_image(data_url: &str) -> Option<Vec<u8>> {
    let payload = data_url.strip_prefix(SIGNATURE_DATA_PREFIX)?;
    STANDARD.decode(payload.trim()).ok()
}

/// Text printed under a signature
pub fn stamp_text(name: &str, signed_at: Option<NaiveDateTime>) -> String {
    match signed_at {
        Some(at) => format!("Signed by {} · {}", name, at.format("%Y-%m-%d")),
        None => format!("Signed by {}", name),
    }
}

/// One signature to draw
#[derive(Debug, Clone, PartialEq)]
struct Placement {
    page_index: usize,
    area: PercentBox,
    image: String,
    stamp: String,
}

fn field_placement(field: &SignatureField) -> Option<Placement> {
    let image = field.signature_data.clone()?;
    Some(Placement {
        page_index: field.page_index.max(0) as usize,
        area: PercentBox { x: field.x_pct, y: field.y_pct, width: field.width_pct, height: field.height_pct },
        image,
        stamp: stamp_text(field.signed_name.as_deref().unwrap_or_default(), field.signed_at),
    })
}

/// Works out every signature to draw for a contract
///
/// Signed fields are drawn where they sit. When no client field carries a
/// signature the legacy client signature goes in [`LEGACY_CLIENT_BOX`]; the
/// countersignature likewise falls back to [`LEGACY_ADMIN_BOX`]. Legacy
/// boxes go on the last page.
fn placements(contract: &Contract, fields: &[SignatureField], last_page: usize) -> Vec<Placement> {
    let mut result: Vec<Placement> = fields.iter().filter_map(field_placement).collect();
    let signed_party = |party: SignatureParty| fields.iter().any(|f| f.party == party && f.is_signed());

    if !signed_party(SignatureParty::Client) {
        if let Some(image) = contract.get_legacy_signature_data() {
            let name = contract
                .get_legacy_signed_name()
                .or_else(|| contract.get_signer_name())
                .unwrap_or_default();
            result.push(Placement {
                page_index: last_page,
                area: LEGACY_CLIENT_BOX,
                image,
                stamp: stamp_text(&name, contract.get_signed_at().map(|t| t.naive_utc())),
            });
        }
    }
    if !signed_party(SignatureParty::Admin) {
        if let Some(image) = contract.get_admin_signature_data() {
            let name = contract.get_admin_signed_name().unwrap_or_default();
            result.push(Placement {
                page_index: last_page,
                area: LEGACY_ADMIN_BOX,
                image,
                stamp: stamp_text(&name, contract.get_countersigned_at().map(|t| t.naive_utc())),
            });
        }
    }
    result
}

/// Produces the signed copy of a contract document
///
/// Page indices past the end of the document land on the last page. A
/// signature image that cannot be decoded is logged and left out; its stamp
/// is still printed.
pub fn composite_signatures(original: &[u8], contract: &Contract, fields: &[SignatureField]) -> Result<Vec<u8>, PdfError> {
    let mut doc = Document::load_mem(original)?;
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let last_page = pages.len().checked_sub(1).ok_or(PdfError::NoPages)?;

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    for page_id in &pages {
        pin_resources(&mut doc, *page_id)?;
    }

    let mut per_page: Vec<Vec<Operation>> = vec![Vec::new(); pages.len()];
    for (n, placement) in placements(contract, fields, last_page).into_iter().enumerate() {
        let page_index = placement.page_index.min(last_page);
        let page_id = pages[page_index];
        let (width, height) = page_size(&doc, page_id);
        let rect = field_rect(width, height, placement.area);
        let ops = &mut per_page[page_index];

        match decode_signature_image(&placement.image).map(lopdf::xobject::image_from) {
            Some(Ok(image)) => {
                let name = format!("Sig{}", n);
                let image_id = doc.add_object(image);
                doc.add_xobject(page_id, name.as_bytes(), image_id)?;
                ops.extend([
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            Object::Real(rect.width),
                            0.into(),
                            0.into(),
                            Object::Real(rect.height),
                            Object::Real(rect.x),
                            Object::Real(rect.y),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(name.into_bytes())]),
                    Operation::new("Q", vec![]),
                ]);
            }
            Some(Err(e)) => warn!("Skipping undecodable signature on page {}: {}", page_index, e),
            None => warn!("Skipping signature on page {}: not a PNG data URL", page_index),
        }

        ops.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(STAMP_FONT_NAME.into()), Object::Real(STAMP_FONT_SIZE)]),
            Operation::new("Td", vec![Object::Real(rect.x), Object::Real((rect.y - STAMP_FONT_SIZE - 2.0).max(0.0))]),
            Operation::new("Tj", vec![Object::String(win_ansi(&placement.stamp), StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ]);
    }

    for (page_id, operations) in pages.iter().zip(per_page) {
        if operations.is_empty() {
            continue;
        }
        add_font(&mut doc, *page_id, font_id)?;
        let mut wrapped = vec![Operation::new("Q", vec![])];
        wrapped.extend(operations);
        append_content(&mut doc, *page_id, Content { operations: wrapped }.encode()?)?;
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)?;
    debug!("Composited contract {} ({} bytes)", contract.get_id(), output.len());
    Ok(output)
}

/// Reads the page's MediaBox, following inherited values up the page tree
fn page_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        if let Ok(Object::Array(media_box)) = dict.get(b"MediaBox").and_then(|o| doc.dereference(o)).map(|(_, o)| o) {
            let numbers: Vec<f32> = media_box.iter().filter_map(number).collect();
            if let &[x0, y0, x1, y1] = numbers.as_slice() {
                return ((x1 - x0).abs(), (y1 - y0).abs());
            }
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    DEFAULT_PAGE_SIZE
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Encodes text for the WinAnsi stamp font; characters outside Latin-1 become `?`
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}

/// Copies inherited Resources onto the page so they survive being extended
fn pin_resources(doc: &mut Document, page_id: ObjectId) -> Result<(), PdfError> {
    if doc.get_dictionary(page_id)?.has(b"Resources") {
        return Ok(());
    }
    let mut inherited = None;
    let mut parent = doc.get_dictionary(page_id)?.get(b"Parent").and_then(Object::as_reference).ok();
    while let Some(id) = parent {
        let node = doc.get_dictionary(id)?;
        if let Ok(resources) = node.get(b"Resources") {
            inherited = Some(resources.clone());
            break;
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    if let Some(resources) = inherited {
        doc.get_object_mut(page_id)?.as_dict_mut()?.set("Resources", resources);
    }
    Ok(())
}

fn add_font(doc: &mut Document, page_id: ObjectId, font_id: ObjectId) -> Result<(), PdfError> {
    let resources = doc.get_or_create_resources(page_id)?.as_dict_mut()?;
    let shared_fonts = match resources.get(b"Font") {
        Ok(Object::Reference(id)) => Some(*id),
        Ok(Object::Dictionary(_)) => None,
        _ => {
            resources.set("Font", dictionary! {});
            None
        }
    };
    let fonts = match shared_fonts {
        Some(id) => doc.get_object_mut(id)?.as_dict_mut()?,
        None => doc.get_or_create_resources(page_id)?.as_dict_mut()?.get_mut(b"Font")?.as_dict_mut()?,
    };
    fonts.set(STAMP_FONT_NAME, Object::Reference(font_id));
    Ok(())
}

/// Appends a content stream to a page, isolating the page's own graphics state
///
/// The existing contents are wrapped in `q`; the new stream must start with `Q`.
fn append_content(doc: &mut Document, page_id: ObjectId, bytes: Vec<u8>) -> Result<(), PdfError> {
    let save_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let stream_id = doc.add_object(Stream::new(dictionary! {}, bytes));
    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    let mut contents = vec![Object::Reference(save_id)];
    match page.get(b"Contents") {
        Ok(Object::Reference(id)) => contents.push(Object::Reference(*id)),
        Ok(Object::Array(existing)) => contents.extend(existing.iter().cloned()),
        _ => {}
    }
    contents.push(Object::Reference(stream_id));
    page.set("Contents", Object::Array(contents));
    Ok(())
}
