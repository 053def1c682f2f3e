//! Assembly: fold ordered per-page results into one artifact.
//!
//! PDF mode grafts each single-page fragment's page into a fresh document.
//! Every fragment is renumbered into a disjoint object-id range, its page
//! object is re-parented under a new Pages node, and the rest of its objects
//! (fonts, image XObjects, content streams) are copied across. Page order
//! comes from the fragment list, never from object-id order, so a reordered
//! id space can't reorder pages.
//!
//! Text mode normalises each page and joins with one blank line.

use crate::error::OcrError;
use crate::output::{Artifact, OutputMode, PageResult, RecognizedPage};
use crate::pipeline::normalize;
use lopdf::{dictionary, Document, Object, ObjectId};
use tracing::debug;

/// Separator between pages in text mode.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Fold ordered page results into the job's single output artifact.
///
/// `results` must already be in page order; the dispatcher guarantees it.
pub fn assemble(results: Vec<PageResult>, mode: OutputMode) -> Result<Artifact, OcrError> {
    match mode {
        OutputMode::SearchablePdf => {
            let fragments = results
                .into_iter()
                .map(|r| match r.content {
                    RecognizedPage::SearchablePdf(bytes) => Ok(bytes),
                    RecognizedPage::Text(_) => Err(OcrError::Internal(format!(
                        "page {} produced text in searchable-pdf mode",
                        r.page_num
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Artifact::SearchablePdf(merge_fragments(&fragments)?))
        }
        OutputMode::Text => {
            let texts = results
                .into_iter()
                .map(|r| match r.content {
                    RecognizedPage::Text(t) => Ok(normalize::normalize_page_text(&t)),
                    RecognizedPage::SearchablePdf(_) => Err(OcrError::Internal(format!(
                        "page {} produced a PDF fragment in text mode",
                        r.page_num
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Artifact::Text(texts.join(PAGE_SEPARATOR)))
        }
    }
}

/// Merge ordered single-page PDF fragments into one document.
///
/// The merged output is re-verified by parsing it back and counting pages;
/// a disagreement with the fragment count is a bug somewhere upstream and
/// surfaces as [`OcrError::PageCountMismatch`] rather than a corrupt file.
pub fn merge_fragments(fragments: &[Vec<u8>]) -> Result<Vec<u8>, OcrError> {
    if fragments.is_empty() {
        return Err(OcrError::MergeFailed {
            detail: "no fragments to merge".to_string(),
        });
    }

    let mut merged = Document::with_version("1.5");
    let mut next_id = 1u32;
    // Page objects in fragment order. Ordering authority lives here.
    let mut page_objects: Vec<(ObjectId, Object)> = Vec::with_capacity(fragments.len());

    for (i, bytes) in fragments.iter().enumerate() {
        let mut doc = Document::load_mem(bytes).map_err(|e| OcrError::MergeFailed {
            detail: format!("fragment {} is not a valid PDF: {}", i + 1, e),
        })?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let pages = doc.get_pages();
        if pages.len() != 1 {
            return Err(OcrError::MergeFailed {
                detail: format!(
                    "fragment {} has {} pages, expected exactly 1",
                    i + 1,
                    pages.len()
                ),
            });
        }
        for page_id in pages.into_values() {
            let object = doc
                .get_object(page_id)
                .map_err(|e| OcrError::MergeFailed {
                    detail: format!("fragment {}: broken page object: {}", i + 1, e),
                })?
                .to_owned();
            page_objects.push((page_id, object));
        }

        for (object_id, object) in doc.objects {
            match object_type(&object) {
                // Structural nodes are rebuilt below; stale ones would
                // shadow the new page tree.
                Some(b"Catalog") | Some(b"Pages") | Some(b"Outlines") | Some(b"Page") => {}
                _ => {
                    merged.objects.insert(object_id, object);
                }
            }
        }
    }

    merged.max_id = next_id - 1;
    let pages_id = merged.new_object_id();

    for (page_id, object) in &page_objects {
        let mut dict = object
            .as_dict()
            .map_err(|e| OcrError::MergeFailed {
                detail: format!("page object is not a dictionary: {}", e),
            })?
            .clone();
        dict.set("Parent", Object::Reference(pages_id));
        merged.objects.insert(*page_id, Object::Dictionary(dict));
    }

    let kids: Vec<Object> = page_objects
        .iter()
        .map(|(id, _)| Object::Reference(*id))
        .collect();
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => page_objects.len() as i64,
            "Kids" => kids,
        }),
    );

    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    merged.trailer.set("Root", catalog_id);
    merged.max_id = merged.objects.len() as u32;
    merged.renumber_objects();
    merged.compress();

    let mut out = Vec::new();
    merged.save_to(&mut out).map_err(|e| OcrError::MergeFailed {
        detail: format!("failed to serialise merged document: {}", e),
    })?;

    let reparsed = Document::load_mem(&out).map_err(|e| OcrError::MergeFailed {
        detail: format!("merged document does not parse back: {}", e),
    })?;
    let actual = reparsed.get_pages().len();
    if actual != fragments.len() {
        return Err(OcrError::PageCountMismatch {
            expected: fragments.len(),
            actual,
        });
    }
    debug!("Merged {} fragments into {} bytes", fragments.len(), out.len());

    Ok(out)
}

fn object_type(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()
        .and_then(|d| d.get(b"Type").ok())
        .and_then(|t| t.as_name().ok())
}
