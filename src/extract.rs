use lopdf::{Document, Object, ObjectId};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::pages::PageInterval;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("page selection matched none of the document's {total} pages")]
    NoPagesSelected { total: usize },
    #[error("failed to load PDF {path}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("failed to rewrite PDF page tree: {0}")]
    Pdf(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Builds a new document containing the pages selected by `intervals`,
/// concatenated in interval order.
///
/// Intervals reaching past the last page are clipped; intervals that start
/// beyond it contribute nothing. Repeated or overlapping intervals emit the
/// same page again, matching what the user wrote. Selecting zero pages in
/// total is the only failure mode besides a malformed page tree.
pub fn select_pages(
    doc: &Document,
    intervals: &[PageInterval],
) -> Result<Document, ExtractError> {
    let ordered: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    let total = ordered.len();

    let mut selected = Vec::new();
    for interval in intervals {
        if interval.start >= total {
            debug!(
                "Interval [{}, {}) is beyond the last page, skipping",
                interval.start, interval.end
            );
            continue;
        }
        let end = interval.end.min(total);
        selected.extend_from_slice(&ordered[interval.start..end]);
    }

    if selected.is_empty() {
        return Err(ExtractError::NoPagesSelected { total });
    }

    debug!("Selected {} of {} pages", selected.len(), total);

    let mut out = doc.clone();
    let pages_id = pages_root_id(&out)?;
    let pages_dict = out
        .get_object_mut(pages_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    pages_dict.set(
        "Kids",
        Object::Array(selected.iter().copied().map(Object::Reference).collect()),
    );
    pages_dict.set("Count", Object::Integer(selected.len() as i64));

    Ok(out)
}

fn pages_root_id(doc: &Document) -> Result<ObjectId, ExtractError> {
    let catalog = doc.catalog().map_err(|e| ExtractError::Pdf(e.to_string()))?;
    match catalog.get(b"Pages") {
        Ok(Object::Reference(id)) => Ok(*id),
        Ok(_) => Err(ExtractError::Pdf(
            "catalog Pages entry is not a reference".to_string(),
        )),
        Err(e) => Err(ExtractError::Pdf(e.to_string())),
    }
}

/// Reads `src`, keeps only the pages selected by `intervals`, and writes the
/// result to `dst`.
pub async fn extract_to_file(
    src: &Path,
    dst: &Path,
    intervals: &[PageInterval],
) -> Result<(), ExtractError> {
    let data = fs::read(src).await?;
    let doc = Document::load_mem(&data).map_err(|e| ExtractError::Load {
        path: src.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut out = select_pages(&doc, intervals)?;

    let mut buf = Vec::new();
    out.save_to(&mut buf)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    fs::write(dst, buf).await?;

    info!(
        "Wrote {} selected pages to {}",
        out.get_pages().len(),
        dst.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::PageInterval;
    use lopdf::{dictionary, Stream};

    fn iv(start: usize, end: usize) -> PageInterval {
        PageInterval { start, end }
    }

    /// Minimal document with `count` empty pages.
    fn sample_doc(count: usize) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::new();
        for _ in 0..count {
            let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id);
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids.iter().copied().map(Object::Reference).collect::<Vec<_>>(),
                "Count" => count as i64,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn page_ids(doc: &Document) -> Vec<ObjectId> {
        doc.get_pages().values().copied().collect()
    }

    #[test]
    fn extraction_preserves_interval_order() {
        let doc = sample_doc(5);
        let original = page_ids(&doc);

        let out = select_pages(&doc, &[iv(2, 3), iv(0, 1)]).unwrap();
        assert_eq!(page_ids(&out), vec![original[2], original[0]]);
    }

    #[test]
    fn overlapping_intervals_duplicate_pages() {
        let doc = sample_doc(3);
        let original = page_ids(&doc);

        let out = select_pages(&doc, &[iv(0, 2), iv(1, 3)]).unwrap();
        assert_eq!(
            page_ids(&out),
            vec![original[0], original[1], original[1], original[2]]
        );
    }

    #[test]
    fn intervals_are_clipped_to_page_count() {
        let doc = sample_doc(5);
        let original = page_ids(&doc);

        let out = select_pages(&doc, &[iv(3, 10)]).unwrap();
        assert_eq!(page_ids(&out), vec![original[3], original[4]]);
    }

    #[test]
    fn out_of_range_interval_contributes_nothing() {
        let doc = sample_doc(5);
        let original = page_ids(&doc);

        let out = select_pages(&doc, &[iv(10, 12), iv(1, 2)]).unwrap();
        assert_eq!(page_ids(&out), vec![original[1]]);
    }

    #[test]
    fn empty_selection_is_an_error() {
        let doc = sample_doc(5);
        let err = select_pages(&doc, &[iv(10, 12)]).unwrap_err();
        assert!(matches!(err, ExtractError::NoPagesSelected { total: 5 }));
    }

    #[test]
    fn page_count_is_rewritten() {
        let doc = sample_doc(4);
        let out = select_pages(&doc, &[iv(0, 2), iv(0, 2)]).unwrap();

        let pages_id = pages_root_id(&out).unwrap();
        let pages = out.get_object(pages_id).unwrap().as_dict().unwrap();
        assert_eq!(pages.get(b"Count").unwrap().as_i64().unwrap(), 4);
    }

    #[test]
    fn selection_survives_a_save_and_reload() {
        let doc = sample_doc(5);
        let mut out = select_pages(&doc, &[iv(1, 3)]).unwrap();

        let mut buf = Vec::new();
        out.save_to(&mut buf).unwrap();
        let reloaded = Document::load_mem(&buf).unwrap();
        assert_eq!(reloaded.get_pages().len(), 2);
    }
}
