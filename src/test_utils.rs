//! Fixtures for tests: small in-memory PDFs and question schemas

use std::fmt::Write;

use crate::fetch::QuestionSchema;

/// Page size of generated documents, in PDF points
pub const PAGE_WIDTH: u32 = 200;
pub const PAGE_HEIGHT: u32 = 300;

/// Build a valid PDF with `pages` blank pages.
///
/// Each page carries one filled black square whose position depends on the
/// page number, so rasters of different pages differ.
pub fn sample_pdf(pages: usize) -> Vec<u8> {
    // 1: catalog, 2: page tree, then (page, contents) pairs
    let object_count = 2 + pages * 2;
    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(object_count);

    offsets.push(out.len());
    out.push_str("1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");

    let kids = (0..pages)
        .map(|i| format!("{} 0 R", 3 + i * 2))
        .collect::<Vec<_>>()
        .join(" ");
    offsets.push(out.len());
    let _ = write!(
        out,
        "2 0 obj\n<< /Type /Pages /Kids [{kids}] /Count {pages} >>\nendobj\n"
    );

    for i in 0..pages {
        let page_obj = 3 + i * 2;
        let content_obj = page_obj + 1;
        let square = format!("0 0 0 rg\n{} {} 40 40 re f\n", 20 + (i % 4) * 40, 200);

        offsets.push(out.len());
        let _ = write!(
            out,
            "{page_obj} 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] /Contents {content_obj} 0 R /Resources << >> >>\nendobj\n"
        );

        offsets.push(out.len());
        let _ = write!(
            out,
            "{content_obj} 0 obj\n<< /Length {} >>\nstream\n{square}endstream\nendobj\n",
            square.len()
        );
    }

    let xref_offset = out.len();
    let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", object_count + 1);
    for offset in &offsets {
        let _ = write!(out, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        object_count + 1
    );

    out.into_bytes()
}

/// Three ten-mark questions, two on page 1 and one on page 2
pub fn sample_questions() -> Vec<QuestionSchema> {
    vec![
        QuestionSchema {
            id: "Q1".to_string(),
            max_marks: 10.0,
            page: Some(1),
        },
        QuestionSchema {
            id: "Q2".to_string(),
            max_marks: 10.0,
            page: Some(1),
        },
        QuestionSchema {
            id: "Q3".to_string(),
            max_marks: 10.0,
            page: Some(2),
        },
    ]
}
