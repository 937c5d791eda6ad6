//! Overlay compositing
//!
//! Replays annotation records onto a copy of a base page raster. Strokes and
//! stamps are drawn with tiny-skia paths; text labels go through usvg so
//! they pick up system fonts.

use log::warn;
use resvg::tiny_skia::{
    FillRule, IntSize, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform,
};
use resvg::usvg;

use crate::annotations::{AnnotationKind, AnnotationRecord, MarkKind};
use crate::error::{Result, WorkspaceError};
use crate::pdf::{PageImage, Point};

/// Half-extent of a correct/incorrect stamp in surface pixels
const MARK_SIZE: f32 = 12.0;
const MARK_WIDTH: f32 = 3.0;
const INK_WIDTH: f32 = 2.5;
const TEXT_SIZE: f32 = 18.0;

const CORRECT_RGB: (u8, u8, u8) = (0x1B, 0x8A, 0x3A);
const INCORRECT_RGB: (u8, u8, u8) = (0xD0, 0x21, 0x2A);
const INK_RGB: (u8, u8, u8) = (0xC6, 0x28, 0x28);
const TEXT_RGB: (u8, u8, u8) = (0xC6, 0x28, 0x28);

/// Draws records over page rasters
pub struct Compositor {
    text_options: usvg::Options<'static>,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor {
    #[must_use]
    pub fn new() -> Self {
        let mut text_options = usvg::Options::default();
        text_options.fontdb_mut().load_system_fonts();
        Self { text_options }
    }

    /// Copy `base` and draw `records` over it in the order given.
    ///
    /// Callers pass records in ascending sequence order so z-order matches
    /// commit order.
    pub fn compose<'a>(
        &self,
        base: &PageImage,
        records: impl IntoIterator<Item = &'a AnnotationRecord>,
    ) -> Result<PageImage> {
        let size = IntSize::from_wh(base.width, base.height)
            .ok_or_else(|| WorkspaceError::render(base.page, "empty page raster"))?;
        let mut pixmap = Pixmap::from_vec(base.pixels.clone(), size)
            .ok_or_else(|| WorkspaceError::render(base.page, "page raster size mismatch"))?;

        for record in records {
            self.draw_record(&mut pixmap, record);
        }

        Ok(PageImage {
            page: base.page,
            width: pixmap.width(),
            height: pixmap.height(),
            pixels: pixmap.take(),
        })
    }

    fn draw_record(&self, pixmap: &mut Pixmap, record: &AnnotationRecord) {
        match &record.kind {
            AnnotationKind::Mark { value, anchor } => draw_mark(pixmap, *value, *anchor),
            AnnotationKind::Stroke { polyline } => draw_polyline(pixmap, polyline),
            AnnotationKind::Text { value, anchor } => self.draw_text(pixmap, value, *anchor),
        }
    }

    fn draw_text(&self, pixmap: &mut Pixmap, value: &str, anchor: Point) {
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}"><text x="{x}" y="{y}" font-family="sans-serif" font-size="{size}" fill="rgb({r},{g},{b})">{text}</text></svg>"#,
            w = pixmap.width(),
            h = pixmap.height(),
            x = anchor.x,
            y = anchor.y + TEXT_SIZE,
            size = TEXT_SIZE,
            r = TEXT_RGB.0,
            g = TEXT_RGB.1,
            b = TEXT_RGB.2,
            text = escape_xml(value),
        );

        match usvg::Tree::from_str(&svg, &self.text_options) {
            Ok(tree) => resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut()),
            Err(e) => warn!("Could not lay out text annotation: {e}"),
        }
    }
}

fn paint(rgb: (u8, u8, u8)) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(rgb.0, rgb.1, rgb.2, u8::MAX);
    paint.anti_alias = true;
    paint
}

fn round_stroke(width: f32) -> Stroke {
    Stroke {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Default::default()
    }
}

fn draw_mark(pixmap: &mut Pixmap, value: MarkKind, at: Point) {
    let mut pb = PathBuilder::new();
    let rgb = match value {
        MarkKind::Correct => {
            pb.move_to(at.x - MARK_SIZE * 0.7, at.y);
            pb.line_to(at.x - MARK_SIZE * 0.2, at.y + MARK_SIZE * 0.6);
            pb.line_to(at.x + MARK_SIZE, at.y - MARK_SIZE * 0.8);
            CORRECT_RGB
        }
        MarkKind::Incorrect => {
            pb.move_to(at.x - MARK_SIZE * 0.7, at.y - MARK_SIZE * 0.7);
            pb.line_to(at.x + MARK_SIZE * 0.7, at.y + MARK_SIZE * 0.7);
            pb.move_to(at.x + MARK_SIZE * 0.7, at.y - MARK_SIZE * 0.7);
            pb.line_to(at.x - MARK_SIZE * 0.7, at.y + MARK_SIZE * 0.7);
            INCORRECT_RGB
        }
    };

    if let Some(path) = pb.finish() {
        pixmap.stroke_path(
            &path,
            &paint(rgb),
            &round_stroke(MARK_WIDTH),
            Transform::identity(),
            None,
        );
    }
}

fn draw_polyline(pixmap: &mut Pixmap, points: &[Point]) {
    match points {
        [] => {}
        [dot] => {
            // A tap with the pen leaves a dot the width of the ink
            if let Some(path) = PathBuilder::from_circle(dot.x, dot.y, INK_WIDTH / 2.0) {
                pixmap.fill_path(
                    &path,
                    &paint(INK_RGB),
                    FillRule::Winding,
                    Transform::identity(),
                    None,
                );
            }
        }
        [first, rest @ ..] => {
            let mut pb = PathBuilder::new();
            pb.move_to(first.x, first.y);
            for p in rest {
                pb.line_to(p.x, p.y);
            }
            if let Some(path) = pb.finish() {
                pixmap.stroke_path(
                    &path,
                    &paint(INK_RGB),
                    &round_stroke(INK_WIDTH),
                    Transform::identity(),
                    None,
                );
            }
        }
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Pixel at `(x, y)` as RGBA, used by tests and diagnostics
#[must_use]
pub fn pixel_at(image: &PageImage, x: u32, y: u32) -> Option<[u8; 4]> {
    if x >= image.width || y >= image.height {
        return None;
    }
    let idx = ((y * image.width + x) * 4) as usize;
    image
        .pixels
        .get(idx..idx + 4)
        .map(|px| [px[0], px[1], px[2], px[3]])
}
