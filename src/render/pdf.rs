use std::io::BufWriter;

use printpdf::{
    BuiltinFont, Color, Greyscale, IndirectFontRef, Line, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point,
};

use super::RenderError;
use super::fonts::FontStyle;
use super::layout::{DrawOp, Layout, PAGE_HEIGHT, PAGE_WIDTH};

const PT_TO_MM: f32 = 0.352_778;
const LAYER: &str = "Layer 1";

struct Faces {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
    bold_italic: IndirectFontRef,
}

impl Faces {
    fn load(doc: &PdfDocumentReference) -> Result<Self, RenderError> {
        let builtin = |font| {
            doc.add_builtin_font(font)
                .map_err(|e| RenderError::Font(e.to_string()))
        };
        Ok(Self {
            regular: builtin(BuiltinFont::TimesRoman)?,
            bold: builtin(BuiltinFont::TimesBold)?,
            italic: builtin(BuiltinFont::TimesItalic)?,
            bold_italic: builtin(BuiltinFont::TimesBoldItalic)?,
        })
    }

    fn get(&self, style: FontStyle) -> &IndirectFontRef {
        match style {
            FontStyle::Regular => &self.regular,
            FontStyle::Bold => &self.bold,
            FontStyle::Italic => &self.italic,
            FontStyle::BoldItalic => &self.bold_italic,
        }
    }
}

fn mm(points: f32) -> Mm {
    Mm(points * PT_TO_MM)
}

/// Paints laid-out pages with the Times built-in fonts.
pub fn paint(layout: &Layout) -> Result<Vec<u8>, RenderError> {
    let (doc, first_page, first_layer) = PdfDocument::new(
        &layout.title,
        mm(PAGE_WIDTH),
        mm(PAGE_HEIGHT),
        LAYER,
    );
    let faces = Faces::load(&doc)?;

    for (i, page) in layout.pages.iter().enumerate() {
        let (page_index, layer_index) = if i == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(mm(PAGE_WIDTH), mm(PAGE_HEIGHT), LAYER)
        };
        let layer = doc.get_page(page_index).get_layer(layer_index);
        for op in &page.ops {
            draw(&layer, &faces, op);
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    buf.into_inner()
        .map_err(|e| RenderError::Encode(e.to_string()))
}

fn draw(layer: &PdfLayerReference, faces: &Faces, op: &DrawOp) {
    match op {
        DrawOp::Text {
            x,
            y,
            size,
            font,
            text,
        } => {
            layer.use_text(text.as_str(), *size, mm(*x), mm(PAGE_HEIGHT - y), faces.get(*font));
        }
        DrawOp::Rule {
            x1,
            x2,
            y,
            thickness,
            gray,
        } => {
            let y = mm(PAGE_HEIGHT - y);
            layer.set_outline_color(Color::Greyscale(Greyscale::new(*gray, None)));
            layer.set_outline_thickness(*thickness);
            layer.add_line(Line {
                points: vec![(Point::new(mm(*x1), y), false), (Point::new(mm(*x2), y), false)],
                is_closed: false,
            });
        }
    }
}
