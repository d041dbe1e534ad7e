//! Prescription PDF rendering.
//!
//! Every page carries the same fixed chrome: a letterhead band under the top
//! margin, a rule below it, and a footer band with its own rule. Page one
//! additionally shows the patient block (place + date line, name and age
//! line, closing rule). The free-text body flows under that as bulleted
//! paragraphs and breaks onto new pages automatically.
//!
//! A missing or unreadable letterhead image never fails a render: the band
//! is replaced by an outlined rectangle with a diagnostic caption.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use printpdf::*;
use thiserror::Error;

use crate::config;
use crate::models::{Patient, Prescription};

// ─── Layout constants (millimetres, A4 portrait) ─────────────────────────────

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 15.0;
const MARGIN_RIGHT: f32 = 15.0;
const MARGIN_TOP: f32 = 12.0;
const MARGIN_BOTTOM: f32 = 12.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;

const HEADER_HEIGHT: f32 = 30.0;
const FOOTER_HEIGHT: f32 = 20.0;
const RULE_GAP: f32 = 3.0;

/// Patient block line drops below the header rule.
const DATE_LINE_DROP: f32 = 8.0;
const NAME_LINE_DROP: f32 = 7.0;
const INFO_RULE_DROP: f32 = 6.0;
const AFTER_INFO_GAP: f32 = 6.0;

const BODY_FONT_SIZE: f32 = 11.0;
const MM_PER_PT: f32 = 25.4 / 72.0;
/// 14 pt leading.
const LINE_HEIGHT: f32 = 14.0 * MM_PER_PT;
/// Blank body lines become a 4 pt spacer, not a bullet.
const EMPTY_LINE_GAP: f32 = 4.0 * MM_PER_PT;
const SUB_ITEM_INDENT: f32 = 6.0;

/// Average Helvetica glyph width as a fraction of the font size; good enough
/// for centering, right-alignment and character-count word wrap.
const AVG_GLYPH_EM: f32 = 0.5;

const IMAGE_DPI: f32 = 300.0;

// ─── Types ────────────────────────────────────────────────────────────────────

/// Letterhead configuration for rendered documents.
#[derive(Debug, Clone)]
pub struct PageAssets {
    /// City shown next to the date on page one.
    pub place: String,
    pub header_image: PathBuf,
    pub footer_image: PathBuf,
}

impl PageAssets {
    /// Assets at their standard locations under the app data directory.
    pub fn from_app_dir() -> Self {
        Self {
            place: config::PRACTICE_PLACE.into(),
            header_image: config::header_image_path(),
            footer_image: config::footer_image_path(),
        }
    }
}

/// A finished render: the PDF bytes plus what the response layer needs to
/// serve them as a download.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
}

/// One element of the formatted body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyLine {
    /// Regular line, rendered with a bullet prefix.
    Bullet(String),
    /// Line that started with `"- "`: rendered indented, no added bullet.
    SubItem(String),
    /// Blank line, rendered as a small vertical gap.
    Gap,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("PDF generation failed: {0}")]
    Pdf(String),

    #[error("PDF buffer error: {0}")]
    Buffer(String),

    #[error("Could not write exported file: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Body formatting ──────────────────────────────────────────────────────────

/// Split the free-text body into renderable elements. An effectively empty
/// body yields a single fallback bullet so the document is never blank.
pub fn format_body(text: &str) -> Vec<BodyLine> {
    if text.trim().is_empty() {
        return vec![BodyLine::Bullet("No description provided".into())];
    }

    text.split('\n')
        .map(|raw| {
            let line = raw.trim();
            if line.is_empty() {
                BodyLine::Gap
            } else if let Some(rest) = line.strip_prefix("- ") {
                BodyLine::SubItem(rest.trim().to_string())
            } else {
                BodyLine::Bullet(line.to_string())
            }
        })
        .collect()
}

/// Simple word-wrap helper for PDF text rendering.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn approx_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * AVG_GLYPH_EM * MM_PER_PT
}

fn wrap_chars(width_mm: f32) -> usize {
    (width_mm / (BODY_FONT_SIZE * AVG_GLYPH_EM * MM_PER_PT)) as usize
}

// ─── Page chrome ──────────────────────────────────────────────────────────────

fn rule_color() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None))
}

fn draw_rule(layer: &PdfLayerReference, y: f32) {
    layer.set_outline_color(rule_color());
    layer.set_outline_thickness(1.0);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(MARGIN_LEFT), Mm(y)), false),
            (Point::new(Mm(PAGE_WIDTH - MARGIN_RIGHT), Mm(y)), false),
        ],
        is_closed: false,
    });
}

fn load_band_image(path: &Path) -> Result<Image, String> {
    if !path.exists() {
        return Err("file not found".into());
    }
    let dynamic = image_crate::open(path).map_err(|e| e.to_string())?;
    Ok(Image::from_dynamic_image(&dynamic))
}

/// Draw one letterhead band: the image fitted into the band box, or an
/// outlined rectangle with a diagnostic caption when it cannot be loaded.
fn draw_band(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    image_path: &Path,
    bottom: f32,
    height: f32,
    label: &str,
) {
    match load_band_image(image_path) {
        Ok(image) => {
            let native_w = image.image.width.0 as f32 * 25.4 / IMAGE_DPI;
            let native_h = image.image.height.0 as f32 * 25.4 / IMAGE_DPI;
            let scale = (CONTENT_WIDTH / native_w).min(height / native_h);
            image.add_to_layer(
                layer.clone(),
                ImageTransform {
                    translate_x: Some(Mm(MARGIN_LEFT)),
                    translate_y: Some(Mm(bottom)),
                    scale_x: Some(scale),
                    scale_y: Some(scale),
                    dpi: Some(IMAGE_DPI),
                    ..Default::default()
                },
            );
        }
        Err(reason) => {
            tracing::warn!(
                label,
                %reason,
                path = %image_path.display(),
                "letterhead image unavailable, drawing fallback"
            );
            layer.set_outline_color(rule_color());
            layer.set_outline_thickness(1.0);
            layer.add_line(Line {
                points: vec![
                    (Point::new(Mm(MARGIN_LEFT), Mm(bottom)), false),
                    (Point::new(Mm(PAGE_WIDTH - MARGIN_RIGHT), Mm(bottom)), false),
                    (
                        Point::new(Mm(PAGE_WIDTH - MARGIN_RIGHT), Mm(bottom + height)),
                        false,
                    ),
                    (Point::new(Mm(MARGIN_LEFT), Mm(bottom + height)), false),
                ],
                is_closed: true,
            });
            layer.use_text(
                format!("Missing {label} image: {reason}"),
                9.0,
                Mm(MARGIN_LEFT + 4.0),
                Mm(bottom + 4.0),
                font,
            );
        }
    }
}

fn draw_patient_block(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    patient: &Patient,
    today: NaiveDate,
    place: &str,
    rule_y: f32,
) {
    let date_line = format!("{place}, {}", today.format("%d/%m/%Y"));
    let date_y = rule_y - DATE_LINE_DROP;
    let date_x = MARGIN_LEFT + (CONTENT_WIDTH - approx_text_width(&date_line, BODY_FONT_SIZE)) / 2.0;
    layer.use_text(date_line, BODY_FONT_SIZE, Mm(date_x), Mm(date_y), font);

    let name_y = date_y - NAME_LINE_DROP;
    layer.use_text(
        format!("Name: {}", patient.full_name()),
        BODY_FONT_SIZE,
        Mm(MARGIN_LEFT),
        Mm(name_y),
        font,
    );
    if let Some(age) = patient.age_on(today) {
        let age_text = format!("Age: {age} years");
        let age_x = PAGE_WIDTH - MARGIN_RIGHT - approx_text_width(&age_text, BODY_FONT_SIZE);
        layer.use_text(age_text, BODY_FONT_SIZE, Mm(age_x), Mm(name_y), font);
    }

    draw_rule(layer, name_y - INFO_RULE_DROP);
}

/// Draw the fixed elements of one page. The patient block only exists on
/// page one; later pages keep the full chrome without it.
fn draw_page_chrome(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    assets: &PageAssets,
    patient: &Patient,
    today: NaiveDate,
    first_page: bool,
) {
    let header_bottom = PAGE_HEIGHT - MARGIN_TOP - HEADER_HEIGHT;
    draw_band(layer, font, &assets.header_image, header_bottom, HEADER_HEIGHT, "header");

    let rule_y = header_bottom - RULE_GAP;
    draw_rule(layer, rule_y);

    if first_page {
        draw_patient_block(layer, font, patient, today, &assets.place, rule_y);
    }

    draw_band(layer, font, &assets.footer_image, MARGIN_BOTTOM, FOOTER_HEIGHT, "footer");
    draw_rule(layer, MARGIN_BOTTOM + FOOTER_HEIGHT + RULE_GAP);
}

/// First body baseline of a page. Page one reserves the patient block on top
/// of the header chrome so body text can never overlap it.
fn body_top(first_page: bool) -> f32 {
    let rule_y = PAGE_HEIGHT - MARGIN_TOP - HEADER_HEIGHT - RULE_GAP;
    if first_page {
        rule_y - DATE_LINE_DROP - NAME_LINE_DROP - INFO_RULE_DROP - AFTER_INFO_GAP
    } else {
        rule_y - LINE_HEIGHT
    }
}

/// Lowest allowed baseline before the footer reserve starts.
fn body_bottom_limit() -> f32 {
    MARGIN_BOTTOM + FOOTER_HEIGHT + RULE_GAP + 2.0
}

// ─── Body layout cursor ───────────────────────────────────────────────────────

struct BodyCursor<'a> {
    doc: &'a PdfDocumentReference,
    font: &'a IndirectFontRef,
    assets: &'a PageAssets,
    patient: &'a Patient,
    today: NaiveDate,
    layer: PdfLayerReference,
    y: f32,
    pages: usize,
}

impl BodyCursor<'_> {
    fn break_page_if_needed(&mut self) {
        if self.y >= body_bottom_limit() {
            return;
        }
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Page {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        draw_page_chrome(&self.layer, self.font, self.assets, self.patient, self.today, false);
        self.y = body_top(false);
    }

    fn write_line(&mut self, text: &str, indent: f32) {
        self.break_page_if_needed();
        self.layer.use_text(
            text,
            BODY_FONT_SIZE,
            Mm(MARGIN_LEFT + indent),
            Mm(self.y),
            self.font,
        );
        self.y -= LINE_HEIGHT;
    }

    fn gap(&mut self) {
        self.y -= EMPTY_LINE_GAP;
    }
}

// ─── Rendering ────────────────────────────────────────────────────────────────

/// Render a prescription to PDF bytes. `today` is the date printed on the
/// patient block (callers pass the current date).
pub fn render_prescription(
    prescription: &Prescription,
    patient: &Patient,
    assets: &PageAssets,
    today: NaiveDate,
) -> Result<RenderedDocument, RenderError> {
    let title = format!("Prescription {} — {}", prescription.numero, patient.full_name());
    let (doc, page1, layer1) = PdfDocument::new(&title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Page 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| RenderError::Pdf(format!("font registration: {e}")))?;

    let layer = doc.get_page(page1).get_layer(layer1);
    draw_page_chrome(&layer, &font, assets, patient, today, true);

    let mut cursor = BodyCursor {
        doc: &doc,
        font: &font,
        assets,
        patient,
        today,
        layer,
        y: body_top(true),
        pages: 1,
    };

    for element in format_body(&prescription.body) {
        match element {
            BodyLine::Bullet(text) => {
                for segment in wrap_text(&format!("\u{2022} {text}"), wrap_chars(CONTENT_WIDTH)) {
                    cursor.write_line(&segment, 0.0);
                }
            }
            BodyLine::SubItem(text) => {
                let width = CONTENT_WIDTH - SUB_ITEM_INDENT;
                for segment in wrap_text(&format!("- {text}"), wrap_chars(width)) {
                    cursor.write_line(&segment, SUB_ITEM_INDENT);
                }
            }
            BodyLine::Gap => cursor.gap(),
        }
    }

    let pages = cursor.pages;
    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| RenderError::Pdf(format!("save: {e}")))?;
    let bytes = buf
        .into_inner()
        .map_err(|e| RenderError::Buffer(e.to_string()))?;

    tracing::debug!(
        prescription = %prescription.id,
        pages,
        size = bytes.len(),
        "prescription rendered"
    );

    Ok(RenderedDocument {
        bytes,
        filename: format!("Prescription_{}_{}.pdf", patient.surname, prescription.numero),
        content_type: "application/pdf",
    })
}

/// Write rendered PDF bytes into the exports directory, creating it if
/// needed. Returns the full path of the written file.
pub fn export_pdf_to_file(
    pdf_bytes: &[u8],
    filename: &str,
    exports_dir: &Path,
) -> Result<PathBuf, RenderError> {
    fs::create_dir_all(exports_dir)?;
    let path = exports_dir.join(filename);
    fs::write(&path, pdf_bytes)?;
    Ok(path)
}
