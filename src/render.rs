// ===============================
// src/render.rs
// ===============================
//
// Renderer PDF tagihan, layout tetap (A4, satuan mm):
// - Header di setiap halaman: banner, nama properti, alamat, garis pemisah.
// - Judul periode + identitas penyewa.
// - Tabel 2 kolom (Description 140mm | Amount 50mm) dengan baris TOTAL tebal.
// - Footer opsional: nomor pembayaran & kontak.
//
// Dokumen dibangun penuh di memori (lopdf), jadi tidak ada file parsial saat gagal.
//
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, StringFormat};
use thiserror::Error;

use crate::config::PropertyConfig;
use crate::domain::{underscored, Bill, TenantIdentity};

const PT_PER_MM: f32 = 72.0 / 25.4;

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
pub const MARGIN_MM: f32 = 10.0;
const BOTTOM_MARGIN_MM: f32 = 20.0;
const CELL_PADDING_MM: f32 = 1.0;

pub const DESCRIPTION_COL_MM: f32 = 140.0;
pub const AMOUNT_COL_MM: f32 = 50.0;
const ROW_HEIGHT_MM: f32 = 10.0;
const TOTAL_ROW_HEIGHT_MM: f32 = 12.0;
const SEPARATOR_Y_MM: f32 = 35.0;
const BODY_TOP_MM: f32 = 40.0;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// `{period}_{tenant}.pdf`, spasi diganti underscore.
pub fn document_file_name(period_label: &str, tenant_name: &str) -> String {
    format!("{}_{}.pdf", underscored(period_label), underscored(tenant_name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    fn widths(self) -> &'static [u16; 95] {
        match self {
            Font::Regular => &HELVETICA_WIDTHS,
            Font::Bold => &HELVETICA_BOLD_WIDTHS,
        }
    }

    /// Text width in mm for the standard Type1 metrics (1/1000 em).
    fn text_width_mm(self, text: &str, size_pt: f32) -> f32 {
        let table = self.widths();
        let units: u32 = text
            .chars()
            .map(|c| match c as u32 {
                32..=126 => table[(c as u32 - 32) as usize] as u32,
                _ => 556,
            })
            .sum();
        units as f32 * size_pt / 1000.0 / PT_PER_MM
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
    Right,
}

fn to_win_ansi(s: &str) -> Vec<u8> {
    s.chars().map(|c| if c as u32 <= 255 { c as u8 } else { b'?' }).collect()
}

fn fit_text(text: &str, font: Font, size_pt: f32, max_mm: f32) -> String {
    if font.text_width_mm(text, size_pt) <= max_mm {
        return text.to_string();
    }
    let mut out: String = text.to_string();
    while !out.is_empty() && font.text_width_mm(&format!("{out}..."), size_pt) > max_mm {
        out.pop();
    }
    format!("{}...", out.trim_end())
}

/// Satu halaman: content stream + kursor vertikal (mm dari atas).
struct PageCanvas {
    content: Content,
    y: f32,
}

impl PageCanvas {
    fn new() -> Self {
        Self { content: Content { operations: vec![] }, y: MARGIN_MM }
    }

    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.content.operations.push(Operation::new(operator, operands));
    }

    fn fits(&self, height_mm: f32) -> bool {
        self.y + height_mm <= PAGE_HEIGHT_MM - BOTTOM_MARGIN_MM
    }

    fn set_gray(&mut self, level: f32) {
        self.op("g", vec![level.into()]);
    }

    fn hline(&mut self, y_mm: f32, x1_mm: f32, x2_mm: f32) {
        let y = (PAGE_HEIGHT_MM - y_mm) * PT_PER_MM;
        self.op("w", vec![(0.2 * PT_PER_MM).into()]);
        self.op("m", vec![(x1_mm * PT_PER_MM).into(), y.into()]);
        self.op("l", vec![(x2_mm * PT_PER_MM).into(), y.into()]);
        self.op("S", vec![]);
    }

    /// Cell at the current cursor row; does not advance the cursor.
    #[allow(clippy::too_many_arguments)]
    fn cell(&mut self, x_mm: f32, w_mm: f32, h_mm: f32, text: &str, font: Font, size_pt: f32, align: Align, border: bool) {
        if border {
            self.op("w", vec![(0.2 * PT_PER_MM).into()]);
            self.op(
                "re",
                vec![
                    (x_mm * PT_PER_MM).into(),
                    ((PAGE_HEIGHT_MM - self.y - h_mm) * PT_PER_MM).into(),
                    (w_mm * PT_PER_MM).into(),
                    (h_mm * PT_PER_MM).into(),
                ],
            );
            self.op("S", vec![]);
        }
        if text.is_empty() {
            return;
        }

        let text = fit_text(text, font, size_pt, w_mm - 2.0 * CELL_PADDING_MM);
        let width = font.text_width_mm(&text, size_pt);
        let tx = match align {
            Align::Left => x_mm + CELL_PADDING_MM,
            Align::Center => x_mm + (w_mm - width) / 2.0,
            Align::Right => x_mm + w_mm - CELL_PADDING_MM - width,
        };
        // Baseline: tengah cell + 0.3 * tinggi font
        let baseline = self.y + 0.5 * h_mm + 0.3 * size_pt / PT_PER_MM;

        self.op("BT", vec![]);
        self.op("Tf", vec![Object::Name(font.resource().as_bytes().to_vec()), size_pt.into()]);
        self.op(
            "Td",
            vec![(tx * PT_PER_MM).into(), ((PAGE_HEIGHT_MM - baseline) * PT_PER_MM).into()],
        );
        self.op("Tj", vec![Object::String(to_win_ansi(&text), StringFormat::Literal)]);
        self.op("ET", vec![]);
    }

    /// Full-width cell, lalu kursor turun `h_mm`.
    fn line(&mut self, h_mm: f32, text: &str, font: Font, size_pt: f32, align: Align) {
        self.cell(MARGIN_MM, PAGE_WIDTH_MM - 2.0 * MARGIN_MM, h_mm, text, font, size_pt, align, false);
        self.y += h_mm;
    }
}

/// Object graph lopdf: Catalog -> Pages -> Page*, satu Resources bersama.
struct PdfBuilder {
    document: Document,
    pages_id: ObjectId,
    resources_id: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl PdfBuilder {
    fn begin() -> Self {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        let resources_id = document.new_object_id();

        let regular_id = document.add_object(dictionary! {
            "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica", "Encoding" => "WinAnsiEncoding",
        });
        let bold_id = document.add_object(dictionary! {
            "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica-Bold", "Encoding" => "WinAnsiEncoding",
        });
        document.objects.insert(
            resources_id,
            Object::Dictionary(dictionary! {
                "Font" => dictionary! {
                    Font::Regular.resource() => regular_id,
                    Font::Bold.resource() => bold_id,
                },
            }),
        );

        let catalog_id = document.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        document.trailer.set("Root", catalog_id);

        Self { document, pages_id, resources_id, page_ids: Vec::new() }
    }

    fn add_page(&mut self, canvas: PageCanvas) -> Result<(), RenderError> {
        let stream = lopdf::Stream::new(Dictionary::new(), canvas.content.encode()?);
        let content_id = self.document.add_object(stream);
        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                (PAGE_WIDTH_MM * PT_PER_MM).into(),
                (PAGE_HEIGHT_MM * PT_PER_MM).into(),
            ],
            "Contents" => content_id,
            "Resources" => self.resources_id,
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>, RenderError> {
        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::from(*id)).collect();
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.page_ids.len() as i64,
            }),
        );
        let mut buf = Vec::new();
        self.document.save_to(&mut buf)?;
        Ok(buf)
    }
}

pub struct BillRenderer {
    property: PropertyConfig,
}

impl BillRenderer {
    pub fn new(property: PropertyConfig) -> Self {
        Self { property }
    }

    pub fn render(&self, bill: &Bill, tenant: &TenantIdentity) -> Result<Vec<u8>, RenderError> {
        if tenant.name.trim().is_empty() {
            return Err(RenderError::MissingField("tenant name"));
        }

        let mut pdf = PdfBuilder::begin();
        let mut page = self.start_page();

        page.line(10.0, &format!("BILL INVOICE - {}", bill.period.label()), Font::Bold, 14.0, Align::Left);
        let who = if tenant.id.trim().is_empty() {
            format!("Name: {}", tenant.name.trim())
        } else {
            format!("Name: {} (ID: {})", tenant.name.trim(), tenant.id.trim())
        };
        page.line(8.0, &who, Font::Regular, 12.0, Align::Left);
        page.y += 5.0;

        table_header(&mut page);

        let mut rows: Vec<(String, String, Font, f32)> = bill
            .items
            .iter()
            .map(|item| (item.label.clone(), item.display_amount(), Font::Regular, ROW_HEIGHT_MM))
            .collect();
        rows.push(("TOTAL PAYABLE".to_string(), bill.display_total(), Font::Bold, TOTAL_ROW_HEIGHT_MM));

        for (label, amount, font, height) in rows {
            if !page.fits(height) {
                pdf.add_page(page)?;
                page = self.start_page();
                table_header(&mut page);
            }
            page.cell(MARGIN_MM, DESCRIPTION_COL_MM, height, &label, font, 12.0, Align::Left, true);
            page.cell(MARGIN_MM + DESCRIPTION_COL_MM, AMOUNT_COL_MM, height, &amount, font, 12.0, Align::Right, true);
            page.y += height;
        }

        let footer: Vec<String> = [
            self.property.payment_mobile.as_ref().map(|m| format!("Pay via mobile: {m}")),
            self.property.query_contact.as_ref().map(|q| format!("For queries: {q}")),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !footer.is_empty() {
            page.y += 4.0;
            for text in footer {
                if !page.fits(6.0) {
                    pdf.add_page(page)?;
                    page = self.start_page();
                }
                page.line(6.0, &text, Font::Regular, 10.0, Align::Left);
            }
        }

        pdf.add_page(page)?;
        pdf.finish()
    }

    /// Halaman baru dengan header tetap; kursor di bawah garis pemisah.
    fn start_page(&self) -> PageCanvas {
        let mut page = PageCanvas::new();

        page.set_gray(100.0 / 255.0);
        page.line(5.0, &self.property.banner, Font::Bold, 9.0, Align::Center);
        page.y += 2.0;
        page.set_gray(0.0);
        page.line(8.0, &self.property.name, Font::Bold, 18.0, Align::Center);
        page.line(5.0, &self.property.address, Font::Regular, 10.0, Align::Center);
        page.hline(SEPARATOR_Y_MM, MARGIN_MM, PAGE_WIDTH_MM - MARGIN_MM);

        page.y = BODY_TOP_MM;
        page
    }
}

fn table_header(page: &mut PageCanvas) {
    page.cell(MARGIN_MM, DESCRIPTION_COL_MM, ROW_HEIGHT_MM, "Description", Font::Regular, 12.0, Align::Left, true);
    page.cell(MARGIN_MM + DESCRIPTION_COL_MM, AMOUNT_COL_MM, ROW_HEIGHT_MM, "Amount", Font::Regular, 12.0, Align::Right, true);
    page.y += ROW_HEIGHT_MM;
}

// Helvetica AFM widths, chars 32..=126
#[rustfmt::skip]
static HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    278, 278, 584, 584, 584, 556, 1015,
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    278, 278, 278, 469, 556, 333,
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    334, 260, 334, 584,
];

#[rustfmt::skip]
static HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    333, 333, 584, 584, 584, 611, 975,
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    333, 278, 333, 584, 556, 333,
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889,
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    389, 280, 389, 584,
];
