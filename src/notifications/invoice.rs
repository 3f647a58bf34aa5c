//! GST tax invoice rendered as a small self-contained PDF.
//!
//! Output is deterministic for a given order: no timestamps or random ids are
//! embedded, so the same order always yields the same bytes.

use super::templates::group_indian;
use crate::{
    config::StoreConfig,
    entities::{order, order_item},
    services::addresses::AddressDetails,
};
use rust_decimal::Decimal;
use std::fmt::Write as _;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const BOTTOM_LIMIT: f32 = 110.0;

/// How the GST on an order splits across tax heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GstBreakdown {
    /// Same-state supply: central and state GST at half the rate each
    Intra { cgst_paise: i64, sgst_paise: i64 },
    /// Inter-state supply: integrated GST at the full rate
    Inter { igst_paise: i64 },
}

pub fn gst_breakdown(tax_paise: i64, shipping_state: &str, store_state: &str) -> GstBreakdown {
    if shipping_state.trim().eq_ignore_ascii_case(store_state.trim()) {
        let cgst = tax_paise / 2;
        GstBreakdown::Intra {
            cgst_paise: cgst,
            sgst_paise: tax_paise - cgst,
        }
    } else {
        GstBreakdown::Inter {
            igst_paise: tax_paise,
        }
    }
}

const ONES: [&str; 20] = [
    "", "One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine", "Ten", "Eleven",
    "Twelve", "Thirteen", "Fourteen", "Fifteen", "Sixteen", "Seventeen", "Eighteen", "Nineteen",
];
const TENS: [&str; 10] = [
    "", "", "Twenty", "Thirty", "Forty", "Fifty", "Sixty", "Seventy", "Eighty", "Ninety",
];

fn below_hundred(n: u64) -> String {
    let n = n as usize;
    if n < 20 {
        ONES[n].to_string()
    } else if n % 10 == 0 {
        TENS[n / 10].to_string()
    } else {
        format!("{} {}", TENS[n / 10], ONES[n % 10])
    }
}

/// Spells a whole number using crore / lakh / thousand grouping.
pub fn number_in_words(n: u64) -> String {
    if n == 0 {
        return "Zero".to_string();
    }
    let mut parts: Vec<String> = Vec::new();
    let crore = n / 10_000_000;
    let lakh = (n / 100_000) % 100;
    let thousand = (n / 1_000) % 100;
    let hundred = (n / 100) % 10;
    let rest = n % 100;

    if crore > 0 {
        parts.push(format!("{} Crore", number_in_words(crore)));
    }
    if lakh > 0 {
        parts.push(format!("{} Lakh", below_hundred(lakh)));
    }
    if thousand > 0 {
        parts.push(format!("{} Thousand", below_hundred(thousand)));
    }
    if hundred > 0 {
        parts.push(format!("{} Hundred", ONES[hundred as usize]));
    }
    if rest > 0 {
        parts.push(below_hundred(rest));
    }
    parts.join(" ")
}

/// `236000` paise -> "Rupees Two Thousand Three Hundred Sixty Only".
pub fn amount_in_words(paise: i64) -> String {
    let abs = paise.unsigned_abs();
    let rupees = abs / 100;
    let fraction = abs % 100;
    let mut words = format!("Rupees {}", number_in_words(rupees));
    if fraction > 0 {
        let _ = write!(words, " and {} Paise", below_hundred(fraction));
    }
    words.push_str(" Only");
    words
}

fn money(paise: i64) -> String {
    let sign = if paise < 0 { "-" } else { "" };
    let abs = paise.unsigned_abs();
    format!("{}Rs. {}.{:02}", sign, group_indian(abs / 100), abs % 100)
}

/// Escapes a string for a PDF literal. Non-ASCII characters are replaced
/// because the built-in fonts only cover Latin-1.
fn pdf_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '₹' => out.push_str("Rs."),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn approx_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Accumulates page content streams with a simple top-down cursor.
struct Layout {
    pages: Vec<String>,
    current: String,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: String::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn text_at(&mut self, x: f32, size: f32, bold: bool, text: &str) {
        let font = if bold { "F2" } else { "F1" };
        let _ = writeln!(
            self.current,
            "BT /{} {:.1} Tf {:.2} {:.2} Td ({}) Tj ET",
            font,
            size,
            x,
            self.y,
            pdf_text(text)
        );
    }

    fn text_right(&mut self, right: f32, size: f32, bold: bool, text: &str) {
        let x = right - approx_width(text, size);
        self.text_at(x, size, bold, text);
    }

    fn rule(&mut self) {
        let _ = writeln!(
            self.current,
            "0.5 w {:.2} {:.2} m {:.2} {:.2} l S",
            MARGIN,
            self.y,
            PAGE_WIDTH - MARGIN,
            self.y
        );
    }

    fn advance(&mut self, dy: f32) {
        self.y -= dy;
        if self.y < BOTTOM_LIMIT {
            self.page_break();
        }
    }

    fn page_break(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn finish(mut self) -> Vec<String> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

/// Serializes page content streams into a PDF 1.4 file.
fn write_pdf(pages: &[String]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    let mut offsets: Vec<usize> = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let page_count = pages.len();
    // 1 catalog, 2 page tree, 3/4 fonts, then (page, content) pairs
    let page_ids: Vec<usize> = (0..page_count).map(|i| 5 + i * 2).collect();
    let kids = page_ids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects: Vec<Vec<u8>> = vec![
        b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, page_count).into_bytes(),
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    ];
    for (i, content) in pages.iter().enumerate() {
        let content_id = page_ids[i] + 1;
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                PAGE_WIDTH, PAGE_HEIGHT, content_id
            )
            .into_bytes(),
        );
        let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        stream.extend_from_slice(content.as_bytes());
        stream.extend_from_slice(b"\nendstream");
        objects.push(stream);
    }

    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_at = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in &offsets {
        let _ = write!(xref, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    );
    out.extend_from_slice(xref.as_bytes());
    out
}

/// A basis-point rate as a percentage without trailing zeros: 900 is "9",
/// 1250 is "12.5".
fn percent_label(bp: Decimal) -> String {
    (bp / Decimal::ONE_HUNDRED).normalize().to_string()
}

/// Renders the tax invoice for an order at the given GST rate.
pub fn render_invoice(
    order: &order::Model,
    items: &[order_item::Model],
    store: &StoreConfig,
    tax_rate_bp: i64,
) -> Vec<u8> {
    let right = PAGE_WIDTH - MARGIN;
    let mut page = Layout::new();

    page.text_at(MARGIN, 18.0, true, &store.name);
    page.text_right(right, 14.0, true, "TAX INVOICE");
    page.advance(16.0);
    for line in wrap(&store.address, 70) {
        page.text_at(MARGIN, 9.0, false, &line);
        page.advance(11.0);
    }
    if let Some(gstin) = &store.gstin {
        page.text_at(MARGIN, 9.0, false, &format!("GSTIN: {}", gstin));
        page.advance(11.0);
    }
    page.advance(8.0);
    page.rule();
    page.advance(18.0);

    let meta = [
        format!("Invoice No: INV-{}", order.confirmation_number),
        format!("Order No: {}", order.confirmation_number),
        format!("Order Date: {}", order.created_at.format("%d-%m-%Y")),
        format!(
            "Payment: {} ({})",
            order.payment_method.as_deref().unwrap_or("-"),
            order.payment_status
        ),
    ];
    for line in &meta {
        page.text_at(MARGIN, 10.0, false, line);
        page.advance(13.0);
    }
    page.advance(6.0);

    let address = AddressDetails::from_json(&order.shipping_address);
    let shipping_state = address.as_ref().map(|a| a.state.clone()).unwrap_or_default();
    page.text_at(MARGIN, 10.0, true, "Ship To:");
    page.advance(13.0);
    page.text_at(MARGIN, 10.0, false, &order.customer_name);
    page.advance(13.0);
    if let Some(address) = &address {
        for line in wrap(&address.one_line(), 80) {
            page.text_at(MARGIN, 10.0, false, &line);
            page.advance(13.0);
        }
        page.text_at(
            MARGIN,
            10.0,
            false,
            &format!("Place of supply: {}", address.state),
        );
        page.advance(13.0);
    }
    page.text_at(
        MARGIN,
        10.0,
        false,
        &format!("{} | {}", order.customer_phone, order.customer_email),
    );
    page.advance(20.0);

    let header = |page: &mut Layout| {
        page.rule();
        page.advance(13.0);
        page.text_at(MARGIN, 10.0, true, "#");
        page.text_at(MARGIN + 20.0, 10.0, true, "Item");
        page.text_at(MARGIN + 250.0, 10.0, true, "SKU");
        page.text_right(MARGIN + 370.0, 10.0, true, "Qty");
        page.text_right(MARGIN + 430.0, 10.0, true, "Rate");
        page.text_right(right, 10.0, true, "Amount");
        page.advance(6.0);
        page.rule();
        page.advance(14.0);
    };
    header(&mut page);

    for (index, item) in items.iter().enumerate() {
        let pages_before = page.pages.len();
        let name: String = item.product_name.chars().take(45).collect();
        page.text_at(MARGIN, 10.0, false, &(index + 1).to_string());
        page.text_at(MARGIN + 20.0, 10.0, false, &name);
        page.text_at(MARGIN + 250.0, 9.0, false, &item.sku);
        page.text_right(MARGIN + 370.0, 10.0, false, &item.quantity.to_string());
        page.text_right(MARGIN + 430.0, 10.0, false, &money(item.unit_price_paise));
        page.text_right(right, 10.0, false, &money(item.total_price_paise));
        page.advance(15.0);
        if page.pages.len() > pages_before {
            header(&mut page);
        }
    }
    page.rule();
    page.advance(16.0);

    let mut totals: Vec<(String, i64)> = vec![("Subtotal".into(), order.subtotal_paise)];
    if order.discount_paise > 0 {
        let label = match &order.coupon_code {
            Some(code) => format!("Discount ({})", code),
            None => "Discount".into(),
        };
        totals.push((label, -order.discount_paise));
    }
    totals.push(("Shipping".into(), order.shipping_paise));
    match gst_breakdown(order.tax_paise, &shipping_state, &store.state) {
        GstBreakdown::Intra {
            cgst_paise,
            sgst_paise,
        } => {
            let half = percent_label(Decimal::from(tax_rate_bp) / Decimal::TWO);
            totals.push((format!("CGST @ {}%", half), cgst_paise));
            totals.push((format!("SGST @ {}%", half), sgst_paise));
        }
        GstBreakdown::Inter { igst_paise } => {
            let full = percent_label(Decimal::from(tax_rate_bp));
            totals.push((format!("IGST @ {}%", full), igst_paise));
        }
    }
    for (label, amount) in &totals {
        page.text_right(MARGIN + 430.0, 10.0, false, label);
        page.text_right(right, 10.0, false, &money(*amount));
        page.advance(14.0);
    }
    page.advance(2.0);
    page.text_right(MARGIN + 430.0, 12.0, true, "Grand Total");
    page.text_right(right, 12.0, true, &money(order.total_paise));
    page.advance(20.0);

    for line in wrap(&amount_in_words(order.total_paise), 90) {
        page.text_at(MARGIN, 10.0, false, &line);
        page.advance(13.0);
    }
    page.advance(24.0);
    page.text_at(
        MARGIN,
        8.0,
        false,
        "This is a computer generated invoice and does not require a signature.",
    );

    write_pdf(&page.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::test_support::{items, order};
    use rstest::rstest;

    #[rstest]
    #[case(0, "Zero")]
    #[case(15, "Fifteen")]
    #[case(40, "Forty")]
    #[case(2360, "Two Thousand Three Hundred Sixty")]
    #[case(100_000, "One Lakh")]
    #[case(1_234_567, "Twelve Lakh Thirty Four Thousand Five Hundred Sixty Seven")]
    #[case(250_000_000, "Twenty Five Crore")]
    fn words(#[case] n: u64, #[case] expected: &str) {
        assert_eq!(number_in_words(n), expected);
    }

    #[test]
    fn rupees_and_paise_in_words() {
        assert_eq!(
            amount_in_words(236_000),
            "Rupees Two Thousand Three Hundred Sixty Only"
        );
        assert_eq!(
            amount_in_words(10_050),
            "Rupees One Hundred and Fifty Paise Only"
        );
    }

    #[test]
    fn same_state_splits_gst() {
        assert_eq!(
            gst_breakdown(36_001, "karnataka ", "Karnataka"),
            GstBreakdown::Intra {
                cgst_paise: 18_000,
                sgst_paise: 18_001
            }
        );
        assert_eq!(
            gst_breakdown(36_000, "Maharashtra", "Karnataka"),
            GstBreakdown::Inter { igst_paise: 36_000 }
        );
    }

    #[test]
    fn pdf_is_well_formed_and_deterministic() {
        let store = StoreConfig {
            state: "Karnataka".into(),
            ..StoreConfig::default()
        };
        let a = render_invoice(&order("Karnataka"), &items(), &store, 1800);
        let b = render_invoice(&order("Karnataka"), &items(), &store, 1800);
        assert_eq!(a, b);
        assert!(a.starts_with(b"%PDF-1.4"));
        assert!(a.ends_with(b"%%EOF\n"));

        let text = String::from_utf8_lossy(&a);
        assert!(text.contains("CGST @ 9%"));
        assert!(text.contains("INV-ORD-M7X2K1-AB12CD"));
        assert!(text.contains("Rupees Two Thousand Two Hundred Ten Only"));
    }

    #[test]
    fn inter_state_uses_igst() {
        let store = StoreConfig {
            state: "Karnataka".into(),
            ..StoreConfig::default()
        };
        let pdf = render_invoice(&order("Tamil Nadu"), &items(), &store, 1800);
        let text = String::from_utf8_lossy(&pdf);
        assert!(text.contains("IGST @ 18%"));
        assert!(!text.contains("CGST"));
    }

    #[test]
    fn tax_labels_follow_the_configured_rate() {
        let store = StoreConfig {
            state: "Karnataka".into(),
            ..StoreConfig::default()
        };
        let intra = render_invoice(&order("Karnataka"), &items(), &store, 1200);
        let text = String::from_utf8_lossy(&intra);
        assert!(text.contains("CGST @ 6%"));
        assert!(text.contains("SGST @ 6%"));
        assert!(!text.contains("@ 9%"));

        let inter = render_invoice(&order("Tamil Nadu"), &items(), &store, 250);
        let text = String::from_utf8_lossy(&inter);
        assert!(text.contains("IGST @ 2.5%"));
        assert_eq!(percent_label(Decimal::from(1250)), "12.5");
    }

    #[test]
    fn long_orders_span_pages() {
        let many: Vec<_> = std::iter::repeat(items()[0].clone()).take(80).collect();
        let pdf = render_invoice(&order("Karnataka"), &many, &StoreConfig::default(), 1800);
        let text = String::from_utf8_lossy(&pdf);
        assert!(!text.contains("/Count 1 "));
    }

    #[test]
    fn pdf_strings_are_escaped() {
        assert_eq!(pdf_text("a(b)c\\"), "a\\(b\\)c\\\\");
        assert_eq!(pdf_text("₹10"), "Rs.10");
        assert_eq!(pdf_text("é"), "?");
    }
}
