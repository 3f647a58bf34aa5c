//! Email and SMS bodies for order notifications.

use crate::{
    config::StoreConfig,
    entities::{
        order::{self, OrderStatus},
        order_item,
    },
    services::addresses::AddressDetails,
};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Groups rupees the Indian way: 12,34,567.
pub fn group_indian(whole: u64) -> String {
    let digits = whole.to_string();
    if digits.len() <= 3 {
        return digits;
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("{},{}", groups.join(","), tail)
}

/// Formats paise as `₹1,23,456.78`.
pub fn format_inr(paise: i64) -> String {
    let sign = if paise < 0 { "-" } else { "" };
    let abs = paise.unsigned_abs();
    format!("{}₹{}.{:02}", sign, group_indian(abs / 100), abs % 100)
}

fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Pending",
        OrderStatus::Processing => "Processing",
        OrderStatus::Shipped => "Shipped",
        OrderStatus::Delivered => "Delivered",
        OrderStatus::Cancelled => "Cancelled",
        OrderStatus::Refunded => "Refunded",
    }
}

fn items_text(items: &[order_item::Model]) -> String {
    let mut out = String::new();
    for item in items {
        let _ = writeln!(
            out,
            "  {} x {} @ {} = {}",
            item.quantity,
            item.product_name,
            format_inr(item.unit_price_paise),
            format_inr(item.total_price_paise)
        );
    }
    out
}

fn items_html(items: &[order_item::Model]) -> String {
    let mut rows = String::new();
    for item in items {
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td align=\"right\">{}</td><td align=\"right\">{}</td></tr>",
            escape_html(&item.product_name),
            item.quantity,
            format_inr(item.unit_price_paise),
            format_inr(item.total_price_paise)
        );
    }
    format!(
        "<table cellpadding=\"6\" style=\"border-collapse:collapse;width:100%\">\
         <tr><th align=\"left\">Item</th><th>Qty</th><th align=\"right\">Price</th><th align=\"right\">Total</th></tr>\
         {}</table>",
        rows
    )
}

fn totals_text(order: &order::Model) -> String {
    let mut out = format!("Subtotal: {}\n", format_inr(order.subtotal_paise));
    if order.discount_paise > 0 {
        let _ = writeln!(
            out,
            "Discount{}: -{}",
            order
                .coupon_code
                .as_deref()
                .map(|c| format!(" ({})", c))
                .unwrap_or_default(),
            format_inr(order.discount_paise)
        );
    }
    let _ = writeln!(out, "GST: {}", format_inr(order.tax_paise));
    let shipping = if order.shipping_paise == 0 {
        "FREE".to_string()
    } else {
        format_inr(order.shipping_paise)
    };
    let _ = writeln!(out, "Shipping: {}", shipping);
    let _ = writeln!(out, "Total: {}", format_inr(order.total_paise));
    out
}

fn totals_html(order: &order::Model) -> String {
    totals_text(order)
        .lines()
        .map(|line| format!("<p style=\"margin:2px 0\">{}</p>", escape_html(line)))
        .collect()
}

fn address_block(order: &order::Model) -> Option<AddressDetails> {
    AddressDetails::from_json(&order.shipping_address)
}

fn footer_text(store: &StoreConfig) -> String {
    match &store.support_phone {
        Some(phone) => format!(
            "Questions? Write to {} or call {}.\n{}",
            store.support_email, phone, store.name
        ),
        None => format!("Questions? Write to {}.\n{}", store.support_email, store.name),
    }
}

fn wrap_html(store: &StoreConfig, heading: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><body style=\"font-family:Georgia,serif;color:#222\">\
         <h2 style=\"color:#8a6d3b\">{store}</h2><h3>{heading}</h3>{body}\
         <hr><p style=\"font-size:12px;color:#777\">{footer}</p></body></html>",
        store = escape_html(&store.name),
        heading = escape_html(heading),
        body = body,
        footer = escape_html(&footer_text(store)).replace('\n', "<br>"),
    )
}

pub fn order_confirmation(
    order: &order::Model,
    items: &[order_item::Model],
    store: &StoreConfig,
) -> RenderedEmail {
    let subject = format!("Order Confirmed - {}", order.confirmation_number);
    let address = address_block(order)
        .map(|a| format!("Shipping to:\n{}\n{}\n", a.full_name, a.one_line()))
        .unwrap_or_default();

    let text = format!(
        "Dear {name},\n\nThank you for shopping with {store}. Your order {cn} has been received.\n\n\
         {items}\n{totals}\n{address}\n{footer}\n",
        name = order.customer_name,
        store = store.name,
        cn = order.confirmation_number,
        items = items_text(items),
        totals = totals_text(order),
        address = address,
        footer = footer_text(store),
    );

    let body = format!(
        "<p>Dear {name},</p><p>Thank you for shopping with us. Your order \
         <strong>{cn}</strong> has been received.</p>{items}{totals}<p>{address}</p>",
        name = escape_html(&order.customer_name),
        cn = escape_html(&order.confirmation_number),
        items = items_html(items),
        totals = totals_html(order),
        address = escape_html(&address).replace('\n', "<br>"),
    );

    RenderedEmail {
        html: wrap_html(store, &subject, &body),
        subject,
        text,
    }
}

pub fn order_shipped(
    order: &order::Model,
    items: &[order_item::Model],
    store: &StoreConfig,
) -> RenderedEmail {
    let subject = format!("Your order {} has shipped", order.confirmation_number);
    let tracking = order
        .tracking_number
        .as_deref()
        .map(|t| format!("Tracking number: {}\n", t))
        .unwrap_or_default();
    let eta = order
        .estimated_delivery
        .map(|d| format!("Estimated delivery: {}\n", d.format("%d %b %Y")))
        .unwrap_or_default();

    let text = format!(
        "Dear {name},\n\nGood news! Your order {cn} is on its way.\n{tracking}{eta}\n\
         {items}\nYour invoice is attached.\n\n{footer}\n",
        name = order.customer_name,
        cn = order.confirmation_number,
        tracking = tracking,
        eta = eta,
        items = items_text(items),
        footer = footer_text(store),
    );
    let body = format!(
        "<p>Dear {name},</p><p>Good news! Your order <strong>{cn}</strong> is on its way.</p>\
         <p>{tracking}{eta}</p>{items}<p>Your invoice is attached.</p>",
        name = escape_html(&order.customer_name),
        cn = escape_html(&order.confirmation_number),
        tracking = escape_html(&tracking).replace('\n', "<br>"),
        eta = escape_html(&eta).replace('\n', "<br>"),
        items = items_html(items),
    );

    RenderedEmail {
        html: wrap_html(store, &subject, &body),
        subject,
        text,
    }
}

pub fn order_cancelled(
    order: &order::Model,
    items: &[order_item::Model],
    store: &StoreConfig,
) -> RenderedEmail {
    let subject = format!("Order {} has been cancelled", order.confirmation_number);
    let reason = order
        .cancellation_reason
        .as_deref()
        .map(|r| format!("Reason: {}\n", r))
        .unwrap_or_default();

    let text = format!(
        "Dear {name},\n\nYour order {cn} has been cancelled.\n{reason}\n{items}\n\
         If you already paid, the refund of {total} will be processed to your original payment method.\n\n{footer}\n",
        name = order.customer_name,
        cn = order.confirmation_number,
        reason = reason,
        items = items_text(items),
        total = format_inr(order.total_paise),
        footer = footer_text(store),
    );
    let body = format!(
        "<p>Dear {name},</p><p>Your order <strong>{cn}</strong> has been cancelled.</p>\
         <p>{reason}</p>{items}<p>If you already paid, the refund of {total} will be processed \
         to your original payment method.</p>",
        name = escape_html(&order.customer_name),
        cn = escape_html(&order.confirmation_number),
        reason = escape_html(&reason),
        items = items_html(items),
        total = escape_html(&format_inr(order.total_paise)),
    );

    RenderedEmail {
        html: wrap_html(store, &subject, &body),
        subject,
        text,
    }
}

pub fn status_update(
    order: &order::Model,
    items: &[order_item::Model],
    store: &StoreConfig,
) -> RenderedEmail {
    let label = status_label(order.status);
    let subject = format!("Order {} update: {}", order.confirmation_number, label);
    let notes = order
        .notes
        .as_deref()
        .map(|n| format!("{}\n", n))
        .unwrap_or_default();

    let text = format!(
        "Dear {name},\n\nThe status of your order {cn} is now: {label}.\n{notes}\n{items}\n{footer}\n",
        name = order.customer_name,
        cn = order.confirmation_number,
        label = label,
        notes = notes,
        items = items_text(items),
        footer = footer_text(store),
    );
    let body = format!(
        "<p>Dear {name},</p><p>The status of your order <strong>{cn}</strong> is now \
         <strong>{label}</strong>.</p><p>{notes}</p>{items}",
        name = escape_html(&order.customer_name),
        cn = escape_html(&order.confirmation_number),
        label = label,
        notes = escape_html(&notes),
        items = items_html(items),
    );

    RenderedEmail {
        html: wrap_html(store, &subject, &body),
        subject,
        text,
    }
}

pub fn confirmation_sms(order: &order::Model, store: &StoreConfig) -> String {
    format!(
        "{}: Thank you! Order {} for {} is confirmed. We'll notify you when it ships.",
        store.name,
        order.confirmation_number,
        format_inr(order.total_paise)
    )
}

pub fn shipped_sms(order: &order::Model, store: &StoreConfig) -> String {
    match &order.tracking_number {
        Some(tracking) => format!(
            "{}: Order {} has shipped. Tracking: {}",
            store.name, order.confirmation_number, tracking
        ),
        None => format!(
            "{}: Order {} has shipped.",
            store.name, order.confirmation_number
        ),
    }
}

pub fn cancelled_sms(order: &order::Model, store: &StoreConfig) -> String {
    format!(
        "{}: Order {} has been cancelled. Contact {} for help.",
        store.name, order.confirmation_number, store.support_email
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::test_support::{items, order};

    #[test]
    fn indian_grouping() {
        assert_eq!(group_indian(0), "0");
        assert_eq!(group_indian(999), "999");
        assert_eq!(group_indian(1000), "1,000");
        assert_eq!(group_indian(123456), "1,23,456");
        assert_eq!(group_indian(12345678), "1,23,45,678");
        assert_eq!(format_inr(221_000), "₹2,210.00");
        assert_eq!(format_inr(5), "₹0.05");
    }

    #[test]
    fn confirmation_escapes_customer_data() {
        let rendered = order_confirmation(&order("Karnataka"), &items(), &StoreConfig::default());
        assert_eq!(rendered.subject, "Order Confirmed - ORD-M7X2K1-AB12CD");
        assert!(rendered.html.contains("Asha &lt;Rao&gt;"));
        assert!(!rendered.html.contains("<Rao>"));
        assert!(rendered.text.contains("Asha <Rao>"));
        assert!(rendered.text.contains("Discount (SAVE10): -₹150.00"));
        assert!(rendered.text.contains("Shipping: FREE"));
        assert!(rendered.text.contains("Total: ₹2,210.00"));
    }

    #[test]
    fn shipped_mentions_tracking() {
        let mut o = order("Karnataka");
        o.tracking_number = Some("AWB123".into());
        let rendered = order_shipped(&o, &items(), &StoreConfig::default());
        assert!(rendered.text.contains("Tracking number: AWB123"));
        assert!(shipped_sms(&o, &StoreConfig::default()).contains("AWB123"));
    }

    #[test]
    fn status_update_names_status() {
        let mut o = order("Karnataka");
        o.status = OrderStatus::Processing;
        let rendered = status_update(&o, &items(), &StoreConfig::default());
        assert!(rendered.subject.ends_with("update: Processing"));
    }
}
