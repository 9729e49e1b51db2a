//! Display formatting helpers shared by cards and reports

use chrono::{TimeZone, Utc};

/// Group the digits of a non-negative integer string with commas
fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `5214` -> `5,214`
pub fn format_commas(n: i64) -> String {
    let grouped = group_thousands(&n.unsigned_abs().to_string());
    if n < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// USD amount: whole dollars with separators from $1,000 up, cents below
pub fn format_usd(amount: f64) -> String {
    if !amount.is_finite() {
        return "$0.00".to_string();
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    let abs = amount.abs();
    if abs >= 1000.0 {
        format!("{}${}", sign, format_commas(abs.round() as i64))
    } else {
        format!("{}${:.2}", sign, abs)
    }
}

/// Trim a decimal string to at most `max_decimals` places, dropping trailing
/// zeros and grouping the integer part. Non-numeric input is returned as is.
pub fn trim_amount(amount: &str, max_decimals: usize) -> String {
    let amount = amount.trim();
    let (int_part, frac_part) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };

    if int_part.is_empty()
        || !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return amount.to_string();
    }

    let frac: String = frac_part.chars().take(max_decimals).collect();
    let frac = frac.trim_end_matches('0');
    let int_part = group_thousands(int_part);

    if frac.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac)
    }
}

/// First `max` characters of `s`
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Pad `s` with spaces to `width` characters
pub fn pad_right(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    format!("{}{}", s, " ".repeat(width - len))
}

/// Card timestamp: `26 Feb · 02:41z`
pub fn format_card_time(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(t) if ts != 0 => t.format("%-d %b · %H:%Mz").to_string(),
        _ => "unknown".to_string(),
    }
}

/// Report timestamp: `02 Jan 2006 15:04z`
pub fn format_log_time(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(t) if ts != 0 => t.format("%d %b %Y %H:%Mz").to_string(),
        _ => "—".to_string(),
    }
}

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
