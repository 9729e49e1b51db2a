//! Swap card rendering
//!
//! A card is a fixed-width double-border box:
//!
//! ```text
//! ╔═══════════════════════════════╗
//! ║ EAGLESWAP       $18.42 PROFIT ║
//! ╠═══════════════════════════════╣
//! ║ 0.5 ETH  ──►  1,842 USDT      ║
//! ║ Ethereum                 TRON ║
//! ╠═══════════════════════════════╣
//! ║ #5,214  ·  26 Feb · 02:41z    ║
//! ╚═══════════════════════════════╝
//! ```

use crate::models::Transaction;
use crate::monitoring::{LabelResolver, StatsSnapshot};
use crate::utils::{
    escape_html, format_card_time, format_commas, format_usd, pad_right, trim_amount,
    truncate_chars,
};

/// Characters between the left and right border
pub const CARD_INNER: usize = 31;

/// NEAR transaction explorer
const NEAR_TX_URL: &str = "https://nearblocks.io/txns/";

fn border(left: char, right: char) -> String {
    format!("{}{}{}", left, "═".repeat(CARD_INNER), right)
}

fn row(content: &str) -> String {
    format!("║{}║", pad_right(&truncate_chars(content, CARD_INNER), CARD_INNER))
}

/// Row with `left` flush left and `right` flush right
fn row_lr(left: &str, right: &str) -> String {
    let right = truncate_chars(right, CARD_INNER - 1);
    let right_len = right.chars().count();
    let left = truncate_chars(left, CARD_INNER - right_len - 1);
    let space = CARD_INNER - left.chars().count() - right_len;
    format!("║{}{}{}║", left, " ".repeat(space), right)
}

/// Render the card for one transaction
///
/// `stats` is the affiliate's snapshot taken right after this transaction was
/// recorded, so its swap count is the transaction's sequence number.
pub fn render_card(
    reseller_name: &str,
    tx: &Transaction,
    fee_usd: f64,
    stats: &StatsSnapshot,
    labels: &LabelResolver,
) -> String {
    let header = row_lr(
        &format!(" {}", reseller_name.to_uppercase()),
        &format!("{} PROFIT ", format_usd(fee_usd)),
    );

    let in_tok = truncate_chars(&labels.asset_label(&tx.origin_asset), 6);
    let out_tok = truncate_chars(&labels.asset_label(&tx.destination_asset), 6);
    let in_amt = truncate_chars(&trim_amount(&tx.amount_in_formatted, 6), 10);
    let out_amt = truncate_chars(&trim_amount(&tx.amount_out_formatted, 6), 10);
    let amounts = row(&format!(
        " {} {}  ──►  {} {}",
        in_amt, in_tok, out_amt, out_tok
    ));

    let in_chain = truncate_chars(&labels.chain_label(&tx.origin_asset), 12);
    let out_chain = truncate_chars(&labels.chain_label(&tx.destination_asset), 12);
    let chains = row_lr(&format!(" {}", in_chain), &format!("{} ", out_chain));

    let swap_num = truncate_chars(&format_commas(stats.swap_count as i64), 7);
    let footer = row(&format!(
        " #{}  ·  {}",
        swap_num,
        format_card_time(tx.created_at_timestamp)
    ));

    [
        border('╔', '╗'),
        header,
        border('╠', '╣'),
        amounts,
        chains,
        border('╠', '╣'),
        footer,
        border('╚', '╝'),
    ]
    .join("\n")
}

/// Full HTML message: the card plus addresses and chain hashes
pub fn render_message(card: &str, tx: &Transaction) -> String {
    let mut msg = format!("<pre>{}</pre>", escape_html(card));

    if let Some(sender) = tx.first_sender() {
        msg.push_str(&format!("\nFrom: <code>{}</code>", escape_html(sender)));
    }
    if !tx.recipient.is_empty() {
        msg.push_str(&format!("\nTo:   <code>{}</code>", escape_html(&tx.recipient)));
    }
    if let Some(hash) = tx.first_origin_hash() {
        msg.push_str(&format!("\n\nSRC:  <code>{}</code>", escape_html(hash)));
    }
    if let Some(hash) = tx.first_destination_hash() {
        msg.push_str(&format!("\nDST:  <code>{}</code>", escape_html(hash)));
    }
    if let Some(hash) = tx.first_near_hash() {
        let hash = escape_html(hash);
        msg.push_str(&format!(
            "\nNEAR: <a href=\"{}{}\">{}</a>",
            NEAR_TX_URL, hash, hash
        ));
    }

    msg
}

/// Explorer link for a NEAR transaction hash
pub fn near_tx_url(hash: &str) -> String {
    format!("{}{}", NEAR_TX_URL, hash)
}

/// Thread title: `$24,210 Profit · Swap.my`
pub fn thread_title(display_name: &str, total_fee_usd: f64) -> String {
    format!("{} Profit · {}", format_usd(total_fee_usd), display_name)
}

/// Byte offset of the first bare `$` (one not followed by a digit)
fn placeholder_offset(description: &str) -> Option<usize> {
    description.match_indices('$').map(|(i, _)| i).find(|&i| {
        !description[i + 1..]
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
    })
}

/// Replace the first bare `$` placeholder in a channel description with the
/// formatted total. `None` when no placeholder is left; an amount written by
/// an earlier pass (`$12.50`) is not a placeholder.
pub fn substitute_total(description: &str, total_fee_usd: f64) -> Option<String> {
    let at = placeholder_offset(description)?;
    Some(format!(
        "{}{}{}",
        &description[..at],
        format_usd(total_fee_usd),
        &description[at + 1..]
    ))
}
