//! Fee and label resolution for explorer transactions
//!
//! Pure and deterministic: no network, no clock. The label rules are two
//! declarative tables plus a fallback:
//!
//! 1. Known-token table, exact asset id -> (ticker, chain code).
//! 2. Unknown ids follow `namespace:body`. The ticker is the namespace, or
//!    for `nep141` the body up to the first `.`. Bridged NEP-141 bodies
//!    (`<chain>[-<contract>].omft.near`) take their chain from the body's
//!    leading segment, everything else from the namespace.
//! 3. Chain codes map through the chain-name table, otherwise uppercase.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::config::KnownTokenConfig;
use crate::models::Transaction;

/// Basis points per unit
const BPS_DENOMINATOR: f64 = 10_000.0;

/// NEP-141 namespace prefix used by NEAR intents asset ids
const NEP141: &str = "nep141";

/// Suffix of bridged (omni fungible token) NEP-141 contracts
const OMFT_SUFFIX: &str = ".omft.near";

/// Sum of all fee-schedule basis points on a transaction
pub fn total_bps(tx: &Transaction) -> u64 {
    tx.app_fees.iter().map(|f| u64::from(f.fee)).sum()
}

/// Fee taken from a transaction in USD: notional x (bps / 10000)
pub fn fee_usd(tx: &Transaction) -> f64 {
    let bps = total_bps(tx);
    if bps == 0 || tx.amount_in_usd == 0.0 {
        return 0.0;
    }
    tx.amount_in_usd * bps as f64 / BPS_DENOMINATOR
}

static CHAIN_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("eth", "Ethereum"),
        ("btc", "Bitcoin"),
        ("sol", "Solana"),
        ("base", "Base"),
        ("arb", "Arbitrum"),
        ("ton", "TON"),
        ("tron", "TRON"),
        ("trx", "TRON"),
        ("bsc", "BNB Chain"),
        ("pol", "Polygon"),
        ("op", "Optimism"),
        ("avax", "Avalanche"),
        ("near", "NEAR"),
        ("sui", "Sui"),
        ("doge", "Dogecoin"),
        ("ltc", "Litecoin"),
        ("xrp", "XRP"),
        ("bch", "Bitcoin Cash"),
        ("xlm", "Stellar"),
        ("nep141", "NEAR"),
    ])
});

/// Built-in known tokens: asset id, ticker, chain code
const DEFAULT_TOKENS: &[(&str, &str, &str)] = &[
    ("nep141:wrap.near", "NEAR", "near"),
    ("nep141:eth.omft.near", "ETH", "eth"),
    ("nep141:btc.omft.near", "BTC", "btc"),
    ("nep141:sol.omft.near", "SOL", "sol"),
    ("nep141:base.omft.near", "ETH", "base"),
    ("nep141:arb.omft.near", "ETH", "arb"),
    ("nep141:doge.omft.near", "DOGE", "doge"),
    ("nep141:xrp.omft.near", "XRP", "xrp"),
    ("nep141:zec.omft.near", "ZEC", "zec"),
    ("nep141:usdt.tether-token.near", "USDT", "near"),
    (
        "nep141:17208628f84f5d6ad33f0da3bbbeb27ffcb398eac501a31bd6ad2011e36133a1",
        "USDC",
        "near",
    ),
    (
        "nep141:eth-0xdac17f958d2ee523a2206206994597c13d831ec7.omft.near",
        "USDT",
        "eth",
    ),
    (
        "nep141:eth-0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.omft.near",
        "USDC",
        "eth",
    ),
    (
        "nep141:tron-d28a265909efecdcee7c5028585214ea0b96f015.omft.near",
        "USDT",
        "tron",
    ),
    (
        "nep141:sol-5ce3bf3a31af18be40ba30f721101b4341690186.omft.near",
        "USDC",
        "sol",
    ),
];

#[derive(Debug, Clone)]
struct KnownToken {
    ticker: String,
    chain: String,
}

/// Human-readable chain name for a chain code
pub fn chain_name(code: &str) -> String {
    let lower = code.to_lowercase();
    match CHAIN_NAMES.get(lower.as_str()) {
        Some(name) => (*name).to_string(),
        None => code.to_uppercase(),
    }
}

/// Resolves asset ids to display tickers and chain names
#[derive(Debug, Clone)]
pub struct LabelResolver {
    known: HashMap<String, KnownToken>,
}

impl LabelResolver {
    /// Resolver with the built-in table only
    pub fn new() -> Self {
        let known = DEFAULT_TOKENS
            .iter()
            .map(|(id, ticker, chain)| {
                (
                    (*id).to_string(),
                    KnownToken {
                        ticker: (*ticker).to_string(),
                        chain: (*chain).to_string(),
                    },
                )
            })
            .collect();
        Self { known }
    }

    /// Resolver with the built-in table extended (or overridden) by config
    pub fn with_tokens(extra: &[KnownTokenConfig]) -> Self {
        let mut resolver = Self::new();
        for token in extra {
            resolver.known.insert(
                token.asset_id.clone(),
                KnownToken {
                    ticker: token.ticker.clone(),
                    chain: token.chain.clone(),
                },
            );
        }
        resolver
    }

    /// Ticker label for an asset id
    pub fn asset_label(&self, asset_id: &str) -> String {
        if let Some(token) = self.known.get(asset_id) {
            if !token.ticker.is_empty() {
                return token.ticker.clone();
            }
        }

        match asset_id.split_once(':') {
            Some((namespace, body)) if namespace.eq_ignore_ascii_case(NEP141) => {
                let head = body.split('.').next().unwrap_or(body);
                head.to_uppercase()
            }
            Some((namespace, _)) => namespace.to_uppercase(),
            None => asset_id.to_uppercase(),
        }
    }

    /// Chain display name for an asset id
    pub fn chain_label(&self, asset_id: &str) -> String {
        if let Some(token) = self.known.get(asset_id) {
            if !token.chain.is_empty() {
                return chain_name(&token.chain);
            }
        }

        match asset_id.split_once(':') {
            Some((namespace, body)) if namespace.eq_ignore_ascii_case(NEP141) => {
                match body.strip_suffix(OMFT_SUFFIX) {
                    Some(bridged) => {
                        let code = bridged.split(['-', '.']).next().unwrap_or(bridged);
                        chain_name(code)
                    }
                    None => chain_name(namespace),
                }
            }
            Some((namespace, _)) => chain_name(namespace),
            None => chain_name(asset_id),
        }
    }
}

impl Default for LabelResolver {
    fn default() -> Self {
        Self::new()
    }
}
