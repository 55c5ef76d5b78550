//! Keyword categorizer.
//!
//! Pure function of the market question: blacklists trend-prediction
//! phrasing, gates crypto questions on an event catalyst, then scores
//! each category by keyword hits.

use pulse_core::Category;

/// Trend-prediction phrasing that is never worth monitoring.
const BLACKLIST_PHRASES: [&str; 10] = [
    "price prediction",
    "hit $",
    "reach $",
    "trading above",
    "trading below",
    "close above",
    "close below",
    "all time high",
    "all-time high",
    "market cap",
];

/// Crypto markers that demand an event catalyst.
const CRYPTO_TERMS: [&str; 10] = [
    "btc", "bitcoin", "eth", "ethereum", "solana", "xrp", "dogecoin", "crypto", "altcoin",
    "stablecoin",
];

/// Catalyst phrases that rescue a crypto question.
const CRYPTO_CATALYSTS: [&str; 12] = [
    "etf",
    "approval",
    "approve",
    "fork",
    "halving",
    "listing",
    "regulation",
    "lawsuit",
    "sec",
    "upgrade",
    "hack",
    "reserve",
];

fn keywords(category: Category) -> &'static [&'static str] {
    match category {
        Category::Politics => &[
            "election",
            "president",
            "senate",
            "congress",
            "governor",
            "primary",
            "nominee",
            "impeach",
            "parliament",
            "prime minister",
            "ballot",
        ],
        Category::Fed => &[
            "fed",
            "fomc",
            "federal reserve",
            "interest rate",
            "rate cut",
            "rate hike",
            "powell",
            "basis points",
        ],
        Category::Earnings => &[
            "earnings",
            "revenue",
            "eps",
            "quarterly",
            "guidance",
            "q1",
            "q2",
            "q3",
            "q4",
        ],
        Category::CeoChanges => &["ceo", "chief executive", "resign", "step down", "successor"],
        Category::Mergers => &[
            "merger",
            "acquisition",
            "acquire",
            "buyout",
            "takeover",
            "antitrust",
        ],
        Category::SportsAwards => &[
            "mvp",
            "heisman",
            "ballon d'or",
            "hall of fame",
            "rookie of the year",
            "coach of the year",
        ],
        Category::CourtCases => &[
            "trial",
            "verdict",
            "guilty",
            "conviction",
            "sentenced",
            "supreme court",
            "indicted",
            "appeal",
        ],
        Category::HollywoodAwards => &[
            "oscar",
            "academy award",
            "emmy",
            "golden globe",
            "grammy",
            "best picture",
            "best actor",
            "best actress",
        ],
        Category::EconomicData => &[
            "cpi",
            "inflation",
            "gdp",
            "unemployment",
            "jobs report",
            "nonfarm",
            "payroll",
            "retail sales",
        ],
        Category::WorldEvents => &[
            "ceasefire",
            "treaty",
            "invasion",
            "sanctions",
            "nato",
            "united nations",
            "summit",
        ],
        Category::Macro => &[
            "recession",
            "debt ceiling",
            "shutdown",
            "tariff",
            "trade deal",
            "default",
        ],
        Category::CryptoEvents => &[
            "etf", "halving", "fork", "listing", "airdrop", "upgrade",
        ],
        Category::Pardons => &["pardon", "commute", "clemency"],
    }
}

/// Categorizer output.
#[derive(Debug, Clone, PartialEq)]
pub struct Categorization {
    pub category: Option<Category>,
    pub score: f64,
    pub blacklisted: bool,
    pub matched_keywords: Vec<String>,
}

impl Categorization {
    fn rejected(blacklisted: bool) -> Self {
        Self {
            category: None,
            score: 0.0,
            blacklisted,
            matched_keywords: Vec::new(),
        }
    }
}

/// Whether `needle` occurs in `haystack` at word boundaries.
fn word_boundary_hit(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !haystack[..abs]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after = abs + needle.len();
        let after_ok = after >= haystack.len()
            || !haystack[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = abs + 1;
    }
    false
}

/// Categorize a market question. Deterministic and pure.
pub fn categorize(question: &str) -> Categorization {
    let q = question.to_lowercase();

    if BLACKLIST_PHRASES.iter().any(|p| q.contains(p)) {
        return Categorization::rejected(true);
    }

    // Crypto questions must name an event catalyst.
    let is_crypto = CRYPTO_TERMS.iter().any(|t| word_boundary_hit(&q, t));
    if is_crypto && !CRYPTO_CATALYSTS.iter().any(|c| q.contains(c)) {
        return Categorization::rejected(true);
    }

    let mut best: Option<(Category, f64, Vec<String>)> = None;
    for category in Category::ALL {
        let mut score = 0.0;
        let mut matched = Vec::new();
        for kw in keywords(category) {
            if q.contains(kw) {
                score += 1.0;
                if word_boundary_hit(&q, kw) {
                    score += 0.5;
                }
                matched.push((*kw).to_string());
            }
        }
        if score > best.as_ref().map(|(_, s, _)| *s).unwrap_or(0.0) {
            best = Some((category, score, matched));
        }
    }

    match best {
        Some((category, score, matched)) if score >= 1.0 => Categorization {
            category: Some(category),
            score,
            blacklisted: false,
            matched_keywords: matched,
        },
        _ => Categorization::rejected(false),
    }
}
