//! Wage-text normalization.
//!
//! Turns free-text compensation strings such as `"時給 1,200円〜1,500円"` or
//! `"月給 25万円 ~ 30万円"` into a typed [`Compensation`].

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Compensation cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayPeriod {
    Hourly,
    Daily,
    Monthly,
    Annual,
    #[default]
    Unknown,
}

impl PayPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayPeriod::Hourly => "hourly",
            PayPeriod::Daily => "daily",
            PayPeriod::Monthly => "monthly",
            PayPeriod::Annual => "annual",
            PayPeriod::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PayPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PayPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(PayPeriod::Hourly),
            "daily" => Ok(PayPeriod::Daily),
            "monthly" => Ok(PayPeriod::Monthly),
            "annual" => Ok(PayPeriod::Annual),
            "unknown" => Ok(PayPeriod::Unknown),
            _ => Err(format!("Unknown pay period: {}", s)),
        }
    }
}

/// A parsed wage range. `(0, 0, Unknown)` is the unquantified state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compensation {
    pub min: u64,
    pub max: u64,
    pub period: PayPeriod,
}

impl Compensation {
    pub fn is_quantified(&self) -> bool {
        self.min > 0 || self.max > 0
    }

    /// Folds an annual figure into its monthly equivalent (integer division by 12).
    /// Any other period is returned unchanged.
    pub fn fold_annual(self) -> Self {
        match self.period {
            PayPeriod::Annual => Self {
                min: self.min / 12,
                max: self.max / 12,
                period: PayPeriod::Monthly,
            },
            _ => self,
        }
    }
}

/// Vocabulary markers, checked in this order.
const PERIOD_MARKERS: &[(PayPeriod, &[&str])] = &[
    (PayPeriod::Hourly, &["時給"]),
    (PayPeriod::Monthly, &["月給", "月収"]),
    (PayPeriod::Daily, &["日給"]),
    (PayPeriod::Annual, &["年俸", "年収"]),
];

/// Unlabelled amounts below this are assumed hourly.
const HOURLY_CEILING: u64 = 10_000;
/// Unlabelled amounts at or above this are assumed monthly.
const MONTHLY_FLOOR: u64 = 100_000;
/// One "man" (万) is ten thousand yen.
const MAN: u64 = 10_000;

static MAN_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9][0-9,]*(?:\.[0-9]+)?)\s*万").expect("valid man-yen pattern"));

static YEN_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9][0-9,]*)\s*円").expect("valid yen pattern"));

/// Parse a wage string into a [`Compensation`].
///
/// `raw` is the dedicated wage field; `fallback` is the full listing text and is
/// consulted only when `raw` carries no period marker or no amount.
pub fn normalize(raw: &str, fallback: &str) -> Compensation {
    let explicit = detect_period(raw).or_else(|| detect_period(fallback));

    let mut amounts = extract_amounts(raw);
    if amounts.is_empty() {
        amounts = extract_amounts(fallback);
    }

    let Some(&first) = amounts.first() else {
        return Compensation::default();
    };
    let second = amounts.get(1).copied().unwrap_or(first);
    let (min, max) = if second < first {
        (second, first)
    } else {
        (first, second)
    };

    let period = explicit.unwrap_or_else(|| infer_period(min));

    Compensation { min, max, period }
}

/// Finds the first explicit period marker in `text`.
pub fn detect_period(text: &str) -> Option<PayPeriod> {
    PERIOD_MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| text.contains(m)))
        .map(|(period, _)| *period)
}

/// Best-effort guess from magnitude alone; between the two thresholds stays unknown.
fn infer_period(amount: u64) -> PayPeriod {
    if amount == 0 {
        PayPeriod::Unknown
    } else if amount < HOURLY_CEILING {
        PayPeriod::Hourly
    } else if amount >= MONTHLY_FLOOR {
        PayPeriod::Monthly
    } else {
        PayPeriod::Unknown
    }
}

/// Amounts in document order. Ten-thousand-unit amounts win over plain yen amounts.
fn extract_amounts(text: &str) -> Vec<u64> {
    let man: Vec<u64> = MAN_AMOUNT
        .captures_iter(text)
        .filter_map(|c| parse_man(&c[1]))
        .collect();
    if !man.is_empty() {
        return man;
    }

    YEN_AMOUNT
        .captures_iter(text)
        .filter_map(|c| digits_only(&c[1]))
        .collect()
}

fn digits_only(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// `"25"` → 250000, `"23.8"` → 238000. Fractions finer than one yen are truncated.
fn parse_man(text: &str) -> Option<u64> {
    let cleaned = text.replace(',', "");
    let (whole, frac) = cleaned.split_once('.').unwrap_or((&cleaned, ""));
    let whole: u64 = whole.parse().ok()?;

    let mut frac_digits: String = frac.chars().take(4).collect();
    while frac_digits.len() < 4 {
        frac_digits.push('0');
    }
    let frac: u64 = frac_digits.parse().ok()?;

    whole.checked_mul(MAN)?.checked_add(frac)
}
