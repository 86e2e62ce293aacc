use std::str::FromStr;
use std::sync::LazyLock;

use hivemind_models::Action;
use regex::Regex;
use rust_decimal::Decimal;

/// Confidence assumed when a reply carries no percentage at all.
pub const DEFAULT_CONFIDENCE: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// `CONFIDENCE: 80%`, `confidence 80 %`, `CONFIDENCE: [72.5]%`
static LABELED_CONFIDENCE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)CONFIDENCE\s*:?\s*\[?\s*(-?\d+(?:\.\d+)?)\s*\]?\s*%").ok()
});

/// First bare `<number>%` anywhere in the text.
static BARE_PERCENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(-?\d+(?:\.\d+)?)\s*%").ok());

/// Map a model reply to a vote.
///
/// Returns `(HOLD, 0)` for missing or blank text; the caller records such a
/// reply as a parse error rather than a vote.
pub fn parse_response(raw_text: Option<&str>) -> (Action, Decimal) {
    match raw_text {
        Some(text) if !text.trim().is_empty() => (parse_action(text), parse_confidence(text)),
        _ => (Action::Hold, Decimal::ZERO),
    }
}

/// Substring scan of the upper-cased text. BUY wins over SELL, SELL over HOLD;
/// no token at all means HOLD.
pub fn parse_action(text: &str) -> Action {
    let upper = text.to_uppercase();
    Action::ALL
        .into_iter()
        .find(|action| upper.contains(action.as_str()))
        .unwrap_or(Action::Hold)
}

/// An explicit `CONFIDENCE` label is preferred over the first bare percentage.
/// The value is divided by 100 and clamped to [0, 1].
pub fn parse_confidence(text: &str) -> Decimal {
    first_capture(&LABELED_CONFIDENCE, text)
        .or_else(|| first_capture(&BARE_PERCENT, text))
        .map(|percent| (percent / Decimal::ONE_HUNDRED).clamp(Decimal::ZERO, Decimal::ONE))
        .unwrap_or(DEFAULT_CONFIDENCE)
}

fn first_capture(pattern: &LazyLock<Option<Regex>>, text: &str) -> Option<Decimal> {
    let regex = pattern.as_ref()?;
    regex
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| parse_number(m.as_str()))
}

/// Numbers too large for `Decimal` saturate to its bounds so they still clamp.
fn parse_number(digits: &str) -> Option<Decimal> {
    if let Ok(value) = Decimal::from_str(digits) {
        return Some(value);
    }
    let value: f64 = digits.parse().ok()?;
    Some(Decimal::try_from(value).unwrap_or(if value.is_sign_negative() {
        Decimal::MIN
    } else {
        Decimal::MAX
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn structured_reply() {
        let text = "RECOMMENDATION: BUY, CONFIDENCE: 85%, REASON: momentum is building";
        assert_eq!(parse_response(Some(text)), (Action::Buy, dec!(0.85)));
    }

    #[test]
    fn no_token_no_percent_is_default_hold() {
        let text = "Market looks mixed, no strong signal";
        assert_eq!(parse_response(Some(text)), (Action::Hold, dec!(0.5)));
    }

    #[test]
    fn buy_beats_sell() {
        assert_eq!(parse_action("Sell the rip or buy the dip?"), Action::Buy);
        assert_eq!(parse_action("SELL now, then HOLD cash"), Action::Sell);
        assert_eq!(parse_action("hold"), Action::Hold);
    }

    #[test]
    fn token_match_is_substring() {
        // "BUYERS" contains BUY
        assert_eq!(parse_action("Buyers are exhausted"), Action::Buy);
    }

    #[test]
    fn labeled_confidence_preferred_over_first_percent() {
        let text = "24h change: -2.3%, volume +40%. RECOMMENDATION: SELL, CONFIDENCE: 80%";
        assert_eq!(parse_confidence(text), dec!(0.80));
    }

    #[test]
    fn bracketed_and_lowercase_label() {
        assert_eq!(parse_confidence("confidence: [72.5]%"), dec!(0.725));
        assert_eq!(parse_confidence("Confidence 64 %"), dec!(0.64));
    }

    #[test]
    fn falls_back_to_first_bare_percent() {
        assert_eq!(parse_confidence("I'd say 70% likely up, maybe 90%"), dec!(0.70));
    }

    #[test]
    fn out_of_range_is_clamped() {
        assert_eq!(parse_confidence("CONFIDENCE: 150%"), Decimal::ONE);
        assert_eq!(parse_confidence("down -2.3% today"), Decimal::ZERO);
    }

    #[test]
    fn oversized_percent_saturates() {
        let text = "RECOMMENDATION: BUY, CONFIDENCE: 100000000000000000000000000000000%";
        assert_eq!(parse_confidence(text), Decimal::ONE);
        assert_eq!(
            parse_confidence("CONFIDENCE: -100000000000000000000000000000000%"),
            Decimal::ZERO
        );
        assert_eq!(parse_confidence("up 99999999999999999999999999999999999.5% lol"), Decimal::ONE);
    }

    #[test]
    fn echoed_template_range_is_not_a_confidence() {
        // "[0-100]%" from the prompt template must not parse as a value
        let text = "RECOMMENDATION: [BUY/SELL/HOLD], CONFIDENCE: [0-100]%";
        assert_eq!(parse_confidence(text), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn empty_or_missing_text() {
        assert_eq!(parse_response(None), (Action::Hold, Decimal::ZERO));
        assert_eq!(parse_response(Some("   \n")), (Action::Hold, Decimal::ZERO));
    }

    #[test]
    fn confidence_always_within_unit_interval() {
        for text in [
            "99999%",
            "-5%",
            "0%",
            "CONFIDENCE: 100%",
            "nothing here",
            "CONFIDENCE: 0.5%",
        ] {
            let c = parse_confidence(text);
            assert!(c >= Decimal::ZERO && c <= Decimal::ONE, "{text} -> {c}");
        }
    }
}
