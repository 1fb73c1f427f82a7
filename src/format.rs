//! Display formatting for currency amounts and on-chain identifiers.

/// `$1.50B`, `$2.50M`, `$1.20K`, `$999.00`.
pub fn format_currency(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1e9 {
        format!("${:.2}B", value / 1e9)
    } else if abs >= 1e6 {
        format!("${:.2}M", value / 1e6)
    } else if abs >= 1e3 {
        format!("${:.2}K", value / 1e3)
    } else {
        format!("${:.2}", value)
    }
}

/// Plain two-decimal dollar amount, used in the transactions listing.
pub fn format_usd(value: f64) -> String {
    format!("${:.2}", value)
}

/// First 6 characters + "..." + last 4. Strings too short to elide are returned as is.
pub fn elide_hex(s: &str) -> String {
    if s.len() <= 10 || !s.is_ascii() {
        return s.to_string();
    }
    format!("{}...{}", &s[..6], &s[s.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_suffixes() {
        assert_eq!(format_currency(1_500_000_000.0), "$1.50B");
        assert_eq!(format_currency(2_500_000.0), "$2.50M");
        assert_eq!(format_currency(1_200.0), "$1.20K");
        assert_eq!(format_currency(999.0), "$999.00");
        assert_eq!(format_currency(0.0), "$0.00");
    }

    #[test]
    fn currency_boundaries() {
        assert_eq!(format_currency(1_000.0), "$1.00K");
        assert_eq!(format_currency(1_000_000.0), "$1.00M");
        assert_eq!(format_currency(1_000_000_000.0), "$1.00B");
    }

    #[test]
    fn negative_amounts_keep_their_suffix() {
        assert_eq!(format_currency(-2_500_000.0), "$-2.50M");
    }

    #[test]
    fn wallet_address_elision() {
        let addr = format!("0xAAAA{}BBBB", "0".repeat(32));
        assert_eq!(addr.len(), 42);
        assert_eq!(elide_hex(&addr), "0xAAAA...BBBB");

        let hash = format!("0x{}", "f".repeat(64));
        assert_eq!(elide_hex(&hash), "0xffff...ffff");
    }

    #[test]
    fn short_strings_are_untouched() {
        assert_eq!(elide_hex("0x1234"), "0x1234");
    }
}
