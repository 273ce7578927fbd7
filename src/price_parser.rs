use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

const DOLLAR_CURRENCIES: [&str; 5] = ["USD", "AUD", "CAD", "NZD", "SGD"];
const ISO_CODES: [&str; 12] = [
    "USD", "AUD", "CAD", "NZD", "SGD", "GBP", "EUR", "JPY", "INR", "KRW", "CNY", "CHF",
];

/// Where a price was found; used to resolve ambiguous or missing currency symbols.
#[derive(Debug, Clone, Default)]
pub struct WebsiteContext {
    pub url: String,
    /// `<html lang>` of the page
    pub lang: Option<String>,
}

impl WebsiteContext {
    pub fn new(url: impl Into<String>, lang: Option<String>) -> Self {
        Self { url: url.into(), lang }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrice {
    pub amount: Decimal,
    pub currency: String,
}

pub struct PriceParser {
    number_regex: Regex,
    iso_regex: Regex,
    symbols: Vec<(&'static str, &'static str)>,
    locale_currency: HashMap<&'static str, &'static str>,
    url_patterns: Vec<(Regex, &'static str)>,
    domain_patterns: Vec<(Regex, &'static str)>,
    default_currency: String,
}

impl Default for PriceParser {
    fn default() -> Self {
        Self::new("USD")
    }
}

impl PriceParser {
    pub fn new(default_currency: &str) -> Self {
        // Longest symbols first so "US$" wins over "$".
        let symbols = vec![
            ("USD$", "USD"),
            ("US$", "USD"),
            ("AU$", "AUD"),
            ("CA$", "CAD"),
            ("NZ$", "NZD"),
            ("A$", "AUD"),
            ("C$", "CAD"),
            ("£", "GBP"),
            ("€", "EUR"),
            ("¥", "JPY"),
            ("₹", "INR"),
            ("₩", "KRW"),
        ];

        let locale_currency: HashMap<&'static str, &'static str> = [
            ("en-au", "AUD"),
            ("en-us", "USD"),
            ("en-gb", "GBP"),
            ("en-ca", "CAD"),
            ("en-nz", "NZD"),
            ("fr-fr", "EUR"),
            ("de-de", "EUR"),
            ("es-es", "EUR"),
            ("it-it", "EUR"),
            ("ja-jp", "JPY"),
            ("ja", "JPY"),
            ("ko-kr", "KRW"),
            ("zh-cn", "CNY"),
            ("hi-in", "INR"),
            ("de", "EUR"),
            ("fr", "EUR"),
        ]
        .into_iter()
        .collect();

        let url_patterns = [
            (r"/en-au/|/au/|/australia/", "AUD"),
            (r"/en-us/|/us/|/usa/", "USD"),
            (r"/en-gb/|/gb/|/uk/", "GBP"),
            (r"/en-ca/|/ca/|/canada/", "CAD"),
            (r"/de/|/fr/|/es/|/it/", "EUR"),
            (r"/jp/|/japan/", "JPY"),
            (r"/in/|/india/", "INR"),
        ];

        let domain_patterns = [
            (r"\.com\.au$|\.au$", "AUD"),
            (r"\.co\.uk$|\.uk$", "GBP"),
            (r"\.ca$", "CAD"),
            (r"\.co\.nz$|\.nz$", "NZD"),
            (r"\.de$|\.fr$|\.es$|\.it$|\.nl$", "EUR"),
            (r"\.co\.jp$|\.jp$", "JPY"),
            (r"\.in$", "INR"),
            (r"\.com$|\.us$", "USD"),
        ];

        Self {
            number_regex: Regex::new(r"\d{1,3}(?:[.,]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?")
                .expect("price regex is valid"),
            iso_regex: Regex::new(&format!(r"\b({})\b", ISO_CODES.join("|")))
                .expect("currency regex is valid"),
            symbols,
            locale_currency,
            url_patterns: compile(&url_patterns),
            domain_patterns: compile(&domain_patterns),
            default_currency: default_currency.to_uppercase(),
        }
    }

    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    /// Extracts the first price in `text`.
    pub fn parse(&self, text: &str, context: Option<&WebsiteContext>) -> Option<ParsedPrice> {
        let raw = self.number_regex.find(text)?.as_str();
        let amount = Decimal::from_str(&normalize_number(raw)).ok()?;
        let currency = self.resolve_currency(text, context);
        Some(ParsedPrice { amount, currency })
    }

    fn resolve_currency(&self, text: &str, context: Option<&WebsiteContext>) -> String {
        if let Some(code) = self.explicit_currency(text) {
            return code.to_string();
        }

        let inferred = context.and_then(|ctx| self.infer_from_website(ctx));

        if text.contains('$') {
            return match inferred {
                Some(code) if DOLLAR_CURRENCIES.contains(&code) => code.to_string(),
                _ => self.dollar_default().to_string(),
            };
        }

        inferred
            .map(str::to_string)
            .unwrap_or_else(|| self.default_currency.clone())
    }

    fn explicit_currency(&self, text: &str) -> Option<&'static str> {
        if let Some((_, code)) = self.symbols.iter().find(|(symbol, _)| text.contains(symbol)) {
            return Some(*code);
        }
        let upper = text.to_uppercase();
        let caps = self.iso_regex.captures(&upper)?;
        let found = caps.get(1)?.as_str();
        ISO_CODES.into_iter().find(|code| *code == found)
    }

    fn dollar_default(&self) -> &str {
        if DOLLAR_CURRENCIES.contains(&self.default_currency.as_str()) {
            &self.default_currency
        } else {
            "USD"
        }
    }

    fn infer_from_website(&self, context: &WebsiteContext) -> Option<&'static str> {
        let url = context.url.to_lowercase();

        if let Some((_, code)) = self.url_patterns.iter().find(|(re, _)| re.is_match(&url)) {
            return Some(*code);
        }

        if let Some(lang) = &context.lang {
            if let Some(code) = self.locale_currency.get(lang.to_lowercase().as_str()) {
                return Some(*code);
            }
        }

        let host = url::Url::parse(&url).ok()?.host_str()?.to_string();
        self.domain_patterns
            .iter()
            .find(|(re, _)| re.is_match(&host))
            .map(|(_, code)| *code)
    }
}

fn compile(patterns: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    patterns
        .iter()
        .filter_map(|(pattern, code)| Regex::new(pattern).ok().map(|re| (re, *code)))
        .collect()
}

/// "1,299.99" -> "1299.99", "1.299,00" -> "1299.00", "12,99" -> "12.99", "1,299" -> "1299".
fn normalize_number(raw: &str) -> String {
    let decimal_sep = raw
        .rfind(['.', ','])
        .filter(|idx| {
            let digits_after = raw.len() - idx - 1;
            digits_after == 1 || digits_after == 2
        });

    let mut out = String::with_capacity(raw.len());
    for (idx, c) in raw.char_indices() {
        match decimal_sep {
            Some(sep_idx) if idx == sep_idx => out.push('.'),
            _ if c == '.' || c == ',' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Renders a price with its symbol when one is known, e.g. `$19.99` or `12.00 CHF`.
pub fn format_price(amount: Decimal, currency: &str) -> String {
    let symbol = match currency {
        "USD" => Some("$"),
        "AUD" => Some("A$"),
        "CAD" => Some("C$"),
        "GBP" => Some("£"),
        "EUR" => Some("€"),
        "JPY" => Some("¥"),
        "INR" => Some("₹"),
        _ => None,
    };
    match symbol {
        Some(symbol) => format!("{}{:.2}", symbol, amount),
        None => format!("{:.2} {}", amount, currency),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[rstest]
    #[case("$19.99", "19.99")]
    #[case("$1,299.99", "1299.99")]
    #[case("Now only 1299.99!", "1299.99")]
    #[case("12,99 €", "12.99")]
    #[case("€1.299,00", "1299.00")]
    #[case("£1,299", "1299")]
    #[case("  49 ", "49")]
    fn test_amount_extraction(#[case] text: &str, #[case] expected: &str) {
        let parser = PriceParser::new("USD");
        let parsed = parser.parse(text, None).unwrap();
        assert_eq!(parsed.amount, dec(expected));
    }

    #[test]
    fn test_parse_failure() {
        let parser = PriceParser::new("USD");
        assert!(parser.parse("not a price", None).is_none());
    }

    #[rstest]
    #[case("$19.99", "USD")]
    #[case("US$19.99", "USD")]
    #[case("A$19.99", "AUD")]
    #[case("€50.00", "EUR")]
    #[case("£50.00", "GBP")]
    #[case("¥5000", "JPY")]
    #[case("CHF 12.50", "CHF")]
    #[case("19.99", "USD")]
    fn test_currency_from_text(#[case] text: &str, #[case] expected: &str) {
        let parser = PriceParser::new("USD");
        assert_eq!(parser.parse(text, None).unwrap().currency, expected);
    }

    #[test]
    fn test_dollar_default_follows_configured_currency() {
        assert_eq!(PriceParser::new("AUD").parse("$19.99", None).unwrap().currency, "AUD");
        assert_eq!(PriceParser::new("EUR").parse("$19.99", None).unwrap().currency, "USD");
        assert_eq!(PriceParser::new("EUR").parse("19.99", None).unwrap().currency, "EUR");
    }

    #[test]
    fn test_currency_detection_from_url() {
        let parser = PriceParser::new("EUR");

        let au = WebsiteContext::new("https://example.com.au/products/item", None);
        assert_eq!(parser.parse("25.99", Some(&au)).unwrap().currency, "AUD");

        let us = WebsiteContext::new("https://example.com/en-us/products/item", None);
        assert_eq!(parser.parse("25.99", Some(&us)).unwrap().currency, "USD");

        let uk = WebsiteContext::new("https://example.co.uk/products/item", None);
        assert_eq!(parser.parse("25.99", Some(&uk)).unwrap().currency, "GBP");
    }

    #[test]
    fn test_currency_detection_from_lang() {
        let parser = PriceParser::new("USD");
        let context = WebsiteContext::new("https://example.xyz/item", Some("en-AU".to_string()));

        assert_eq!(parser.parse("$25.99", Some(&context)).unwrap().currency, "AUD");
    }

    #[test]
    fn test_explicit_symbol_wins_over_context() {
        let parser = PriceParser::new("EUR");
        let context = WebsiteContext::new("https://example.com.au/item", Some("en-AU".to_string()));

        assert_eq!(parser.parse("US$25.99", Some(&context)).unwrap().currency, "USD");
    }

    #[test]
    fn test_currency_fallback_to_default() {
        let parser = PriceParser::new("EUR");
        let context = WebsiteContext::new("https://unknown-domain.xyz/products/item", None);

        assert_eq!(parser.parse("25.99", Some(&context)).unwrap().currency, "EUR");
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(dec("19.9"), "USD"), "$19.90");
        assert_eq!(format_price(dec("50"), "EUR"), "€50.00");
        assert_eq!(format_price(dec("12.5"), "CHF"), "12.50 CHF");
    }
}
