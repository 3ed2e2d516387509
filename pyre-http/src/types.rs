//! Route tables: which endpoints are priced, at what USD price, and which
//! are free.
//!
//! Patterns are `"METHOD /path"` or just `"/path"` (any method). Paths
//! support a trailing `/*` wildcard and a bare `*` matching everything.

use pyre::pricing::EndpointQuote;
use rust_decimal::Decimal;

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompiledRoute {
    /// HTTP method (uppercase) or `"*"` for any method.
    pub method: String,
    /// Path pattern (e.g., `/api/data/weather`, `/api/ai/*`).
    pub path_pattern: String,
}

impl CompiledRoute {
    pub fn parse(pattern: &str) -> Self {
        let (method, path_pattern) = parse_route_pattern(pattern);
        Self {
            method,
            path_pattern,
        }
    }

    /// Checks whether this route matches the given method and path.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        if self.method != "*" && !self.method.eq_ignore_ascii_case(method) {
            return false;
        }
        match_path_pattern(&self.path_pattern, path)
    }

    /// Glob patterns match more than one path and lose to exact ones.
    fn is_wildcard(&self) -> bool {
        self.path_pattern.ends_with('*')
    }
}

/// Simple glob-style path matching.
///
/// - Exact match: `/api/health` matches `/api/health` and `/api/health/`
/// - Trailing wildcard: `/api/ai/*` matches `/api/ai` and `/api/ai/chat`
/// - Full wildcard: `*` matches everything
fn match_path_pattern(pattern: &str, path: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let normalized_path = path.split('?').next().unwrap_or(path);
    let normalized_path = normalized_path.trim_end_matches('/');
    let normalized_pattern = pattern.trim_end_matches('/');

    if let Some(prefix) = normalized_pattern.strip_suffix("/*") {
        normalized_path.eq_ignore_ascii_case(prefix)
            || normalized_path
                .get(..=prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(&format!("{prefix}/")))
    } else {
        normalized_path.eq_ignore_ascii_case(normalized_pattern)
    }
}

/// Parses a route pattern string into method + path.
///
/// - `"GET /weather"` → method=`GET`, path=`/weather`
/// - `"/weather"` → method=`*`, path=`/weather`
fn parse_route_pattern(pattern: &str) -> (String, String) {
    let trimmed = pattern.trim();
    if let Some((method, path)) = trimmed.split_once(char::is_whitespace) {
        (method.to_uppercase(), path.trim().to_owned())
    } else {
        ("*".to_owned(), trimmed.to_owned())
    }
}

/// USD price per call for each metered route.
#[derive(Debug, Clone, Default)]
pub struct RoutePricing {
    routes: Vec<(CompiledRoute, Decimal)>,
    default_price: Option<Decimal>,
}

impl RoutePricing {
    /// Creates an empty table. Unmatched routes have no price.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The launch price list of the PYRE marketplace.
    #[must_use]
    pub fn pyre_defaults() -> Self {
        [
            ("/api/ai/chat", Decimal::new(5, 2)),
            ("/api/ai/image", Decimal::new(10, 2)),
            ("/api/ai/translate", Decimal::new(3, 2)),
            ("/api/ai/tts", Decimal::new(8, 2)),
            ("/api/ai/vision", Decimal::new(15, 2)),
            ("/api/data/weather", Decimal::new(1, 2)),
            ("/api/data/crypto", Decimal::new(2, 2)),
            ("/api/data/stock", Decimal::new(2, 2)),
            ("/api/data/news", Decimal::new(25, 3)),
            ("/api/tools/qrcode", Decimal::new(5, 3)),
            ("/api/tools/screenshot", Decimal::new(5, 2)),
            ("/api/tools/pdf", Decimal::new(8, 2)),
            ("/api/premium/content", Decimal::ONE),
            ("/api/premium/analytics", Decimal::new(50, 2)),
        ]
        .into_iter()
        .collect()
    }

    /// Prices calls matching `pattern` at `usd_price`.
    #[must_use]
    pub fn with_route(mut self, pattern: &str, usd_price: Decimal) -> Self {
        self.routes.push((CompiledRoute::parse(pattern), usd_price));
        self
    }

    /// Appends the entries of `other` whose pattern this table lacks.
    ///
    /// Entries already present keep their price and precedence. The default
    /// price of `other` is used only if this table has none.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        for (route, usd) in other.routes {
            if !self.routes.iter().any(|(existing, _)| *existing == route) {
                self.routes.push((route, usd));
            }
        }
        self.default_price = self.default_price.or(other.default_price);
        self
    }

    /// Price of routes that match no entry.
    #[must_use]
    pub const fn with_default_price(mut self, usd_price: Option<Decimal>) -> Self {
        self.default_price = usd_price;
        self
    }

    /// Returns the USD price of a call, if the route is priced.
    ///
    /// Exact patterns take precedence over wildcard patterns; within each
    /// kind the first registered entry wins.
    #[must_use]
    pub fn price_for(&self, method: &str, path: &str) -> Option<Decimal> {
        let mut matching = self
            .routes
            .iter()
            .filter(|(route, _)| route.matches(method, path));
        let (route, price) = matching.next()?;
        if route.is_wildcard()
            && let Some((_, exact)) = matching.find(|(route, _)| !route.is_wildcard())
        {
            return Some(*exact);
        }
        Some(*price)
    }

    /// Like [`RoutePricing::price_for`], falling back to the default price.
    #[must_use]
    pub fn resolve(&self, method: &str, path: &str) -> Option<Decimal> {
        self.price_for(method, path).or(self.default_price)
    }

    /// Quotes every priced route at `token_price`.
    #[must_use]
    pub fn quotes(&self, token_price: Decimal, burn_percent: u8) -> Vec<EndpointQuote> {
        self.routes
            .iter()
            .map(|(route, usd)| {
                EndpointQuote::new(route.path_pattern.clone(), *usd, token_price, burn_percent)
            })
            .collect()
    }

    /// Number of priced routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no route is priced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<P: AsRef<str>> FromIterator<(P, Decimal)> for RoutePricing {
    fn from_iter<I: IntoIterator<Item = (P, Decimal)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |table, (pattern, usd)| {
                table.with_route(pattern.as_ref(), usd)
            })
    }
}

/// Routes that bypass the payment gate entirely.
#[derive(Debug, Clone, Default)]
pub struct FreeRoutes {
    routes: Vec<CompiledRoute>,
}

impl FreeRoutes {
    /// Creates an empty allow-list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The public PYRE endpoints.
    #[must_use]
    pub fn pyre_defaults() -> Self {
        [
            "/api/health",
            "/api/info",
            "/api/token/price",
            "/api/token/burn-stats",
            "/api/token/balance",
        ]
        .into_iter()
        .collect()
    }

    /// Lets calls matching `pattern` through without payment.
    #[must_use]
    pub fn with_route(mut self, pattern: &str) -> Self {
        self.routes.push(CompiledRoute::parse(pattern));
        self
    }

    /// Returns `true` if the call needs no payment.
    #[must_use]
    pub fn matches(&self, method: &str, path: &str) -> bool {
        self.routes.iter().any(|route| route.matches(method, path))
    }
}

impl<P: AsRef<str>> FromIterator<P> for FreeRoutes {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |routes, pattern| routes.with_route(pattern.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route_pattern() {
        assert_eq!(
            parse_route_pattern("get /api/data/time"),
            ("GET".to_owned(), "/api/data/time".to_owned())
        );
        assert_eq!(
            parse_route_pattern(" /api/health "),
            ("*".to_owned(), "/api/health".to_owned())
        );
    }

    #[test]
    fn test_match_path_pattern() {
        assert!(match_path_pattern("*", "/anything"));
        assert!(match_path_pattern("/api/health", "/api/health/"));
        assert!(match_path_pattern("/api/health", "/API/Health?verbose=1"));
        assert!(match_path_pattern("/api/ai/*", "/api/ai"));
        assert!(match_path_pattern("/api/ai/*", "/api/ai/chat/stream"));
        assert!(!match_path_pattern("/api/ai/*", "/api/aix"));
        assert!(!match_path_pattern("/api/health", "/api/healthz"));
    }

    #[test]
    fn test_method_filter() {
        let route = CompiledRoute::parse("POST /api/ai/chat");
        assert!(route.matches("post", "/api/ai/chat"));
        assert!(!route.matches("GET", "/api/ai/chat"));
    }

    #[test]
    fn test_exact_price_beats_wildcard() {
        let table = RoutePricing::new()
            .with_route("/api/ai/*", Decimal::new(5, 2))
            .with_route("/api/ai/vision", Decimal::new(15, 2));
        assert_eq!(table.price_for("GET", "/api/ai/vision"), Some(Decimal::new(15, 2)));
        assert_eq!(table.price_for("GET", "/api/ai/chat"), Some(Decimal::new(5, 2)));
        assert_eq!(table.price_for("GET", "/api/data/weather"), None);
    }

    #[test]
    fn test_default_price() {
        let table = RoutePricing::new().with_default_price(Some(Decimal::new(1, 2)));
        assert_eq!(table.price_for("GET", "/api/other"), None);
        assert_eq!(table.resolve("GET", "/api/other"), Some(Decimal::new(1, 2)));
    }

    #[test]
    fn test_pyre_defaults() {
        let table = RoutePricing::pyre_defaults();
        assert_eq!(table.len(), 14);
        assert_eq!(table.resolve("GET", "/api/data/news"), Some(Decimal::new(25, 3)));
        assert_eq!(table.resolve("GET", "/api/premium/content"), Some(Decimal::ONE));

        let free = FreeRoutes::pyre_defaults();
        assert!(free.matches("GET", "/api/token/price"));
        assert!(free.matches("GET", "/api/token/balance"));
        assert!(!free.matches("GET", "/api/ai/chat"));
    }

    #[test]
    fn test_quotes() {
        let quotes = RoutePricing::pyre_defaults().quotes(Decimal::new(1, 3), 30);
        let chat = quotes.iter().find(|q| q.endpoint == "/api/ai/chat").unwrap();
        assert_eq!(chat.token_amount, Some(50));
        assert_eq!(chat.burn_amount, Some(15));
        assert_eq!(chat.category, "ai");
        assert!(chat.available);
    }

    #[test]
    fn test_merge_keeps_existing_entries() {
        let table = RoutePricing::new()
            .with_route("/api/ai/chat", Decimal::new(7, 2))
            .merge(RoutePricing::pyre_defaults());
        assert_eq!(table.len(), 14);
        assert_eq!(table.resolve("GET", "/api/ai/chat"), Some(Decimal::new(7, 2)));
        assert_eq!(table.resolve("GET", "/api/ai/tts"), Some(Decimal::new(8, 2)));
    }
}
