use axum::http::HeaderMap;

use crate::api::CATEGORY_BOT;
use crate::enrichment::user_agent::crawler_name;

/// Signatures of automation and tooling, matched against the lowercased
/// user agent.
const BOT_PATTERNS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "slurp",
    "headlesschrome",
    "phantomjs",
    "puppeteer",
    "playwright",
    "selenium",
    "webdriver",
    "lighthouse",
    "pingdom",
    "curl/",
    "wget/",
    "python-requests",
    "python-urllib",
    "aiohttp",
    "go-http-client",
    "java/",
    "okhttp",
    "axios/",
    "node-fetch",
    "libwww-perl",
    "httpclient",
    "scrapy",
    "facebookexternalhit",
    "ia_archiver",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotCheck {
    pub is_bot: bool,
    pub reason: Option<String>,
    pub category: Option<String>,
    pub bot_name: Option<String>,
}

impl BotCheck {
    fn human() -> Self {
        Self::default()
    }

    fn bot(reason: &str, bot_name: Option<String>) -> Self {
        Self {
            is_bot: true,
            reason: Some(reason.to_owned()),
            category: Some(CATEGORY_BOT.to_owned()),
            bot_name,
        }
    }
}

fn is_prefetch(headers: &HeaderMap) -> bool {
    let announces_prefetch = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| {
                let v = v.to_ascii_lowercase();
                v.contains("prefetch") || v.contains("preview") || v.contains("prerender")
            })
    };
    announces_prefetch("purpose") || announces_prefetch("sec-purpose") || announces_prefetch("x-moz")
}

pub fn detect_bot(user_agent: &str, headers: &HeaderMap) -> BotCheck {
    let user_agent = user_agent.trim();
    if user_agent.is_empty() {
        return BotCheck::bot("missing_user_agent", None);
    }

    if let Some(name) = crawler_name(user_agent) {
        return BotCheck::bot("known_bot", Some(name));
    }

    let lowered = user_agent.to_ascii_lowercase();
    if let Some(pattern) = BOT_PATTERNS.iter().find(|p| lowered.contains(*p)) {
        return BotCheck::bot("bot_user_agent_pattern", Some((*pattern).to_owned()));
    }

    if is_prefetch(headers) {
        return BotCheck::bot("prefetch_request", None);
    }

    BotCheck::human()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const FIREFOX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

    #[test]
    fn humans_pass() {
        assert_eq!(detect_bot(FIREFOX, &HeaderMap::new()), BotCheck::default());
    }

    #[test]
    fn missing_agent_is_a_bot() {
        let check = detect_bot("  ", &HeaderMap::new());
        assert!(check.is_bot);
        assert_eq!(check.reason.as_deref(), Some("missing_user_agent"));
        assert_eq!(check.category.as_deref(), Some("Bot Detection"));
    }

    #[test]
    fn crawlers_are_named() {
        let check = detect_bot(
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
            &HeaderMap::new(),
        );
        assert_eq!(check.reason.as_deref(), Some("known_bot"));
        assert_eq!(check.bot_name.as_deref(), Some("Googlebot"));
    }

    #[test]
    fn tooling_matches_patterns() {
        for agent in ["curl/8.4.0", "python-requests/2.31", "Mozilla/5.0 HeadlessChrome/120.0"] {
            let check = detect_bot(agent, &HeaderMap::new());
            assert!(check.is_bot, "{agent} should be a bot");
        }
    }

    #[test]
    fn prefetches_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("sec-purpose", HeaderValue::from_static("prefetch;prerender"));
        let check = detect_bot(FIREFOX, &headers);
        assert_eq!(check.reason.as_deref(), Some("prefetch_request"));
    }
}
