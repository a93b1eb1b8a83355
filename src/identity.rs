//! Rotated client identity sent with every outbound request.

use rand::seq::IndexedRandom;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, REFERER, USER_AGENT,
};

use crate::config::PoolConfig;

pub(crate) const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/116.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36 Edg/115.0.1901.188",
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/116.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36",
];

pub(crate) const DEFAULT_REFERERS: &[&str] = &[
    "https://www.polsatnews.pl/",
    "https://www.facebook.com/",
    "https://tvn24.pl/",
    "https://businessinsider.com.pl/",
    "https://www.money.pl/gospodarka/ceny-mieszkan-wskazniki-cen-lokali-mieszkalnych-w-i-kwartale-2023-r-dane-gus-6916275925240608a.html",
    "https://www.money.pl/gospodarka/ceny-mieszkan-szaleja-a-lokali-zaczyna-brakowac-co-sie-dzieje-6955196972055040a.html",
    "https://www.morizon.pl/blog/indeks-cen-mieszkan/",
    "https://www.bankier.pl/wiadomosc/Podwyzki-cen-mieszkan-nie-odpuszcza-Podaz-nie-nadaza-za-sztucznie-rozdmuchanym-popytem-8614581.html",
    "https://tvn24.pl/biznes/z-kraju/ceny-mieszkan-eksplodowaly-dane-za-wrzesien-2023-analiza-7359890",
    "https://tvn24.pl/biznes/z-kraju/ceny-mieszkan-w-polsce-pazdziernik-2023-w-tych-miastach-wzrosty-sa-najwieksze-7410380",
    "https://www.rp.pl/nieruchomosci/art39048221-rzadowy-kredyt-2-nakreca-ceny-mieszkan-do-rekordowych-poziomow",
];

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
const ACCEPT_LANGUAGE_PL: &str = "pl-PL,pl";
const ACCEPT_ENCODING_ALL: &str = "gzip, deflate, br";

/// A User-Agent/Referer pair presented to the target site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: String,
    pub referer: String,
}

impl Identity {
    pub fn new(user_agent: impl Into<String>, referer: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            referer: referer.into(),
        }
    }

    /// Draw a fresh identity uniformly from the configured candidates.
    pub fn random(config: &PoolConfig) -> Self {
        let mut rng = rand::rng();
        let user_agent = config
            .user_agents
            .choose(&mut rng)
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0]);
        let referer = config
            .referers
            .choose(&mut rng)
            .map(String::as_str)
            .unwrap_or(DEFAULT_REFERERS[0]);
        Self::new(user_agent, referer)
    }

    /// The complete header set: fixed Accept headers plus this identity.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_PL));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(ACCEPT_ENCODING_ALL));
        self.apply_to(&mut headers);
        headers
    }

    /// Set User-Agent and Referer on `headers` unless they are already present.
    pub fn apply_to(&self, headers: &mut HeaderMap) {
        // Values that are not valid header text are skipped rather than sent mangled.
        if !headers.contains_key(USER_AGENT) {
            if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
                headers.insert(USER_AGENT, value);
            }
        }
        if !headers.contains_key(REFERER) {
            if let Ok(value) = HeaderValue::from_str(&self.referer) {
                headers.insert(REFERER, value);
            }
        }
    }
}
