//! Challenge page detection.
//!
//! Provides pattern-based identification of bot-manager interstitials and
//! block pages, independent of the HTTP status they were served with.

use std::fmt;

use http::HeaderMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// Bot-management vendors with recognisable block pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BotVendor {
    Akamai,
    Cloudflare,
    PerimeterX,
    DataDome,
    Imperva,
    Generic,
}

impl fmt::Display for BotVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BotVendor::Akamai => "akamai",
            BotVendor::Cloudflare => "cloudflare",
            BotVendor::PerimeterX => "perimeterx",
            BotVendor::DataDome => "datadome",
            BotVendor::Imperva => "imperva",
            BotVendor::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// Evidence that a response is a challenge or block page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeMarker {
    pub pattern_id: &'static str,
    pub vendor: BotVendor,
    pub indicator: String,
}

impl fmt::Display for ChallengeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.pattern_id, self.vendor)
    }
}

#[derive(Debug, Clone)]
struct ChallengePattern {
    id: &'static str,
    vendor: BotVendor,
    patterns: Vec<Regex>,
}

impl ChallengePattern {
    fn new(id: &'static str, vendor: BotVendor, raw_patterns: &[&str]) -> Self {
        Self {
            id,
            vendor,
            patterns: raw_patterns.iter().map(|pattern| build_regex(pattern)).collect(),
        }
    }
}

static KNOWN_PATTERNS: Lazy<Vec<ChallengePattern>> = Lazy::new(|| {
    vec![
        ChallengePattern::new(
            "akamai_access_denied",
            BotVendor::Akamai,
            &[
                r"You don't have permission to access",
                r"Reference(?:\s|&#32;)*(?:#|&#35;)\s*[0-9a-f]+(?:\.|&#46;)[0-9a-f]+",
                r"errors\.edgesuite\.net",
            ],
        ),
        ChallengePattern::new(
            "akamai_bot_manager",
            BotVendor::Akamai,
            &[
                r"/_sec/cp_challenge/",
                r#"id=["']sec-if-cpt-container["']"#,
                r"bm-verify",
            ],
        ),
        ChallengePattern::new(
            "cf_challenge",
            BotVendor::Cloudflare,
            &[
                r"<title>\s*Just a moment\.\.\.\s*</title>",
                r"/cdn-cgi/challenge-platform/",
                r"window\._cf_chl_opt\s*=",
                r"<title>\s*Attention Required! \| Cloudflare\s*</title>",
            ],
        ),
        ChallengePattern::new(
            "px_captcha",
            BotVendor::PerimeterX,
            &[r#"id=["']px-captcha["']"#, r"window\._pxAppId", r"captcha\.px-cdn\.net"],
        ),
        ChallengePattern::new(
            "datadome_captcha",
            BotVendor::DataDome,
            &[r"geo\.captcha-delivery\.com", r"ct\.captcha-delivery\.com"],
        ),
        ChallengePattern::new(
            "imperva_incident",
            BotVendor::Imperva,
            &[r"_Incapsula_Resource", r"Incapsula incident ID"],
        ),
        ChallengePattern::new(
            "generic_interstitial",
            BotVendor::Generic,
            &[
                r"<title>\s*Pardon Our Interruption",
                r"Please enable JavaScript and cookies to continue",
                r"Checking your browser before accessing",
            ],
        ),
    ]
});

/// Pattern-based challenge detector.
#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    patterns: Vec<ChallengePattern>,
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeDetector {
    pub fn new() -> Self {
        Self {
            patterns: KNOWN_PATTERNS.clone(),
        }
    }

    /// Register an extra site-specific signature. Any single matching
    /// expression marks a response as a challenge.
    pub fn with_pattern(
        mut self,
        id: &'static str,
        vendor: BotVendor,
        raw_patterns: &[&str],
    ) -> Self {
        self.patterns.push(ChallengePattern::new(id, vendor, raw_patterns));
        self
    }

    /// Headers that announce a challenge on their own.
    pub fn detect_headers(&self, headers: &HeaderMap) -> Option<ChallengeMarker> {
        let mitigated = headers.get("cf-mitigated")?.to_str().ok()?;
        mitigated
            .eq_ignore_ascii_case("challenge")
            .then(|| ChallengeMarker {
                pattern_id: "cf_mitigated_header",
                vendor: BotVendor::Cloudflare,
                indicator: format!("cf-mitigated: {mitigated}"),
            })
    }

    /// First known signature found in the body, in table order.
    pub fn detect_body(&self, body: &str) -> Option<ChallengeMarker> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .patterns
                .iter()
                .find(|regex| regex.is_match(body))
                .map(|regex| ChallengeMarker {
                    pattern_id: pattern.id,
                    vendor: pattern.vendor,
                    indicator: regex.as_str().to_string(),
                })
        })
    }
}

fn build_regex(pattern: &str) -> Regex {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .dot_matches_new_line(true)
        .build()
        .unwrap_or_else(|err| panic!("invalid challenge detection regex `{}`: {}", pattern, err))
}
