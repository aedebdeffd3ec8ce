//! Fixed marker lists used by the fetcher and the link discovery.

/// Substrings of challenge/interstitial pages served instead of the real site.
pub static BOT_CHALLENGE_MARKERS: &[&str] = &[
    "Just a moment...",
    "cf-browser-verification",
    "cf_chl_opt",
    "challenge-platform",
    "Attention Required! | Cloudflare",
    "_Incapsula_Resource",
    "DDoS protection by",
    "px-captcha",
    "Checking your browser",
    "Verifying you are human",
];

/// Markers of pages whose content is rendered client side.
pub static SPA_MARKERS: &[&str] = &[
    "id=\"root\"></div>",
    "id=\"app\"></div>",
    "id=\"__next\"",
    "__NEXT_DATA__",
    "ng-version",
    "data-reactroot",
    "__NUXT__",
    "window.__INITIAL_STATE__",
    "data-v-app",
    "ember-application",
    "data-server-rendered",
    "sveltekit",
];

/// Hosts that are never contact pages of the site being scanned.
pub static SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com",
    "fb.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "instagram.com",
    "youtube.com",
    "youtu.be",
    "tiktok.com",
    "pinterest.com",
    "xing.com",
    "wa.me",
    "whatsapp.com",
    "t.me",
    "telegram.me",
    "threads.net",
    "vimeo.com",
];

/// Path extensions of downloadable assets.
pub static DOWNLOAD_EXTENSIONS: &[&str] = &[
    "pdf", "zip", "rar", "7z", "gz", "tar", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt",
    "csv", "jpg", "jpeg", "png", "gif", "svg", "webp", "mp3", "mp4", "mov", "avi", "exe", "dmg",
    "apk", "ics", "vcf",
];

/// Query parameters that carry tracking state only.
pub static TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "mc_cid", "mc_eid", "msclkid", "_ga", "_gl", "ref", "igshid", "yclid",
];

/// Query parameter prefixes that carry tracking state only.
pub static TRACKING_PARAM_PREFIXES: &[&str] = &["utm_"];

pub fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    TRACKING_PARAMS.contains(&name.as_str())
        || TRACKING_PARAM_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// True when `html` carries one of [`BOT_CHALLENGE_MARKERS`].
pub fn find_challenge_marker(html: &str) -> Option<&'static str> {
    BOT_CHALLENGE_MARKERS.iter().copied().find(|m| html.contains(m))
}

pub fn find_spa_marker(html: &str) -> Option<&'static str> {
    SPA_MARKERS.iter().copied().find(|m| html.contains(m))
}

/// `host` equals a social domain or is one of its subdomains.
pub fn is_social_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    SOCIAL_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}
