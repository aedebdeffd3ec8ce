//! Email grammar: the plain-text matcher, the at/dot substitution matcher and
//! the strict validator every decoded candidate has to pass.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::patterns::keywords::{AT_WORDS, DOT_WORDS};

/// Loose `local@domain.tld` shape used to find candidates in text and HTML.
pub static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b[a-z0-9][a-z0-9._%+\-]*@[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?)*\.[a-z]{2,24}\b",
    )
    .unwrap()
});

static LOCAL_PART_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9!#$%&'*+/=?^_`{|}~\-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~\-]+)*$").unwrap()
});

static DOMAIN_LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9](?:[a-z0-9\-]{0,61}[a-z0-9])?$").unwrap());

/// At/dot substitution matchers. Capture groups: `local`, `domain` (still
/// carrying its dot words) and `tail` (last label).
///
/// The first matches a bracketed at (`[at]`, `(at)`, `{ät}`, `(@)`) followed by
/// a bracketed dot, a bare ` dot ` or a literal `.`. The second matches a bare
/// ` at ` or `@` and then only accepts bracketed dots or a bare ` dot `, so
/// prose like "visit us at www.firma.de" stays prose. Words from other
/// languages (`chez`, `punkt`, `point`) only count inside brackets.
pub static AT_DOT_REGEXES: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    let at = alternation(AT_WORDS);
    let dot = alternation(DOT_WORDS);
    let at_bracketed = format!(r"\s*[\[\(\{{<]\s*(?:{at}|@)\s*[\]\)\}}>]\s*");
    let dot_bracketed = format!(r"\s*[\[\(\{{<]\s*(?:{dot}|\.)\s*[\]\)\}}>]\s*");
    let dot_worded = format!(r"(?:{dot_bracketed}|\s+{BARE_DOT}\s+)");
    let dot_any = format!(r"(?:{dot_bracketed}|\s+{BARE_DOT}\s+|\.)");
    let label = r"[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?";
    let local = r"(?P<local>\b[a-z0-9][a-z0-9._%+\-]*)";
    let tail = r"(?P<tail>[a-z]{2,24})\b";

    let bracketed = format!(
        r"(?i){local}{at_bracketed}(?P<domain>{label}(?:{dot_any}{label})*){dot_any}{tail}"
    );
    let spaced = format!(
        r"(?i){local}(?:\s+{BARE_AT}\s+|\s*@\s*)(?P<domain>{label}(?:{dot_worded}{label})*){dot_worded}{tail}"
    );
    [Regex::new(&bracketed).unwrap(), Regex::new(&spaced).unwrap()]
});

/// The only words accepted without brackets around them.
const BARE_AT: &str = "at";
const BARE_DOT: &str = "dot";

/// Separators inside the `domain` group of [`AT_DOT_REGEXES`].
pub static DOT_SEPARATOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let dot = alternation(DOT_WORDS);
    Regex::new(&format!(
        r"(?i)\s*[\[\(\{{<]\s*(?:{dot}|\.)\s*[\]\)\}}>]\s*|\s+{BARE_DOT}\s+"
    ))
    .unwrap()
});

/// Two-letter country codes.
const COUNTRY_TLDS: &str = "ac ad ae af ag ai al am ao aq ar as at au aw ax az ba bb bd be bf bg \
    bh bi bj bm bn bo br bs bt bw by bz ca cc cd cf cg ch ci ck cl cm cn co cr cu cv cw cx cy cz \
    de dj dk dm do dz ec ee eg er es et eu fi fj fk fm fo fr ga gd ge gf gg gh gi gl gm gn gp gq \
    gr gs gt gu gw gy hk hm hn hr ht hu id ie il im in io iq ir is it je jm jo jp ke kg kh ki km \
    kn kp kr kw ky kz la lb lc li lk lr ls lt lu lv ly ma mc md me mg mh mk ml mm mn mo mp mq mr \
    ms mt mu mv mw mx my mz na nc ne nf ng ni nl no np nr nu nz om pa pe pf pg ph pk pl pm pn pr \
    ps pt pw py qa re ro rs ru rw sa sb sc sd se sg sh si sk sl sm sn so sr ss st su sv sx sy sz \
    tc td tf tg th tj tk tl tm tn to tr tt tv tw tz ua ug uk us uy uz va vc ve vg vi vn vu wf ws \
    ye yt za zm zw";

/// Generic and regional top-level domains seen on business sites.
const GENERIC_TLDS: &[&str] = &[
    "com", "net", "org", "info", "biz", "edu", "gov", "mil", "int", "name", "pro", "mobi",
    "aero", "coop", "museum", "jobs", "travel", "xyz", "online", "site", "website", "shop",
    "store", "app", "dev", "tech", "email", "studio", "agency", "design", "digital", "media",
    "solutions", "services", "consulting", "group", "company", "business", "network", "systems",
    "software", "cloud", "blog", "news", "law", "legal", "health", "care", "bio", "eco", "art",
    "club", "team", "world", "global", "berlin", "hamburg", "koeln", "cologne", "bayern", "nrw",
    "ruhr", "saarland", "wien", "tirol", "swiss", "zuerich", "paris", "bzh", "cat", "eus", "gal",
    "london", "nyc", "amsterdam", "brussels", "vlaanderen", "frl", "gmbh", "ltd", "llc", "inc",
    "immo", "haus", "immobilien", "versicherung", "reise", "reisen", "tools", "works", "center",
    "zone", "expert", "academy", "school", "education", "energy", "solar", "partners",
    "insurance", "bank", "finance", "capital", "fund", "restaurant", "cafe", "bar", "pub",
    "hotel", "photography", "events", "family", "life", "live", "love", "social", "support",
];

/// Whether `tld` looks like a real top-level domain. Used where the last label
/// was reconstructed from words, not copied from an address.
pub fn is_plausible_tld(tld: &str) -> bool {
    let tld = tld.to_ascii_lowercase();
    match tld.len() {
        2 => COUNTRY_TLDS.split_ascii_whitespace().any(|cc| cc == tld),
        _ => GENERIC_TLDS.contains(&tld.as_str()),
    }
}

/// Characters that render as nothing but break a naive regex scan.
pub const INVISIBLE_CHARS: [char; 7] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}', '\u{180E}',
];

/// Top-level "domains" that are really file extensions (`logo@2x.png`).
const FILE_EXTENSION_TLDS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "bmp", "ico", "tif", "tiff", "css", "js",
    "mjs", "json", "map", "pdf", "mp4", "webm", "mp3", "woff", "woff2", "ttf", "eot", "php",
    "html", "htm", "txt", "xml",
];

/// Template addresses and template domains left in page copy.
const PLACEHOLDER_ADDRESSES: &[&str] = &[
    "example@example.com",
    "yourname@domain.com",
    "your@email.com",
    "your.name@domain.com",
    "name@domain.com",
    "email@domain.com",
    "user@domain.com",
    "username@domain.com",
    "john.doe@gmail.com",
    "max.mustermann@example.de",
    "max@mustermann.de",
    "vorname.nachname@firma.de",
    "prenom.nom@domaine.fr",
];

const PLACEHOLDER_DOMAINS: &[&str] = &[
    "example.com",
    "example.org",
    "example.net",
    "example.de",
    "sample.com",
    "domain.com",
    "email.com",
    "test.com",
    "yourcompany.com",
    "yourdomain.com",
    "mydomain.com",
    "company.com",
    "domain.tld",
];

const PLACEHOLDER_LOCALS: &[&str] = &[
    "yourname",
    "your.name",
    "your-name",
    "youremail",
    "your.email",
    "firstname.lastname",
    "first.last",
    "vorname.nachname",
    "prenom.nom",
];

/// Domains that show up in page source without being contact addresses:
/// error-tracking DSNs and site-builder internals.
const NOISE_DOMAIN_SUFFIXES: &[&str] = &[
    "sentry.io",
    "sentry-next.wixpress.com",
    "sentry.wixpress.com",
    "wixpress.com",
    "ingest.sentry.io",
];

fn alternation(words: &[&str]) -> String {
    let mut sorted: Vec<&str> = words.to_vec();
    sorted.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
    sorted
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|")
}

/// Drop zero-width and soft-hyphen characters.
pub fn strip_invisible(text: &str) -> Cow<'_, str> {
    if text.contains(INVISIBLE_CHARS) {
        Cow::Owned(text.chars().filter(|c| !INVISIBLE_CHARS.contains(c)).collect())
    } else {
        Cow::Borrowed(text)
    }
}

/// Longest span worth looking back over for a trailing address.
const ADDRESS_TAIL_BYTES: usize = 320;

/// Whether `text` ends exactly where a complete address ends. Only the last
/// few hundred bytes are scanned.
pub fn ends_with_address(text: &str) -> bool {
    let mut start = text.len().saturating_sub(ADDRESS_TAIL_BYTES);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let tail = &text[start..];
    EMAIL_REGEX
        .find_iter(tail)
        .last()
        .is_some_and(|m| m.end() == tail.len())
}

/// Strict syntactic check on an already lowercased address.
pub fn is_valid_address(address: &str) -> bool {
    let Some((local, domain)) = address.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 || domain.len() > 253 {
        return false;
    }
    if !LOCAL_PART_REGEX.is_match(local) {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || !labels.iter().all(|l| DOMAIN_LABEL_REGEX.is_match(l)) {
        return false;
    }
    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    !FILE_EXTENSION_TLDS.contains(&tld)
}

/// Templates, placeholders and noise that must never reach the output.
pub fn is_denylisted(address: &str) -> bool {
    if PLACEHOLDER_ADDRESSES.contains(&address) {
        return true;
    }
    let Some((local, domain)) = address.rsplit_once('@') else {
        return true;
    };
    if PLACEHOLDER_DOMAINS.contains(&domain) || PLACEHOLDER_LOCALS.contains(&local) {
        return true;
    }
    NOISE_DOMAIN_SUFFIXES
        .iter()
        .any(|suffix| domain == *suffix || domain.ends_with(&format!(".{suffix}")))
}
