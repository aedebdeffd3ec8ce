//! Static pattern library shared by discovery, fetching and extraction.

pub mod email;
pub mod keywords;
pub mod markers;

pub use email::{
    AT_DOT_REGEXES, DOT_SEPARATOR_REGEX, EMAIL_REGEX, INVISIBLE_CHARS, ends_with_address,
    is_denylisted, is_plausible_tld, is_valid_address, strip_invisible,
};
pub use keywords::{
    ALL_KEYWORDS, AT_WORDS, CONSENT_KEYWORDS, CONTACT_KEYWORDS, DOT_WORDS, Keyword, KeywordTier,
    contains_term,
};
pub use markers::{
    find_challenge_marker, find_spa_marker, is_social_host, is_tracking_param,
    DOWNLOAD_EXTENSIONS,
};
