use std::fmt;

use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("empty input")]
    Empty,

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("url has no host")]
    MissingHost,
}

/// One website to scan, normalized from a line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: Uuid,
    pub root: Url,
}

impl Target {
    /// Parse user input. A missing scheme means `https`; the fragment is dropped.
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TargetError::Empty);
        }

        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://{input}")
        };
        let mut root = Url::parse(&with_scheme)?;

        if !matches!(root.scheme(), "http" | "https") {
            return Err(TargetError::UnsupportedScheme(root.scheme().to_string()));
        }
        if root.host_str().is_none_or(str::is_empty) {
            return Err(TargetError::MissingHost);
        }
        root.set_fragment(None);

        Ok(Self {
            id: Uuid::new_v4(),
            root,
        })
    }

    pub fn scheme(&self) -> &str {
        self.root.scheme()
    }

    pub fn host(&self) -> &str {
        self.root.host_str().unwrap_or_default()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

/// Host with a leading `www.` removed, lowercased.
pub fn site_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    Some(match host.strip_prefix("www.") {
        Some(bare) => bare.to_string(),
        None => host,
    })
}

/// Same site when the hosts match, treating `www.` and the bare domain as one.
pub fn same_site(a: &Url, b: &Url) -> bool {
    match (site_host(a), site_host(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_https_and_drops_fragment() {
        let target = Target::parse("  firma.de/#top ").unwrap();
        assert_eq!(target.root.as_str(), "https://firma.de/");
        assert_eq!(target.scheme(), "https");
        assert_eq!(target.host(), "firma.de");
    }

    #[test]
    fn keeps_explicit_http_and_path() {
        let target = Target::parse("http://Firma.de/en/").unwrap();
        assert_eq!(target.root.as_str(), "http://firma.de/en/");
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(Target::parse("   "), Err(TargetError::Empty));
        assert_eq!(
            Target::parse("ftp://firma.de"),
            Err(TargetError::UnsupportedScheme("ftp".to_string()))
        );
        assert!(matches!(
            Target::parse("https://"),
            Err(TargetError::InvalidUrl(_))
        ));
    }

    #[test]
    fn targets_get_distinct_ids() {
        let a = Target::parse("firma.de").unwrap();
        let b = Target::parse("firma.de").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn www_and_bare_domain_are_one_site() {
        let bare = Url::parse("https://firma.de/").unwrap();
        let www = Url::parse("http://www.firma.de/kontakt").unwrap();
        let other = Url::parse("https://shop.firma.de/").unwrap();
        assert!(same_site(&bare, &www));
        assert!(!same_site(&bare, &other));
    }
}
