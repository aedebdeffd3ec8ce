use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// How an address was hidden on the page. Variant order is precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Technique {
    Plain,
    EntityEncoded,
    AtWordSubstitution,
    TextSplit,
    JsConcat,
    MailtoHref,
    ImageAltText,
    CfEmail,
}

impl Technique {
    pub fn as_str(&self) -> &'static str {
        match self {
            Technique::Plain => "plain",
            Technique::EntityEncoded => "entity-encoded",
            Technique::AtWordSubstitution => "at-word-substitution",
            Technique::TextSplit => "text-split",
            Technique::JsConcat => "js-concat",
            Technique::MailtoHref => "mailto-href",
            Technique::ImageAltText => "image-alt-text",
            Technique::CfEmail => "cf-email",
        }
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate before normalization and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObfuscationMatch {
    /// Span as it was matched, obfuscation included.
    pub raw: String,
    pub technique: Technique,
    pub decoded: String,
}

impl ObfuscationMatch {
    pub fn new(raw: impl Into<String>, technique: Technique, decoded: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            technique,
            decoded: decoded.into(),
        }
    }

    /// For techniques where the matched span is already the address.
    pub fn verbatim(raw: &str, technique: Technique) -> Self {
        Self::new(raw, technique, raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Lowercase, validated `local@domain`.
    pub address: String,
    pub source_url: Url,
    pub technique: Technique,
}

/// Insertion-ordered set of records keyed by address. The first record for
/// an address wins; later ones are dropped.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct EmailSet {
    records: Vec<EmailRecord>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl EmailSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the address was already present.
    pub fn insert(&mut self, mut record: EmailRecord) -> bool {
        record.address = record.address.to_lowercase();
        if !self.seen.insert(record.address.clone()) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Append `other`'s records after ours, keeping our provenance on overlap.
    pub fn merge(&mut self, other: EmailSet) -> usize {
        other
            .records
            .into_iter()
            .filter(|record| self.insert(record.clone()))
            .count()
    }

    pub fn get(&self, address: &str) -> Option<&EmailRecord> {
        let address = address.to_lowercase();
        self.records.iter().find(|r| r.address == address)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EmailRecord> {
        self.records.iter()
    }

    pub fn addresses(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.address.as_str()).collect()
    }
}

impl Extend<EmailRecord> for EmailSet {
    fn extend<I: IntoIterator<Item = EmailRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl FromIterator<EmailRecord> for EmailSet {
    fn from_iter<I: IntoIterator<Item = EmailRecord>>(iter: I) -> Self {
        let mut set = EmailSet::new();
        set.extend(iter);
        set
    }
}

impl<'a> IntoIterator for &'a EmailSet {
    type Item = &'a EmailRecord;
    type IntoIter = std::slice::Iter<'a, EmailRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl PartialEq for EmailSet {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str, page: &str, technique: Technique) -> EmailRecord {
        EmailRecord {
            address: address.to_string(),
            source_url: Url::parse(page).unwrap(),
            technique,
        }
    }

    #[test]
    fn insert_is_case_insensitive_and_keeps_first() {
        let mut set = EmailSet::new();
        assert!(set.insert(record("Info@Firma.de", "https://firma.de/", Technique::Plain)));
        assert!(!set.insert(record("info@firma.de", "https://firma.de/kontakt", Technique::JsConcat)));

        assert_eq!(set.len(), 1);
        let kept = set.get("INFO@firma.de").unwrap();
        assert_eq!(kept.address, "info@firma.de");
        assert_eq!(kept.technique, Technique::Plain);
        assert_eq!(kept.source_url.path(), "/");
    }

    #[test]
    fn merge_is_idempotent_and_ordered() {
        let mut home = EmailSet::new();
        home.insert(record("a@firma.de", "https://firma.de/", Technique::Plain));

        let mut contact = EmailSet::new();
        contact.insert(record("b@firma.de", "https://firma.de/kontakt", Technique::Plain));
        contact.insert(record("a@firma.de", "https://firma.de/kontakt", Technique::Plain));

        assert_eq!(home.merge(contact.clone()), 1);
        assert_eq!(home.merge(contact), 0);
        assert_eq!(home.addresses(), vec!["a@firma.de", "b@firma.de"]);
        assert_eq!(home.get("a@firma.de").unwrap().source_url.path(), "/");
    }

    #[test]
    fn technique_names_are_kebab_case() {
        assert_eq!(Technique::AtWordSubstitution.to_string(), "at-word-substitution");
        assert_eq!(
            serde_json::to_string(&Technique::CfEmail).unwrap(),
            "\"cf-email\""
        );
    }
}
