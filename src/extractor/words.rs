//! At/dot substitutions: `info [at] firma [dot] de`, `info (ät) firma punkt de`.

use crate::extractor::PageView;
use crate::extractor::model::{ObfuscationMatch, Technique};
use crate::patterns::{AT_DOT_REGEXES, DOT_SEPARATOR_REGEX, is_plausible_tld, strip_invisible};

/// Articles that start a prose phrase ("at the point of"), never a domain.
const PROSE_LABELS: &[&str] = &[
    "the", "a", "an", "this", "that", "der", "die", "das", "le", "la", "les", "il", "el", "los",
    "un", "una", "een", "het",
];

pub fn find(page: &PageView<'_>) -> Vec<ObfuscationMatch> {
    find_in(&page.text, Technique::AtWordSubstitution)
}

/// Substitution matches in `text`, reconstructed to `local@domain.tld`.
pub(super) fn find_in(text: &str, technique: Technique) -> Vec<ObfuscationMatch> {
    let text = strip_invisible(text);
    let mut out = Vec::new();
    for regex in AT_DOT_REGEXES.iter() {
        for caps in regex.captures_iter(&text) {
            let first_label = caps["domain"]
                .split(|c: char| !c.is_alphanumeric() && c != '-')
                .next()
                .unwrap_or_default()
                .to_lowercase();
            if PROSE_LABELS.contains(&first_label.as_str()) || !is_plausible_tld(&caps["tail"]) {
                continue;
            }
            let domain = DOT_SEPARATOR_REGEX.replace_all(&caps["domain"], ".");
            let decoded = format!("{}@{}.{}", &caps["local"], domain, &caps["tail"]);
            out.push(ObfuscationMatch::new(&caps[0], technique, decoded));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(text: &str) -> Vec<String> {
        find_in(text, Technique::AtWordSubstitution)
            .into_iter()
            .map(|m| m.decoded)
            .collect()
    }

    #[test]
    fn reconstructs_common_forms() {
        assert_eq!(decoded("Mail: info [at] firma [dot] de"), vec!["info@firma.de"]);
        assert_eq!(decoded("info(at)mail(dot)firma(dot)co(dot)uk"), vec!["info@mail.firma.co.uk"]);
        assert_eq!(decoded("kontakt {ät} firma {punkt} de"), vec!["kontakt@firma.de"]);
        assert_eq!(decoded("hello at firma dot de"), vec!["hello@firma.de"]);
        assert_eq!(decoded("info [at] shop.firma.de"), vec!["info@shop.firma.de"]);
    }

    #[test]
    fn ignores_prose() {
        assert!(decoded("We are at your service. Find us at firma.de").is_empty());
        assert!(decoded("we met at the point of no return").is_empty());
        assert!(decoded("Retrouvez-nous chez Dupont point de vente à Paris.").is_empty());
        assert!(decoded("Visit us at Harbour point of sale every day.").is_empty());
        assert!(decoded("meet me at noon dot sharp").is_empty());
    }

    #[test]
    fn foreign_words_count_inside_brackets() {
        assert_eq!(decoded("contact (chez) dupont (point) fr"), vec!["contact@dupont.fr"]);
        assert_eq!(decoded("info [bei] firma [punkt] de"), vec!["info@firma.de"]);
    }
}
