//! Relevance scoring for candidate links.

use crate::config::ScoringWeights;
use crate::discovery::links::{RawLink, path_segments};
use crate::patterns::{ALL_KEYWORDS, KeywordTier, contains_term};

/// Paths with more segments than this are penalized.
const DEEP_PATH_SEGMENTS: usize = 3;
/// URLs longer than this are penalized.
const LONG_URL_CHARS: usize = 100;
/// Keywords at least this long also match as a path-segment prefix
/// (`kontaktformular` for `kontakt`).
const PREFIX_MATCH_MIN_CHARS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchStrength {
    Exact,
    Partial,
}

pub fn score_link(link: &RawLink, weights: &ScoringWeights) -> f32 {
    let text = text_score(&link.anchor_text, weights);
    let (path, path_tier) = path_score(&path_segments(&link.url), weights);

    let mut score = text + path;
    if path_tier == Some(KeywordTier::Primary) {
        score += weights.primary_path_boost;
    }
    // Prominence only lifts links that already look relevant
    if score > 0.0 && link.prominent {
        score += weights.prominent_region;
    }

    if link.url.query().is_some() {
        score -= weights.query_penalty;
    }
    if path_segments(&link.url).len() > DEEP_PATH_SEGMENTS {
        score -= weights.deep_path_penalty;
    }
    if link.url.as_str().chars().count() > LONG_URL_CHARS {
        score -= weights.long_url_penalty;
    }
    score
}

fn tier_factor(tier: KeywordTier, weights: &ScoringWeights) -> f32 {
    match tier {
        KeywordTier::Primary => 1.0,
        KeywordTier::Secondary => weights.secondary_factor,
    }
}

fn text_score(anchor: &str, weights: &ScoringWeights) -> f32 {
    if anchor.is_empty() {
        return 0.0;
    }
    let folded = transliterate(anchor);
    ALL_KEYWORDS
        .iter()
        .filter_map(|keyword| {
            let strength = if anchor == keyword.text || folded == transliterate(keyword.text) {
                MatchStrength::Exact
            } else if contains_term(anchor, keyword.text)
                || contains_term(&folded, &transliterate(keyword.text))
            {
                MatchStrength::Partial
            } else {
                return None;
            };
            let base = match strength {
                MatchStrength::Exact => weights.text_exact,
                MatchStrength::Partial => weights.text_partial,
            };
            Some(base * tier_factor(keyword.tier, weights))
        })
        .fold(0.0, f32::max)
}

/// Best keyword hit over all path segments, with the tier of that hit.
fn path_score(segments: &[String], weights: &ScoringWeights) -> (f32, Option<KeywordTier>) {
    let mut best = (0.0_f32, None);
    for segment in segments {
        let segment = strip_extension(segment);
        let folded = transliterate(segment);
        for keyword in ALL_KEYWORDS.iter() {
            let Some(strength) = match_segment(&folded, keyword.text) else {
                continue;
            };
            let base = match strength {
                MatchStrength::Exact => weights.path_exact,
                MatchStrength::Partial => weights.path_partial,
            };
            let score = base * tier_factor(keyword.tier, weights);
            if score > best.0 {
                best = (score, Some(keyword.tier));
            }
        }
    }
    best
}

fn match_segment(segment: &str, keyword: &str) -> Option<MatchStrength> {
    let folded = transliterate(keyword);
    let variants = [folded.replace(' ', "-"), folded.replace(' ', "_"), folded.replace(' ', "")];

    if variants.iter().any(|v| segment == v) {
        return Some(MatchStrength::Exact);
    }
    let separated = segment.replace(['-', '_', '.', '+'], " ");
    if contains_term(&separated, &folded) {
        return Some(MatchStrength::Partial);
    }
    if folded.chars().count() >= PREFIX_MATCH_MIN_CHARS
        && variants.iter().any(|v| segment.starts_with(v.as_str()))
    {
        return Some(MatchStrength::Partial);
    }
    None
}

fn strip_extension(segment: &str) -> &str {
    for ext in [".html", ".htm", ".php", ".aspx", ".asp", ".jsp"] {
        if let Some(stem) = segment.strip_suffix(ext) {
            return stem;
        }
    }
    segment
}

/// ASCII folding for URL paths: umlauts expand (`ü` → `ue`), other accents drop.
pub fn transliterate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'ß' => out.push_str("ss"),
            'à' | 'á' | 'â' | 'ã' | 'å' | 'ą' | 'ă' => out.push('a'),
            'ç' | 'č' | 'ć' => out.push('c'),
            'ď' => out.push('d'),
            'è' | 'é' | 'ê' | 'ë' | 'ę' | 'ě' | 'ė' | 'ē' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => out.push('i'),
            'ł' | 'ľ' | 'ĺ' => out.push('l'),
            'ñ' | 'ń' | 'ň' => out.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ő' | 'ø' => out.push('o'),
            'ř' => out.push('r'),
            'š' | 'ś' | 'ș' | 'ş' => out.push('s'),
            'ť' | 'ț' | 'ţ' => out.push('t'),
            'ù' | 'ú' | 'û' | 'ű' | 'ů' | 'ū' | 'ų' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'ž' | 'ź' | 'ż' => out.push('z'),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn link(url: &str, text: &str, prominent: bool) -> RawLink {
        RawLink {
            url: Url::parse(url).unwrap(),
            anchor_text: text.to_string(),
            prominent,
        }
    }

    #[test]
    fn exact_text_beats_partial_text() {
        let w = ScoringWeights::default();
        let exact = score_link(&link("https://firma.de/x", "contact", false), &w);
        let partial = score_link(&link("https://firma.de/x", "contact our office", false), &w);
        assert_eq!(exact, w.text_exact);
        assert_eq!(partial, w.text_partial);
    }

    #[test]
    fn secondary_keywords_score_lower() {
        let w = ScoringWeights::default();
        let contact = score_link(&link("https://firma.de/contact", "contact", false), &w);
        let about = score_link(&link("https://firma.de/about", "about", false), &w);
        assert!(contact > about);
        assert!(about > 0.0);
    }

    #[test]
    fn path_keywords_match_in_any_language() {
        let w = ScoringWeights::default();
        for url in [
            "https://firma.de/kontakt",
            "https://firma.it/contatti",
            "https://firma.fi/yhteystiedot",
            "https://firma.de/kontaktformular",
            "https://firma.de/impressum.html",
        ] {
            let score = score_link(&link(url, "", false), &w);
            assert!(score >= w.path_partial, "{url} scored {score}");
        }
        let umlaut = score_link(&link("https://firma.de/%C3%BCber-uns", "", false), &w);
        assert!(umlaut > 0.0);
    }

    #[test]
    fn prominence_and_penalties_apply() {
        let w = ScoringWeights::default();
        let plain = score_link(&link("https://firma.de/kontakt", "kontakt", false), &w);
        let nav = score_link(&link("https://firma.de/kontakt", "kontakt", true), &w);
        let query = score_link(&link("https://firma.de/kontakt?x=1", "kontakt", false), &w);
        let deep = score_link(&link("https://firma.de/a/b/c/kontakt", "kontakt", false), &w);
        assert_eq!(nav, plain + w.prominent_region);
        assert_eq!(query, plain - w.query_penalty);
        assert_eq!(deep, plain - w.deep_path_penalty);
    }

    #[test]
    fn irrelevant_links_score_zero_even_in_nav() {
        let w = ScoringWeights::default();
        assert_eq!(score_link(&link("https://firma.de/products", "products", true), &w), 0.0);
    }

    #[test]
    fn transliteration_folds_accents() {
        assert_eq!(transliterate("über uns"), "ueber uns");
        assert_eq!(transliterate("équipe"), "equipe");
        assert_eq!(transliterate("zespół"), "zespol");
    }
}
