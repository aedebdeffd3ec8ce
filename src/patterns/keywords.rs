//! Multilingual keyword tables.
//!
//! Contact keywords are split into two tiers: `primary` words name a contact
//! or imprint page outright, `secondary` words (about, team, legal, privacy)
//! name pages that often carry an address without being contact pages.

use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordTier {
    Primary,
    Secondary,
}

#[derive(Debug)]
pub struct LanguageKeywords {
    pub lang: &'static str,
    pub primary: &'static [&'static str],
    pub secondary: &'static [&'static str],
}

pub static CONTACT_KEYWORDS: &[LanguageKeywords] = &[
    LanguageKeywords {
        lang: "en",
        primary: &["contact", "contact us", "contacts", "get in touch", "imprint", "legal notice", "reach us"],
        secondary: &["about", "about us", "team", "our team", "legal", "privacy", "who we are"],
    },
    LanguageKeywords {
        lang: "de",
        primary: &["kontakt", "impressum", "kontaktieren", "anfahrt"],
        secondary: &["über uns", "ueber uns", "team", "datenschutz", "wir über uns"],
    },
    LanguageKeywords {
        lang: "fr",
        primary: &["contact", "contactez-nous", "nous contacter", "mentions légales", "mentions legales"],
        secondary: &["à propos", "a propos", "équipe", "equipe", "qui sommes-nous"],
    },
    LanguageKeywords {
        lang: "es",
        primary: &["contacto", "contactar", "contáctenos", "contactenos", "aviso legal"],
        secondary: &["acerca", "sobre nosotros", "equipo", "quiénes somos", "quienes somos"],
    },
    LanguageKeywords {
        lang: "it",
        primary: &["contatti", "contatto", "contattaci", "note legali"],
        secondary: &["chi siamo", "team"],
    },
    LanguageKeywords {
        lang: "nl",
        primary: &["contact", "neem contact op", "contacteer ons"],
        secondary: &["over ons", "team", "juridisch"],
    },
    LanguageKeywords {
        lang: "pl",
        primary: &["kontakt", "informacje prawne"],
        secondary: &["o nas", "zespół", "zespol"],
    },
    LanguageKeywords {
        lang: "sv",
        primary: &["kontakt", "kontakta oss"],
        secondary: &["om oss", "team", "juridisk information"],
    },
    LanguageKeywords {
        lang: "da",
        primary: &["kontakt", "kontakt os"],
        secondary: &["om os", "team", "juridisk information"],
    },
    LanguageKeywords {
        lang: "fi",
        primary: &["yhteystiedot", "ota yhteyttä", "ota yhteytta"],
        secondary: &["meistä", "meista", "tiimi", "oikeudelliset tiedot"],
    },
    LanguageKeywords {
        lang: "el",
        primary: &["επικοινωνία", "επικοινωνια"],
        secondary: &["σχετικά με", "ομάδα", "νομικές πληροφορίες"],
    },
    LanguageKeywords {
        lang: "pt",
        primary: &["contato", "contacto", "contactos", "fale conosco"],
        secondary: &["sobre nós", "sobre nos", "equipe", "equipa", "quem somos", "informações legais", "informacoes legais"],
    },
    LanguageKeywords {
        lang: "cs",
        primary: &["kontakt", "kontakty"],
        secondary: &["o nás", "o nas", "tým", "tym", "právní informace", "pravni informace"],
    },
    LanguageKeywords {
        lang: "hu",
        primary: &["kapcsolat", "elérhetőség", "elerhetoseg"],
        secondary: &["rólunk", "rolunk", "csapat", "jogi információk", "jogi informaciok"],
    },
    LanguageKeywords {
        lang: "ro",
        primary: &["contact", "contacte", "date de contact"],
        secondary: &["despre noi", "echipă", "echipa", "informații legale", "informatii legale"],
    },
    LanguageKeywords {
        lang: "bg",
        primary: &["контакт", "контакти"],
        secondary: &["за нас", "екип", "правна информация"],
    },
    LanguageKeywords {
        lang: "hr",
        primary: &["kontakt", "kontakti"],
        secondary: &["o nama", "tim", "pravne informacije"],
    },
    LanguageKeywords {
        lang: "et",
        primary: &["kontakt", "kontaktid"],
        secondary: &["meist", "meeskond", "õiguslik teave", "oiguslik teave"],
    },
    LanguageKeywords {
        lang: "lv",
        primary: &["kontakti"],
        secondary: &["par mums", "komanda", "juridiskā informācija", "juridiska informacija"],
    },
    LanguageKeywords {
        lang: "lt",
        primary: &["kontaktai"],
        secondary: &["apie mus", "komanda", "teisinė informacija", "teisine informacija"],
    },
    LanguageKeywords {
        lang: "sl",
        primary: &["kontakt"],
        secondary: &["o nas", "ekipa", "pravne informacije"],
    },
    LanguageKeywords {
        lang: "sk",
        primary: &["kontakt"],
        secondary: &["o nás", "o nas", "tím", "tim", "právne informácie", "pravne informacie"],
    },
    LanguageKeywords {
        lang: "mt",
        primary: &["kuntatt"],
        secondary: &["dwar", "tim", "informazzjoni legali"],
    },
    LanguageKeywords {
        lang: "ga",
        primary: &["teagmháil", "teagmhail"],
        secondary: &["fúinn", "fuinn", "foireann", "eolas dlíthiúil", "eolas dlithiuil"],
    },
];

/// A keyword flattened out of [`CONTACT_KEYWORDS`], deduplicated across languages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub text: &'static str,
    pub tier: KeywordTier,
}

/// All keywords, longest first so multi-word phrases are tried before their parts.
/// A word listed as primary in any language stays primary.
pub static ALL_KEYWORDS: LazyLock<Vec<Keyword>> = LazyLock::new(|| {
    let mut out: Vec<Keyword> = Vec::new();
    for lang in CONTACT_KEYWORDS {
        for &text in lang.primary {
            match out.iter_mut().find(|k| k.text == text) {
                Some(existing) => existing.tier = KeywordTier::Primary,
                None => out.push(Keyword {
                    text,
                    tier: KeywordTier::Primary,
                }),
            }
        }
        for &text in lang.secondary {
            if !out.iter().any(|k| k.text == text) {
                out.push(Keyword {
                    text,
                    tier: KeywordTier::Secondary,
                });
            }
        }
    }
    out.sort_by(|a, b| b.text.chars().count().cmp(&a.text.chars().count()).then(a.text.cmp(b.text)));
    out
});

/// Button/link captions that accept a cookie-consent dialog.
pub static CONSENT_KEYWORDS: &[&str] = &[
    "accept all",
    "accept all cookies",
    "allow all",
    "accept",
    "agree",
    "i agree",
    "ok",
    "got it",
    "i understand",
    "alle akzeptieren",
    "akzeptieren",
    "zustimmen",
    "einverstanden",
    "tout accepter",
    "accepter",
    "j'accepte",
    "aceptar todo",
    "aceptar",
    "aceitar",
    "aceitar todos",
    "accetta tutti",
    "accetto",
    "accetta",
    "alles accepteren",
    "akkoord",
    "godkänn alla",
    "acceptera",
    "hyväksy",
    "zaakceptuj",
    "souhlasím",
    "elfogadom",
    "acceptă",
    "prihvati",
];

/// Words standing in for `@` in "name [at] domain" style addresses.
pub static AT_WORDS: &[&str] = &[
    "at", "ät", "arroba", "chez", "bei", "presso", "kukac", "snabel-a", "snabela", "małpa",
    "malpa", "zavináč", "zavinac", "miukumauku",
];

/// Words standing in for `.` in the domain part.
pub static DOT_WORDS: &[&str] = &[
    "dot", "punkt", "point", "punto", "ponto", "pont", "piste", "kropka", "tečka", "tecka",
    "pik", "prik", "taške", "punct",
];

/// Find `needle` in `haystack` where both ends sit on a non-alphanumeric
/// boundary. Both arguments are expected to be lowercase already.
pub fn contains_term(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}
