use std::fs;

use scraper::Html;
use url::Url;

use crate::extractor::{EmailSet, PageView, Technique, entities, extract};
use crate::fetcher::decode::visible_text;
use crate::fetcher::errors::FetchError;
use crate::fetcher::types::{FetchTier, PageFetchResult};

#[test]
fn test_extract_plain_contact_page() {
    let html = fs::read_to_string("src/extractor/tests/fixtures/plain_contact.html")
        .expect("Failed to read test fixture");

    let emails = extract(&create_test_page(html, "https://firma.de/kontakt"));

    // Placeholder, asset name and error-tracking DSN are all dropped
    assert_eq!(emails.addresses(), vec!["info@firma.de"]);
    let record = emails.get("info@firma.de").unwrap();
    assert_eq!(record.technique, Technique::Plain);
    assert_eq!(record.source_url.as_str(), "https://firma.de/kontakt");
}

#[test]
fn test_extract_every_technique() {
    let html = fs::read_to_string("src/extractor/tests/fixtures/obfuscated.html")
        .expect("Failed to read test fixture");

    let emails = extract(&create_test_page(html, "https://firma.de/impressum"));

    let found: Vec<(&str, Technique)> = emails
        .iter()
        .map(|r| (r.address.as_str(), r.technique))
        .collect();
    assert_eq!(
        found,
        vec![
            ("info@firma.de", Technique::Plain),
            ("presse@firma.de", Technique::EntityEncoded),
            ("vertrieb@firma.de", Technique::AtWordSubstitution),
            ("jobs@firma.de", Technique::TextSplit),
            ("kontakt@firma.de", Technique::JsConcat),
            ("buchhaltung@firma.de", Technique::MailtoHref),
            ("bewerbung@firma.de", Technique::ImageAltText),
            ("service@firma.de", Technique::CfEmail),
        ]
    );
    assert!(!emails.addresses().contains(&"jobs@nospamfirma.de"));
}

#[test]
fn test_footer_spans_and_prose() {
    let html = fs::read_to_string("src/extractor/tests/fixtures/contact_footer.html")
        .expect("Failed to read test fixture");

    let emails = extract(&create_test_page(html, "https://firma.de/kontakt"));

    let found: Vec<(&str, Technique)> = emails
        .iter()
        .map(|r| (r.address.as_str(), r.technique))
        .collect();
    assert_eq!(
        found,
        vec![
            ("info@firma.de", Technique::Plain),
            ("vertrieb@firma.de", Technique::Plain),
        ]
    );
}

#[test]
fn test_spa_shell_has_nothing() {
    let html = fs::read_to_string("src/extractor/tests/fixtures/spa_shell.html")
        .expect("Failed to read test fixture");

    let emails = extract(&create_test_page(html, "https://firma.de/"));
    assert!(emails.is_empty());
}

#[test]
fn test_entity_reference_decodes_to_address() {
    let html = "<p>Mail: info&#64;example.com</p>";
    let page = PageView::new(html, "", &[]);
    let matches = entities::find(&page);

    assert_eq!(matches[0].decoded, "info@example.com");
    assert_eq!(matches[0].technique, Technique::EntityEncoded);

    // Same encoding on a real domain survives validation
    let emails = extract(&create_test_page(
        "<p>Mail: info&#64;firma.de</p>".to_string(),
        "https://firma.de/",
    ));
    assert_eq!(emails.addresses(), vec!["info@firma.de"]);
}

#[test]
fn test_obfuscations_agree_with_plain_form() {
    let variants = [
        "<p>info@firma.de</p>",
        "<p>INFO@FIRMA.DE</p>",
        "<p>info&#64;firma&#46;de</p>",
        "<p>info&#x40;firma.de</p>",
        "<p>info [at] firma [dot] de</p>",
        "<p>info (at) firma (punkt) de</p>",
        "<p>info at firma dot de</p>",
        "<p>in<b>fo</b>@<i>firma</i>.de</p>",
        "<p>info\u{200B}@firma.de</p>",
        "<script>var a='info'; var b='firma.de'; x = a + '@' + b;</script>",
        r#"<script>x = "ed.amrif@ofni".split("").reverse().join("");</script>"#,
        r#"<a href="mailto:info%40firma.de">mail</a>"#,
        r#"<img src="m.png" alt="info@firma.de">"#,
    ];
    for html in variants {
        let emails = extract(&create_test_page(html.to_string(), "https://firma.de/"));
        assert_eq!(emails.addresses(), vec!["info@firma.de"], "{html}");
    }
}

#[test]
fn test_dedup_is_idempotent_across_pages() {
    let home = extract(&create_test_page(
        "<p>info@firma.de</p>".to_string(),
        "https://firma.de/",
    ));
    let contact = extract(&create_test_page(
        "<p>Info@Firma.de, hello@firma.de</p>".to_string(),
        "https://firma.de/kontakt",
    ));

    let mut merged = EmailSet::new();
    merged.merge(home.clone());
    merged.merge(contact.clone());
    let once = merged.clone();
    merged.merge(home);
    merged.merge(contact);

    assert_eq!(merged, once);
    assert_eq!(merged.addresses(), vec!["info@firma.de", "hello@firma.de"]);
    assert_eq!(merged.get("info@firma.de").unwrap().source_url.path(), "/");
}

#[test]
fn test_failed_page_with_body_is_scanned() {
    let url = Url::parse("https://firma.de/").unwrap();
    let err = FetchError::BotChallenge {
        status: Some(403),
        marker: "cf-chl",
    };
    let page = PageFetchResult::failure(url.clone(), FetchTier::Http, &err).with_body(
        url,
        "<p>abuse@firma.de</p>".to_string(),
        "abuse@firma.de".to_string(),
    );
    assert_eq!(extract(&page).addresses(), vec!["abuse@firma.de"]);

    let empty = PageFetchResult::failure(
        Url::parse("https://firma.de/").unwrap(),
        FetchTier::Http,
        &FetchError::Connect("refused".to_string()),
    );
    assert!(extract(&empty).is_empty());
}

#[test]
fn test_malformed_html() {
    let html = "<html><body><p>Unclosed <div>mail: info@firma.de<span>".to_string();
    let emails = extract(&create_test_page(html, "https://firma.de/broken"));
    assert_eq!(emails.addresses(), vec!["info@firma.de"]);
}

fn create_test_page(html: String, url: &str) -> PageFetchResult {
    let url = Url::parse(url).unwrap();
    let text = visible_text(&Html::parse_document(&html));
    PageFetchResult::success(url.clone(), url, FetchTier::Http, Some(200), html, text)
}

#[cfg(feature = "fuzz")]
mod fuzz {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_extract_never_panics(
            html in ".*",
            url in "https://[a-z]+\\.com/[a-z]*"
        ) {
            let _ = extract(&create_test_page(html, &url));
        }

        #[test]
        fn test_extracted_addresses_are_normalized(html in ".*") {
            let emails = extract(&create_test_page(html, "https://firma.de/"));
            for record in &emails {
                prop_assert_eq!(record.address.clone(), record.address.to_lowercase());
                prop_assert!(crate::patterns::is_valid_address(&record.address));
            }
        }

        #[test]
        fn test_script_folder_never_panics(source in ".*") {
            let _ = crate::extractor::script::fold_literals(&source);
        }
    }
}
