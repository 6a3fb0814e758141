//! Text extraction: turns an uploaded file into plain text.
//!
//! Never fails: anything that cannot be read yields an empty string, which the
//! pipeline treats as "no content". A panic inside the archive or XML readers
//! is caught here and degrades the same way.

pub mod slides;

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::models::analysis::{SourceFile, PPTX_MEDIA_TYPE};

/// Local-file header signature shared by every zip container.
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// Extracts the text of a file, dispatching slide decks to the slide extractor
/// and decoding everything else as UTF-8.
pub fn extract_text(file: &SourceFile) -> String {
    if is_slide_deck(&file.name, &file.media_type, &file.content) {
        debug!("Extracting {} as a slide deck", file.name);
        return contain_panic(&file.name, || slides::extract_slide_deck_text(&file.content));
    }

    String::from_utf8_lossy(&file.content).into_owned()
}

/// Runs `extract`, turning a panic into an empty extraction.
fn contain_panic(name: &str, extract: impl FnOnce() -> String) -> String {
    match catch_unwind(AssertUnwindSafe(extract)) {
        Ok(text) => text,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!("Extraction of {name} panicked, treating as empty: {reason}");
            String::new()
        }
    }
}

fn is_slide_deck(name: &str, media_type: &str, content: &[u8]) -> bool {
    name.to_ascii_lowercase().ends_with(".pptx")
        || media_type.eq_ignore_ascii_case(PPTX_MEDIA_TYPE)
        || content.starts_with(ZIP_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::slides::tests::{build_deck, slide_xml};
    use super::*;

    #[test]
    fn test_plain_text_is_decoded_directly() {
        let file = SourceFile::new(
            "notes.txt",
            "text/plain",
            Bytes::from_static(b"Lesson 1: fractions\nLesson 2: decimals"),
        );
        assert_eq!(
            extract_text(&file),
            "Lesson 1: fractions\nLesson 2: decimals"
        );
    }

    #[test]
    fn test_json_is_decoded_as_text() {
        let file = SourceFile::new(
            "quiz.json",
            "application/json",
            Bytes::from_static(br#"{"q": "What is 2+2?"}"#),
        );
        assert_eq!(extract_text(&file), r#"{"q": "What is 2+2?"}"#);
    }

    #[test]
    fn test_pptx_extension_dispatches_to_slides() {
        let deck = build_deck(&[("ppt/slides/slide1.xml", &slide_xml(&["Plate tectonics"]))]);
        let file = SourceFile::new("Geology.PPTX", "application/octet-stream", Bytes::from(deck));
        assert_eq!(extract_text(&file), "Plate tectonics");
    }

    #[test]
    fn test_zip_signature_dispatches_to_slides() {
        let deck = build_deck(&[("ppt/slides/slide1.xml", &slide_xml(&["Volcanoes"]))]);
        let file = SourceFile::new("upload", "application/octet-stream", Bytes::from(deck));
        assert_eq!(extract_text(&file), "Volcanoes");
    }

    #[test]
    fn test_corrupt_deck_yields_empty_string() {
        let file = SourceFile::new(
            "broken.pptx",
            PPTX_MEDIA_TYPE,
            Bytes::from_static(b"PK\x03\x04 truncated"),
        );
        assert_eq!(extract_text(&file), "");
    }

    #[test]
    fn test_panicking_extractor_yields_empty_string() {
        let text = contain_panic("bad.pptx", || panic!("malformed central directory"));
        assert_eq!(text, "");
    }

    #[test]
    fn test_contain_panic_passes_through_text() {
        assert_eq!(contain_panic("ok.pptx", || "Photosynthesis".to_string()), "Photosynthesis");
    }

    #[test]
    fn test_empty_file_yields_empty_string() {
        let file = SourceFile::new("empty.txt", "text/plain", Bytes::new());
        assert_eq!(extract_text(&file), "");
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let file = SourceFile::new("latin1.txt", "text/plain", Bytes::from_static(b"caf\xe9"));
        assert_eq!(extract_text(&file), "caf\u{FFFD}");
    }
}
