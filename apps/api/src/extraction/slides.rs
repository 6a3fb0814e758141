//! Slide-deck text extraction.
//!
//! A deck is a zip container holding one XML document per slide under
//! `ppt/slides/`. Text lives in runs (`a:r/a:t`) inside paragraphs of shape
//! text bodies. Slides are visited in lexical entry-name order, so `slide10.xml`
//! sorts before `slide2.xml`.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, warn};
use zip::ZipArchive;

const SLIDE_ENTRY_PREFIX: &str = "ppt/slides/slide";
const SLIDE_ENTRY_SUFFIX: &str = ".xml";
/// Largest uncompressed slide document read; bigger entries are skipped.
const MAX_SLIDE_XML_BYTES: u64 = 2 * 1024 * 1024;

/// `p:sld/p:cSld/p:spTree/p:sp/p:txBody/a:p/a:r/a:t`
const SHAPE_TREE_TEXT_PATH: &[&[u8]] = &[
    b"p:sld",
    b"p:cSld",
    b"p:spTree",
    b"p:sp",
    b"p:txBody",
    b"a:p",
    b"a:r",
    b"a:t",
];

/// `p:sld/p:cSld/p:txBody/a:p/a:r/a:t`
const BODY_TEXT_PATH: &[&[u8]] = &[b"p:sld", b"p:cSld", b"p:txBody", b"a:p", b"a:r", b"a:t"];

#[derive(Debug, Error)]
enum SlideError {
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("entry exceeds the slide size limit")]
    TooLarge,
}

#[derive(Debug, Clone, Copy)]
enum TextTarget {
    ShapeTree,
    Body,
}

/// Extracts the text of every slide in a deck, in entry-name order.
///
/// Returns an empty string when the archive cannot be opened or no slide
/// yields text. A slide that fails to parse is skipped.
pub fn extract_slide_deck_text(bytes: &[u8]) -> String {
    let mut archive = match ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(e) => {
            warn!("Could not open slide deck archive: {e}");
            return String::new();
        }
    };

    let mut entries: Vec<String> = archive
        .file_names()
        .filter(|name| is_slide_entry(name))
        .map(String::from)
        .collect();
    entries.sort();

    let mut slides = Vec::with_capacity(entries.len());
    for entry in &entries {
        match read_slide(&mut archive, entry) {
            Ok(text) if !text.is_empty() => slides.push(text),
            Ok(_) => debug!("Slide {entry} has no text"),
            Err(e) => warn!("Skipping slide {entry}: {e}"),
        }
    }

    let text = clean_deck_text(&slides.join("\n\n"));
    if text.is_empty() {
        warn!("No text content extracted from slide deck");
    } else {
        debug!(
            "Extracted {} characters from {} slides",
            text.len(),
            slides.len()
        );
    }
    text
}

fn is_slide_entry(name: &str) -> bool {
    name.starts_with(SLIDE_ENTRY_PREFIX) && name.ends_with(SLIDE_ENTRY_SUFFIX)
}

fn read_slide(archive: &mut ZipArchive<Cursor<&[u8]>>, entry: &str) -> Result<String, SlideError> {
    let mut file = archive.by_name(entry)?;
    if file.size() > MAX_SLIDE_XML_BYTES {
        return Err(SlideError::TooLarge);
    }

    // The header size is not trusted; cap what is actually inflated.
    let mut xml = String::new();
    (&mut file)
        .take(MAX_SLIDE_XML_BYTES + 1)
        .read_to_string(&mut xml)?;
    if xml.len() as u64 > MAX_SLIDE_XML_BYTES {
        return Err(SlideError::TooLarge);
    }
    Ok(parse_slide_xml(&xml)?)
}

/// Collects trimmed, non-blank run text from one slide document.
/// Shape-tree text comes first, then text in a body directly under `p:cSld`.
fn parse_slide_xml(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut shape_texts: Vec<String> = Vec::new();
    let mut body_texts: Vec<String> = Vec::new();
    let mut target: Option<TextTarget> = None;
    let mut current = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                path.push(e.name().as_ref().to_vec());
                if path_is(&path, SHAPE_TREE_TEXT_PATH) {
                    target = Some(TextTarget::ShapeTree);
                    current.clear();
                } else if path_is(&path, BODY_TEXT_PATH) {
                    target = Some(TextTarget::Body);
                    current.clear();
                }
            }
            Event::End(_) => {
                if let Some(t) = target.take() {
                    let text = current.trim();
                    if !text.is_empty() {
                        match t {
                            TextTarget::ShapeTree => shape_texts.push(text.to_string()),
                            TextTarget::Body => body_texts.push(text.to_string()),
                        }
                    }
                    current.clear();
                }
                path.pop();
            }
            Event::Text(t) if target.is_some() => current.push_str(&t.unescape()?),
            Event::CData(c) if target.is_some() => {
                current.push_str(&String::from_utf8_lossy(&c.into_inner()))
            }
            Event::Eof => break,
            _ => {}
        }
    }

    shape_texts.extend(body_texts);
    Ok(shape_texts.join("\n"))
}

fn path_is(path: &[Vec<u8>], expected: &[&[u8]]) -> bool {
    path.len() == expected.len()
        && path
            .iter()
            .zip(expected)
            .all(|(seen, want)| seen.as_slice() == *want)
}

/// Trims lines and drops blanks, slide numbers, and bare URLs.
fn clean_deck_text(text: &str) -> String {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.chars().all(|c| c.is_ascii_digit()))
        .filter(|line| !(line.starts_with("http://") || line.starts_with("https://")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use zip::write::FileOptions;
    use zip::ZipWriter;

    use super::*;

    const NAMESPACES: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;

    /// Builds a zip container from `(entry name, contents)` pairs.
    pub(crate) fn build_deck(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer
                .start_file(*name, FileOptions::default())
                .unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// A slide with one shape per paragraph run.
    pub(crate) fn slide_xml(runs: &[&str]) -> String {
        let shapes: String = runs
            .iter()
            .map(|r| {
                format!(
                    "<p:sp><p:nvSpPr/><p:txBody><a:bodyPr/><a:p><a:r><a:rPr lang=\"en-US\"/><a:t>{r}</a:t></a:r></a:p></p:txBody></p:sp>"
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld {NAMESPACES}><p:cSld><p:spTree>{shapes}</p:spTree></p:cSld></p:sld>"#
        )
    }

    #[test]
    fn test_extracts_runs_in_shape_order() {
        let deck = build_deck(&[(
            "ppt/slides/slide1.xml",
            &slide_xml(&["Photosynthesis", "Light reactions"]),
        )]);
        assert_eq!(
            extract_slide_deck_text(&deck),
            "Photosynthesis\nLight reactions"
        );
    }

    #[test]
    fn test_lexical_slide_order_places_slide10_before_slide2() {
        let deck = build_deck(&[
            ("ppt/slides/slide1.xml", &slide_xml(&["A"])),
            ("ppt/slides/slide2.xml", &slide_xml(&["B"])),
            ("ppt/slides/slide10.xml", &slide_xml(&["C"])),
        ]);
        // Known limitation: entry names are compared as strings, not slide numbers.
        assert_eq!(extract_slide_deck_text(&deck), "A\nC\nB");
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let deck = build_deck(&[
            ("ppt/slides/slide2.xml", &slide_xml(&["Second slide"])),
            ("ppt/slides/slide1.xml", &slide_xml(&["First slide"])),
        ]);
        let first = extract_slide_deck_text(&deck);
        let second = extract_slide_deck_text(&deck);
        assert_eq!(first, second);
        assert_eq!(first, "First slide\nSecond slide");
    }

    #[test]
    fn test_drops_slide_numbers_urls_and_blank_runs() {
        let deck = build_deck(&[(
            "ppt/slides/slide1.xml",
            &slide_xml(&["Cell structure", "  ", "12", "https://example.org/cells", "Mitochondria"]),
        )]);
        assert_eq!(
            extract_slide_deck_text(&deck),
            "Cell structure\nMitochondria"
        );
    }

    #[test]
    fn test_reads_top_level_text_body_after_shape_tree() {
        let xml = format!(
            r#"<p:sld {NAMESPACES}><p:cSld><p:txBody><a:p><a:r><a:t>Speaker note</a:t></a:r></a:p></p:txBody><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>Title</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
        );
        let deck = build_deck(&[("ppt/slides/slide1.xml", &xml)]);
        assert_eq!(extract_slide_deck_text(&deck), "Title\nSpeaker note");
    }

    #[test]
    fn test_unescapes_entities_in_runs() {
        let deck = build_deck(&[("ppt/slides/slide1.xml", &slide_xml(&["Cause &amp; effect"]))]);
        assert_eq!(extract_slide_deck_text(&deck), "Cause & effect");
    }

    #[test]
    fn test_malformed_slide_is_skipped() {
        let deck = build_deck(&[
            ("ppt/slides/slide1.xml", &slide_xml(&["Kept"])),
            (
                "ppt/slides/slide2.xml",
                "<p:sld><p:cSld><p:spTree></p:cSld></p:sld>",
            ),
            ("ppt/slides/slide3.xml", &slide_xml(&["Also kept"])),
        ]);
        assert_eq!(extract_slide_deck_text(&deck), "Kept\nAlso kept");
    }

    #[test]
    fn test_oversize_slide_is_skipped() {
        let huge = "x".repeat(MAX_SLIDE_XML_BYTES as usize + 1);
        let deck = build_deck(&[
            ("ppt/slides/slide1.xml", &slide_xml(&["Before"])),
            ("ppt/slides/slide2.xml", &slide_xml(&[huge.as_str()])),
            ("ppt/slides/slide3.xml", &slide_xml(&["After"])),
        ]);
        assert!(deck.len() < huge.len() / 10);
        assert_eq!(extract_slide_deck_text(&deck), "Before\nAfter");
    }

    #[test]
    fn test_ignores_non_slide_entries() {
        let deck = build_deck(&[
            ("ppt/slides/_rels/slide1.xml.rels", "<Relationships/>"),
            ("ppt/slideLayouts/slideLayout1.xml", &slide_xml(&["Layout"])),
            ("ppt/slides/slide1.xml", &slide_xml(&["Only this"])),
        ]);
        assert_eq!(extract_slide_deck_text(&deck), "Only this");
    }

    #[test]
    fn test_clean_deck_text_drops_blank_slide_separator() {
        let joined = clean_deck_text("One\n\nTwo");
        assert_eq!(joined, "One\nTwo");
    }

    #[test]
    fn test_not_an_archive_returns_empty() {
        assert_eq!(extract_slide_deck_text(b"plain text, not a zip"), "");
    }

    #[test]
    fn test_deck_without_text_returns_empty() {
        let deck = build_deck(&[("ppt/slides/slide1.xml", &slide_xml(&[]))]);
        assert_eq!(extract_slide_deck_text(&deck), "");
    }
}
