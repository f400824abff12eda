//! Extraction adapters: turn an uploaded file into plain text.
//!
//! Documents are parsed locally (plain text, PDF, DOCX). Images are read by
//! the OCR command and described by the captioning service; either result
//! alone is enough. Audio and video go to the transcription service.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use crate::config::{Config, OcrConfig};
use crate::models::ContentType;

/// Maximum decompressed bytes read from `word/document.xml` (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extensions read as UTF-8 text.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "tsv", "json", "xml", "html", "htm", "rtf", "log", "yaml",
    "yml",
];

pub async fn extract_text(
    client: &reqwest::Client,
    config: &Config,
    path: &Path,
    filename: &str,
    content_type: ContentType,
    mime_type: &str,
) -> Result<String> {
    match content_type {
        ContentType::Document => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let ext = extension_of(filename);
            tokio::task::spawn_blocking(move || extract_document(&bytes, &ext)).await?
        }
        ContentType::Image => {
            let ocr = ocr_image(&config.ocr, path).await;
            let bytes = tokio::fs::read(path).await?;
            let caption =
                crate::llm::caption::caption_image(client, &config.caption, mime_type, bytes, None)
                    .await;
            combine_image_text(ocr, caption)
        }
        ContentType::Audio => {
            let bytes = tokio::fs::read(path).await?;
            crate::llm::transcription::transcribe(
                client,
                &config.transcription,
                &config.llm,
                filename,
                mime_type,
                bytes,
            )
            .await
        }
        ContentType::Video => {
            let bytes = tokio::fs::read(path).await?;
            let transcript = crate::llm::transcription::transcribe(
                client,
                &config.transcription,
                &config.llm,
                filename,
                mime_type,
                bytes,
            )
            .await?;
            Ok(format!("Audio transcript: {transcript}"))
        }
    }
}

/// Recognize text in an image with the configured OCR command.
pub async fn ocr_image(config: &OcrConfig, path: &Path) -> Result<String> {
    if !config.enabled {
        anyhow::bail!("OCR is disabled");
    }

    let output = tokio::process::Command::new(&config.command)
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(&config.language)
        .output()
        .await
        .with_context(|| format!("Failed to run OCR command '{}'", config.command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("OCR command exited with {}: {}", output.status, stderr.trim());
    }

    // Page breaks come through as form feeds
    Ok(String::from_utf8_lossy(&output.stdout)
        .replace('\x0c', "")
        .trim()
        .to_string())
}

/// Merge OCR text and caption into the indexed text of an image. Fails
/// only when neither produced anything.
pub fn combine_image_text(ocr: Result<String>, caption: Result<String>) -> Result<String> {
    let ocr_text = match ocr {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("OCR unavailable: {e:#}");
            None
        }
    };

    match (ocr_text, caption) {
        (Some(text), Ok(caption)) => Ok(format!("OCR Text: {text}\nImage Description: {caption}")),
        (None, Ok(caption)) => Ok(format!("Image Description: {caption}")),
        (Some(text), Err(e)) => {
            tracing::warn!("Captioning unavailable, keeping OCR text only: {e:#}");
            Ok(format!("OCR Text: {text}"))
        }
        (None, Err(e)) => Err(e.context("No text could be recognized or captioned in the image")),
    }
}

/// Lowercase extension without the dot, or an empty string.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Extract text from document bytes, dispatching on file extension.
pub fn extract_document(bytes: &[u8], ext: &str) -> Result<String> {
    match ext {
        "pdf" => {
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| anyhow::anyhow!("PDF extraction failed: {e}"))?;
            Ok(text.trim().to_string())
        }
        "docx" => extract_docx(bytes),
        e if TEXT_EXTENSIONS.contains(&e) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        // Unknown document formats: keep them only if they are valid UTF-8
        _ => Ok(String::from_utf8(bytes.to_vec()).unwrap_or_default()),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).context("DOCX is not a zip archive")?;
    let entry = archive
        .by_name("word/document.xml")
        .context("word/document.xml not found")?;

    let mut xml = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut xml)?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        anyhow::bail!("word/document.xml exceeds size limit");
    }

    docx_paragraph_text(&xml)
}

/// Collect `<w:t>` runs, one line per `<w:p>` paragraph.
fn docx_paragraph_text(xml: &[u8]) -> Result<String> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                current.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::Eof) => break,
            Err(e) => anyhow::bail!("DOCX XML parse error: {e}"),
            _ => {}
        }
        buf.clear();
    }

    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_docx(document_xml: &str) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            zip.write_all(document_xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Report.PDF"), "pdf");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "");
    }

    #[test]
    fn test_plain_text_document() {
        let text = extract_document("hello\nworld".as_bytes(), "txt").unwrap();
        assert_eq!(text, "hello\nworld");
    }

    #[test]
    fn test_unknown_binary_document_is_empty() {
        let text = extract_document(&[0xff, 0xfe, 0x00, 0x81], "bin").unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn test_docx_paragraphs() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>First</w:t></w:r><w:r><w:t xml:space="preserve"> paragraph</w:t></w:r></w:p>
    <w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = extract_document(&make_docx(xml), "docx").unwrap();
        assert_eq!(text, "First paragraph\nSecond & last");
    }

    #[test]
    fn test_docx_missing_document_xml() {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        assert!(extract_document(&buf.into_inner(), "docx").is_err());
    }

    #[test]
    fn test_image_text_combines_ocr_and_caption() {
        let text =
            combine_image_text(Ok("EXIT 12".to_string()), Ok("a road sign".to_string())).unwrap();
        assert_eq!(text, "OCR Text: EXIT 12\nImage Description: a road sign");
    }

    #[test]
    fn test_image_text_falls_back_to_ocr_only() {
        let text = combine_image_text(
            Ok("Invoice total 42".to_string()),
            Err(anyhow::anyhow!("Captioning service not configured")),
        )
        .unwrap();
        assert_eq!(text, "OCR Text: Invoice total 42");
    }

    #[test]
    fn test_image_text_caption_only_when_ocr_blank_or_failing() {
        let text = combine_image_text(Ok("  \n".to_string()), Ok("a cat".to_string())).unwrap();
        assert_eq!(text, "Image Description: a cat");

        let text =
            combine_image_text(Err(anyhow::anyhow!("no tesseract")), Ok("a cat".to_string()))
                .unwrap();
        assert_eq!(text, "Image Description: a cat");
    }

    #[test]
    fn test_image_text_fails_when_nothing_recognized() {
        let err = combine_image_text(Ok(String::new()), Err(anyhow::anyhow!("caption down")))
            .unwrap_err();
        assert!(format!("{err:#}").contains("caption down"));
    }

    #[tokio::test]
    async fn test_ocr_disabled_or_missing_command_errors() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.png");
        std::fs::write(&image, b"png").unwrap();

        let disabled = OcrConfig {
            enabled: false,
            ..OcrConfig::default()
        };
        assert!(ocr_image(&disabled, &image).await.is_err());

        let missing = OcrConfig {
            command: dir.path().join("no-such-ocr").display().to_string(),
            ..OcrConfig::default()
        };
        assert!(ocr_image(&missing, &image).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ocr_reads_command_stdout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ocr");
        std::fs::write(&script, "#!/bin/sh\nprintf 'Page one\\n\\f'\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let image = dir.path().join("a.png");
        std::fs::write(&image, b"png").unwrap();

        let config = OcrConfig {
            command: script.display().to_string(),
            ..OcrConfig::default()
        };
        assert_eq!(ocr_image(&config, &image).await.unwrap(), "Page one");
    }

    #[test]
    fn test_corrupt_pdf_errors() {
        assert!(extract_document(b"not a pdf", "pdf").is_err());
    }
}
