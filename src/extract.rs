//! Turns a stored upload into [`Document`]s.
//!
//! | Type | Strategy |
//! |------|----------|
//! | PDF  | `pdf-extract` over the raw bytes |
//! | DOCX | `word/document.xml` from the ZIP, one line per paragraph |
//! | TXT  | UTF-8, invalid sequences replaced |
//! | CSV  | one document per data row, `header: value` lines |
//! | URL  | first line of the upload is fetched; visible page text is kept |
//!
//! Extraction never panics; failures come back as [`ExtractError`] and the
//! collection is left unindexed.

use scraper::{Html, Selector};
use std::io::Read;

use crate::models::{Document, FileType};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Elements whose text makes up the readable part of a web page.
const PAGE_TEXT_SELECTOR: &str = "title, h1, h2, h3, h4, h5, h6, p, li, pre, blockquote, td";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("CSV parsing failed: {0}")]
    Csv(String),
    #[error("invalid URL upload: {0}")]
    InvalidUrl(String),
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("HTML parsing failed: {0}")]
    Html(String),
    #[error("no text could be extracted from {0}")]
    Empty(String),
}

/// Extracts documents from `bytes`, an upload of type `file_type` stored
/// as `source`. URL uploads are fetched with `client`.
pub async fn load_documents(
    bytes: &[u8],
    file_type: FileType,
    source: &str,
    client: &reqwest::Client,
) -> Result<Vec<Document>, ExtractError> {
    let docs = match file_type {
        FileType::Pdf => vec![Document::new(extract_pdf(bytes)?, source)],
        FileType::Docx => vec![Document::new(extract_docx(bytes)?, source)],
        FileType::Txt => vec![Document::new(String::from_utf8_lossy(bytes), source)],
        FileType::Csv => csv_documents(&String::from_utf8_lossy(bytes), source)?,
        FileType::Url => {
            let url = url_from_upload(bytes)?;
            let html = fetch_page(client, &url).await?;
            vec![Document::new(page_text(&html)?, url)]
        }
    };

    if docs.iter().all(|d| d.page_content.trim().is_empty()) {
        return Err(ExtractError::Empty(source.to_string()));
    }
    Ok(docs)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_paragraphs(&doc_xml)
}

/// Collects `<w:t>` text, ending each `<w:p>` paragraph with a newline.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"br" => out.push('\n'),
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

/// One document per data row; the first row is the header.
fn csv_documents(text: &str, source: &str) -> Result<Vec<Document>, ExtractError> {
    let mut rows = parse_csv(text)?.into_iter();
    let headers = match rows.next() {
        Some(h) => h,
        None => return Ok(Vec::new()),
    };

    let docs = rows
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .enumerate()
        .map(|(i, row)| {
            let lines: Vec<String> = headers
                .iter()
                .enumerate()
                .map(|(col, header)| {
                    let value = row.get(col).map(String::as_str).unwrap_or("");
                    format!("{}: {}", header.trim(), value.trim())
                })
                .collect();
            Document::new(lines.join("\n"), source).with_row(i)
        })
        .collect();
    Ok(docs)
}

/// RFC 4180 style parsing: quoted fields may hold commas, doubled quotes
/// and line breaks.
pub fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, ExtractError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                line += 1;
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ExtractError::Csv(format!(
            "unterminated quoted field starting before line {}",
            line
        )));
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

fn url_from_upload(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = String::from_utf8_lossy(bytes);
    let url = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| ExtractError::InvalidUrl("upload is empty".to_string()))?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ExtractError::InvalidUrl(format!(
            "'{}' is not an http(s) URL",
            url
        )));
    }
    Ok(url.to_string())
}

async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String, ExtractError> {
    let fetch_err = |message: String| ExtractError::Fetch {
        url: url.to_string(),
        message,
    };
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| fetch_err(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(fetch_err(format!("HTTP {}", status)));
    }
    response.text().await.map_err(|e| fetch_err(e.to_string()))
}

/// Readable text of an HTML page, one element per line.
pub fn page_text(html: &str) -> Result<String, ExtractError> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse(PAGE_TEXT_SELECTOR).map_err(|e| ExtractError::Html(format!("{:?}", e)))?;

    let mut lines: Vec<String> = document
        .select(&selector)
        .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|t| !t.is_empty())
        .collect();

    if lines.is_empty() {
        let body = Selector::parse("body").map_err(|e| ExtractError::Html(format!("{:?}", e)))?;
        lines = document
            .select(&body)
            .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
            .filter(|t| !t.is_empty())
            .collect();
    }
    Ok(lines.join("\n"))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        use std::io::Write;
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn txt_is_one_document() {
        let client = reqwest::Client::new();
        let docs = load_documents(b"plain notes", FileType::Txt, "n.txt", &client)
            .await
            .unwrap();
        assert_eq!(docs, vec![Document::new("plain notes", "n.txt")]);
    }

    #[tokio::test]
    async fn empty_upload_is_an_error() {
        let client = reqwest::Client::new();
        let err = load_documents(b"  \n ", FileType::Txt, "e.txt", &client)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Empty(_)));
    }

    #[tokio::test]
    async fn invalid_pdf_returns_error() {
        let client = reqwest::Client::new();
        let err = load_documents(b"not a pdf", FileType::Pdf, "x.pdf", &client)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[tokio::test]
    async fn non_http_url_upload_is_rejected_before_fetching() {
        let client = reqwest::Client::new();
        let err = load_documents(b"file:///etc/passwd", FileType::Url, "r.url", &client)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidUrl(_)));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let bytes = docx_with_paragraphs(&["First &amp; foremost", "Second"]);
        assert_eq!(extract_docx(&bytes).unwrap(), "First & foremost\nSecond");
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        assert!(matches!(
            extract_docx(b"not a zip").unwrap_err(),
            ExtractError::Docx(_)
        ));
    }

    #[test]
    fn csv_quoting() {
        let rows = parse_csv("a,b\r\n\"x, y\",\"say \"\"hi\"\"\"\n\"multi\nline\",3\n").unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["x, y".to_string(), "say \"hi\"".to_string()],
                vec!["multi\nline".to_string(), "3".to_string()],
            ]
        );
    }

    #[test]
    fn csv_unterminated_quote_is_an_error() {
        assert!(matches!(
            parse_csv("a,b\n\"open,1\n").unwrap_err(),
            ExtractError::Csv(_)
        ));
    }

    #[test]
    fn csv_rows_become_documents() {
        let docs = csv_documents("name,city\nAda,London\n,\nGrace,Arlington", "people.csv").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].page_content, "name: Ada\ncity: London");
        assert_eq!(docs[0].row, Some(0));
        assert_eq!(docs[1].page_content, "name: Grace\ncity: Arlington");
    }

    #[test]
    fn page_text_keeps_readable_elements() {
        let html = "<html><head><title>Guide</title><script>var x = 1;</script></head>\
                    <body><h1>Install</h1><p>Run   the\n installer.</p><ul><li>Step one</li></ul></body></html>";
        assert_eq!(
            page_text(html).unwrap(),
            "Guide\nInstall\nRun the installer.\nStep one"
        );
    }

    #[test]
    fn page_text_falls_back_to_body() {
        let html = "<html><body><div>Only a div</div></body></html>";
        assert_eq!(page_text(html).unwrap(), "Only a div");
    }
}
