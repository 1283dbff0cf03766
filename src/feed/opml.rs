use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

use crate::types::{Feed, Genre};

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
/// Prevents stack overflow attacks from maliciously crafted deeply nested OPMLs.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur while reading an OPML document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The text is not well-formed XML or has no `<opml>` root.
    #[error("Malformed OPML document: {0}")]
    Malformed(String),

    /// SEC-003: OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// A feed entry as it appears in a document, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDraft {
    /// Sourced from `title`, falling back to `text`, then to the URL itself.
    pub title: String,
    pub url: String,
    /// `category` attribute, else the enclosing folder outline, else `Other`.
    pub category: String,
    pub description: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FeedDraft {
    pub fn into_feed(self) -> Feed {
        Feed {
            genre: Genre::from_label(&self.category),
            title: self.title,
            url: self.url,
            description: self.description,
            deleted_at: self.deleted_at,
        }
    }
}

/// Reads and decodes the OPML document at `path`.
pub async fn read_document(path: &Path) -> Result<Vec<FeedDraft>, DocumentError> {
    let content = tokio::fs::read_to_string(path).await?;
    decode(&content)
}

/// Decodes OPML text into the flat list of feed entries it contains.
///
/// Every `<outline>` carrying a non-empty `xmlUrl` is a feed, at any depth.
/// Outlines without one are folders: they are traversed and lend their label
/// to the feeds inside them, but are not returned. URLs are passed through
/// verbatim; judging them is the validator's job.
///
/// # Security
///
/// XXE is not possible: `quick-xml` (0.37) never expands `<!ENTITY>`
/// declarations, and custom entity references fail to unescape, which turns
/// the whole document into [`DocumentError::Malformed`].
pub fn decode(content: &str) -> Result<Vec<FeedDraft>, DocumentError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut feeds = Vec::new();
    let mut buf = Vec::new();
    // Labels of the open folder outlines, innermost last
    let mut folders: Vec<Option<String>> = Vec::new();
    let mut saw_root = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                // SEC-003: Reject excessively nested OPMLs
                if folders.len() >= MAX_OPML_DEPTH {
                    return Err(DocumentError::MaxDepthExceeded(MAX_OPML_DEPTH));
                }
                let outline = read_outline(&e, &reader)?;
                let label = outline.label();
                if let Some(feed) = outline.into_draft(&folders) {
                    feeds.push(feed);
                }
                folders.push(label);
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                if let Some(feed) = read_outline(&e, &reader)?.into_draft(&folders) {
                    feeds.push(feed);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                folders.pop();
            }
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if !saw_root => {
                if e.name().as_ref() != b"opml" {
                    return Err(DocumentError::Malformed(format!(
                        "expected <opml> root element, found <{}>",
                        String::from_utf8_lossy(e.name().as_ref())
                    )));
                }
                saw_root = true;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocumentError::Malformed(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(DocumentError::Malformed(
            "document has no <opml> root element".to_string(),
        ));
    }

    Ok(feeds)
}

#[derive(Default)]
struct Outline {
    text: Option<String>,
    title: Option<String>,
    xml_url: Option<String>,
    category: Option<String>,
    description: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Outline {
    fn label(&self) -> Option<String> {
        self.text
            .clone()
            .or_else(|| self.title.clone())
            .filter(|l| !l.trim().is_empty())
    }

    fn into_draft(self, folders: &[Option<String>]) -> Option<FeedDraft> {
        let url = self.xml_url.filter(|u| !u.trim().is_empty())?;
        let category = self
            .category
            .filter(|c| !c.trim().is_empty())
            .or_else(|| folders.iter().rev().flatten().next().cloned())
            .unwrap_or_else(|| Genre::Other.to_string());

        Some(FeedDraft {
            title: self.title.or(self.text).unwrap_or_else(|| url.clone()),
            url,
            category,
            description: self.description.unwrap_or_default(),
            deleted_at: self.deleted_at,
        })
    }
}

fn read_outline(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Outline, DocumentError> {
    let mut outline = Outline::default();
    let decoder = reader.decoder();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let value = || {
            attr.decode_and_unescape_value(decoder)
                .map(|v| v.into_owned())
                .map_err(|e| DocumentError::Malformed(e.to_string()))
        };
        match attr.key.as_ref() {
            b"text" => outline.text = Some(value()?),
            b"title" => outline.title = Some(value()?),
            b"xmlUrl" => outline.xml_url = Some(value()?),
            b"category" => outline.category = Some(value()?),
            b"description" => outline.description = Some(value()?),
            b"deletedAt" => {
                let raw = value()?;
                outline.deleted_at = parse_timestamp(&raw);
                if outline.deleted_at.is_none() {
                    tracing::warn!(value = %raw, "Ignoring unparsable deletedAt attribute");
                }
            }
            _ => {}
        }
    }

    Ok(outline)
}

/// Accepts RFC 3339, or a zone-less ISO-8601 timestamp taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| raw.parse::<NaiveDateTime>().ok().map(|n| n.and_utc()))
}

/// Groups feeds under their genre label, the shape [`encode`] expects.
pub fn group_by_genre<'a>(feeds: impl IntoIterator<Item = &'a Feed>) -> BTreeMap<String, Vec<Feed>> {
    let mut groups: BTreeMap<String, Vec<Feed>> = BTreeMap::new();
    for feed in feeds {
        groups
            .entry(feed.genre.to_string())
            .or_default()
            .push(feed.clone());
    }
    groups
}

/// Encodes feeds grouped by genre as an OPML 2.0 document stamped with the
/// current time. See [`encode_at`].
pub fn encode(feeds_by_genre: &BTreeMap<String, Vec<Feed>>, title: &str) -> Result<String> {
    encode_at(feeds_by_genre, title, Utc::now())
}

/// Encodes feeds grouped by genre as an OPML 2.0 document.
///
/// Genres appear in lexicographic order, each as a folder outline; feeds
/// inside a folder are ordered by title (byte-wise, stable for equal titles).
/// Every feed outline carries `text`, `title`, `type`, `xmlUrl`, `category`
/// and `description`, plus `deletedAt` when the feed has been deleted.
///
/// The same input and `modified` timestamp always produce identical bytes.
pub fn encode_at(
    feeds_by_genre: &BTreeMap<String, Vec<Feed>>,
    title: &str,
    modified: DateTime<Utc>,
) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("Failed to write XML declaration")?;

    let mut opml = BytesStart::new("opml");
    opml.push_attribute(("version", "2.0"));
    writer
        .write_event(Event::Start(opml))
        .context("Failed to write opml element")?;

    writer
        .write_event(Event::Start(BytesStart::new("head")))
        .context("Failed to write head element")?;
    write_text_element(&mut writer, "title", title)?;
    write_text_element(&mut writer, "dateModified", &modified.to_rfc2822())?;
    writer
        .write_event(Event::End(BytesEnd::new("head")))
        .context("Failed to write head end")?;

    writer
        .write_event(Event::Start(BytesStart::new("body")))
        .context("Failed to write body element")?;

    for (genre, feeds) in feeds_by_genre {
        let mut folder = BytesStart::new("outline");
        push_text_attribute(&mut folder, "text", genre);
        push_text_attribute(&mut folder, "title", genre);
        writer
            .write_event(Event::Start(folder))
            .with_context(|| format!("Failed to write folder outline '{}'", genre))?;

        let mut sorted: Vec<&Feed> = feeds.iter().collect();
        sorted.sort_by(|a, b| a.title.cmp(&b.title));

        for feed in sorted {
            let mut outline = BytesStart::new("outline");
            push_text_attribute(&mut outline, "text", &feed.title);
            push_text_attribute(&mut outline, "title", &feed.title);
            outline.push_attribute(("type", "rss"));
            push_text_attribute(&mut outline, "xmlUrl", &feed.url);
            push_text_attribute(&mut outline, "category", genre);
            push_text_attribute(&mut outline, "description", &feed.description);
            if let Some(deleted_at) = feed.deleted_at {
                outline.push_attribute(("deletedAt", deleted_at.to_rfc3339().as_str()));
            }
            writer
                .write_event(Event::Empty(outline))
                .context("Failed to write outline element")?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("outline")))
            .context("Failed to write folder end")?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("body")))
        .context("Failed to write body end")?;
    writer
        .write_event(Event::End(BytesEnd::new("opml")))
        .context("Failed to write opml end")?;

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).context("Generated OPML contains invalid UTF-8")
}

/// Adds an attribute whose value survives attribute-value normalization.
///
/// Conforming XML readers fold literal tabs and line breaks in attribute
/// values into spaces, so those are written as character references.
fn push_text_attribute(element: &mut BytesStart<'_>, key: &str, value: &str) {
    let escaped = escape(value)
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
        .replace('\t', "&#9;");
    element.push_attribute(Attribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escaped.into_bytes()),
    });
}

fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .with_context(|| format!("Failed to write {} element", name))?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .with_context(|| format!("Failed to write {} text", name))?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("Failed to write {} end", name))?;
    Ok(())
}

/// Writes a document to `path` atomically.
///
/// The content goes to a temporary file in the same directory, is synced to
/// disk, then renamed over the destination, so readers never observe a
/// partially written document.
pub fn write_document(path: &Path, content: &str) -> Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};

    // SEC-009: Randomized temp filename to prevent TOCTOU race conditions
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .with_context(|| {
            format!(
                "Failed to create temporary file '{}': check directory permissions",
                temp_path.display()
            )
        })?;

    std::io::Write::write_all(&mut file, content.as_bytes()).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!("Failed to write temporary file '{}'", temp_path.display())
    })?;

    file.sync_all().with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!("Failed to sync temporary file '{}' to disk", temp_path.display())
    })?;

    drop(file);

    std::fs::rename(&temp_path, path).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to rename '{}' to '{}'",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}
