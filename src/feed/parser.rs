use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Errors that can occur while reading a feed document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The document is not well-formed XML
    #[error("Malformed document: {0}")]
    Malformed(String),
    /// A required element is absent, e.g. `channel/title`
    #[error("Missing required element: {0}")]
    MissingElement(&'static str),
}

/// Channel-level metadata of a feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedHeader {
    pub title: String,
    pub description: String,
}

/// One `<item>` of a feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub title: String,
    pub description: String,
    pub link: String,
}

/// Header and entries of a feed document, entries in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    pub header: FeedHeader,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    ChannelTitle,
    ChannelDescription,
    ItemTitle,
    ItemDescription,
    ItemLink,
}

/// Text being collected for one element, closed when the stack unwinds to `depth`.
struct Capture {
    target: Target,
    depth: usize,
    text: String,
}

#[derive(Default)]
struct ItemFields {
    title: Option<String>,
    description: Option<String>,
    link: Option<String>,
}

impl ItemFields {
    fn slot(&mut self, target: Target) -> Option<&mut Option<String>> {
        match target {
            Target::ItemTitle => Some(&mut self.title),
            Target::ItemDescription => Some(&mut self.description),
            Target::ItemLink => Some(&mut self.link),
            Target::ChannelTitle | Target::ChannelDescription => None,
        }
    }

    fn finish(self) -> Result<ParsedEntry, ParseError> {
        let title = self.title.ok_or(ParseError::MissingElement("item/title"))?;
        let link = self
            .link
            .filter(|l| !l.is_empty())
            .ok_or(ParseError::MissingElement("item/link"))?;
        Ok(ParsedEntry {
            title,
            description: self.description.unwrap_or_default(),
            link,
        })
    }
}

/// Tracks element nesting and collects the fields the feed model needs.
#[derive(Default)]
struct Walker {
    stack: Vec<Vec<u8>>,
    seen_root: bool,
    /// Stack depth of the first `<channel>`, once opened
    channel_depth: Option<usize>,
    channel_title: Option<String>,
    channel_description: Option<String>,
    item: Option<(usize, ItemFields)>,
    capture: Option<Capture>,
    entries: Vec<ParsedEntry>,
}

impl Walker {
    fn open(&mut self, start: &BytesStart<'_>) -> Result<(), ParseError> {
        if self.stack.is_empty() {
            if self.seen_root {
                return Err(ParseError::Malformed(
                    "more than one root element".to_string(),
                ));
            }
            self.seen_root = true;
        }

        let qname = start.name();
        let name = qname.as_ref();
        self.stack.push(name.to_vec());
        let depth = self.stack.len();

        if self.capture.is_some() {
            return Ok(());
        }

        match name {
            b"channel" if self.channel_depth.is_none() => self.channel_depth = Some(depth),
            b"item" if self.item.is_none() => self.item = Some((depth, ItemFields::default())),
            _ => {}
        }

        let target = match (name, &mut self.item) {
            (b"title", Some((_, fields))) if fields.title.is_none() => Some(Target::ItemTitle),
            (b"description", Some((_, fields))) if fields.description.is_none() => {
                Some(Target::ItemDescription)
            }
            (b"link", Some((_, fields))) if fields.link.is_none() => Some(Target::ItemLink),
            (b"title", None)
                if self.channel_depth == Some(depth - 1) && self.channel_title.is_none() =>
            {
                Some(Target::ChannelTitle)
            }
            (b"description", None)
                if self.channel_depth == Some(depth - 1)
                    && self.channel_description.is_none() =>
            {
                Some(Target::ChannelDescription)
            }
            _ => None,
        };

        if let Some(target) = target {
            self.capture = Some(Capture {
                target,
                depth,
                text: String::new(),
            });
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> Result<(), ParseError> {
        let depth = self.stack.len();
        match self.stack.pop() {
            Some(open) if open == name => {}
            Some(open) => {
                return Err(ParseError::Malformed(format!(
                    "expected </{}>, found </{}>",
                    String::from_utf8_lossy(&open),
                    String::from_utf8_lossy(name)
                )))
            }
            None => {
                return Err(ParseError::Malformed(format!(
                    "unexpected </{}>",
                    String::from_utf8_lossy(name)
                )))
            }
        }

        if self.capture.as_ref().is_some_and(|c| c.depth == depth) {
            if let Some(capture) = self.capture.take() {
                self.store_capture(capture);
            }
        }

        if self.item.as_ref().is_some_and(|(d, _)| *d == depth) {
            if let Some((_, fields)) = self.item.take() {
                let index = self.entries.len();
                let entry = fields.finish().inspect_err(|e| {
                    tracing::debug!(item = index, error = %e, "Rejecting feed item");
                })?;
                self.entries.push(entry);
            }
        }
        Ok(())
    }

    fn store_capture(&mut self, capture: Capture) {
        let value = capture.text.trim().to_string();
        match capture.target {
            Target::ChannelTitle => self.channel_title = Some(value),
            Target::ChannelDescription => self.channel_description = Some(value),
            target => {
                if let Some(slot) = self.item.as_mut().and_then(|(_, f)| f.slot(target)) {
                    *slot = Some(value);
                }
            }
        }
    }

    fn text(&mut self, text: &str) -> Result<(), ParseError> {
        match &mut self.capture {
            Some(capture) => capture.text.push_str(text),
            None if self.stack.is_empty() && !text.trim().is_empty() => {
                return Err(ParseError::Malformed(
                    "text outside the root element".to_string(),
                ))
            }
            None => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<ParsedFeed, ParseError> {
        if let Some(open) = self.stack.last() {
            return Err(ParseError::Malformed(format!(
                "unclosed element <{}>",
                String::from_utf8_lossy(open)
            )));
        }
        if !self.seen_root {
            return Err(ParseError::Malformed("no root element".to_string()));
        }

        let title = self
            .channel_title
            .ok_or(ParseError::MissingElement("channel/title"))?;
        let description = self
            .channel_description
            .ok_or(ParseError::MissingElement("channel/description"))?;

        Ok(ParsedFeed {
            header: FeedHeader { title, description },
            entries: self.entries,
        })
    }
}

/// Parses an RSS document into its channel header and items.
///
/// The document must be well-formed XML with a `channel` carrying `title`
/// and `description`, and every `item` must carry `title` and `link`.
/// `item/description` is optional. Unknown elements are ignored, and no
/// deduplication happens here.
///
/// `source_address` is only used to annotate log records.
///
/// # Errors
///
/// - [`ParseError::Malformed`] for syntax errors, mismatched or unclosed
///   tags, and documents without exactly one root element
/// - [`ParseError::MissingElement`] when a required element is absent
pub fn parse(raw: &str, source_address: Option<&str>) -> Result<ParsedFeed, ParseError> {
    // quick-xml (0.37) never expands DOCTYPE entities; unknown entity
    // references surface as unescape errors below.
    let mut reader = Reader::from_str(raw);
    let mut walker = Walker::default();
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            ParseError::Malformed(format!(
                "{} at position {}",
                e,
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Start(e) => walker.open(&e)?,
            Event::Empty(e) => {
                walker.open(&e)?;
                walker.close(e.name().as_ref())?;
            }
            Event::End(e) => walker.close(e.name().as_ref())?,
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|e| ParseError::Malformed(e.to_string()))?;
                walker.text(&text)?;
            }
            Event::CData(e) => {
                let text = std::str::from_utf8(&e)
                    .map_err(|e| ParseError::Malformed(e.to_string()))?;
                walker.text(text)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) | Event::Comment(_) => {}
        }
        buf.clear();
    }

    let parsed = walker.finish()?;
    tracing::debug!(
        feed = source_address.unwrap_or("<inline>"),
        entries = parsed.entries.len(),
        "Parsed feed document"
    );
    Ok(parsed)
}
