use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{FetchError, Result};
use crate::models::{Channel, FeedDocument, FeedEntry};

/// Parse an RSS 2.0 or Atom document from raw XML bytes.
///
/// Only the fields the synchronizer consumes are extracted. Element names are
/// compared by qualified name, so `atom:link` inside an RSS channel never
/// shadows the channel's own `<link>`.
pub fn parse_feed(xml: &[u8]) -> Result<FeedDocument> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut state = ParseState::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = qname(&e);
                state.on_attributes(&name, &e);
                state.open(name);
            }
            Ok(Event::Empty(e)) => {
                let name = qname(&e);
                state.on_attributes(&name, &e);
            }
            Ok(Event::End(_)) => state.close(),
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map(|t| t.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                state.on_text(&text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                state.on_text(text.trim());
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::Parse(format!(
                    "XML error at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    state.finish()
}

fn qname(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn append(field: &mut Option<String>, text: &str) {
    if text.is_empty() {
        return;
    }
    match field {
        Some(existing) => existing.push_str(text),
        None => *field = Some(text.to_string()),
    }
}

#[derive(Default)]
struct EntryBuilder {
    /// `item` or `entry`, whichever opened this builder.
    tag: String,
    guid: Option<String>,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    link: Option<String>,
}

impl EntryBuilder {
    fn build(self) -> FeedEntry {
        FeedEntry {
            guid: self.guid,
            title: self.title,
            description: self.description.or(self.content),
            published_at: self.published.or(self.updated),
            link: self.link,
        }
    }
}

#[derive(Default)]
struct ParseState {
    stack: Vec<String>,
    saw_root: bool,
    title: Option<String>,
    itunes_image: Option<String>,
    rss_image: Option<String>,
    atom_logo: Option<String>,
    atom_icon: Option<String>,
    current: Option<EntryBuilder>,
    entries: Vec<FeedEntry>,
}

impl ParseState {
    fn open(&mut self, name: String) {
        match name.as_str() {
            "channel" | "feed" => self.saw_root = true,
            "item" | "entry" => {
                self.current = Some(EntryBuilder {
                    tag: name.clone(),
                    ..EntryBuilder::default()
                })
            }
            _ => {}
        }
        self.stack.push(name);
    }

    fn close(&mut self) {
        let Some(name) = self.stack.pop() else {
            return;
        };
        if let Some(current) = &self.current {
            if current.tag == name {
                if let Some(done) = self.current.take() {
                    self.entries.push(done.build());
                }
            }
        }
    }

    fn parent(&self) -> Option<&str> {
        self.stack
            .len()
            .checked_sub(2)
            .map(|i| self.stack[i].as_str())
    }

    /// Attribute-carried values: `<itunes:image href>` and Atom `<link href>`.
    fn on_attributes(&mut self, name: &str, e: &BytesStart<'_>) {
        // For Start events the element is not on the stack yet, so the
        // innermost open element is its parent.
        let parent = self.stack.last().map(String::as_str);
        match (&mut self.current, name) {
            (Some(entry), "link") if parent == Some(entry.tag.as_str()) => {
                let rel = attr(e, b"rel");
                if entry.link.is_none() && matches!(rel.as_deref(), None | Some("alternate")) {
                    entry.link = attr(e, b"href");
                }
            }
            (None, "itunes:image") => {
                if self.itunes_image.is_none() {
                    self.itunes_image = attr(e, b"href");
                }
            }
            _ => {}
        }
    }

    fn on_text(&mut self, text: &str) {
        let Some(tag) = self.stack.last().cloned() else {
            return;
        };
        let parent = self.parent().map(str::to_string);

        if let Some(entry) = &mut self.current {
            if parent.as_deref() != Some(entry.tag.as_str()) {
                return;
            }
            let field = match tag.as_str() {
                "guid" | "id" => &mut entry.guid,
                "title" => &mut entry.title,
                "description" | "summary" => &mut entry.description,
                "content:encoded" | "content" => &mut entry.content,
                "pubDate" | "published" => &mut entry.published,
                "updated" | "dc:date" => &mut entry.updated,
                "link" => &mut entry.link,
                _ => return,
            };
            append(field, text);
            return;
        }

        match (parent.as_deref(), tag.as_str()) {
            (Some("channel" | "feed"), "title") => append(&mut self.title, text),
            (Some("image"), "url") => append(&mut self.rss_image, text),
            (Some("feed"), "logo") => append(&mut self.atom_logo, text),
            (Some("feed"), "icon") => append(&mut self.atom_icon, text),
            _ => {}
        }
    }

    fn finish(self) -> Result<FeedDocument> {
        if !self.saw_root {
            return Err(FetchError::Parse(
                "document has neither an RSS <channel> nor an Atom <feed>".to_string(),
            ));
        }
        Ok(FeedDocument {
            channel: Channel {
                title: self.title.unwrap_or_default(),
                image_url: self
                    .itunes_image
                    .or(self.rss_image)
                    .or(self.atom_logo)
                    .or(self.atom_icon),
            },
            entries: self.entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"
     xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Talk Python to Me</title>
    <link>https://talkpython.fm</link>
    <atom:link href="https://talkpython.fm/episodes/rss" rel="self"/>
    <image>
      <url>http://img/fallback.png</url>
      <title>Talk Python artwork</title>
    </image>
    <itunes:image href="http://img/x.png"/>
    <item>
      <guid isPermaLink="false">abc123</guid>
      <title>Ep1</title>
      <description><![CDATA[<p>d &amp; more</p>]]></description>
      <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
      <link>http://x/1</link>
    </item>
    <item>
      <guid>def456</guid>
      <title>Fish &amp; Chips</title>
      <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
      <link>http://x/2</link>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Cast</title>
  <logo>http://img/logo.png</logo>
  <entry>
    <id>urn:uuid:1</id>
    <title>First</title>
    <link rel="enclosure" href="http://x/1.mp3"/>
    <link rel="alternate" href="http://x/1"/>
    <updated>2024-01-02T00:00:00Z</updated>
    <published>2024-01-01T00:00:00Z</published>
    <content>full text</content>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_channel_and_items() {
        let doc = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(doc.channel.title, "Talk Python to Me");
        // itunes:image wins over <image><url>
        assert_eq!(doc.channel.image_url.as_deref(), Some("http://img/x.png"));
        assert_eq!(doc.entries.len(), 2);

        let first = &doc.entries[0];
        assert_eq!(first.guid.as_deref(), Some("abc123"));
        assert_eq!(first.title.as_deref(), Some("Ep1"));
        assert_eq!(first.description.as_deref(), Some("<p>d &amp; more</p>"));
        assert_eq!(
            first.published_at.as_deref(),
            Some("Mon, 01 Jan 2024 10:00:00 GMT")
        );
        assert_eq!(first.link.as_deref(), Some("http://x/1"));

        let second = &doc.entries[1];
        assert_eq!(second.title.as_deref(), Some("Fish & Chips"));
        assert_eq!(second.description, None);
    }

    #[test]
    fn rss_image_url_is_the_fallback() {
        let xml = RSS.replace(r#"<itunes:image href="http://img/x.png"/>"#, "");
        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.channel.image_url.as_deref(), Some("http://img/fallback.png"));
        assert_eq!(doc.channel.title, "Talk Python to Me");
    }

    #[test]
    fn parses_atom() {
        let doc = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(doc.channel.title, "Atom Cast");
        assert_eq!(doc.channel.image_url.as_deref(), Some("http://img/logo.png"));
        let entry = &doc.entries[0];
        assert_eq!(entry.guid.as_deref(), Some("urn:uuid:1"));
        assert_eq!(entry.link.as_deref(), Some("http://x/1"));
        assert_eq!(entry.published_at.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(entry.description.as_deref(), Some("full text"));
    }

    #[test]
    fn item_without_guid_is_kept_for_the_caller_to_judge() {
        let xml = r#"<rss><channel><title>T</title><item><title>No id</title></item></channel></rss>"#;
        let doc = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.entries[0].guid, None);
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse_feed(b"<rss><channel><title>T</channel></rss>").unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[test]
    fn html_is_not_a_feed() {
        let err = parse_feed(b"<html><body>502 Bad Gateway</body></html>").unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }
}
