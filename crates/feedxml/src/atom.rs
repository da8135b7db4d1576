use crate::document::{XmlElement, XmlNode};

const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

/// Whether a parsed document is an Atom feed (root local name `feed`,
/// regardless of how the namespace is spelled).
pub fn is_atom(root: &XmlElement) -> bool {
    root.local_name() == "feed"
}

/// Convert an Atom feed tree into an RSS 2.0 channel tree.
///
/// The conversion is total and order-preserving: every entry becomes an item
/// in document order, and absent source fields map to empty elements. Lookups
/// match on local names, so feeds mixing default-namespace and prefixed
/// elements resolve consistently.
pub fn atom_to_rss(feed: &XmlElement) -> XmlElement {
    let mut channel = XmlElement::new("channel");
    channel.push_text_element("title", &feed.child_text("title"));
    channel.push_text_element("link", &feed_link(feed));
    channel.push_text_element("description", &feed.child_text("subtitle"));
    channel.push_text_element("lastBuildDate", &feed.child_text("updated"));
    if let Some(lang) = feed.attr("xml:lang") {
        channel.push_text_element("language", lang);
    }

    for entry in feed.elements().filter(|el| el.local_name() == "entry") {
        channel.push_element(entry_to_item(entry));
    }

    let mut rss = XmlElement::new("rss");
    rss.set_attr("version", "2.0");
    rss.set_attr("xmlns:content", CONTENT_NS);
    rss.push_element(channel);
    rss
}

fn entry_to_item(entry: &XmlElement) -> XmlElement {
    let mut item = XmlElement::new("item");
    item.push_text_element("title", &entry.child_text("title"));

    let id = entry.child_text("id");
    let link = if id.is_empty() { link_href(entry) } else { id };
    item.push_text_element("link", &link);

    let published = entry.child_text("published");
    item.push_text_element("pubDate", &to_rfc2822(&published));

    item.push_text_element("description", &entry.child_text("summary"));

    let author = entry
        .find("author")
        .map(|a| a.child_text("name"))
        .unwrap_or_default();
    item.push_text_element("author", &author);

    if let Some(content) = entry.find("content") {
        let mut encoded = XmlElement::new("content:encoded");
        encoded.children = vec![XmlNode::Text(content.text())];
        item.push_element(encoded);
    }
    item
}

/// The feed- or entry-level link: prefer an `alternate` (or untyped) link's
/// `href`, fall back to the first link, then to the empty string.
fn link_href(el: &XmlElement) -> String {
    let links: Vec<&XmlElement> = el
        .elements()
        .filter(|e| e.local_name() == "link")
        .collect();
    links
        .iter()
        .find(|l| matches!(l.attr("rel"), None | Some("alternate")))
        .or_else(|| links.first())
        .and_then(|l| l.attr("href"))
        .unwrap_or_default()
        .to_string()
}

fn feed_link(feed: &XmlElement) -> String {
    link_href(feed)
}

/// Render an Atom timestamp as an RFC 2822 date for `pubDate`. An absent
/// value stays empty; an unparseable one passes through verbatim.
fn to_rfc2822(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.to_rfc2822())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document;

    const ATOM: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom" xml:lang="en-US">
  <title>Example Feed</title>
  <subtitle>All the news</subtitle>
  <updated>2024-01-02T10:00:00Z</updated>
  <link rel="self" href="https://example.org/feed.atom"/>
  <link rel="alternate" href="https://example.org/"/>
  <entry>
    <title>Hello</title>
    <id>https://example.org/posts/1</id>
    <published>2024-01-01T00:00:00Z</published>
    <summary>A greeting</summary>
    <author><name>Alice</name></author>
    <content type="html">&lt;p&gt;Hello &lt;img src="https://cdn.example/x.jpg"&gt;&lt;/p&gt;</content>
  </entry>
  <entry>
    <title>Bare</title>
    <link href="https://example.org/posts/2"/>
  </entry>
</feed>"#;

    #[test]
    fn test_detects_atom_root() {
        let root = parse_document(ATOM.as_bytes()).unwrap();
        assert!(is_atom(&root));

        let rss = parse_document(b"<rss><channel/></rss>").unwrap();
        assert!(!is_atom(&rss));
    }

    #[test]
    fn test_channel_mapping() {
        let feed = parse_document(ATOM.as_bytes()).unwrap();
        let rss = atom_to_rss(&feed);

        assert_eq!(rss.name, "rss");
        assert_eq!(rss.attr("version"), Some("2.0"));

        let channel = rss.find("channel").unwrap();
        assert_eq!(channel.child_text("title"), "Example Feed");
        assert_eq!(channel.child_text("link"), "https://example.org/");
        assert_eq!(channel.child_text("description"), "All the news");
        assert_eq!(channel.child_text("language"), "en-US");
        assert_eq!(channel.child_text("lastBuildDate"), "2024-01-02T10:00:00Z");
    }

    #[test]
    fn test_conversion_is_total() {
        let feed = parse_document(ATOM.as_bytes()).unwrap();
        let rss = atom_to_rss(&feed);
        let channel = rss.find("channel").unwrap();

        let items: Vec<_> = channel
            .elements()
            .filter(|el| el.local_name() == "item")
            .collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].child_text("title"), "Hello");
        assert_eq!(items[1].child_text("title"), "Bare");
    }

    #[test]
    fn test_entry_mapping() {
        let feed = parse_document(ATOM.as_bytes()).unwrap();
        let rss = atom_to_rss(&feed);
        let channel = rss.find("channel").unwrap();
        let item = channel.find("item").unwrap();

        assert_eq!(item.child_text("link"), "https://example.org/posts/1");
        assert_eq!(item.child_text("pubDate"), "Mon, 1 Jan 2024 00:00:00 +0000");
        assert_eq!(item.child_text("description"), "A greeting");
        assert_eq!(item.child_text("author"), "Alice");
        assert!(item.child_text("encoded").contains("<img src="));
    }

    #[test]
    fn test_entry_fallbacks() {
        let feed = parse_document(ATOM.as_bytes()).unwrap();
        let rss = atom_to_rss(&feed);
        let channel = rss.find("channel").unwrap();
        let bare = channel
            .elements()
            .filter(|el| el.local_name() == "item")
            .nth(1)
            .unwrap();

        // No id: fall back to the link href.
        assert_eq!(bare.child_text("link"), "https://example.org/posts/2");
        // Absent fields come out empty, not missing.
        assert_eq!(bare.child_text("pubDate"), "");
        assert_eq!(bare.child_text("description"), "");
        assert_eq!(bare.child_text("author"), "");
        assert!(bare.find("encoded").is_none());
    }

    #[test]
    fn test_unparseable_date_passes_through() {
        assert_eq!(to_rfc2822("last tuesday"), "last tuesday");
        assert_eq!(to_rfc2822(""), "");
        assert_eq!(
            to_rfc2822("2024-01-01T00:00:00Z"),
            "Mon, 1 Jan 2024 00:00:00 +0000"
        );
    }
}
