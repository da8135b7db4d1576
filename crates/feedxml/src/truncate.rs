use crate::document::{XmlElement, XmlNode};

/// Item close-tag literal and matching closing wrapper for each feed dialect.
/// Detection is by substring presence, so an RSS feed quoting `</entry>`
/// inside a description still resolves as RSS.
fn dialect_of(text: &str) -> Option<(&'static str, &'static str)> {
    if text.contains("</item>") {
        Some(("</item>", "</channel></rss>"))
    } else if text.contains("</entry>") {
        Some(("</entry>", "</feed>"))
    } else {
        None
    }
}

/// Bound a parsed feed to its leading items, producing a new tree.
///
/// Keeps items while the running count stays below `max_items`, matching the
/// historical boundary behavior of the full-parse strategy: a feed with at
/// least `max_items` items comes back with `max_items - 1` of them. Atom
/// entries count the same way so bounding can run before normalization.
pub fn bound_items(root: &XmlElement, max_items: usize) -> XmlElement {
    let mut out = root.clone();
    let keep = max_items.saturating_sub(1);

    if let Some(container) = item_container_mut(&mut out) {
        let mut seen = 0usize;
        container.children.retain(|node| match node {
            XmlNode::Element(el) if is_item(el) => {
                seen += 1;
                seen <= keep
            }
            _ => true,
        });
    }
    out
}

fn is_item(el: &XmlElement) -> bool {
    matches!(el.local_name(), "item" | "entry")
}

/// The element that holds the item sequence: the Atom `feed` root carries
/// entries directly, RSS nests items under `channel`.
fn item_container_mut(root: &mut XmlElement) -> Option<&mut XmlElement> {
    if root.elements().any(is_item) {
        return Some(root);
    }
    root.find_mut("channel")
}

/// Cut raw feed text after its `max_items`-th item close-tag and restore
/// well-formedness with a synthetic closing wrapper.
///
/// Returns `None` when the text holds fewer close-tags than requested (or
/// none at all). The search is a literal substring scan: a close-tag literal
/// occurring inside CDATA or entity-encoded markup before the intended
/// boundary produces a wrong cut, which the caller catches by re-parsing.
pub fn cut_at_item_count(text: &str, max_items: usize) -> Option<String> {
    if max_items == 0 {
        return None;
    }
    let (close_tag, wrapper) = dialect_of(text)?;

    let mut end = 0usize;
    for _ in 0..max_items {
        let found = text[end..].find(close_tag)?;
        end += found + close_tag.len();
    }
    Some(format!("{}{}", &text[..end], wrapper))
}

/// Cut raw feed text after the last complete item close-tag it contains and
/// append the closing wrapper. Used when a byte budget, not an item count,
/// decided where the text ends.
pub fn cut_at_last_item(text: &str) -> Option<String> {
    let (close_tag, wrapper) = dialect_of(text)?;
    let at = text.rfind(close_tag)?;
    Some(format!("{}{}", &text[..at + close_tag.len()], wrapper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document;

    fn rss_with_items(n: usize) -> String {
        let mut xml = String::from("<rss version=\"2.0\"><channel><title>t</title>");
        for i in 0..n {
            xml.push_str(&format!("<item><title>item {}</title></item>", i));
        }
        xml.push_str("<language>en</language></channel></rss>");
        xml
    }

    fn count_items(root: &XmlElement) -> usize {
        root.find("channel")
            .unwrap_or(root)
            .elements()
            .filter(|el| is_item(el))
            .count()
    }

    #[test]
    fn test_bound_items_exact_boundary() {
        // 60 source items with a cap of 50 keeps 49: the count check trips
        // on the boundary item. Covered explicitly so the behavior cannot
        // change unnoticed.
        let root = parse_document(rss_with_items(60).as_bytes()).unwrap();
        let bounded = bound_items(&root, 50);
        assert_eq!(count_items(&bounded), 49);
    }

    #[test]
    fn test_bound_items_keeps_short_feeds() {
        let root = parse_document(rss_with_items(5).as_bytes()).unwrap();
        let bounded = bound_items(&root, 50);
        assert_eq!(count_items(&bounded), 5);
    }

    #[test]
    fn test_bound_items_keeps_document_order_and_siblings() {
        let root = parse_document(rss_with_items(10).as_bytes()).unwrap();
        let bounded = bound_items(&root, 4);
        let channel = bounded.find("channel").unwrap();

        let titles: Vec<String> = channel
            .elements()
            .filter(|el| is_item(el))
            .map(|el| el.child_text("title"))
            .collect();
        assert_eq!(titles, vec!["item 0", "item 1", "item 2"]);

        // Non-item channel children survive, wherever they sit.
        assert_eq!(channel.child_text("title"), "t");
        assert_eq!(channel.child_text("language"), "en");
    }

    #[test]
    fn test_bound_items_atom_entries() {
        let xml = "<feed xmlns=\"http://www.w3.org/2005/Atom\">\
                   <title>t</title>\
                   <entry><title>a</title></entry>\
                   <entry><title>b</title></entry>\
                   <entry><title>c</title></entry>\
                   </feed>";
        let root = parse_document(xml.as_bytes()).unwrap();
        let bounded = bound_items(&root, 3);
        assert_eq!(count_items(&bounded), 2);
    }

    #[test]
    fn test_cut_at_item_count() {
        let xml = rss_with_items(10);
        let cut = cut_at_item_count(&xml, 3).unwrap();
        assert!(cut.ends_with("</item></channel></rss>"));

        let root = parse_document(cut.as_bytes()).unwrap();
        assert_eq!(count_items(&root), 3);
    }

    #[test]
    fn test_cut_at_item_count_not_enough_items() {
        let xml = rss_with_items(2);
        assert!(cut_at_item_count(&xml, 3).is_none());
        assert!(cut_at_item_count(&xml, 0).is_none());
    }

    #[test]
    fn test_cut_at_last_item() {
        let xml = rss_with_items(4);
        // Chop inside the last item to simulate a byte budget ending there.
        let prefix = &xml[..xml.rfind("</item>").unwrap()];
        let cut = cut_at_last_item(prefix).unwrap();

        let root = parse_document(cut.as_bytes()).unwrap();
        assert_eq!(count_items(&root), 3);
    }

    #[test]
    fn test_cut_atom_entries() {
        let xml = "<feed><title>t</title>\
                   <entry><id>1</id></entry><entry><id>2</id></entry>\
                   <entry><id>3</id";
        let cut = cut_at_last_item(xml).unwrap();
        assert!(cut.ends_with("</entry></feed>"));
        let root = parse_document(cut.as_bytes()).unwrap();
        assert_eq!(count_items(&root), 2);
    }

    #[test]
    fn test_cut_no_close_tag() {
        assert!(cut_at_last_item("<rss><channel><item>").is_none());
    }
}
