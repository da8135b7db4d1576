use std::collections::BTreeSet;

use feedxml::{XmlElement, XmlNode};
use scraper::{Html, Node, Selector};
use sqlx::SqlitePool;

use crate::error::AppResult;
use crate::repositories::AllowlistRepository;
use crate::token::TokenCodec;

const MAX_SLUG_LEN: usize = 48;

/// Rewrites media references in a bounded feed document so they route
/// through the proxy endpoint, registering every original URL in the
/// allowlist as a side effect.
pub struct RewriteService {
    db: SqlitePool,
    codec: TokenCodec,
    base_url: String,
}

impl RewriteService {
    pub fn new(db: SqlitePool, codec: TokenCodec, base_url: impl Into<String>) -> Self {
        Self {
            db,
            codec,
            base_url: base_url.into(),
        }
    }

    /// Rewrite every media URL under the channel (items and top-level
    /// artwork alike) in place, then register the originals for the feed's
    /// source path. Returns how many distinct URLs were registered.
    pub async fn rewrite_document(
        &self,
        root: &mut XmlElement,
        source_url: &str,
    ) -> AppResult<usize> {
        let path_token = self.codec.encode(source_url);
        let mut emitted: Vec<String> = Vec::new();

        if let Some(channel) = root.find_mut("channel") {
            for child in channel.children.iter_mut() {
                let XmlNode::Element(el) = child else { continue };
                let slug = if el.local_name() == "item" {
                    slugify(&el.child_text("title"))
                } else {
                    None
                };
                self.rewrite_element(el, &path_token, slug.as_deref(), &mut emitted);
            }
        }

        let tokens: BTreeSet<String> = emitted.into_iter().collect();
        for url_token in &tokens {
            AllowlistRepository::register(&self.db, &path_token, url_token).await?;
        }

        if !tokens.is_empty() {
            tracing::debug!(urls = tokens.len(), "rewrote media references");
        }
        Ok(tokens.len())
    }

    /// Depth-first scan of one subtree for media-bearing elements.
    fn rewrite_element(
        &self,
        el: &mut XmlElement,
        path_token: &str,
        slug: Option<&str>,
        emitted: &mut Vec<String>,
    ) {
        let local = el.local_name().to_string();

        if local == "enclosure" || local.ends_with("thumbnail") {
            if let Some(url) = el.attr("url").map(str::to_string) {
                let proxied = self.proxy_url(path_token, &url, slug, emitted);
                el.set_attr("url", &proxied);
            }
        } else if local.ends_with("image") {
            if let Some(href) = el.attr("href").map(str::to_string) {
                let proxied = self.proxy_url(path_token, &href, slug, emitted);
                el.set_attr("href", &proxied);
            }
            if let Some(url_child) = el.find_mut("url") {
                let url = url_child.text().trim().to_string();
                if !url.is_empty() {
                    let proxied = self.proxy_url(path_token, &url, slug, emitted);
                    url_child.set_text(&proxied);
                }
            }
        } else if local == "encoded" || local.ends_with("content") {
            self.rewrite_body_field(el, path_token, slug, emitted);
        }

        for child in el.children.iter_mut() {
            if let XmlNode::Element(inner) = child {
                self.rewrite_element(inner, path_token, slug, emitted);
            }
        }
    }

    /// Rewrite `img src` attributes inside an HTML-bearing body field.
    /// A failure here skips only this field; the rest of the item is
    /// still rewritten.
    fn rewrite_body_field(
        &self,
        el: &mut XmlElement,
        path_token: &str,
        slug: Option<&str>,
        emitted: &mut Vec<String>,
    ) {
        let html = el.text();
        if !html.contains('<') {
            return;
        }

        match self.rewrite_inline_html(&html, path_token, slug, emitted) {
            Ok(Some(rewritten)) => {
                let keep_cdata = el
                    .children
                    .iter()
                    .any(|c| matches!(c, XmlNode::CData(_)));
                el.children = vec![if keep_cdata {
                    XmlNode::CData(rewritten)
                } else {
                    XmlNode::Text(rewritten)
                }];
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(field = %el.name, error = %e, "skipping inline HTML rewrite");
            }
        }
    }

    /// Parse an HTML fragment, swap every `img src` for a proxy URL, and
    /// re-serialize through the fragment root so the synthetic wrapper
    /// element never reaches the output. Returns `Ok(None)` when there is
    /// nothing to rewrite, leaving the field byte-identical.
    fn rewrite_inline_html(
        &self,
        html: &str,
        path_token: &str,
        slug: Option<&str>,
        emitted: &mut Vec<String>,
    ) -> Result<Option<String>, String> {
        let mut fragment = Html::parse_fragment(html);
        let selector = Selector::parse("img").map_err(|e| e.to_string())?;

        let targets: Vec<(ego_tree::NodeId, String)> = fragment
            .select(&selector)
            .filter_map(|img| img.value().attr("src").map(|src| (img.id(), src.to_string())))
            .collect();
        if targets.is_empty() {
            return Ok(None);
        }

        for (id, src) in targets {
            let proxied = self.proxy_url(path_token, &src, slug, emitted);
            let mut node = fragment
                .tree
                .get_mut(id)
                .ok_or_else(|| "img node vanished during rewrite".to_string())?;
            if let Node::Element(element) = node.value() {
                for (name, value) in element.attrs.iter_mut() {
                    if name.local.as_ref() == "src" {
                        *value = proxied.as_str().into();
                    }
                }
            }
        }

        Ok(Some(fragment.root_element().inner_html()))
    }

    /// Build the proxy URL for one media URL and queue its token for
    /// registration. The slug and extension only make the link readable;
    /// routing happens on the query parameters.
    fn proxy_url(
        &self,
        path_token: &str,
        url: &str,
        slug: Option<&str>,
        emitted: &mut Vec<String>,
    ) -> String {
        let url_token = self.codec.encode(url);
        emitted.push(url_token.clone());

        let name = match (slug, extension_hint(url)) {
            (Some(slug), Some(ext)) => format!("proxy_{}.{}", slug, ext),
            (_, Some(ext)) => format!("proxy.{}", ext),
            _ => "proxy".to_string(),
        };
        format!(
            "{}/{}?pp={}&en={}",
            self.base_url, name, path_token, url_token
        )
    }
}

/// File-extension hint from a URL's path, ignoring query and fragment.
fn extension_hint(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Lowercased, dash-separated rendition of an item title for readable
/// proxy links. Returns `None` when nothing printable remains.
fn slugify(title: &str) -> Option<String> {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn service() -> RewriteService {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::MIGRATOR.run(&pool).await.unwrap();
        RewriteService::new(
            pool,
            TokenCodec::new("test-key".as_bytes()),
            "http://gate.example",
        )
    }

    fn doc(items: &str) -> XmlElement {
        let xml = format!(
            "<rss version=\"2.0\"><channel><title>t</title>{}</channel></rss>",
            items
        );
        feedxml::parse_document(xml.as_bytes()).unwrap()
    }

    const SOURCE: &str = "https://example.org/feed.xml";

    #[tokio::test]
    async fn test_enclosure_rewritten_and_registered() {
        let svc = service().await;
        let mut root = doc(
            "<item><title>Ep 1</title>\
             <enclosure url=\"https://cdn.example/a.mp3\" type=\"audio/mpeg\"/></item>",
        );
        let registered = svc.rewrite_document(&mut root, SOURCE).await.unwrap();
        assert_eq!(registered, 1);

        let channel = root.find("channel").unwrap();
        let enclosure = channel.find("item").unwrap().find("enclosure").unwrap();
        let url = enclosure.attr("url").unwrap();
        assert!(url.starts_with("http://gate.example/proxy_ep-1.mp3?pp="));
        assert!(url.contains("&en="));
        // Everything else on the element is untouched.
        assert_eq!(enclosure.attr("type"), Some("audio/mpeg"));

        // The emitted pair authorizes exactly the original URL.
        let pp = svc.codec.encode(SOURCE);
        let en = svc.codec.encode("https://cdn.example/a.mp3");
        assert!(url.contains(&format!("pp={}", pp)));
        assert!(url.contains(&format!("en={}", en)));
        assert!(AllowlistRepository::is_allowed(&svc.db, &pp, &en)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_thumbnail_and_image_rewritten() {
        let svc = service().await;
        let mut root = doc(
            "<image><url>https://cdn.example/logo.png</url><title>logo</title></image>\
             <item><title>x</title>\
             <media:thumbnail url=\"https://cdn.example/t.jpg\"/>\
             <itunes:image href=\"https://cdn.example/art.png\"/></item>",
        );
        let registered = svc.rewrite_document(&mut root, SOURCE).await.unwrap();
        assert_eq!(registered, 3);

        let channel = root.find("channel").unwrap();
        let artwork = channel.find("image").unwrap();
        assert!(artwork
            .child_text("url")
            .starts_with("http://gate.example/proxy.png?pp="));
        assert_eq!(artwork.child_text("title"), "logo");

        let item = channel.find("item").unwrap();
        assert!(item
            .find("thumbnail")
            .unwrap()
            .attr("url")
            .unwrap()
            .starts_with("http://gate.example/proxy_x.jpg?pp="));
        assert!(item
            .find("image")
            .unwrap()
            .attr("href")
            .unwrap()
            .starts_with("http://gate.example/proxy_x.png?pp="));
    }

    #[tokio::test]
    async fn test_inline_html_images_rewritten() {
        let svc = service().await;
        let mut root = doc(
            "<item><title>Post</title><content:encoded><![CDATA[\
             <p>Look: <img src=\"https://cdn.example/pic.jpg\" alt=\"pic\"> done</p>\
             ]]></content:encoded></item>",
        );
        svc.rewrite_document(&mut root, SOURCE).await.unwrap();

        let channel = root.find("channel").unwrap();
        let encoded = channel.find("item").unwrap().find("encoded").unwrap();
        let html = encoded.text();
        assert!(html.contains("src=\"http://gate.example/proxy_post.jpg?pp="));
        assert!(!html.contains("https://cdn.example/pic.jpg"));
        // Fragment parsing must not leak a wrapper element.
        assert!(!html.contains("<html"));
        // Stays CDATA on the way out.
        assert!(matches!(encoded.children[0], XmlNode::CData(_)));
    }

    #[tokio::test]
    async fn test_body_without_markup_untouched() {
        let svc = service().await;
        let mut root = doc(
            "<item><title>Plain</title>\
             <content:encoded>just words, no markup</content:encoded></item>",
        );
        let registered = svc.rewrite_document(&mut root, SOURCE).await.unwrap();
        assert_eq!(registered, 0);

        let channel = root.find("channel").unwrap();
        let encoded = channel.find("item").unwrap().find("encoded").unwrap();
        assert_eq!(encoded.text(), "just words, no markup");
    }

    #[tokio::test]
    async fn test_rewrite_twice_registers_once() {
        let svc = service().await;
        let items =
            "<item><title>Ep</title><enclosure url=\"https://cdn.example/a.mp3\"/></item>";

        let mut first = doc(items);
        svc.rewrite_document(&mut first, SOURCE).await.unwrap();
        let mut second = doc(items);
        svc.rewrite_document(&mut second, SOURCE).await.unwrap();

        let pp = svc.codec.encode(SOURCE);
        assert_eq!(
            AllowlistRepository::count_for_path(&svc.db, &pp)
                .await
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_hint("https://a/b/c.mp3"), Some("mp3".into()));
        assert_eq!(extension_hint("https://a/b/C.JPG?v=1#x"), Some("jpg".into()));
        assert_eq!(extension_hint("https://a/b/c"), None);
        assert_eq!(extension_hint("https://a/b.mp3/c"), None);
        assert_eq!(extension_hint("https://a/c.toolong"), None);
        assert_eq!(extension_hint("https://a/c.we%20ird"), None);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), Some("hello-world".into()));
        assert_eq!(slugify("  Ep. 42: The Answer "), Some("ep-42-the-answer".into()));
        assert_eq!(slugify("???"), None);
        assert_eq!(slugify(""), None);

        let long = slugify(&"word ".repeat(30)).unwrap();
        assert!(long.len() <= MAX_SLUG_LEN);
        assert!(!long.ends_with('-'));
    }
}
