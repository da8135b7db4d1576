mod atom;
mod document;
mod error;
mod truncate;

pub use atom::{atom_to_rss, is_atom};
pub use document::{parse_document, serialize_document, XmlElement, XmlNode};
pub use error::FeedXmlError;
pub use truncate::{bound_items, cut_at_item_count, cut_at_last_item};

pub type Result<T> = std::result::Result<T, FeedXmlError>;
