//! The book catalog.
//!
//! Books are compiled into the binary and never change at runtime. The
//! `books` table in Postgres mirrors this list (see `lamplight seed books`)
//! so that orders and reviews can reference it with foreign keys.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::types::{BookId, Price};

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub price: Price,
    /// Cover image path under `/static`.
    pub image: String,
    pub description: String,
    /// Opening pages offered as a free sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amazon_link: Option<String>,
    /// Shown on the home page when the database has no featured list.
    #[serde(default)]
    pub featured: bool,
}

const AUTHOR: &str = "Miriam Hale";

static CATALOG: LazyLock<Vec<Book>> = LazyLock::new(|| {
    vec![
        Book {
            id: BookId::new(1),
            title: "Still Waters".to_owned(),
            author: AUTHOR.to_owned(),
            price: Price::from_cents(1299),
            image: "/static/images/books/still-waters.jpg".to_owned(),
            description: "A forty-day devotional on rest, trust, and the quiet places \
                          where God restores the soul."
                .to_owned(),
            sample: Some(
                "Day One. He leads me beside still waters. Before the psalmist speaks of \
                 valleys or enemies, he speaks of rest..."
                    .to_owned(),
            ),
            amazon_link: Some("https://www.amazon.com/dp/B0STILLWTR".to_owned()),
            featured: true,
        },
        Book {
            id: BookId::new(2),
            title: "A Lamp Unto My Feet".to_owned(),
            author: AUTHOR.to_owned(),
            price: Price::from_cents(1699),
            image: "/static/images/books/a-lamp-unto-my-feet.jpg".to_owned(),
            description: "Walking through Psalm 119 one stanza at a time, with study \
                          questions for small groups."
                .to_owned(),
            sample: None,
            amazon_link: Some("https://www.amazon.com/dp/B0LAMPFEET".to_owned()),
            featured: true,
        },
        Book {
            id: BookId::new(3),
            title: "Grace in the Wilderness".to_owned(),
            author: AUTHOR.to_owned(),
            price: Price::from_cents(1499),
            image: "/static/images/books/grace-in-the-wilderness.jpg".to_owned(),
            description: "Stories of Hagar, Elijah, and the people of Israel, and the \
                          God who meets us in dry seasons."
                .to_owned(),
            sample: Some(
                "Chapter One. The wilderness is not where God abandons his people; it is \
                 where he feeds them..."
                    .to_owned(),
            ),
            amazon_link: None,
            featured: false,
        },
        Book {
            id: BookId::new(4),
            title: "Letters to a Weary Heart".to_owned(),
            author: AUTHOR.to_owned(),
            price: Price::from_cents(999),
            image: "/static/images/books/letters-to-a-weary-heart.jpg".to_owned(),
            description: "Short pastoral letters for caregivers, grievers, and anyone \
                          running on empty."
                .to_owned(),
            sample: None,
            amazon_link: None,
            featured: false,
        },
    ]
});

/// All books, in display order.
#[must_use]
pub fn books() -> &'static [Book] {
    &CATALOG
}

/// Look up a book by ID.
#[must_use]
pub fn find(id: BookId) -> Option<&'static Book> {
    CATALOG.iter().find(|book| book.id == id)
}

/// Books flagged as featured in the catalog itself.
pub fn featured() -> impl Iterator<Item = &'static Book> {
    CATALOG.iter().filter(|book| book.featured)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_catalog_ids_are_unique() {
        let ids: HashSet<BookId> = books().iter().map(|b| b.id).collect();
        assert_eq!(ids.len(), books().len());
    }

    #[test]
    fn test_find() {
        assert_eq!(
            find(BookId::new(1)).map(|b| b.title.as_str()),
            Some("Still Waters")
        );
        assert!(find(BookId::new(999)).is_none());
    }

    #[test]
    fn test_featured() {
        assert!(featured().all(|b| b.featured));
        assert!(featured().count() >= 1);
    }

    #[test]
    fn test_book_serializes_camel_case() {
        let json = serde_json::to_value(find(BookId::new(1))).unwrap_or_default();
        assert_eq!(json["price"], "12.99");
        assert!(json.get("amazonLink").is_some());
    }
}
