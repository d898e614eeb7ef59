//! Reader reviews: submission validation, filtering, sorting and statistics.
//!
//! The review list shown on the site is the union of a small curated set
//! compiled into the binary ([`curated`]) and approved reviews read from
//! Postgres. Everything in this module is pure; fetching and caching live
//! in the storefront's review service.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::html;
use crate::types::{BookId, Email, EmailError, ReviewId};

/// Minimum comment length, in characters, after trimming.
pub const MIN_COMMENT_CHARS: usize = 10;
/// Maximum comment length, in characters, after trimming.
pub const MAX_COMMENT_CHARS: usize = 5000;
/// Maximum length of a reviewer name or review title.
pub const MAX_SHORT_TEXT_CHARS: usize = 120;

// =============================================================================
// Rating
// =============================================================================

/// A star rating from 1 to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Clamp any integer into `1..=5`.
    ///
    /// ```
    /// use lamplight_core::review::Rating;
    ///
    /// assert_eq!(Rating::clamped(10).value(), 5);
    /// assert_eq!(Rating::clamped(-3).value(), 1);
    /// ```
    #[must_use]
    pub fn clamped(value: i64) -> Self {
        let clamped = value.clamp(i64::from(Self::MIN), i64::from(Self::MAX));
        Self(u8::try_from(clamped).unwrap_or(Self::MIN))
    }

    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i16> for Rating {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or_else(|| format!("rating must be between 1 and 5, got {value}"))
    }
}

impl From<Rating> for i16 {
    fn from(rating: Rating) -> Self {
        Self::from(rating.0)
    }
}

// =============================================================================
// Review
// =============================================================================

/// A published or pending review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub book_id: BookId,
    pub rating: Rating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub comment: String,
    pub reviewer_name: String,
    /// Never sent to browsers.
    #[serde(default, skip_serializing)]
    pub reviewer_email: Option<Email>,
    pub is_verified_purchase: bool,
    pub is_highlighted: bool,
    pub is_approved: bool,
    pub date: DateTime<Utc>,
}

// =============================================================================
// Filtering and sorting
// =============================================================================

/// Which book's reviews to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BookFilter {
    #[default]
    All,
    Book(BookId),
}

impl BookFilter {
    #[must_use]
    pub fn matches(&self, book_id: BookId) -> bool {
        match self {
            Self::All => true,
            Self::Book(id) => *id == book_id,
        }
    }
}

impl std::str::FromStr for BookFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<i32>()
            .map(|id| Self::Book(BookId::new(id)))
            .map_err(|_| format!("invalid book filter: {s}"))
    }
}

impl TryFrom<String> for BookFilter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BookFilter> for String {
    fn from(filter: BookFilter) -> Self {
        match filter {
            BookFilter::All => "all".to_owned(),
            BookFilter::Book(id) => id.to_string(),
        }
    }
}

/// Sort key for review lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Date,
    Rating,
    /// Highlighted reviews first. There is no real helpfulness score.
    Helpful,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Query over the review set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewFilter {
    pub book_id: BookFilter,
    /// `0` disables the filter; values above 5 are treated as 5.
    pub min_rating: u8,
    pub sort_by: SortBy,
    pub order: SortOrder,
}

impl ReviewFilter {
    /// Whether a review passes the book and rating filters.
    #[must_use]
    pub fn matches(&self, review: &Review) -> bool {
        review.is_approved
            && self.book_id.matches(review.book_id)
            && review.rating.value() >= self.min_rating.min(Rating::MAX)
    }

    fn compare(&self, a: &Review, b: &Review) -> Ordering {
        let primary = match self.sort_by {
            SortBy::Date => a.date.cmp(&b.date),
            SortBy::Rating => a.rating.cmp(&b.rating),
            SortBy::Helpful => a.is_highlighted.cmp(&b.is_highlighted),
        };
        let primary = match self.order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        // Ties: newest first, then by id for a stable order across calls.
        primary
            .then_with(|| b.date.cmp(&a.date))
            .then_with(|| a.id.as_i32().cmp(&b.id.as_i32()))
    }
}

/// Approved reviews matching `filter`, sorted as requested.
#[must_use]
pub fn list(reviews: &[Review], filter: &ReviewFilter) -> Vec<Review> {
    let mut matching: Vec<Review> = reviews
        .iter()
        .filter(|review| filter.matches(review))
        .cloned()
        .collect();
    matching.sort_by(|a, b| filter.compare(a, b));
    matching
}

/// Union of the curated set and persisted reviews, de-duplicated by id.
///
/// Curated entries win when ids collide.
#[must_use]
pub fn union(curated: &[Review], persisted: Vec<Review>) -> Vec<Review> {
    let mut all = curated.to_vec();
    for review in persisted {
        if !all.iter().any(|existing| existing.id == review.id) {
            all.push(review);
        }
    }
    all
}

// =============================================================================
// Statistics
// =============================================================================

/// Aggregate figures for a set of reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    /// Mean rating, `0.0` when there are no reviews.
    pub average_rating: f64,
    pub total_reviews: u64,
    /// Count per star value; always has keys 1 through 5.
    pub rating_distribution: BTreeMap<u8, u64>,
}

impl Default for ReviewStats {
    fn default() -> Self {
        Self {
            average_rating: 0.0,
            total_reviews: 0,
            rating_distribution: (Rating::MIN..=Rating::MAX).map(|star| (star, 0)).collect(),
        }
    }
}

/// Stats over the approved reviews for `book` (or all books).
#[must_use]
pub fn stats(reviews: &[Review], book: BookFilter) -> ReviewStats {
    let filter = ReviewFilter {
        book_id: book,
        ..ReviewFilter::default()
    };

    let (mut stats, sum) = reviews.iter().filter(|r| filter.matches(r)).fold(
        (ReviewStats::default(), 0_u64),
        |(mut stats, sum), review| {
            stats.total_reviews += 1;
            *stats
                .rating_distribution
                .entry(review.rating.value())
                .or_insert(0) += 1;
            (stats, sum + u64::from(review.rating.value()))
        },
    );

    if stats.total_reviews > 0 {
        #[allow(clippy::cast_precision_loss)] // review counts never approach 2^52
        let average = sum as f64 / stats.total_reviews as f64;
        stats.average_rating = average;
    }
    stats
}

// =============================================================================
// Submission
// =============================================================================

/// Raw review form input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewSubmission {
    pub book_id: Option<BookId>,
    pub rating: Option<i64>,
    pub title: Option<String>,
    #[serde(alias = "content")]
    pub comment: String,
    pub reviewer_name: String,
    pub reviewer_email: String,
}

/// One problem with a submitted review.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReviewFieldError {
    #[error("please select a book")]
    MissingBook,
    #[error("unknown book: {0}")]
    UnknownBook(BookId),
    #[error("please select a rating")]
    MissingRating,
    #[error("name is required")]
    EmptyName,
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("invalid email: {0}")]
    InvalidEmail(EmailError),
    #[error("review must be at least {min} characters")]
    CommentTooShort { min: usize },
}

impl ReviewFieldError {
    /// Form field the error belongs to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::MissingBook | Self::UnknownBook(_) => "bookId",
            Self::MissingRating => "rating",
            Self::EmptyName => "reviewerName",
            Self::TooLong { field, .. } => *field,
            Self::InvalidEmail(_) => "reviewerEmail",
            Self::CommentTooShort { .. } => "comment",
        }
    }
}

/// Every problem found with a submitted review.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("review has {} invalid field(s)", .0.len())]
pub struct ReviewValidationError(pub Vec<ReviewFieldError>);

/// A validated, escaped review ready to be persisted.
///
/// New reviews are never highlighted or approved; moderation does that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub book_id: BookId,
    pub rating: Rating,
    pub title: Option<String>,
    pub comment: String,
    pub reviewer_name: String,
    pub reviewer_email: Email,
}

impl ReviewSubmission {
    /// Validate the form, clamp the rating and escape free text.
    ///
    /// # Errors
    ///
    /// Returns every field problem found, not just the first.
    pub fn validate(self) -> Result<NewReview, ReviewValidationError> {
        let mut errors = Vec::new();

        let book_id = match self.book_id {
            None => {
                errors.push(ReviewFieldError::MissingBook);
                None
            }
            Some(id) if catalog::find(id).is_none() => {
                errors.push(ReviewFieldError::UnknownBook(id));
                None
            }
            Some(id) => Some(id),
        };

        let rating = self.rating.map(Rating::clamped);
        if rating.is_none() {
            errors.push(ReviewFieldError::MissingRating);
        }

        let name = self.reviewer_name.trim();
        if name.is_empty() {
            errors.push(ReviewFieldError::EmptyName);
        } else if name.chars().count() > MAX_SHORT_TEXT_CHARS {
            errors.push(ReviewFieldError::TooLong {
                field: "reviewerName",
                max: MAX_SHORT_TEXT_CHARS,
            });
        }

        let email = Email::parse_normalized(&self.reviewer_email)
            .map_err(|e| errors.push(ReviewFieldError::InvalidEmail(e)))
            .ok();

        let comment = self.comment.trim();
        let comment_chars = comment.chars().count();
        if comment_chars < MIN_COMMENT_CHARS {
            errors.push(ReviewFieldError::CommentTooShort {
                min: MIN_COMMENT_CHARS,
            });
        } else if comment_chars > MAX_COMMENT_CHARS {
            errors.push(ReviewFieldError::TooLong {
                field: "comment",
                max: MAX_COMMENT_CHARS,
            });
        }

        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if title.is_some_and(|t| t.chars().count() > MAX_SHORT_TEXT_CHARS) {
            errors.push(ReviewFieldError::TooLong {
                field: "title",
                max: MAX_SHORT_TEXT_CHARS,
            });
        }

        match (book_id, rating, email) {
            (Some(book_id), Some(rating), Some(reviewer_email)) if errors.is_empty() => {
                Ok(NewReview {
                    book_id,
                    rating,
                    title: title.map(html::escape),
                    comment: html::escape(comment),
                    reviewer_name: html::escape(name),
                    reviewer_email,
                })
            }
            _ => Err(ReviewValidationError(errors)),
        }
    }
}

// =============================================================================
// Curated reviews
// =============================================================================

fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}

#[allow(clippy::too_many_arguments)]
fn curated_review(
    id: i32,
    book: i32,
    rating: u8,
    title: &str,
    comment: &str,
    name: &str,
    highlighted: bool,
    date: DateTime<Utc>,
) -> Review {
    Review {
        id: ReviewId::new(id),
        book_id: BookId::new(book),
        rating: Rating::clamped(i64::from(rating)),
        title: Some(title.to_owned()),
        comment: comment.to_owned(),
        reviewer_name: name.to_owned(),
        reviewer_email: None,
        is_verified_purchase: true,
        is_highlighted: highlighted,
        is_approved: true,
        date,
    }
}

static CURATED: LazyLock<Vec<Review>> = LazyLock::new(|| {
    vec![
        curated_review(
            1,
            1,
            5,
            "A balm for a tired soul",
            "I read one day each morning before work. It slowed me down in the best way.",
            "Rachel M.",
            true,
            day(2024, 3, 14),
        ),
        curated_review(
            2,
            1,
            4,
            "Gentle and honest",
            "Some days hit harder than others, but the reflections on Psalm 23 stayed with me.",
            "David K.",
            false,
            day(2024, 5, 2),
        ),
        curated_review(
            3,
            1,
            3,
            "Good, a little short",
            "I wanted more depth in the second half, though the prayers are lovely.",
            "Anonymous",
            false,
            day(2024, 1, 20),
        ),
        curated_review(
            4,
            2,
            5,
            "Our small group loved it",
            "The study questions sparked the best conversations we have had in years.",
            "Pastor Jim",
            true,
            day(2024, 6, 11),
        ),
        curated_review(
            5,
            2,
            4,
            "Thoughtful walk through Psalm 119",
            "Slow going at times, but every stanza opened something new for me.",
            "Esther L.",
            false,
            day(2024, 2, 8),
        ),
        curated_review(
            6,
            3,
            5,
            "Met me in a dry season",
            "I picked this up after losing my job. The chapter on Elijah under the broom tree undid me.",
            "Marcus T.",
            true,
            day(2024, 4, 27),
        ),
        curated_review(
            7,
            4,
            4,
            "Perfect for caregivers",
            "Each letter is short enough to read in a hospital waiting room, and I did.",
            "Linda P.",
            false,
            day(2024, 7, 3),
        ),
    ]
});

/// Reviews compiled into the site, all approved.
#[must_use]
pub fn curated() -> &'static [Review] {
    &CURATED
}
