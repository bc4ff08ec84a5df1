//! Book catalog rules: draft validation and relevance search.
//!
//! Pure helpers over in-memory data; the coordinator decides when they run
//! and against which snapshot.

use crate::error::{LibraryError, Result};
use crate::models::{Book, BookDraft};

/// Relevance weights per matched field. Title matches dominate, ISBN
/// matches are the weakest signal.
const WEIGHT_TITLE: u32 = 8;
const WEIGHT_AUTHOR: u32 = 4;
const WEIGHT_GENRE: u32 = 2;
const WEIGHT_ISBN: u32 = 1;

/// Validate a book draft before any write.
pub fn validate_draft(draft: &BookDraft) -> Result<()> {
    if draft.title.trim().is_empty() {
        return Err(LibraryError::validation("title", "must not be empty"));
    }
    if draft.author.trim().is_empty() {
        return Err(LibraryError::validation("author", "must not be empty"));
    }
    if draft.total_copies == 0 {
        return Err(LibraryError::validation(
            "total_copies",
            "must be at least 1",
        ));
    }
    Ok(())
}

/// Relevance score of a book for a lowercased search term. Zero means no
/// match.
fn score(book: &Book, term: &str) -> u32 {
    let mut score = 0;
    if book.title.to_lowercase().contains(term) {
        score += WEIGHT_TITLE;
    }
    if book.author.to_lowercase().contains(term) {
        score += WEIGHT_AUTHOR;
    }
    if book.genre.to_lowercase().contains(term) {
        score += WEIGHT_GENRE;
    }
    if book.isbn.to_lowercase().contains(term) {
        score += WEIGHT_ISBN;
    }
    score
}

/// Case-insensitive substring search over title/author/genre/isbn.
///
/// An empty term returns all active books sorted by id. Otherwise results
/// are ordered by descending relevance, ties broken by id ascending so the
/// ordering is stable.
pub fn search_books(books: &[Book], term: &str) -> Vec<Book> {
    let term = term.trim().to_lowercase();

    if term.is_empty() {
        let mut all: Vec<Book> = books.iter().filter(|b| b.is_active).cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        return all;
    }

    let mut scored: Vec<(u32, Book)> = books
        .iter()
        .filter(|b| b.is_active)
        .filter_map(|b| {
            let s = score(b, &term);
            (s > 0).then(|| (s, b.clone()))
        })
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| a.id.cmp(&b.id)));
    scored.into_iter().map(|(_, b)| b).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn book(id: &str, title: &str, author: &str, genre: &str, isbn: &str) -> Book {
        let draft = BookDraft {
            title: title.into(),
            author: author.into(),
            isbn: isbn.into(),
            genre: genre.into(),
            description: String::new(),
            publication_year: 2000,
            publisher: "Test".into(),
            total_copies: 1,
        };
        Book::from_draft(id, &draft, Utc::now())
    }

    #[test]
    fn test_validate_rejects_zero_copies() {
        let mut draft = BookDraft {
            title: "T".into(),
            author: "A".into(),
            total_copies: 0,
            ..Default::default()
        };
        assert!(matches!(
            validate_draft(&draft),
            Err(LibraryError::Validation { .. })
        ));
        draft.total_copies = 1;
        assert!(validate_draft(&draft).is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_title() {
        let draft = BookDraft {
            title: "   ".into(),
            author: "A".into(),
            total_copies: 1,
            ..Default::default()
        };
        assert!(validate_draft(&draft).is_err());
    }

    #[test]
    fn test_empty_term_returns_all_active_by_id() {
        let mut deleted = book("B002", "Gone", "Nobody", "Fiction", "");
        deleted.is_active = false;
        let books = vec![
            book("B003", "Zebra", "A", "Fiction", ""),
            book("B001", "Apple", "B", "Fiction", ""),
            deleted,
        ];
        let results = search_books(&books, "");
        let ids: Vec<_> = results.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["B001", "B003"]);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let books = vec![book("B001", "The Rust Book", "Steve", "Programming", "")];
        assert_eq!(search_books(&books, "RUST").len(), 1);
        assert_eq!(search_books(&books, "rust").len(), 1);
        assert_eq!(search_books(&books, "python").len(), 0);
    }

    #[test]
    fn test_title_match_outranks_genre_match() {
        let books = vec![
            book("B001", "Cooking Basics", "A", "History", ""),
            book("B002", "World Atlas", "B", "Cooking", ""),
        ];
        let results = search_books(&books, "cooking");
        assert_eq!(results[0].id, "B001");
        assert_eq!(results[1].id, "B002");
    }

    #[test]
    fn test_equal_scores_tie_break_by_id() {
        let books = vec![
            book("B002", "Rust in Action", "A", "", ""),
            book("B001", "Rust for Rustaceans", "B", "", ""),
        ];
        let results = search_books(&books, "rust");
        assert_eq!(results[0].id, "B001");
        assert_eq!(results[1].id, "B002");
    }

    #[test]
    fn test_isbn_substring_match() {
        let books = vec![book("B001", "Title", "Author", "Genre", "978-0441172719")];
        assert_eq!(search_books(&books, "0441172719").len(), 1);
    }
}
