use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{BookId, BookRuleError, Isbn};

/// 書籍 - カタログが所有する在庫の単位
///
/// 貸出側は在庫数（stock）を参照するだけで、所有はしない。
/// 貸出への逆参照は持たず、貸出はレコードストアへの問い合わせで得る。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub book_id: BookId,
    pub title: String,
    pub author: String,
    pub isbn: Isbn,
    pub publication_year: i32,
    pub stock: u32,
    pub genres: BTreeSet<String>,
    pub version: i64,
}

/// 書籍登録の入力
#[derive(Debug, Clone)]
pub struct NewBook<'a> {
    pub title: &'a str,
    pub author: &'a str,
    pub isbn: &'a str,
    pub publication_year: i32,
    pub stock: u32,
    pub genres: &'a [&'a str],
}

/// 純粋関数：書籍を登録する
///
/// ビジネスルール：
/// - タイトル・著者は空でない
/// - ISBNはチェックディジットが正しい
/// - 出版年は 0 以上、今年以下
/// - ジャンルは1つ以上
pub fn register_book(input: NewBook<'_>, current_year: i32) -> Result<Book, BookRuleError> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(BookRuleError::BlankTitle);
    }

    let author = input.author.trim();
    if author.is_empty() {
        return Err(BookRuleError::BlankAuthor);
    }

    let isbn = Isbn::parse(input.isbn)?;

    if input.publication_year < 0 || input.publication_year > current_year {
        return Err(BookRuleError::PublicationYearOutOfRange {
            year: input.publication_year,
            current_year,
        });
    }

    let mut genres = BTreeSet::new();
    for genre in input.genres {
        genres.insert(normalize_genre(genre)?);
    }
    if genres.is_empty() {
        return Err(BookRuleError::NoGenres);
    }

    Ok(Book {
        book_id: BookId::new(),
        title: title.to_string(),
        author: author.to_string(),
        isbn,
        publication_year: input.publication_year,
        stock: input.stock,
        genres,
        version: 0,
    })
}

/// 純粋関数：在庫数の入力を検証する
///
/// 貸出中の件数を下回らないかはレコードストアの排他区間内で確認する。
pub fn validate_stock(new_stock: i64) -> Result<u32, BookRuleError> {
    u32::try_from(new_stock).map_err(|_| BookRuleError::NegativeStock(new_stock))
}

/// 純粋関数：ジャンルを追加する（既にあれば変更なし）
pub fn add_genre(book: &Book, genre: &str) -> Result<Book, BookRuleError> {
    let genre = normalize_genre(genre)?;
    let mut genres = book.genres.clone();
    genres.insert(genre);

    Ok(Book {
        genres,
        ..book.clone()
    })
}

/// 純粋関数：ジャンルを外す
///
/// ビジネスルール：
/// - 書籍に付いていないジャンルは外せない
/// - 最後の1つは外せない
pub fn remove_genre(book: &Book, genre: &str) -> Result<Book, BookRuleError> {
    let genre = normalize_genre(genre)?;
    if !book.genres.contains(&genre) {
        return Err(BookRuleError::GenreNotOnBook(genre));
    }
    if book.genres.len() == 1 {
        return Err(BookRuleError::LastGenre);
    }

    let mut genres = book.genres.clone();
    genres.remove(&genre);

    Ok(Book {
        genres,
        ..book.clone()
    })
}

fn normalize_genre(genre: &str) -> Result<String, BookRuleError> {
    let genre = genre.trim();
    if genre.is_empty() {
        return Err(BookRuleError::BlankGenre);
    }
    Ok(genre.to_string())
}
