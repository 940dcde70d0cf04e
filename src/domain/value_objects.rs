use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 貸出ID - 貸出レコードの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LendingId(Uuid);

impl LendingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for LendingId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<LendingId> for Uuid {
    fn from(id: LendingId) -> Self {
        id.0
    }
}

impl fmt::Display for LendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 書籍ID - カタログ（在庫）への参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookId(Uuid);

impl BookId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<BookId> for Uuid {
    fn from(id: BookId) -> Self {
        id.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 読者ID - 読者管理コンテキストへの参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReaderId(Uuid);

impl ReaderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for ReaderId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ReaderId> for Uuid {
    fn from(id: ReaderId) -> Self {
        id.0
    }
}

impl fmt::Display for ReaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// ISBNのエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsbnError {
    /// 桁数が10でも13でもない
    InvalidLength(usize),
    /// 数字以外の文字を含む（ISBN-10末尾のXを除く）
    InvalidCharacter(char),
    /// チェックディジットが一致しない
    ChecksumMismatch,
}

/// ISBN - 書籍の不変のビジネスキー
///
/// 不変条件：ISBN-10またはISBN-13としてチェックディジットが正しい。
/// ハイフンと空白は取り除いて正規化した形で保持する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn(String);

impl Isbn {
    pub fn parse(raw: &str) -> Result<Self, IsbnError> {
        let normalized: String = raw
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match normalized.len() {
            10 => Self::verify_isbn10(&normalized)?,
            13 => Self::verify_isbn13(&normalized)?,
            n => return Err(IsbnError::InvalidLength(n)),
        }

        Ok(Self(normalized))
    }

    pub fn value(&self) -> &str {
        &self.0
    }

    fn verify_isbn10(digits: &str) -> Result<(), IsbnError> {
        let mut sum = 0u32;
        for (i, c) in digits.chars().enumerate() {
            let digit = match c {
                'X' if i == 9 => 10,
                c => c.to_digit(10).ok_or(IsbnError::InvalidCharacter(c))?,
            };
            sum += digit * (10 - i as u32);
        }
        if sum % 11 != 0 {
            return Err(IsbnError::ChecksumMismatch);
        }
        Ok(())
    }

    fn verify_isbn13(digits: &str) -> Result<(), IsbnError> {
        let mut sum = 0u32;
        for (i, c) in digits.chars().enumerate() {
            let digit = c.to_digit(10).ok_or(IsbnError::InvalidCharacter(c))?;
            sum += if i % 2 == 0 { digit } else { digit * 3 };
        }
        if sum % 10 != 0 {
            return Err(IsbnError::ChecksumMismatch);
        }
        Ok(())
    }
}

impl TryFrom<String> for Isbn {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Isbn::parse(&value).map_err(|e| format!("Invalid ISBN {}: {:?}", value, e))
    }
}

impl From<Isbn> for String {
    fn from(isbn: Isbn) -> Self {
        isbn.0
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
