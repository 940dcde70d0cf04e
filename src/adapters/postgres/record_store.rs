use crate::domain::{
    Book, BookId, Isbn, Lending, LendingId, LendingStatus, ReaderId, availability,
};
use crate::ports::record_store::{
    BookPopularity, LendingRecordStore as LendingRecordStoreTrait, Result, StockCheck,
    WriteOutcome,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{BoxStream, StreamExt};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use std::str::FromStr;

fn invalid_data(message: String) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message))
}

fn to_stock(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| invalid_data(format!("stock out of range: {}", value)))
}

/// PostgreSQLの行データをLendingに変換する
fn map_row_to_lending(row: &PgRow) -> Result<Lending> {
    let status_str: &str = row.get("status");
    let status = LendingStatus::from_str(status_str).map_err(invalid_data)?;

    Ok(Lending {
        lending_id: LendingId::from_uuid(row.get("id")),
        book_id: BookId::from_uuid(row.get("book_id")),
        reader_id: ReaderId::from_uuid(row.get("reader_id")),
        lending_date: row.get("lending_date"),
        due_date: row.get("due_date"),
        return_date: row.get("return_date"),
        status,
        version: row.get("version"),
    })
}

/// PostgreSQLの行データをBookに変換する
///
/// ISBNは保存時に検証済みだが、読み込み時にも値オブジェクトとして再検証する。
fn map_row_to_book(row: &PgRow) -> Result<Book> {
    let isbn_str: &str = row.get("isbn");
    let isbn = Isbn::parse(isbn_str)
        .map_err(|e| invalid_data(format!("invalid isbn {:?}: {:?}", isbn_str, e)))?;
    let genres: Vec<String> = row.get("genres");

    Ok(Book {
        book_id: BookId::from_uuid(row.get("id")),
        title: row.get("title"),
        author: row.get("author"),
        isbn,
        publication_year: row.get("publication_year"),
        stock: to_stock(row.get("stock"))?,
        genres: genres.into_iter().collect(),
        version: row.get("version"),
    })
}

/// 書籍の行ロックを取得し、在庫数を返す
///
/// 同じ書籍に対する受付チェックと書き込みは、トランザクションが終わるまで直列化される。
async fn lock_book(conn: &mut PgConnection, book_id: BookId) -> Result<Option<u32>> {
    let stock: Option<i32> = sqlx::query_scalar("SELECT stock FROM books WHERE id = $1 FOR UPDATE")
        .bind(book_id.value())
        .fetch_optional(&mut *conn)
        .await?;

    stock.map(to_stock).transpose()
}

/// 書籍の貸出中（active / overdue）の件数
async fn count_held(
    conn: &mut PgConnection,
    book_id: BookId,
    excluding: Option<LendingId>,
) -> Result<u64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM lendings
        WHERE book_id = $1
          AND status IN ('active', 'overdue')
          AND ($2::uuid IS NULL OR id <> $2)
        "#,
    )
    .bind(book_id.value())
    .bind(excluding.map(|id| id.value()))
    .fetch_one(&mut *conn)
    .await?;

    Ok(count as u64)
}

/// 受付チェック（行ロック取得済みの接続で呼ぶこと）
///
/// 受け付けられる場合は `None`、拒否する場合はその理由を返す。
async fn admit(
    conn: &mut PgConnection,
    book_id: BookId,
    excluding: Option<LendingId>,
) -> Result<Option<WriteOutcome>> {
    let Some(stock) = lock_book(conn, book_id).await? else {
        return Ok(Some(WriteOutcome::MissingBook));
    };
    let held = count_held(conn, book_id, excluding).await?;

    match availability::can_admit(stock, held) {
        Ok(true) => Ok(None),
        _ => Ok(Some(WriteOutcome::StockExhausted { stock, held })),
    }
}

/// LendingRecordStoreのPostgreSQL実装
///
/// 書籍と貸出の正本。書き込みは1つのトランザクションで行い、
/// 途中で失敗・中断した場合はトランザクションが破棄されてロールバックされる。
pub struct LendingRecordStore {
    pool: PgPool,
}

impl LendingRecordStore {
    /// PostgreSQLコネクションプールから新しいLendingRecordStoreを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LendingRecordStoreTrait for LendingRecordStore {
    async fn find_book(&self, book_id: BookId) -> Result<Option<Book>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, author, isbn, publication_year, stock, genres, version
            FROM books
            WHERE id = $1
            "#,
        )
        .bind(book_id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_book).transpose()
    }

    async fn find_lending(&self, lending_id: LendingId) -> Result<Option<Lending>> {
        let row = sqlx::query(
            r#"
            SELECT
                id,
                book_id,
                reader_id,
                lending_date,
                due_date,
                return_date,
                status,
                version
            FROM lendings
            WHERE id = $1
            "#,
        )
        .bind(lending_id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_lending).transpose()
    }

    async fn count_active_like(&self, book_id: BookId) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        count_held(&mut *conn, book_id, None).await
    }

    async fn find_all_lendings(&self) -> Result<Vec<Lending>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                book_id,
                reader_id,
                lending_date,
                due_date,
                return_date,
                status,
                version
            FROM lendings
            ORDER BY lending_date DESC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_lending).collect()
    }

    /// 書籍ごとの貸出件数を集計する（INNER JOINなので貸出のない書籍は出ない）
    async fn top_borrowed_books(&self, limit: u32) -> Result<Vec<BookPopularity>> {
        let rows = sqlx::query(
            r#"
            SELECT b.id, b.title, b.author, COUNT(l.id) AS lending_count
            FROM books b
            JOIN lendings l ON l.book_id = b.id
            GROUP BY b.id, b.title, b.author
            ORDER BY lending_count DESC, b.id ASC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| BookPopularity {
                book_id: BookId::from_uuid(row.get("id")),
                title: row.get("title"),
                author: row.get("author"),
                lending_count: row.get::<i64, _>("lending_count") as u64,
            })
            .collect())
    }

    /// (status, due_date)のインデックスを使用する
    async fn find_lendings_by_status(&self, status: LendingStatus) -> Result<Vec<Lending>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                book_id,
                reader_id,
                lending_date,
                due_date,
                return_date,
                status,
                version
            FROM lendings
            WHERE status = $1
            ORDER BY lending_date ASC, id ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_lending).collect()
    }

    async fn find_overdue_unreturned(&self, before: NaiveDate) -> Result<Vec<Lending>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                book_id,
                reader_id,
                lending_date,
                due_date,
                return_date,
                status,
                version
            FROM lendings
            WHERE due_date < $1 AND return_date IS NULL
            ORDER BY due_date ASC, id ASC
            "#,
        )
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_lending).collect()
    }

    async fn find_lendings_by_reader(
        &self,
        reader_id: ReaderId,
        status: Option<LendingStatus>,
    ) -> Result<Vec<Lending>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                book_id,
                reader_id,
                lending_date,
                due_date,
                return_date,
                status,
                version
            FROM lendings
            WHERE reader_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY lending_date DESC, id ASC
            "#,
        )
        .bind(reader_id.value())
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_lending).collect()
    }

    /// 書籍の貸出履歴（新しい順）
    async fn find_lendings_by_book(&self, book_id: BookId) -> Result<Vec<Lending>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                book_id,
                reader_id,
                lending_date,
                due_date,
                return_date,
                status,
                version
            FROM lendings
            WHERE book_id = $1
            ORDER BY lending_date DESC, id ASC
            "#,
        )
        .bind(book_id.value())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_lending).collect()
    }

    async fn find_lendings_by_lending_date_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Lending>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                book_id,
                reader_id,
                lending_date,
                due_date,
                return_date,
                status,
                version
            FROM lendings
            WHERE lending_date BETWEEN $1 AND $2
            ORDER BY lending_date ASC, id ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_lending).collect()
    }

    /// 全件をストリーム配信する（延滞スイープ用）
    fn stream_lendings(&self) -> BoxStream<'_, Result<Lending>> {
        let stream = sqlx::query(
            r#"
            SELECT id, book_id, reader_id, lending_date, due_date, return_date, status, version
            FROM lendings
            ORDER BY lending_date ASC, id ASC
            "#,
        )
        .fetch(&self.pool)
        .map(|row_result| {
            let row = row_result?;
            map_row_to_lending(&row)
        });

        Box::pin(stream)
    }

    /// 貸出を挿入する
    ///
    /// `SELECT ... FOR UPDATE` で書籍の行をロックしてから貸出中の件数を数え、
    /// 在庫に空きがある場合のみ挿入してコミットする。
    async fn insert_lending(&self, lending: &Lending) -> Result<WriteOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(rejected) = admit(&mut *tx, lending.book_id, None).await? {
            tx.rollback().await?;
            return Ok(rejected);
        }

        sqlx::query(
            r#"
            INSERT INTO lendings (
                id,
                book_id,
                reader_id,
                lending_date,
                due_date,
                return_date,
                status,
                version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(lending.lending_id.value())
        .bind(lending.book_id.value())
        .bind(lending.reader_id.value())
        .bind(lending.lending_date)
        .bind(lending.due_date)
        .bind(lending.return_date)
        .bind(lending.status.as_str())
        .bind(lending.version)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(WriteOutcome::Applied)
    }

    /// 貸出を更新する（バージョン比較付き）
    async fn update_lending(
        &self,
        lending: &Lending,
        expected_version: i64,
        stock_check: StockCheck,
    ) -> Result<WriteOutcome> {
        let mut tx = self.pool.begin().await?;

        if stock_check == StockCheck::Required {
            if let Some(rejected) =
                admit(&mut *tx, lending.book_id, Some(lending.lending_id)).await?
            {
                tx.rollback().await?;
                return Ok(rejected);
            }
        }

        let result = sqlx::query(
            r#"
            UPDATE lendings
            SET due_date = $1,
                return_date = $2,
                status = $3,
                version = version + 1
            WHERE id = $4 AND version = $5
            "#,
        )
        .bind(lending.due_date)
        .bind(lending.return_date)
        .bind(lending.status.as_str())
        .bind(lending.lending_id.value())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(WriteOutcome::VersionConflict);
        }

        tx.commit().await?;
        Ok(WriteOutcome::Applied)
    }

    /// 在庫数を変更する（貸出中の件数を下回る変更は拒否）
    async fn update_stock(&self, book_id: BookId, new_stock: u32) -> Result<WriteOutcome> {
        let mut tx = self.pool.begin().await?;

        if lock_book(&mut *tx, book_id).await?.is_none() {
            tx.rollback().await?;
            return Ok(WriteOutcome::MissingBook);
        }

        let held = count_held(&mut *tx, book_id, None).await?;
        if held > u64::from(new_stock) {
            tx.rollback().await?;
            return Ok(WriteOutcome::StockExhausted {
                stock: new_stock,
                held,
            });
        }

        let stock = i32::try_from(new_stock)
            .map_err(|_| invalid_data(format!("stock out of range: {}", new_stock)))?;

        sqlx::query("UPDATE books SET stock = $1, version = version + 1 WHERE id = $2")
            .bind(stock)
            .bind(book_id.value())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(WriteOutcome::Applied)
    }

    /// 書籍を更新する（バージョン比較付き）
    ///
    /// 在庫数は `update_stock` でのみ変更するため、ここでは書き込まない。
    async fn update_book(&self, book: &Book, expected_version: i64) -> Result<WriteOutcome> {
        let genres: Vec<String> = book.genres.iter().cloned().collect();

        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = $1,
                author = $2,
                publication_year = $3,
                genres = $4,
                version = version + 1
            WHERE id = $5 AND version = $6
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.publication_year)
        .bind(&genres)
        .bind(book.book_id.value())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(WriteOutcome::Applied);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
            .bind(book.book_id.value())
            .fetch_one(&self.pool)
            .await?;

        Ok(if exists {
            WriteOutcome::VersionConflict
        } else {
            WriteOutcome::MissingBook
        })
    }
}
