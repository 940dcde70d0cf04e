use crate::application::lending::{
    self as lending, ServiceDependencies, SweepReport, sweep_overdue,
};
use crate::domain::{
    BookId, LendingId, ReaderId,
    commands::{ExtendLending, ReturnLending, SetLendingStatus},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    error::ApiError,
    types::{
        AddGenreRequest, AvailabilityResponse, BookResponse, CreateLendingRequest,
        ExtendLendingRequest, LendingResponse, ListLendingsQuery, PopularBookResponse,
        PopularBooksQuery, SetLendingStatusRequest, UpdateStockRequest, parse_status,
    },
};

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
}

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

// ============================================================================
// Lending command handlers
// ============================================================================

/// POST /lendings - 新しい貸出を作成
///
/// 強制されるビジネスルール:
/// - 読者と書籍が存在すること
/// - 貸出日が今日以前、返却期限が貸出日以降であること
/// - 利用可能在庫があること
pub async fn create_lending(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLendingRequest>,
) -> Result<(StatusCode, Json<LendingResponse>), ApiError> {
    let cmd = req.to_command(today());

    let view = lending::create_lending(&state.service_deps, cmd).await?;

    Ok((StatusCode::CREATED, Json(LendingResponse::from(view))))
}

/// POST /lendings/:id/return - 書籍を返却
pub async fn return_lending(
    State(state): State<Arc<AppState>>,
    Path(lending_id): Path<Uuid>,
) -> Result<Json<LendingResponse>, ApiError> {
    let cmd = ReturnLending {
        lending_id: LendingId::from_uuid(lending_id),
        today: today(),
    };

    let view = lending::return_lending(&state.service_deps, cmd).await?;

    Ok(Json(LendingResponse::from(view)))
}

/// POST /lendings/:id/extend - 返却期限を延長
pub async fn extend_lending(
    State(state): State<Arc<AppState>>,
    Path(lending_id): Path<Uuid>,
    Json(req): Json<ExtendLendingRequest>,
) -> Result<Json<LendingResponse>, ApiError> {
    let cmd = ExtendLending {
        lending_id: LendingId::from_uuid(lending_id),
        new_due_date: req.new_due_date,
        today: today(),
    };

    let view = lending::extend_lending(&state.service_deps, cmd).await?;

    Ok(Json(LendingResponse::from(view)))
}

/// PUT /lendings/:id/status - ステータスを上書き（管理者操作）
pub async fn set_lending_status(
    State(state): State<Arc<AppState>>,
    Path(lending_id): Path<Uuid>,
    Json(req): Json<SetLendingStatusRequest>,
) -> Result<Json<LendingResponse>, ApiError> {
    let status = parse_status(&req.status).map_err(ApiError::BadRequest)?;

    let cmd = SetLendingStatus {
        lending_id: LendingId::from_uuid(lending_id),
        status,
        today: today(),
    };

    let view = lending::set_lending_status(&state.service_deps, cmd).await?;

    Ok(Json(LendingResponse::from(view)))
}

/// POST /lendings/sweep - 延滞スイープを即時実行
pub async fn run_overdue_sweep(State(state): State<Arc<AppState>>) -> Json<SweepReport> {
    Json(sweep_overdue(&state.service_deps, today()).await)
}

// ============================================================================
// Lending query handlers
// ============================================================================

/// GET /lendings/:id - 貸出詳細をIDで取得
pub async fn get_lending(
    State(state): State<Arc<AppState>>,
    Path(lending_id): Path<Uuid>,
) -> Result<Json<LendingResponse>, ApiError> {
    let view =
        lending::get_lending(&state.service_deps, LendingId::from_uuid(lending_id), today())
            .await?;

    Ok(Json(LendingResponse::from(view)))
}

/// GET /lendings - フィルタ付き貸出一覧取得
///
/// クエリパラメータ:
/// - reader_id: 読者の貸出（status で絞り込み可能）
/// - book_id: 書籍の貸出履歴（status で絞り込み可能）
/// - status: ステータスで検索
///
/// いずれも指定されない場合は全件を返す。
pub async fn list_lendings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListLendingsQuery>,
) -> Result<Json<Vec<LendingResponse>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(parse_status)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let deps = &state.service_deps;
    let today = today();

    let views = match (query.reader_id, query.book_id, status) {
        (Some(reader_id), _, status) => {
            lending::find_lendings_by_reader(deps, ReaderId::from_uuid(reader_id), status, today)
                .await?
        }
        (None, Some(book_id), status) => {
            let views =
                lending::find_lendings_by_book(deps, BookId::from_uuid(book_id), today).await?;
            views
                .into_iter()
                .filter(|view| status.is_none_or(|status| view.status == status))
                .collect()
        }
        (None, None, Some(status)) => {
            lending::find_lendings_by_status(deps, status, today).await?
        }
        (None, None, None) => lending::find_all_lendings(deps, today).await?,
    };

    Ok(Json(views.into_iter().map(LendingResponse::from).collect()))
}

/// GET /lendings/popular-books - 貸出件数の多い書籍
pub async fn list_popular_books(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PopularBooksQuery>,
) -> Result<Json<Vec<PopularBookResponse>>, ApiError> {
    let popular = lending::top_borrowed_books(&state.service_deps, query.limit).await?;

    Ok(Json(popular.into_iter().map(PopularBookResponse::from).collect()))
}

// ============================================================================
// Book handlers
// ============================================================================

/// GET /books/:id - 書籍ビュー（キャッシュ経由）
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
) -> Result<Json<BookResponse>, ApiError> {
    let view = lending::get_book_view(&state.service_deps, BookId::from_uuid(book_id)).await?;

    Ok(Json(BookResponse::from(view)))
}

/// GET /books/:id/availability - 利用可能在庫（キャッシュ経由）
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let available_stock =
        lending::get_availability(&state.service_deps, BookId::from_uuid(book_id)).await?;

    Ok(Json(AvailabilityResponse {
        book_id,
        available_stock,
    }))
}

/// PUT /books/:id/stock - 在庫数を変更
pub async fn update_stock(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
    Json(req): Json<UpdateStockRequest>,
) -> Result<Json<BookResponse>, ApiError> {
    let view =
        lending::update_book_stock(&state.service_deps, BookId::from_uuid(book_id), req.stock)
            .await?;

    Ok(Json(BookResponse::from(view)))
}

/// POST /books/:id/genres - ジャンルを追加
pub async fn add_genre(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
    Json(req): Json<AddGenreRequest>,
) -> Result<Json<BookResponse>, ApiError> {
    let view =
        lending::add_genre_to_book(&state.service_deps, BookId::from_uuid(book_id), &req.genre)
            .await?;

    Ok(Json(BookResponse::from(view)))
}

/// DELETE /books/:id/genres/:name - ジャンルを外す
pub async fn remove_genre(
    State(state): State<Arc<AppState>>,
    Path((book_id, genre)): Path<(Uuid, String)>,
) -> Result<Json<BookResponse>, ApiError> {
    let view =
        lending::remove_genre_from_book(&state.service_deps, BookId::from_uuid(book_id), &genre)
            .await?;

    Ok(Json(BookResponse::from(view)))
}
