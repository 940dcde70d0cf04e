use crate::domain::{self, Lending, LendingBecameOverdue};
use crate::ports::*;
use chrono::NaiveDate;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::lending_service::{ServiceDependencies, publish};

/// 延滞スイープの集計結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// 走査した貸出の件数
    pub scanned: usize,
    /// Overdue に遷移させた件数
    pub transitioned: usize,
    /// 他の書き込みが先行したため見送った件数（次回のスイープで再評価される）
    pub conflicts: usize,
    /// 読み込み・書き込みに失敗した件数
    pub failures: usize,
}

/// 延滞スイープバッチ
///
/// 定期的に実行され、返却期限を過ぎた Active の貸出を Overdue に遷移させる。
///
/// ビジネスルール：
/// - 返却期限（due_date）が `today` より前の Active の貸出のみ対象
/// - Overdue / Returned / Reserved / Cancelled は触らない（再実行しても何も起きない）
///
/// 処理フロー：
/// 1. すべての貸出をストリームで走査し、遷移対象を集める
/// 2. 各対象について、読み込んだ時点のバージョンを条件に書き込む
///    - 同時に返却された貸出は `VersionConflict` になり、Overdue で上書きされない
/// 3. 遷移した書籍のキャッシュを無効化する
///
/// 1件ごとの失敗は記録して処理を続ける。残りの貸出は必ず評価される。
pub async fn sweep_overdue(deps: &ServiceDependencies, today: NaiveDate) -> SweepReport {
    let mut report = SweepReport::default();

    // 1. 全件走査（書き込みは走査後に行い、走査中の接続を保持し続けない）
    let mut candidates: Vec<(Lending, Lending, LendingBecameOverdue)> = Vec::new();
    {
        let mut lendings = deps.record_store.stream_lendings();
        while let Some(row) = lendings.next().await {
            report.scanned += 1;
            match row {
                Ok(lending) => {
                    if let Some((overdue, event)) = domain::lending::mark_overdue(&lending, today) {
                        candidates.push((lending, overdue, event));
                    }
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(error = %e, "Failed to read lending during overdue sweep");
                }
            }
        }
    }

    // 2. 条件付き書き込み
    for (lending, overdue, event) in candidates {
        let outcome = deps
            .record_store
            .update_lending(&overdue, lending.version, StockCheck::Skip)
            .await;

        match outcome {
            Ok(WriteOutcome::Applied) => {
                report.transitioned += 1;
                publish(deps, event.into()).await;
            }
            Ok(WriteOutcome::VersionConflict) => {
                report.conflicts += 1;
                tracing::warn!(
                    lending_id = %lending.lending_id,
                    "Lending changed concurrently, skipped by overdue sweep"
                );
            }
            Ok(other) => {
                report.failures += 1;
                tracing::error!(
                    lending_id = %lending.lending_id,
                    outcome = ?other,
                    "Unexpected outcome while marking lending overdue"
                );
            }
            Err(e) => {
                report.failures += 1;
                tracing::error!(
                    lending_id = %lending.lending_id,
                    error = %e,
                    "Failed to mark lending overdue"
                );
            }
        }
    }

    tracing::info!(
        %today,
        scanned = report.scanned,
        transitioned = report.transitioned,
        conflicts = report.conflicts,
        failures = report.failures,
        "Overdue sweep finished"
    );

    report
}
