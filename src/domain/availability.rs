use super::{AvailabilityError, Lending};

/// 純粋関数：利用可能在庫を計算する
///
/// `stock − |{ 貸出中（Active / Overdue）の貸出 }|`
///
/// 貸出中の件数が在庫数を超える場合は丸めずに `Oversubscribed` を返す。
///
/// 貸出の集合が手元にある場合の形。アプリケーション層とレコードストアは
/// 件数をまとめて数えるので `available_stock_from_count` を使う。
/// どちらも同じ規則で、同じ入力には同じ結果を返す。
pub fn available_stock(stock: u32, lendings: &[Lending]) -> Result<u32, AvailabilityError> {
    let held = lendings
        .iter()
        .filter(|lending| lending.status.is_active_like())
        .count() as u64;

    available_stock_from_count(stock, held)
}

/// 利用可能在庫を貸出中の件数から計算する
///
/// 表示用の読み取り、貸出受付の排他区間、在庫数変更のすべてがこの形を通る。
pub fn available_stock_from_count(stock: u32, held: u64) -> Result<u32, AvailabilityError> {
    u64::from(stock)
        .checked_sub(held)
        .map(|available| available as u32)
        .ok_or(AvailabilityError::Oversubscribed { stock, held })
}

/// 受付チェック：もう1冊貸し出せるか
pub fn can_admit(stock: u32, held: u64) -> Result<bool, AvailabilityError> {
    available_stock_from_count(stock, held).map(|available| available > 0)
}
