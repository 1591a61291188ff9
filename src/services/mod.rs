use sea_orm::DatabaseTransaction;

use crate::error::AppResult;

pub mod admin_service;
pub mod auth_service;
pub mod cart_service;
pub mod category_service;
pub mod checkout_service;
pub mod order_service;
pub mod product_service;
pub mod profile_service;
pub mod supplier_service;

/// Commits on success. On failure rolls back explicitly and hands the
/// original error back; a failed rollback is only logged.
pub(crate) async fn finish<T>(txn: DatabaseTransaction, outcome: AppResult<T>) -> AppResult<T> {
    match outcome {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
