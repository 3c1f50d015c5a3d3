use thiserror::Error;

use crate::model::Column;

/// Errors raised by the core transforms. Everything else degrades to a
/// default during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid group key: column `{0}` is not a groupable column of this dataset")]
    InvalidGroupKey(Column),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
