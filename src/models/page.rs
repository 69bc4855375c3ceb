use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::utils::constants::{DEFAULT_PAGE, DEFAULT_PER_PAGE};

/// Pagination parameters as supplied by a caller. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PageRequest {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self { page, per_page }
    }

    /// Reject out-of-range values and cap `per_page` at `max_per_page`.
    pub fn validated(self, max_per_page: i64) -> Result<Self> {
        if self.page < 1 {
            return Err(ProcessingError::InvalidInput(format!(
                "page must be >= 1, got {}",
                self.page
            )));
        }
        if self.per_page < 1 {
            return Err(ProcessingError::InvalidInput(format!(
                "per_page must be >= 1, got {}",
                self.per_page
            )));
        }

        let per_page = self.per_page.min(max_per_page);
        if (self.page - 1).checked_mul(per_page).is_none() {
            return Err(ProcessingError::InvalidInput(format!(
                "page {} is out of range",
                self.page
            )));
        }

        Ok(Self {
            page: self.page,
            per_page,
        })
    }

    /// Row offset of this page. Saturates for requests that skipped `validated`.
    pub fn offset(&self) -> i64 {
        self.page
            .saturating_sub(1)
            .max(0)
            .saturating_mul(self.per_page.max(0))
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, total: i64, data: Vec<T>) -> Self {
        Self {
            total,
            page: request.page,
            per_page: request.per_page,
            data,
        }
    }
}
