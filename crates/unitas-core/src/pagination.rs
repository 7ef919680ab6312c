//! Offset pagination.

use unitas_types::error::{DataError, DataResult};

/// A validated page request: `page_size` rows starting after
/// `(page_number - 1) * page_size` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    size: i64,
    number: i64,
    offset: i64,
}

impl Page {
    /// Both values must be positive; page numbers start at 1.
    pub fn new(page_size: i64, page_number: i64) -> DataResult<Self> {
        let invalid = || DataError::InvalidPagination {
            page_size,
            page_number,
        };
        if page_size <= 0 || page_number <= 0 {
            return Err(invalid());
        }
        let offset = (page_number - 1).checked_mul(page_size).ok_or_else(invalid)?;
        Ok(Self {
            size: page_size,
            number: page_number,
            offset,
        })
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn limit(&self) -> i64 {
        self.size
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// The following page, if its offset is still representable.
    pub fn next(&self) -> Option<Self> {
        Self::new(self.size, self.number.checked_add(1)?).ok()
    }

    /// Number of pages needed to cover `total_rows` at this page size.
    pub fn page_count(&self, total_rows: u64) -> u64 {
        total_rows.div_ceil(self.size.unsigned_abs())
    }
}
