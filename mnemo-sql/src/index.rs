use std::fmt;
use std::str::FromStr;

use mnemo_core::{IndexType, StoreError};

/// IVFFLAT centroids need data; below this row count the index is not built unless forced.
pub const MIN_ROWS_FOR_IVFFLAT_INDEX: i64 = 10_000;

/// Row count above which `lists` grows with `sqrt(rows)` instead of `rows / 1000`.
const IVFFLAT_LINEAR_LISTS_MAX_ROWS: i64 = 1_000_000;

/// First pgvector release with HNSW.
pub const HNSW_MIN_VERSION: PgVectorVersion = PgVectorVersion {
    major: 0,
    minor: 5,
    patch: 0,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PgVectorVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PgVectorVersion {
    pub fn supports_hnsw(self) -> bool {
        self >= HNSW_MIN_VERSION
    }
}

impl fmt::Display for PgVectorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for PgVectorVersion {
    type Err = StoreError;

    /// Accepts `extversion` strings such as `0.4`, `0.5.1` or `0.7.0-dev`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::invalid(format!("unrecognised pgvector version '{value}'"));
        let mut parts = value.trim().splitn(3, '.');
        let mut next = |required: bool| -> Result<u32, StoreError> {
            match parts.next() {
                Some(part) => {
                    let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                    digits.parse().map_err(|_| invalid())
                }
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };
        let major = next(true)?;
        let minor = next(true)?;
        let patch = next(false)?;
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

/// HNSW when the installed extension has it, IVFFLAT otherwise.
pub fn index_type_for(version: Option<PgVectorVersion>) -> IndexType {
    match version {
        Some(version) if version.supports_hnsw() => IndexType::Hnsw,
        _ => IndexType::IvfFlat,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IvfFlatParams {
    pub lists: i32,
    pub probes: i32,
}

impl IvfFlatParams {
    /// `lists = rows / 1000` up to a million rows, `sqrt(rows)` beyond;
    /// `probes = sqrt(lists)`. Both at least 1.
    pub fn for_row_count(rows: i64) -> Self {
        let rows = rows.max(0);
        let lists = if rows <= IVFFLAT_LINEAR_LISTS_MAX_ROWS {
            rows / 1000
        } else {
            (rows as f64).sqrt() as i64
        };
        let lists = lists.clamp(1, i32::MAX as i64) as i32;
        let probes = ((lists as f64).sqrt() as i32).max(1);
        Self { lists, probes }
    }
}
