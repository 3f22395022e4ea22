//! 单元格坐标、区间与值网格。
//!
//! 坐标采用表格惯例：列为字母（`A`..`Z`、`AA`..），行从 1 开始；内部统一换算为从 0 开始的
//! `(row, column)` 下标。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ServiceError;

/// 求值后的表格：`rows × columns` 个字符串。
pub type Grid = Vec<Vec<String>>;

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CellError {
    #[error("invalid cell id `{0}`")]
    InvalidCellId(String),
    #[error("invalid cell range `{0}`")]
    InvalidRange(String),
    #[error("range `{range}` exceeds a {rows}x{columns} grid")]
    OutOfBounds {
        range: String,
        rows: usize,
        columns: usize,
    },
}

impl From<CellError> for ServiceError {
    fn from(value: CellError) -> Self {
        ServiceError::bad_request(value.to_string())
    }
}

/// 单元格坐标。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellId {
    row: usize,
    column: usize,
}

impl CellId {
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    pub const fn row(self) -> usize {
        self.row
    }

    pub const fn column(self) -> usize {
        self.column
    }

    /// 坐标是否落在 `rows × columns` 网格之内。
    pub const fn fits(self, rows: usize, columns: usize) -> bool {
        self.row < rows && self.column < columns
    }
}

impl FromStr for CellId {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CellError::InvalidCellId(s.to_owned());
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid());
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut column = 0usize;
        for c in letters.chars() {
            let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
            column = column
                .checked_mul(26)
                .and_then(|v| v.checked_add(digit))
                .ok_or_else(invalid)?;
        }
        let row: usize = digits.parse().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }
        Ok(CellId::new(row - 1, column - 1))
    }
}

impl TryFrom<String> for CellId {
    type Error = CellError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellId> for String {
    fn from(value: CellId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = Vec::new();
        let mut n = self.column + 1;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            n = (n - 1) / 26;
        }
        for c in letters.iter().rev() {
            write!(f, "{c}")?;
        }
        write!(f, "{}", self.row + 1)
    }
}

/// 矩形区间，两端均包含。单个单元格写作 `B2`，区间写作 `A1:C3`。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CellRange {
    top_left: CellId,
    bottom_right: CellId,
}

impl CellRange {
    /// 由任意两个角构造，内部归一化为左上/右下。
    pub fn new(a: CellId, b: CellId) -> Self {
        Self {
            top_left: CellId::new(a.row.min(b.row), a.column.min(b.column)),
            bottom_right: CellId::new(a.row.max(b.row), a.column.max(b.column)),
        }
    }

    pub fn single(cell: CellId) -> Self {
        Self::new(cell, cell)
    }

    pub fn top_left(&self) -> CellId {
        self.top_left
    }

    pub fn bottom_right(&self) -> CellId {
        self.bottom_right
    }

    pub fn rows(&self) -> usize {
        self.bottom_right.row - self.top_left.row + 1
    }

    pub fn columns(&self) -> usize {
        self.bottom_right.column - self.top_left.column + 1
    }

    /// 行优先遍历区间内的全部坐标。
    pub fn cells(&self) -> impl Iterator<Item = CellId> + use<> {
        let (r0, r1) = (self.top_left.row, self.bottom_right.row);
        let (c0, c1) = (self.top_left.column, self.bottom_right.column);
        (r0..=r1).flat_map(move |r| (c0..=c1).map(move |c| CellId::new(r, c)))
    }

    /// 从完整网格中截取该区间。
    pub fn extract(&self, grid: &Grid) -> Result<Grid, CellError> {
        let rows = grid.len();
        let columns = grid.first().map_or(0, Vec::len);
        if !self.bottom_right.fits(rows, columns) {
            return Err(CellError::OutOfBounds {
                range: self.to_string(),
                rows,
                columns,
            });
        }
        Ok(grid[self.top_left.row..=self.bottom_right.row]
            .iter()
            .map(|row| row[self.top_left.column..=self.bottom_right.column].to_vec())
            .collect())
    }
}

impl FromStr for CellRange {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |_| CellError::InvalidRange(s.to_owned());
        match s.split_once(':') {
            Some((a, b)) => Ok(CellRange::new(
                a.trim().parse().map_err(invalid)?,
                b.trim().parse().map_err(invalid)?,
            )),
            None => Ok(CellRange::single(s.trim().parse().map_err(invalid)?)),
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.top_left == self.bottom_right {
            write!(f, "{}", self.top_left)
        } else {
            write!(f, "{}:{}", self.top_left, self.bottom_right)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_column_letters_and_rows() {
        assert_eq!("A1".parse::<CellId>().unwrap(), CellId::new(0, 0));
        assert_eq!("b3".parse::<CellId>().unwrap(), CellId::new(2, 1));
        assert_eq!("AA10".parse::<CellId>().unwrap(), CellId::new(9, 26));
        assert_eq!(CellId::new(9, 26).to_string(), "AA10");
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in ["", "A", "1", "A0", "1A", "A1B", "Ä1"] {
            assert!(bad.parse::<CellId>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn range_is_normalized() {
        let range: CellRange = "C3:A1".parse().unwrap();
        assert_eq!(range.to_string(), "A1:C3");
        assert_eq!(range.rows(), 3);
        assert_eq!(range.columns(), 3);
    }

    #[test]
    fn extract_rejects_out_of_bounds() {
        let grid = vec![vec!["1".to_owned(), "2".to_owned()]];
        let range: CellRange = "A1:C1".parse().unwrap();
        assert!(matches!(
            range.extract(&grid),
            Err(CellError::OutOfBounds { .. })
        ));
    }

    proptest! {
        #[test]
        fn extract_matches_indexing(
            rows in 1usize..8,
            columns in 1usize..8,
            a in (0usize..8, 0usize..8),
            b in (0usize..8, 0usize..8),
        ) {
            let grid: Grid = (0..rows)
                .map(|r| (0..columns).map(|c| format!("{r}/{c}")).collect())
                .collect();
            let range = CellRange::new(CellId::new(a.0, a.1), CellId::new(b.0, b.1));
            match range.extract(&grid) {
                Ok(slice) => {
                    prop_assert_eq!(slice.len(), range.rows());
                    for (cell, value) in range.cells().zip(slice.iter().flatten()) {
                        prop_assert_eq!(value, &grid[cell.row()][cell.column()]);
                    }
                }
                Err(_) => prop_assert!(!range.bottom_right().fits(rows, columns)),
            }
        }
    }
}
