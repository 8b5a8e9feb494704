//! ChArUco board geometry.

use crate::Dictionary;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Static board description.
///
/// `cols`/`rows` are **square counts**. Lengths share one unit (usually
/// meters) and only their ratio matters to detection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    pub cols: u32,
    pub rows: u32,
    pub square_length: f32,
    pub marker_length: f32,
    pub dictionary: Dictionary,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BoardError {
    #[error("cols and rows must be >= 1, got {cols}x{rows}")]
    InvalidSize { cols: u32, rows: u32 },
    #[error("square_length must be finite and > 0")]
    InvalidSquareLength,
    #[error("marker_length must be finite, > 0 and no larger than the square")]
    InvalidMarkerLength,
    #[error("board needs {needed} markers, {dictionary} has {available}")]
    NotEnoughMarkers {
        dictionary: Dictionary,
        needed: usize,
        available: usize,
    },
}

/// Validated, immutable ChArUco board.
///
/// The top-left square is black; markers sit on the white squares and take
/// ids `0..marker_count()` in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct Board {
    spec: BoardSpec,
    marker_cells: Vec<[u32; 2]>,
}

/// Build a board from its parts.
pub fn make_board(
    cols: u32,
    rows: u32,
    dictionary: Dictionary,
    square_length: f32,
    marker_length: f32,
) -> Result<Board, BoardError> {
    Board::new(BoardSpec {
        cols,
        rows,
        square_length,
        marker_length,
        dictionary,
    })
}

impl Board {
    pub fn new(spec: BoardSpec) -> Result<Self, BoardError> {
        if spec.cols < 1 || spec.rows < 1 {
            return Err(BoardError::InvalidSize {
                cols: spec.cols,
                rows: spec.rows,
            });
        }
        if !spec.square_length.is_finite() || spec.square_length <= 0.0 {
            return Err(BoardError::InvalidSquareLength);
        }
        if !spec.marker_length.is_finite()
            || spec.marker_length <= 0.0
            || spec.marker_length > spec.square_length
        {
            return Err(BoardError::InvalidMarkerLength);
        }

        // Half the squares (rounded down) are white.
        let needed = u64::from(spec.cols) * u64::from(spec.rows) / 2;
        let available = spec.dictionary.marker_count();
        if needed > u64::from(available) {
            return Err(BoardError::NotEnoughMarkers {
                dictionary: spec.dictionary,
                needed: usize::try_from(needed).unwrap_or(usize::MAX),
                available: available as usize,
            });
        }

        let marker_cells: Vec<[u32; 2]> = (0..spec.rows)
            .flat_map(|j| (0..spec.cols).map(move |i| [i, j]))
            .filter(|[i, j]| (i + j) % 2 == 1)
            .collect();

        Ok(Self { spec, marker_cells })
    }

    #[inline]
    pub fn spec(&self) -> BoardSpec {
        self.spec
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.spec.cols
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.spec.rows
    }

    #[inline]
    pub fn dictionary(&self) -> Dictionary {
        self.spec.dictionary
    }

    #[inline]
    pub fn marker_count(&self) -> usize {
        self.marker_cells.len()
    }

    /// Square `(col, row)` holding marker `id`.
    pub fn marker_cell(&self, id: u32) -> Option<[u32; 2]> {
        self.marker_cells.get(id as usize).copied()
    }

    /// Number of inner chessboard corners, i.e. the largest possible
    /// interpolation response.
    pub fn inner_corner_count(&self) -> usize {
        ((self.spec.cols - 1) * (self.spec.rows - 1)) as usize
    }

    /// Interpolated corners a view must exceed to count as a board sighting:
    /// `floor(cols * rows / 2 * 0.8)`.
    pub fn min_response(&self) -> usize {
        ((self.spec.cols * self.spec.rows) as f64 / 2.0 * 0.8).floor() as usize
    }

    /// Physical board-plane position of an inner corner id.
    ///
    /// Origin is the board's top-left outer corner; ids run row-major over the
    /// `(cols - 1) × (rows - 1)` inner corners.
    pub fn corner_object_xy(&self, id: u32) -> Option<Point2<f32>> {
        let inner_cols = self.spec.cols.checked_sub(1)?;
        if id as usize >= self.inner_corner_count() || inner_cols == 0 {
            return None;
        }
        let i = (id % inner_cols) as f32 + 1.0;
        let j = (id / inner_cols) as f32 + 1.0;
        Some(Point2::new(
            i * self.spec.square_length,
            j * self.spec.square_length,
        ))
    }
}
