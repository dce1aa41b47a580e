//! Simulated tetromino host.
//!
//! A 20x10 board filled by a deterministic bot: pieces cycle through the
//! catalog and each one drops into the column where it lands lowest.
//! Full rows are cleared for 100 points per row.

use serde_json::json;
use warden_types::TrackedState;

/// Board height in rows.
pub const ROWS: usize = 20;

/// Board width in columns.
pub const COLS: usize = 10;

/// Points per cleared row.
pub const POINTS_PER_LINE: i64 = 100;

/// One tetromino as four `[row, col]` cell offsets.
pub type Piece = [[u8; 2]; 4];

/// The seven tetrominoes.
pub type Catalog = [Piece; 7];

/// T, Z, S, I, O, L, J.
pub const CATALOG: Catalog = [
    [[0, 0], [0, 1], [0, 2], [1, 1]],
    [[0, 0], [0, 1], [1, 1], [1, 2]],
    [[0, 1], [0, 2], [1, 0], [1, 1]],
    [[0, 0], [0, 1], [0, 2], [0, 3]],
    [[0, 0], [0, 1], [1, 0], [1, 1]],
    [[0, 0], [0, 1], [0, 2], [1, 0]],
    [[0, 0], [0, 1], [0, 2], [1, 2]],
];

/// Outcome of one placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Piece placed; `lines` rows became full.
    Placed { lines: usize },
    /// No column fits; the board was topped out.
    ToppedOut,
}

/// Host game state.
///
/// The catalog lives on the heap so its address stays fixed for the
/// memory guard.
#[derive(Debug)]
pub struct Game {
    board: [[u8; COLS]; ROWS],
    score: i64,
    lines: usize,
    pieces: usize,
    catalog: Box<Catalog>,
}

impl Game {
    /// Empty board with the standard catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            board: [[0; COLS]; ROWS],
            score: 0,
            lines: 0,
            pieces: 0,
            catalog: Box::new(CATALOG),
        }
    }

    /// The shape catalog; register this with the memory guard.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Current score.
    #[must_use]
    pub const fn score(&self) -> i64 {
        self.score
    }

    /// Total cleared rows.
    #[must_use]
    pub const fn lines(&self) -> usize {
        self.lines
    }

    /// State exposed to the monitor.
    #[must_use]
    pub fn tracked(&self) -> TrackedState {
        TrackedState::new()
            .with_field("board", json!(self.board))
            .with_field("score", self.score)
            .with_field("lines", self.lines)
            .with_field("shapes", json!(*self.catalog))
    }

    /// Same state with a forged score.
    #[must_use]
    pub fn tracked_with_score(&self, score: i64) -> TrackedState {
        self.tracked().with_field("score", score)
    }

    /// Drops the next piece. Rows are not cleared yet; call
    /// [`Game::clear_lines`] after the placement was reported.
    pub fn place_next(&mut self) -> Placement {
        let piece = self.catalog[self.pieces % self.catalog.len()];
        self.pieces += 1;

        let width = piece.iter().map(|[_, c]| usize::from(*c) + 1).max().unwrap_or(1);
        let best = (0..=COLS.saturating_sub(width))
            .filter_map(|col| self.landing_row(&piece, col).map(|row| (row, col)))
            .max_by_key(|&(row, col)| (row, std::cmp::Reverse(col)));

        let Some((row, col)) = best else {
            return Placement::ToppedOut;
        };
        for [r, c] in piece {
            self.board[row + usize::from(r)][col + usize::from(c)] = 1;
        }
        let lines = self.board.iter().filter(|line| line.iter().all(|&cell| cell != 0)).count();
        Placement::Placed { lines }
    }

    /// Removes full rows and scores them. Returns the number cleared.
    pub fn clear_lines(&mut self) -> usize {
        let kept: Vec<[u8; COLS]> = self
            .board
            .iter()
            .filter(|line| !line.iter().all(|&cell| cell != 0))
            .copied()
            .collect();
        let cleared = ROWS - kept.len();
        if cleared == 0 {
            return 0;
        }

        let mut board = [[0; COLS]; ROWS];
        board[cleared..].copy_from_slice(&kept);
        self.board = board;
        self.lines += cleared;
        self.score += POINTS_PER_LINE * cleared as i64;
        cleared
    }

    /// Clears the board after a top-out. Score and lines are kept.
    pub fn restart_board(&mut self) {
        self.board = [[0; COLS]; ROWS];
    }

    /// Rewrites one cell of the catalog in place.
    pub fn tamper_catalog(&mut self) {
        self.catalog[3][3] = [1, 0];
    }

    /// Lowest row the piece can rest at in `col`, dropping from the top.
    fn landing_row(&self, piece: &Piece, col: usize) -> Option<usize> {
        let height = piece.iter().map(|[r, _]| usize::from(*r) + 1).max().unwrap_or(1);
        let fits = |row: usize| {
            piece
                .iter()
                .all(|[r, c]| self.board[row + usize::from(*r)][col + usize::from(*c)] == 0)
        };

        let mut landed = None;
        for row in 0..=ROWS - height {
            if !fits(row) {
                break;
            }
            landed = Some(row);
        }
        landed
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}
