//! Rule engine: 3x3 board, marks, placement and win/draw predicates.

use std::fmt;

/// Board side length.
pub const SIZE: usize = 3;

/// Player mark. The acceptor plays `X` and moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    /// Wire symbol for this mark.
    pub fn symbol(self) -> char {
        match self {
            Mark::X => 'X',
            Mark::O => 'O',
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Marked(Mark),
}

/// Why a placement was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlaceError {
    #[error("position ({row}, {col}) is off the board")]
    OutOfRange { row: usize, col: usize },
    #[error("position ({row}, {col}) is already taken")]
    Occupied { row: usize, col: usize },
}

// Rows, columns, diagonals.
const LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Board {
    cells: [[Cell; SIZE]; SIZE],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell at (row, col), or None when off the board.
    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        self.cells.get(row)?.get(col).copied()
    }

    /// Place `mark` at (row, col). Succeeds only for an in-range, empty cell.
    pub fn place(&mut self, row: usize, col: usize, mark: Mark) -> Result<(), PlaceError> {
        let cell = self
            .cells
            .get_mut(row)
            .and_then(|r| r.get_mut(col))
            .ok_or(PlaceError::OutOfRange { row, col })?;
        if *cell != Cell::Empty {
            return Err(PlaceError::Occupied { row, col });
        }
        *cell = Cell::Marked(mark);
        Ok(())
    }

    /// True if `mark` holds a full row, column or diagonal.
    pub fn has_won(&self, mark: Mark) -> bool {
        LINES.iter().any(|line| {
            line.iter()
                .all(|&(r, c)| self.cells[r][c] == Cell::Marked(mark))
        })
    }

    /// No empty cell left. Check `has_won` first: a full board can still hold a line.
    pub fn is_full(&self) -> bool {
        self.cells.iter().flatten().all(|c| *c != Cell::Empty)
    }

    pub fn marks_placed(&self, mark: Mark) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|c| **c == Cell::Marked(mark))
            .count()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    1   2   3")?;
        writeln!(f, "  +---+---+---+")?;
        for row in 0..SIZE {
            write!(f, "{} |", row + 1)?;
            for col in 0..SIZE {
                let c = match self.get(row, col) {
                    Some(Cell::Marked(m)) => m.symbol(),
                    _ => ' ',
                };
                write!(f, " {} |", c)?;
            }
            writeln!(f)?;
            writeln!(f, "  +---+---+---+")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_on_empty_cell() {
        let mut b = Board::new();
        assert!(b.place(1, 2, Mark::X).is_ok());
        assert_eq!(b.get(1, 2), Some(Cell::Marked(Mark::X)));
    }

    #[test]
    fn place_rejects_repeat() {
        let mut b = Board::new();
        b.place(0, 0, Mark::X).unwrap();
        assert_eq!(
            b.place(0, 0, Mark::X),
            Err(PlaceError::Occupied { row: 0, col: 0 })
        );
        assert_eq!(
            b.place(0, 0, Mark::O),
            Err(PlaceError::Occupied { row: 0, col: 0 })
        );
        assert_eq!(b.marks_placed(Mark::O), 0);
    }

    #[test]
    fn place_rejects_out_of_range() {
        let mut b = Board::new();
        for (r, c) in [(3, 0), (0, 3), (9, 9)] {
            assert_eq!(
                b.place(r, c, Mark::O),
                Err(PlaceError::OutOfRange { row: r, col: c })
            );
        }
        assert_eq!(b, Board::new());
    }

    #[test]
    fn every_in_range_cell_accepts_exactly_once() {
        let mut b = Board::new();
        for r in 0..SIZE {
            for c in 0..SIZE {
                assert!(b.place(r, c, Mark::X).is_ok());
                assert!(b.place(r, c, Mark::O).is_err());
            }
        }
        assert!(b.is_full());
    }

    #[test]
    fn detects_row_column_and_diagonals() {
        for line in LINES {
            let mut b = Board::new();
            for (r, c) in line {
                b.place(r, c, Mark::O).unwrap();
            }
            assert!(b.has_won(Mark::O));
            assert!(!b.has_won(Mark::X));
        }
    }

    #[test]
    fn full_board_without_line() {
        let mut b = Board::new();
        let moves = [
            (0, 0, Mark::X),
            (0, 1, Mark::O),
            (0, 2, Mark::X),
            (1, 1, Mark::O),
            (1, 0, Mark::X),
            (1, 2, Mark::O),
            (2, 1, Mark::X),
            (2, 0, Mark::O),
            (2, 2, Mark::X),
        ];
        for (r, c, m) in moves {
            b.place(r, c, m).unwrap();
        }
        assert!(b.is_full());
        assert!(!b.has_won(Mark::X));
        assert!(!b.has_won(Mark::O));
    }

    #[test]
    fn renders_marks() {
        let mut b = Board::new();
        b.place(0, 0, Mark::X).unwrap();
        b.place(2, 1, Mark::O).unwrap();
        let text = b.to_string();
        assert!(text.contains("1 | X |   |   |"));
        assert!(text.contains("3 |   | O |   |"));
    }
}
