use ndarray::Array3;

pub const BOARD_SIZE: usize = 8;
pub const MOVE_COUNT: usize = BOARD_SIZE * BOARD_SIZE;
/// Side to move, then opponent.
pub const PLANES: usize = 2;

/// Row and column of a move index, row-major.
///
/// # Panics
///
/// If `idx` is not below `MOVE_COUNT`.
pub fn move_to_cell(idx: usize) -> (usize, usize) {
    assert!(idx < MOVE_COUNT);
    (idx / BOARD_SIZE, idx % BOARD_SIZE)
}

/// # Panics
///
/// If `row` or `col` is off the board.
pub fn cell_to_move((row, col): (usize, usize)) -> usize {
    assert!(row < BOARD_SIZE && col < BOARD_SIZE);
    row * BOARD_SIZE + col
}

/// Encodes a position given as occupancy lists for the side to move and its opponent.
///
/// # Panics
///
/// If a stone lies off the board.
pub fn encode_position(to_move: &[(usize, usize)], opponent: &[(usize, usize)]) -> Array3<f32> {
    let mut planes = Array3::zeros((PLANES, BOARD_SIZE, BOARD_SIZE));
    for (plane, stones) in [to_move, opponent].into_iter().enumerate() {
        for &(row, col) in stones {
            planes[[plane, row, col]] = 1.0;
        }
    }
    planes
}

/// Standard start position, black to move.
pub fn opening_position() -> Array3<f32> {
    encode_position(&[(3, 4), (4, 3)], &[(3, 3), (4, 4)])
}
