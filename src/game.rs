use std::fmt;
use std::ops::Not;

//
// ROLES
//

/// The mark a player places.  X is the first player to join and moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    X,
    O,
}

impl Role {
    pub fn from_field(field: &str) -> Option<Self> {
        match field {
            "X" => Some(Self::X),
            "O" => Some(Self::O),
            _   => None,
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            Self::X => "X",
            Self::O => "O",
        }
    }

    fn mark(&self) -> char {
        match self {
            Self::X => 'X',
            Self::O => 'O',
        }
    }
}

impl Not for Role {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

//
// CELLS
//

/// A board square named `r,c` with r, c ∈ {1, 2, 3}, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    row: u8,
    col: u8,
}

impl Cell {
    /// Accepts exactly three bytes `d,d` with both digits in 1..=3.
    pub fn parse(field: &str) -> Option<Self> {
        let digit = |b: u8| (b'1'..=b'3').contains(&b).then(|| b - b'0');
        match field.as_bytes() {
            [r, b',', c] => Some(Self { row: digit(*r)?, col: digit(*c)? }),
            _ => None,
        }
    }

    fn index(&self) -> usize {
        usize::from(self.row - 1) * 3 + usize::from(self.col - 1)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.row, self.col)
    }
}

//
// BOARD (authoritative 3×3 grid)
//

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Board {
    cells: [Option<Role>; 9],
}

impl Board {
    fn place(&mut self, cell: Cell, role: Role) -> Result<(), &'static str> {
        let slot = &mut self.cells[cell.index()];
        if slot.is_some() {
            return Err("Space occupied.");
        }
        *slot = Some(role);
        Ok(())
    }

    fn winning_role(&self) -> Option<Role> {
        LINES.iter().find_map(|line| {
            let first = self.cells[line[0]]?;
            line[1..]
                .iter()
                .all(|&i| self.cells[i] == Some(first))
                .then_some(first)
        })
    }

    fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Nine characters, row-major, `.` for empty.
    pub fn encode(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.map_or('.', |role| role.mark()))
            .collect()
    }
}

//
// GAME
//

/// One side of a game: the owning session and its display name.
#[derive(Debug, Clone)]
pub struct Seat {
    pub session: u64,
    pub name: String,
}

/// What a MOVE did once the rules ran.
#[derive(Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The mark was placed; `board` is the post-move encoding.
    Placed {
        cell: Cell,
        board: String,
        terminal: Option<Terminal>,
    },
    /// Rejected without changing state; the reason goes back as INVL.
    Rejected(&'static str),
    /// The cell field is not `d,d` — fatal for the sender's session.
    Malformed,
}

/// A condition that ends the game on the spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Won(Role),
    Filled,
}

/// A paired game: two seats, the grid, whose turn it is, and whether a draw
/// offer is pending.  All methods are pure state transitions; the lobby owns
/// the Game, serializes access, and does the talking to sockets.
///
/// `turn` never moves while a draw offer is outstanding: the offer field
/// itself gates MOVE and RSGN from both sides until it is answered.
#[derive(Debug)]
pub struct Game {
    id: u64,
    seats: [Seat; 2],
    board: Board,
    turn: Role,
    draw_offer: Option<Role>,
}

impl Game {
    pub fn new(id: u64, x: Seat, o: Seat) -> Self {
        Self {
            id,
            seats: [x, o],
            board: Board::default(),
            turn: Role::X,
            draw_offer: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn seat(&self, role: Role) -> &Seat {
        &self.seats[seat_index(role)]
    }

    /// The role a session plays in this game, if it is one of the two.
    pub fn role_of(&self, session: u64) -> Option<Role> {
        if self.seats[0].session == session {
            Some(Role::X)
        } else if self.seats[1].session == session {
            Some(Role::O)
        } else {
            None
        }
    }

    /// MOVE, rules applied in order: pending draw offer, claimed role,
    /// turn, cell grammar, occupancy.
    pub fn apply_move(&mut self, sender: Role, role: &str, cell: &str) -> MoveOutcome {
        if self.draw_offer.is_some() {
            return MoveOutcome::Rejected("Draw was called");
        }
        if role != sender.field() {
            return MoveOutcome::Rejected("Wrong role used");
        }
        if self.turn != sender {
            return MoveOutcome::Rejected("Wait your turn!");
        }
        let Some(cell) = Cell::parse(cell) else {
            return MoveOutcome::Malformed;
        };
        if let Err(reason) = self.board.place(cell, sender) {
            return MoveOutcome::Rejected(reason);
        }

        let terminal = if self.board.winning_role() == Some(sender) {
            Some(Terminal::Won(sender))
        } else if self.board.is_full() {
            Some(Terminal::Filled)
        } else {
            self.turn = !self.turn;
            None
        };
        MoveOutcome::Placed { cell, board: self.board.encode(), terminal }
    }

    /// RSGN is always legal while no draw offer is pending.
    pub fn resign(&self, _sender: Role) -> Result<(), &'static str> {
        if self.draw_offer.is_some() {
            return Err("Draw was called");
        }
        Ok(())
    }

    /// DRAW S: only on the proposer's turn, only one offer at a time.
    pub fn offer_draw(&mut self, sender: Role) -> Result<(), &'static str> {
        if self.draw_offer.is_some() {
            return Err("Draw already called");
        }
        if self.turn != sender {
            return Err("Wait your turn!");
        }
        self.draw_offer = Some(sender);
        Ok(())
    }

    /// DRAW A / DRAW R: only from the non-proposer while an offer is
    /// outstanding.  Returns the proposer's role; on reject the offer is
    /// cleared and play resumes with the turn where it was.
    pub fn answer_draw(&mut self, sender: Role, accept: bool) -> Result<Role, &'static str> {
        match self.draw_offer {
            None => Err("Draw not called"),
            Some(proposer) if proposer == sender => Err("Draw already called"),
            Some(proposer) => {
                if !accept {
                    self.draw_offer = None;
                }
                Ok(proposer)
            }
        }
    }
}

fn seat_index(role: Role) -> usize {
    match role {
        Role::X => 0,
        Role::O => 1,
    }
}

//
// TESTS
//

#[cfg(test)]
mod tests {
    use super::*;

    fn game() -> Game {
        Game::new(
            1,
            Seat { session: 10, name: "Alice".into() },
            Seat { session: 20, name: "Bob".into() },
        )
    }

    fn placed(outcome: MoveOutcome) -> (String, Option<Terminal>) {
        match outcome {
            MoveOutcome::Placed { board, terminal, .. } => (board, terminal),
            other => panic!("expected Placed, got {other:?}"),
        }
    }

    #[test]
    fn cell_grammar() {
        assert_eq!(Cell::parse("1,1"), Some(Cell { row: 1, col: 1 }));
        assert_eq!(Cell::parse("3,3"), Some(Cell { row: 3, col: 3 }));
        assert_eq!(Cell::parse("0,2"), None);
        assert_eq!(Cell::parse("2,4"), None);
        assert_eq!(Cell::parse("22"), None);
        assert_eq!(Cell::parse("2,2,"), None);
        assert_eq!(Cell::parse("2 2"), None);
    }

    #[test]
    fn first_move_goes_to_x() {
        let mut g = game();
        assert_eq!(
            g.apply_move(Role::O, "O", "1,1"),
            MoveOutcome::Rejected("Wait your turn!")
        );
        let (board, terminal) = placed(g.apply_move(Role::X, "X", "1,1"));
        assert_eq!(board, "X........");
        assert_eq!(terminal, None);
    }

    #[test]
    fn claimed_role_must_match_seat() {
        let mut g = game();
        assert_eq!(
            g.apply_move(Role::X, "O", "1,1"),
            MoveOutcome::Rejected("Wrong role used")
        );
        // Garbage in the role field is still a role mismatch, not framing.
        assert_eq!(
            g.apply_move(Role::X, "Q", "1,1"),
            MoveOutcome::Rejected("Wrong role used")
        );
    }

    #[test]
    fn bad_cell_is_malformed() {
        let mut g = game();
        assert_eq!(g.apply_move(Role::X, "X", "0,1"), MoveOutcome::Malformed);
        assert_eq!(g.apply_move(Role::X, "X", "1,4"), MoveOutcome::Malformed);
        assert_eq!(g.apply_move(Role::X, "X", "11"), MoveOutcome::Malformed);
    }

    #[test]
    fn occupied_cell_is_rejected_and_turn_stays() {
        let mut g = game();
        placed(g.apply_move(Role::X, "X", "2,2"));
        assert_eq!(
            g.apply_move(Role::O, "O", "2,2"),
            MoveOutcome::Rejected("Space occupied.")
        );
        // O is still on turn after the rejection.
        let (board, _) = placed(g.apply_move(Role::O, "O", "1,1"));
        assert_eq!(board, "O...X....");
    }

    #[test]
    fn row_win_ends_the_game() {
        let mut g = game();
        for (role, cell) in [
            (Role::X, "1,1"),
            (Role::O, "2,1"),
            (Role::X, "1,2"),
            (Role::O, "2,2"),
        ] {
            assert_eq!(placed(g.apply_move(role, role.field(), cell)).1, None);
        }
        let (board, terminal) = placed(g.apply_move(Role::X, "X", "1,3"));
        assert_eq!(board, "XXXOO....");
        assert_eq!(terminal, Some(Terminal::Won(Role::X)));
    }

    #[test]
    fn column_and_diagonal_wins_detected() {
        let mut col = Board::default();
        for i in [0, 3, 6] {
            col.cells[i] = Some(Role::O);
        }
        assert_eq!(col.winning_role(), Some(Role::O));

        let mut diag = Board::default();
        for i in [2, 4, 6] {
            diag.cells[i] = Some(Role::X);
        }
        assert_eq!(diag.winning_role(), Some(Role::X));
    }

    #[test]
    fn full_board_without_winner_is_filled() {
        let mut g = game();
        // X X O / O O X / X O X — no line, board full on the ninth move.
        let script = [
            (Role::X, "1,1"),
            (Role::O, "1,3"),
            (Role::X, "1,2"),
            (Role::O, "2,1"),
            (Role::X, "2,3"),
            (Role::O, "2,2"),
            (Role::X, "3,1"),
            (Role::O, "3,2"),
        ];
        for (role, cell) in script {
            assert_eq!(placed(g.apply_move(role, role.field(), cell)).1, None);
        }
        let (board, terminal) = placed(g.apply_move(Role::X, "X", "3,3"));
        assert_eq!(board, "XXOOOXXOX");
        assert_eq!(terminal, Some(Terminal::Filled));
    }

    #[test]
    fn mark_counts_stay_balanced() {
        let mut g = game();
        let script = [(Role::X, "1,1"), (Role::O, "2,2"), (Role::X, "3,3")];
        for (role, cell) in script {
            placed(g.apply_move(role, role.field(), cell));
            let xs = g.board.cells.iter().filter(|c| **c == Some(Role::X)).count();
            let os = g.board.cells.iter().filter(|c| **c == Some(Role::O)).count();
            assert!(xs == os || xs == os + 1);
        }
    }

    #[test]
    fn draw_offer_only_on_own_turn() {
        let mut g = game();
        assert_eq!(g.offer_draw(Role::O), Err("Wait your turn!"));
        assert_eq!(g.offer_draw(Role::X), Ok(()));
        assert_eq!(g.offer_draw(Role::X), Err("Draw already called"));
    }

    #[test]
    fn pending_offer_blocks_move_and_resign() {
        let mut g = game();
        g.offer_draw(Role::X).unwrap();
        assert_eq!(
            g.apply_move(Role::X, "X", "1,1"),
            MoveOutcome::Rejected("Draw was called")
        );
        assert_eq!(
            g.apply_move(Role::O, "O", "1,1"),
            MoveOutcome::Rejected("Draw was called")
        );
        assert_eq!(g.resign(Role::X), Err("Draw was called"));
        assert_eq!(g.resign(Role::O), Err("Draw was called"));
    }

    #[test]
    fn rejecting_a_draw_resumes_play_with_turn_intact() {
        let mut g = game();
        g.offer_draw(Role::X).unwrap();
        assert_eq!(g.answer_draw(Role::O, false), Ok(Role::X));
        assert_eq!(g.draw_offer, None);
        // The proposer is still on turn and may now move.
        let (board, _) = placed(g.apply_move(Role::X, "X", "1,1"));
        assert_eq!(board, "X........");
    }

    #[test]
    fn answering_requires_an_offer_from_the_other_side() {
        let mut g = game();
        assert_eq!(g.answer_draw(Role::O, true), Err("Draw not called"));
        g.offer_draw(Role::X).unwrap();
        assert_eq!(g.answer_draw(Role::X, true), Err("Draw already called"));
        assert_eq!(g.answer_draw(Role::O, true), Ok(Role::X));
    }

    #[test]
    fn resign_is_legal_any_time_without_offer() {
        let mut g = game();
        assert_eq!(g.resign(Role::O), Ok(()));
        placed(g.apply_move(Role::X, "X", "1,1"));
        assert_eq!(g.resign(Role::X), Ok(()));
    }

    #[test]
    fn role_lookup_by_session() {
        let g = game();
        assert_eq!(g.role_of(10), Some(Role::X));
        assert_eq!(g.role_of(20), Some(Role::O));
        assert_eq!(g.role_of(30), None);
    }

    #[test]
    fn board_encoding_uses_dots() {
        assert_eq!(Board::default().encode(), ".........");
    }
}
