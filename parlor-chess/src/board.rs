use std::fmt;
use std::ops::Not;
use std::str::FromStr;

use thiserror::Error;

/// A square index in `0..64`. File is `index % 8` (a = 0), rank is
/// `index / 8` with rank 0 being White's back rank ("1").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square(u8);

impl Square {
    pub const NUM: usize = 64;

    pub const A1: Square = Square(0);
    pub const C1: Square = Square(2);
    pub const D1: Square = Square(3);
    pub const E1: Square = Square(4);
    pub const F1: Square = Square(5);
    pub const G1: Square = Square(6);
    pub const H1: Square = Square(7);
    pub const A8: Square = Square(56);
    pub const C8: Square = Square(58);
    pub const D8: Square = Square(59);
    pub const E8: Square = Square(60);
    pub const F8: Square = Square(61);
    pub const G8: Square = Square(62);
    pub const H8: Square = Square(63);

    pub fn new(file: u8, rank: u8) -> Self {
        debug_assert!(file < 8 && rank < 8);
        Self(rank * 8 + file)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        (index < Self::NUM).then(|| Self(index as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn file(self) -> u8 {
        self.0 % 8
    }

    pub fn rank(self) -> u8 {
        self.0 / 8
    }

    pub fn file_char(self) -> char {
        (b'a' + self.file()) as char
    }

    pub fn rank_char(self) -> char {
        (b'1' + self.rank()) as char
    }

    pub fn offset(self, file_delta: i8, rank_delta: i8) -> Option<Self> {
        let file = self.file() as i8 + file_delta;
        let rank = self.rank() as i8 + rank_delta;
        if (0..8).contains(&file) && (0..8).contains(&rank) {
            Some(Self::new(file as u8, rank as u8))
        } else {
            None
        }
    }

    pub fn is_light(self) -> bool {
        (self.file() + self.rank()) % 2 == 1
    }

    pub fn all() -> impl Iterator<Item = Square> {
        (0..Self::NUM as u8).map(Square)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file_char(), self.rank_char())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid square {0:?}")]
pub struct InvalidSquare(pub String);

impl FromStr for Square {
    type Err = InvalidSquare;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes() {
            &[file @ b'a'..=b'h', rank @ b'1'..=b'8'] => Ok(Self::new(file - b'a', rank - b'1')),
            _ => Err(InvalidSquare(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub const NUM: usize = 2;
    pub const ALL: [Color; 2] = [Color::White, Color::Black];

    pub fn back_rank(self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 7,
        }
    }

    pub fn pawn_direction(self) -> i8 {
        match self {
            Color::White => 1,
            Color::Black => -1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Color::White => "White",
            Color::Black => "Black",
        }
    }
}

impl Not for Color {
    type Output = Color;

    fn not(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    pub const PROMOTIONS: [PieceKind; 4] = [
        PieceKind::Queen,
        PieceKind::Rook,
        PieceKind::Bishop,
        PieceKind::Knight,
    ];

    /// Lowercase letter as used by position strings and UCI moves.
    pub fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceKind::Pawn),
            'n' => Some(PieceKind::Knight),
            'b' => Some(PieceKind::Bishop),
            'r' => Some(PieceKind::Rook),
            'q' => Some(PieceKind::Queen),
            'k' => Some(PieceKind::King),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Piece {
    pub color: Color,
    pub kind: PieceKind,
}

impl Piece {
    pub fn new(color: Color, kind: PieceKind) -> Self {
        Self { color, kind }
    }

    /// Uppercase for White, lowercase for Black.
    pub fn symbol(self) -> char {
        let c = self.kind.letter();
        match self.color {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        let kind = PieceKind::from_letter(c)?;
        let color = if c.is_ascii_uppercase() { Color::White } else { Color::Black };
        Some(Self { color, kind })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastleSide {
    King,
    Queen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CastlingRights {
    rights: [[bool; 2]; Color::NUM],
}

impl CastlingRights {
    pub const ALL: CastlingRights = CastlingRights { rights: [[true; 2]; Color::NUM] };
    pub const NONE: CastlingRights = CastlingRights { rights: [[false; 2]; Color::NUM] };

    pub fn has(&self, color: Color, side: CastleSide) -> bool {
        self.rights[color as usize][side as usize]
    }

    pub fn set(&mut self, color: Color, side: CastleSide, allowed: bool) {
        self.rights[color as usize][side as usize] = allowed;
    }

    pub fn clear_color(&mut self, color: Color) {
        self.rights[color as usize] = [false; 2];
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    /// The rook square whose right is lost when that square is vacated or captured on.
    fn revoke_for_square(&mut self, sq: Square) {
        match sq {
            Square::A1 => self.set(Color::White, CastleSide::Queen, false),
            Square::H1 => self.set(Color::White, CastleSide::King, false),
            Square::A8 => self.set(Color::Black, CastleSide::Queen, false),
            Square::H8 => self.set(Color::Black, CastleSide::King, false),
            _ => {}
        }
    }
}

impl fmt::Display for CastlingRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        let flags = [
            (Color::White, CastleSide::King, 'K'),
            (Color::White, CastleSide::Queen, 'Q'),
            (Color::Black, CastleSide::King, 'k'),
            (Color::Black, CastleSide::Queen, 'q'),
        ];
        for (color, side, c) in flags {
            if self.has(color, side) {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

/// A move is only from, to, and an optional promotion. Castling is the king
/// moving two files; en passant is a pawn moving diagonally onto the
/// en-passant target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
}

impl Move {
    pub fn new(from: Square, to: Square, promotion: Option<PieceKind>) -> Self {
        Self { from, to, promotion }
    }
}

/// Long algebraic form, e.g. `e2e4`, `e7e8q`.
impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(promotion) = self.promotion {
            write!(f, "{}", promotion.letter())?;
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid move {0:?}")]
pub struct InvalidMove(pub String);

impl FromStr for Move {
    type Err = InvalidMove;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMove(s.to_owned());
        if !s.is_ascii() || !(4..=5).contains(&s.len()) {
            return Err(invalid());
        }
        let from = s[0..2].parse().map_err(|_| invalid())?;
        let to = s[2..4].parse().map_err(|_| invalid())?;
        let promotion = match s[4..].chars().next() {
            Some(c) => match PieceKind::from_letter(c) {
                Some(kind) if PieceKind::PROMOTIONS.contains(&kind) => Some(kind),
                _ => return Err(invalid()),
            },
            None => None,
        };
        Ok(Self { from, to, promotion })
    }
}

/// Everything needed to take a move back exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedMove {
    pub mv: Move,
    pub moved: Piece,
    /// The captured piece and the square it stood on (differs from `mv.to`
    /// for en passant).
    pub captured: Option<(Square, Piece)>,
    /// Rook displacement when the move castled.
    pub castle_rook: Option<(Square, Square)>,
    pub prev_castling: CastlingRights,
    pub prev_en_passant: Option<Square>,
    pub prev_halfmove_clock: u32,
    pub prev_fullmove_number: u32,
}

impl AppliedMove {
    pub fn is_capture(&self) -> bool {
        self.captured.is_some()
    }

    pub fn is_castle(&self) -> bool {
        self.castle_rook.is_some()
    }

    pub fn is_en_passant(&self) -> bool {
        matches!(self.captured, Some((sq, _)) if sq != self.mv.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Board {
    squares: [Option<Piece>; Square::NUM],
    pub(crate) side_to_move: Color,
    pub(crate) castling: CastlingRights,
    pub(crate) en_passant: Option<Square>,
    pub(crate) halfmove_clock: u32,
    pub(crate) fullmove_number: u32,
}

impl Default for Board {
    fn default() -> Self {
        Self::startpos()
    }
}

impl Board {
    pub(crate) fn empty() -> Self {
        Self {
            squares: [None; Square::NUM],
            side_to_move: Color::White,
            castling: CastlingRights::NONE,
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    pub fn startpos() -> Self {
        use PieceKind::*;

        const BACK_RANK: [PieceKind; 8] = [Rook, Knight, Bishop, Queen, King, Bishop, Knight, Rook];
        let mut board = Self::empty();
        for (file, &kind) in BACK_RANK.iter().enumerate() {
            let file = file as u8;
            board.put(Square::new(file, 0), Some(Piece::new(Color::White, kind)));
            board.put(Square::new(file, 1), Some(Piece::new(Color::White, Pawn)));
            board.put(Square::new(file, 6), Some(Piece::new(Color::Black, Pawn)));
            board.put(Square::new(file, 7), Some(Piece::new(Color::Black, kind)));
        }
        board.castling = CastlingRights::ALL;
        board
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.squares[sq.index()]
    }

    pub(crate) fn put(&mut self, sq: Square, piece: Option<Piece>) {
        self.squares[sq.index()] = piece;
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn castling_rights(&self) -> CastlingRights {
        self.castling
    }

    pub fn en_passant(&self) -> Option<Square> {
        self.en_passant
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::all().filter_map(move |sq| self.piece_at(sq).map(|p| (sq, p)))
    }

    pub fn king_square(&self, color: Color) -> Option<Square> {
        self.pieces()
            .find(|&(_, p)| p == Piece::new(color, PieceKind::King))
            .map(|(sq, _)| sq)
    }

    /// Applies `mv` in place. The move must be legal; nothing is checked here.
    pub fn apply(&mut self, mv: Move) -> AppliedMove {
        let moved = match self.piece_at(mv.from) {
            Some(piece) => piece,
            None => {
                debug_assert!(false, "apply from empty square {}", mv.from);
                Piece::new(self.side_to_move, PieceKind::Pawn)
            }
        };
        let mut record = AppliedMove {
            mv,
            moved,
            captured: None,
            castle_rook: None,
            prev_castling: self.castling,
            prev_en_passant: self.en_passant,
            prev_halfmove_clock: self.halfmove_clock,
            prev_fullmove_number: self.fullmove_number,
        };

        let is_pawn = moved.kind == PieceKind::Pawn;
        let file_distance = (mv.to.file() as i8 - mv.from.file() as i8).abs();

        if let Some(captured) = self.piece_at(mv.to) {
            record.captured = Some((mv.to, captured));
        } else if is_pawn && file_distance == 1 && Some(mv.to) == self.en_passant {
            let victim_sq = Square::new(mv.to.file(), mv.from.rank());
            if let Some(victim) = self.piece_at(victim_sq) {
                record.captured = Some((victim_sq, victim));
                self.put(victim_sq, None);
            }
        }

        if moved.kind == PieceKind::King && file_distance == 2 {
            let rank = mv.from.rank();
            let (rook_from, rook_to) = if mv.to.file() > mv.from.file() {
                (Square::new(7, rank), Square::new(5, rank))
            } else {
                (Square::new(0, rank), Square::new(3, rank))
            };
            let rook = self.piece_at(rook_from);
            self.put(rook_from, None);
            self.put(rook_to, rook);
            record.castle_rook = Some((rook_from, rook_to));
        }

        self.put(mv.from, None);
        let placed = match mv.promotion {
            Some(kind) if is_pawn => Piece::new(moved.color, kind),
            _ => moved,
        };
        self.put(mv.to, Some(placed));

        if moved.kind == PieceKind::King {
            self.castling.clear_color(moved.color);
        }
        self.castling.revoke_for_square(mv.from);
        self.castling.revoke_for_square(mv.to);

        let rank_distance = (mv.to.rank() as i8 - mv.from.rank() as i8).abs();
        self.en_passant = if is_pawn && rank_distance == 2 {
            Some(Square::new(mv.from.file(), (mv.from.rank() + mv.to.rank()) / 2))
        } else {
            None
        };

        if is_pawn || record.captured.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock = self.halfmove_clock.saturating_add(1);
        }
        if self.side_to_move == Color::Black {
            self.fullmove_number = self.fullmove_number.saturating_add(1);
        }
        self.side_to_move = !self.side_to_move;
        record
    }

    /// Exact inverse of [`Board::apply`] for the record it returned.
    pub fn undo(&mut self, record: &AppliedMove) {
        let mv = record.mv;
        self.put(mv.to, None);
        self.put(mv.from, Some(record.moved));
        if let Some((sq, piece)) = record.captured {
            self.put(sq, Some(piece));
        }
        if let Some((rook_from, rook_to)) = record.castle_rook {
            let rook = self.piece_at(rook_to);
            self.put(rook_to, None);
            self.put(rook_from, rook);
        }
        self.castling = record.prev_castling;
        self.en_passant = record.prev_en_passant;
        self.halfmove_clock = record.prev_halfmove_clock;
        self.fullmove_number = record.prev_fullmove_number;
        self.side_to_move = record.moved.color;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(s: &str) -> Move {
        s.parse().expect("move should parse")
    }

    #[test]
    fn square_coordinates() {
        let e4: Square = "e4".parse().expect("e4 should parse");
        assert_eq!(e4.index(), 28);
        assert_eq!((e4.file(), e4.rank()), (4, 3));
        assert_eq!(e4.to_string(), "e4");
        assert!("i1".parse::<Square>().is_err());
        assert!("a9".parse::<Square>().is_err());
        assert_eq!(Square::H8.offset(1, 0), None);
        assert_eq!(Square::A1.offset(1, 1), Some(Square::new(1, 1)));
    }

    #[test]
    fn move_text() {
        assert_eq!(mv("e7e8q").promotion, Some(PieceKind::Queen));
        assert_eq!(mv("e7e8q").to_string(), "e7e8q");
        assert!("e7e8k".parse::<Move>().is_err());
        assert!("e7".parse::<Move>().is_err());
    }

    #[test]
    fn castling_moves_the_rook_and_undoes() {
        let mut board = Board::startpos();
        for sq in [Square::F1, Square::G1] {
            board.put(sq, None);
        }
        let before = board.clone();
        let record = board.apply(mv("e1g1"));
        assert!(record.is_castle());
        assert_eq!(board.piece_at(Square::F1), Some(Piece::new(Color::White, PieceKind::Rook)));
        assert_eq!(board.piece_at(Square::H1), None);
        assert!(!board.castling_rights().has(Color::White, CastleSide::King));
        assert!(!board.castling_rights().has(Color::White, CastleSide::Queen));
        assert!(board.castling_rights().has(Color::Black, CastleSide::King));
        board.undo(&record);
        assert_eq!(board, before);
    }

    #[test]
    fn en_passant_removes_the_passed_pawn() {
        let mut board = Board::startpos();
        for m in ["e2e4", "a7a6", "e4e5", "d7d5"] {
            board.apply(mv(m));
        }
        assert_eq!(board.en_passant(), Some("d6".parse().expect("d6")));
        let before = board.clone();
        let record = board.apply(mv("e5d6"));
        assert!(record.is_en_passant());
        assert_eq!(board.piece_at("d5".parse().expect("d5")), None);
        board.undo(&record);
        assert_eq!(board, before);
    }

    #[test]
    fn counters_advance() {
        let mut board = Board::startpos();
        board.apply(mv("g1f3"));
        assert_eq!((board.halfmove_clock(), board.fullmove_number()), (1, 1));
        board.apply(mv("g8f6"));
        assert_eq!((board.halfmove_clock(), board.fullmove_number()), (2, 2));
        board.apply(mv("e2e4"));
        assert_eq!(board.halfmove_clock(), 0);
        assert_eq!(board.side_to_move(), Color::Black);
    }

    #[test]
    fn counters_saturate_at_the_maximum() {
        let mut board = Board::startpos();
        board.halfmove_clock = u32::MAX;
        board.fullmove_number = u32::MAX;
        board.apply(mv("g1f3"));
        let record = board.apply(mv("g8f6"));
        assert_eq!((board.halfmove_clock(), board.fullmove_number()), (u32::MAX, u32::MAX));
        board.undo(&record);
        assert_eq!(board.fullmove_number(), u32::MAX);
    }
}
