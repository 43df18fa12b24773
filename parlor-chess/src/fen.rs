//! Position strings: the six space-separated FEN fields.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::board::*;
use crate::rules;

pub const STARTING_POSITION: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FenError {
    #[error("expected 6 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid piece placement {0:?}")]
    Placement(String),
    #[error("invalid side to move {0:?}")]
    SideToMove(String),
    #[error("invalid castling rights {0:?}")]
    Castling(String),
    #[error("invalid en passant square {0:?}")]
    EnPassant(String),
    #[error("invalid move counter {0:?}")]
    Counter(String),
    #[error("each side needs exactly one king")]
    KingCount,
    #[error("pawn on a back rank")]
    PawnOnBackRank,
    #[error("side not to move is in check")]
    OpponentInCheck,
}

impl Board {
    pub fn to_position_string(&self) -> String {
        self.to_string()
    }

    pub fn from_position_string(s: &str) -> Result<Self, FenError> {
        s.parse()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.piece_at(Square::new(file, rank)) {
                    Some(piece) => {
                        if empty > 0 {
                            write!(f, "{}", empty)?;
                            empty = 0;
                        }
                        write!(f, "{}", piece.symbol())?;
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                write!(f, "{}", empty)?;
            }
            if rank > 0 {
                f.write_str("/")?;
            }
        }
        let side = match self.side_to_move {
            Color::White => 'w',
            Color::Black => 'b',
        };
        write!(f, " {} {} ", side, self.castling)?;
        match self.en_passant {
            Some(sq) => write!(f, "{}", sq)?,
            None => f.write_str("-")?,
        }
        write!(f, " {} {}", self.halfmove_clock, self.fullmove_number)
    }
}

impl FromStr for Board {
    type Err = FenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let &[placement, side, castling, en_passant, halfmove, fullmove] = fields.as_slice() else {
            return Err(FenError::FieldCount(fields.len()));
        };

        let mut board = Board::empty();
        parse_placement(&mut board, placement)?;

        board.side_to_move = match side {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(FenError::SideToMove(side.to_owned())),
        };
        board.castling = parse_castling(castling)?;
        board.en_passant = match en_passant {
            "-" => None,
            _ => {
                let sq: Square = en_passant
                    .parse()
                    .map_err(|_| FenError::EnPassant(en_passant.to_owned()))?;
                if !double_step_behind(&board, sq) {
                    return Err(FenError::EnPassant(en_passant.to_owned()));
                }
                Some(sq)
            }
        };
        board.halfmove_clock = halfmove
            .parse()
            .map_err(|_| FenError::Counter(halfmove.to_owned()))?;
        board.fullmove_number = match fullmove.parse() {
            Ok(n) if n > 0 => n,
            _ => return Err(FenError::Counter(fullmove.to_owned())),
        };

        validate(&board)?;
        Ok(board)
    }
}

/// An en passant target must sit on the square a double step just passed:
/// the enemy pawn beyond it, with the target and its start square empty.
fn double_step_behind(board: &Board, target: Square) -> bool {
    let us = board.side_to_move;
    let expected_rank = match us {
        Color::White => 5,
        Color::Black => 2,
    };
    if target.rank() != expected_rank || board.piece_at(target).is_some() {
        return false;
    }
    let dir = us.pawn_direction();
    let pawn = target.offset(0, -dir).and_then(|sq| board.piece_at(sq));
    let start_empty = target
        .offset(0, dir)
        .map_or(false, |sq| board.piece_at(sq).is_none());
    pawn == Some(Piece::new(!us, PieceKind::Pawn)) && start_empty
}

fn parse_placement(board: &mut Board, placement: &str) -> Result<(), FenError> {
    let err = || FenError::Placement(placement.to_owned());
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(err());
    }
    for (i, rank_text) in ranks.iter().enumerate() {
        let rank = 7 - i as u8;
        let mut file = 0u8;
        for c in rank_text.chars() {
            if let Some(skip) = c.to_digit(10) {
                if !(1..=8).contains(&skip) {
                    return Err(err());
                }
                file += skip as u8;
            } else {
                let piece = Piece::from_symbol(c).ok_or_else(err)?;
                if file >= 8 {
                    return Err(err());
                }
                board.put(Square::new(file, rank), Some(piece));
                file += 1;
            }
            if file > 8 {
                return Err(err());
            }
        }
        if file != 8 {
            return Err(err());
        }
    }
    Ok(())
}

fn parse_castling(text: &str) -> Result<CastlingRights, FenError> {
    let mut rights = CastlingRights::NONE;
    if text == "-" {
        return Ok(rights);
    }
    for c in text.chars() {
        let (color, side) = match c {
            'K' => (Color::White, CastleSide::King),
            'Q' => (Color::White, CastleSide::Queen),
            'k' => (Color::Black, CastleSide::King),
            'q' => (Color::Black, CastleSide::Queen),
            _ => return Err(FenError::Castling(text.to_owned())),
        };
        if rights.has(color, side) {
            return Err(FenError::Castling(text.to_owned()));
        }
        rights.set(color, side, true);
    }
    Ok(rights)
}

/// Legal-at-rest check: one king each, no back-rank pawns, the waiting side
/// not in check, and castling rights backed by king and rook on their homes.
fn validate(board: &Board) -> Result<(), FenError> {
    for color in Color::ALL {
        let kings = board
            .pieces()
            .filter(|&(_, p)| p == Piece::new(color, PieceKind::King))
            .count();
        if kings != 1 {
            return Err(FenError::KingCount);
        }
    }
    let pawn_on_back_rank = board
        .pieces()
        .any(|(sq, p)| p.kind == PieceKind::Pawn && (sq.rank() == 0 || sq.rank() == 7));
    if pawn_on_back_rank {
        return Err(FenError::PawnOnBackRank);
    }
    let waiting = !board.side_to_move;
    if let Some(king) = board.king_square(waiting) {
        if rules::is_square_attacked(board, king, board.side_to_move) {
            return Err(FenError::OpponentInCheck);
        }
    }
    for color in Color::ALL {
        let rank = color.back_rank();
        let king = Piece::new(color, PieceKind::King);
        let rook = Piece::new(color, PieceKind::Rook);
        let king_home = board.piece_at(Square::new(4, rank)) == Some(king);
        for (side, rook_file) in [(CastleSide::King, 7), (CastleSide::Queen, 0)] {
            let rook_home = board.piece_at(Square::new(rook_file, rank)) == Some(rook);
            if board.castling.has(color, side) && !(king_home && rook_home) {
                return Err(FenError::Castling(board.castling.to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_position_round_trips() {
        let board: Board = STARTING_POSITION.parse().expect("start position should parse");
        assert_eq!(board, Board::startpos());
        assert_eq!(board.to_position_string(), STARTING_POSITION);
    }

    #[test]
    fn arbitrary_position_round_trips() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let board = Board::from_position_string(fen).expect("kiwipete should parse");
        assert_eq!(board.to_position_string(), fen);

        let fen = "4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 12";
        let board = Board::from_position_string(fen).expect("en passant position should parse");
        assert_eq!(board.en_passant(), Some("d6".parse().expect("d6")));
        assert_eq!(board.to_position_string(), fen);
    }

    #[test]
    fn rejects_malformed_fields() {
        assert_eq!(
            Board::from_position_string("8/8/8/8/8/8/8/8 w - -"),
            Err(FenError::FieldCount(4))
        );
        assert!(matches!(
            Board::from_position_string("rnbqkbnr/pppppppp/9/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
            Err(FenError::Placement(_))
        ));
        assert!(matches!(
            Board::from_position_string("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1"),
            Err(FenError::SideToMove(_))
        ));
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq e4 0 1";
        assert!(matches!(Board::from_position_string(fen), Err(FenError::EnPassant(_))));
        assert!(matches!(
            Board::from_position_string("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 0"),
            Err(FenError::Counter(_))
        ));
    }

    #[test]
    fn en_passant_needs_a_pawn_that_just_passed() {
        for fen in [
            "4k3/8/8/4P3/8/8/8/4K3 w - d6 0 1",
            "4k3/3p4/8/3pP3/8/8/8/4K3 w - d6 0 1",
            "4k3/8/3n4/3pP3/8/8/8/4K3 w - d6 0 1",
            "4k3/8/8/8/3Pp3/8/8/4K3 b - c3 0 1",
        ] {
            assert_eq!(
                Board::from_position_string(fen),
                Err(FenError::EnPassant(fen.split(' ').nth(3).unwrap_or("-").to_owned())),
                "{}",
                fen
            );
        }

        let board = Board::from_position_string("4k3/8/8/8/3Pp3/8/8/4K3 b - d3 0 1")
            .expect("black en passant position should parse");
        assert_eq!(board.en_passant(), Some("d3".parse().expect("d3")));
    }

    #[test]
    fn rejects_illegal_positions() {
        assert_eq!(
            Board::from_position_string("8/8/8/8/8/8/8/4K3 w - - 0 1"),
            Err(FenError::KingCount)
        );
        assert_eq!(
            Board::from_position_string("P3k3/8/8/8/8/8/8/4K3 w - - 0 1"),
            Err(FenError::PawnOnBackRank)
        );
        assert_eq!(
            Board::from_position_string("4k3/8/8/8/8/8/8/4R2K w - - 0 1"),
            Err(FenError::OpponentInCheck)
        );
        assert!(matches!(
            Board::from_position_string("4k3/8/8/8/8/8/8/4K3 w K - 0 1"),
            Err(FenError::Castling(_))
        ));
    }
}
