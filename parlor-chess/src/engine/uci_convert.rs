use vampirc_uci::{
    UciFen, UciMessage, UciMove, UciPiece, UciSearchControl, UciSquare, UciTimeControl,
};

use crate::board::*;
use crate::game::GameSession;

use super::error::EngineError;
use super::limit::SearchLimit;

/// The start position and moves since, as sent to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPosition {
    pub init_pos: Board,
    pub moves: Vec<Move>,
}

impl SearchPosition {
    pub fn from_session(session: &GameSession) -> Self {
        Self {
            init_pos: session.init_pos().clone(),
            moves: session.moves().collect(),
        }
    }
}

fn square_to_uci(sq: Square) -> UciSquare {
    UciSquare::from(sq.file_char(), sq.rank() + 1)
}

fn square_from_uci(sq: &UciSquare) -> Option<Square> {
    let file = sq.file;
    if !('a'..='h').contains(&file) || !(1..=8).contains(&sq.rank) {
        return None;
    }
    Some(Square::new(file as u8 - b'a', sq.rank - 1))
}

fn piece_to_uci(kind: PieceKind) -> UciPiece {
    match kind {
        PieceKind::Pawn => UciPiece::Pawn,
        PieceKind::Knight => UciPiece::Knight,
        PieceKind::Bishop => UciPiece::Bishop,
        PieceKind::Rook => UciPiece::Rook,
        PieceKind::Queen => UciPiece::Queen,
        PieceKind::King => UciPiece::King,
    }
}

fn piece_from_uci(piece: &UciPiece) -> PieceKind {
    match piece {
        UciPiece::Pawn => PieceKind::Pawn,
        UciPiece::Knight => PieceKind::Knight,
        UciPiece::Bishop => PieceKind::Bishop,
        UciPiece::Rook => PieceKind::Rook,
        UciPiece::Queen => PieceKind::Queen,
        UciPiece::King => PieceKind::King,
    }
}

pub fn move_to_uci(mv: Move) -> UciMove {
    UciMove {
        from: square_to_uci(mv.from),
        to: square_to_uci(mv.to),
        promotion: mv.promotion.map(piece_to_uci),
    }
}

/// Castling arrives as the king's two-square step, which is already how a
/// [`Move`] spells it. Legality is left to the session.
pub fn move_from_uci(mv: &UciMove) -> Result<Move, EngineError> {
    let bad = || EngineError::Protocol(format!("bestmove {}", mv));
    let from = square_from_uci(&mv.from).ok_or_else(bad)?;
    let to = square_from_uci(&mv.to).ok_or_else(bad)?;
    let promotion = mv.promotion.as_ref().map(piece_from_uci);
    if matches!(promotion, Some(PieceKind::Pawn | PieceKind::King)) {
        return Err(bad());
    }
    Ok(Move::new(from, to, promotion))
}

pub fn position_message(position: &SearchPosition) -> UciMessage {
    UciMessage::Position {
        startpos: false,
        fen: Some(UciFen(position.init_pos.to_position_string())),
        moves: position.moves.iter().copied().map(move_to_uci).collect(),
    }
}

pub fn go_message(limit: &SearchLimit) -> UciMessage {
    let time_control = limit.move_time.map(|d| {
        let d = vampirc_uci::Duration::from_std(d)
            .unwrap_or_else(|_| vampirc_uci::Duration::max_value());
        UciTimeControl::MoveTime(d)
    });
    UciMessage::Go {
        time_control,
        search_control: Some(UciSearchControl {
            search_moves: Vec::new(),
            mate: None,
            depth: Some(limit.depth),
            nodes: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_message_lists_moves_in_long_algebraic() {
        let mut session = GameSession::default();
        for m in ["e2e4", "e7e5"] {
            let mv: Move = m.parse().expect("move");
            session.propose_move(mv.from, mv.to, None).expect("legal");
        }
        let message = position_message(&SearchPosition::from_session(&session)).to_string();
        assert!(message.starts_with(&format!("position fen {}", crate::fen::STARTING_POSITION)));
        assert!(message.trim_end().ends_with("moves e2e4 e7e5"));
    }

    #[test]
    fn bestmove_conversion() {
        let uci = UciMove {
            from: UciSquare::from('e', 7),
            to: UciSquare::from('e', 8),
            promotion: Some(UciPiece::Queen),
        };
        assert_eq!(move_from_uci(&uci).expect("valid"), "e7e8q".parse::<Move>().expect("move"));
        assert_eq!(move_to_uci("e1g1".parse().expect("move")).to_string(), "e1g1");

        let king_promotion = UciMove {
            promotion: Some(UciPiece::King),
            ..uci
        };
        assert!(matches!(move_from_uci(&king_promotion), Err(EngineError::Protocol(_))));
    }

    #[test]
    fn go_message_carries_depth_and_time() {
        let limit = SearchLimit { depth: 10, move_time: None };
        let message = go_message(&limit).to_string();
        assert!(message.starts_with("go"));
        assert!(message.contains("depth 10"));
        assert!(!message.contains("movetime"));

        let move_time = Some(std::time::Duration::from_millis(250));
        let limit = SearchLimit { depth: 3, move_time };
        assert!(go_message(&limit).to_string().contains("movetime 250"));
    }
}
