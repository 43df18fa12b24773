//! Standard algebraic notation.

use crate::board::*;
use crate::rules;

fn piece_letter(kind: PieceKind) -> char {
    kind.letter().to_ascii_uppercase()
}

/// Renders `mv` as SAN. `board` is the position *before* the move, and the
/// move is assumed legal there.
pub fn to_san(board: &Board, mv: Move) -> String {
    let mut san = san_without_suffix(board, mv);
    let mut after = board.clone();
    after.apply(mv);
    if rules::is_checkmate(&after) {
        san.push('#');
    } else if rules::is_check(&after) {
        san.push('+');
    }
    san
}

fn san_without_suffix(board: &Board, mv: Move) -> String {
    let piece = match board.piece_at(mv.from) {
        Some(piece) => piece,
        None => return mv.to_string(),
    };

    if piece.kind == PieceKind::King && (mv.to.file() as i8 - mv.from.file() as i8).abs() == 2 {
        return if mv.to.file() > mv.from.file() { "O-O" } else { "O-O-O" }.to_owned();
    }

    let is_capture = board.piece_at(mv.to).is_some()
        || (piece.kind == PieceKind::Pawn && mv.from.file() != mv.to.file());
    let mut san = String::new();

    if piece.kind == PieceKind::Pawn {
        if is_capture {
            san.push(mv.from.file_char());
        }
    } else {
        san.push(piece_letter(piece.kind));
        let rivals: Vec<Square> = rules::legal_moves(board)
            .into_iter()
            .filter(|other| {
                other.to == mv.to
                    && other.from != mv.from
                    && board.piece_at(other.from) == Some(piece)
            })
            .map(|other| other.from)
            .collect();
        if !rivals.is_empty() {
            let file_unique = rivals.iter().all(|sq| sq.file() != mv.from.file());
            let rank_unique = rivals.iter().all(|sq| sq.rank() != mv.from.rank());
            if file_unique {
                san.push(mv.from.file_char());
            } else if rank_unique {
                san.push(mv.from.rank_char());
            } else {
                san.push_str(&mv.from.to_string());
            }
        }
    }

    if is_capture {
        san.push('x');
    }
    san.push_str(&mv.to.to_string());
    if let Some(promotion) = mv.promotion {
        san.push('=');
        san.push(piece_letter(promotion));
    }
    san
}

/// Resolves a SAN token against the legal moves of `board`. Check markers,
/// annotation glyphs, and a missing `x` or `=` are tolerated; long algebraic
/// (`e2e4`) is accepted as a fallback.
pub fn parse_san(board: &Board, token: &str) -> Option<Move> {
    let text = token.trim_end_matches(|c| matches!(c, '+' | '#' | '!' | '?'));
    let legal = rules::legal_moves(board);

    if matches!(text, "O-O" | "0-0" | "O-O-O" | "0-0-0") {
        let king_side = text.len() == 3;
        let king = board.king_square(board.side_to_move())?;
        let file = if king_side { 6 } else { 2 };
        let target = Square::new(file, king.rank());
        return legal
            .into_iter()
            .find(|mv| mv.from == king && mv.to == target && king.file() == 4);
    }

    if let Ok(mv) = text.parse::<Move>() {
        if legal.contains(&mv) {
            return Some(mv);
        }
    }

    let mut chars: Vec<char> = text.chars().filter(|&c| c != 'x' && c != '=').collect();

    let promotion = match chars.last() {
        Some(&c) if c.is_ascii_uppercase() => {
            chars.pop();
            Some(PieceKind::from_letter(c)?)
        }
        _ => None,
    };

    if chars.len() < 2 {
        return None;
    }
    let target: String = chars.split_off(chars.len() - 2).into_iter().collect();
    let target: Square = target.parse().ok()?;

    let kind = match chars.first() {
        Some(&c) if c.is_ascii_uppercase() => {
            chars.remove(0);
            PieceKind::from_letter(c)?
        }
        _ => PieceKind::Pawn,
    };

    let mut from_file = None;
    let mut from_rank = None;
    for c in chars {
        match c {
            'a'..='h' => from_file = Some(c as u8 - b'a'),
            '1'..='8' => from_rank = Some(c as u8 - b'1'),
            _ => return None,
        }
    }

    let mut candidates = legal.into_iter().filter(|mv| {
        mv.to == target
            && mv.promotion == promotion
            && board.piece_at(mv.from).map(|p| p.kind) == Some(kind)
            && from_file.map_or(true, |f| mv.from.file() == f)
            && from_rank.map_or(true, |r| mv.from.rank() == r)
            && !(kind == PieceKind::King && (mv.to.file() as i8 - mv.from.file() as i8).abs() == 2)
    });
    let found = candidates.next()?;
    match candidates.next() {
        Some(_) => None,
        None => Some(found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(fen: &str) -> Board {
        fen.parse().expect("test position should parse")
    }

    fn mv(s: &str) -> Move {
        s.parse().expect("test move should parse")
    }

    #[test]
    fn renders_basic_moves() {
        let start = Board::startpos();
        assert_eq!(to_san(&start, mv("e2e4")), "e4");
        assert_eq!(to_san(&start, mv("g1f3")), "Nf3");
    }

    #[test]
    fn renders_captures_and_promotions() {
        let b = board("r3k3/1P6/8/8/8/8/8/4K3 w - - 0 1");
        assert_eq!(to_san(&b, mv("b7a8q")), "bxa8=Q+");
        assert_eq!(to_san(&b, mv("b7b8n")), "b8=N");
    }

    #[test]
    fn disambiguates_by_file_then_rank_then_square() {
        let b = board("4k3/8/8/8/8/8/8/R4R1K w - - 0 1");
        assert_eq!(to_san(&b, mv("a1d1")), "Rad1");

        let b = board("4k3/8/8/R7/8/8/8/R3K3 w - - 0 1");
        assert_eq!(to_san(&b, mv("a1a3")), "R1a3");

        let b = board("1k6/8/8/8/4Q2Q/8/8/K6Q w - - 0 1");
        assert_eq!(to_san(&b, mv("h4e1")), "Qh4e1");
    }

    #[test]
    fn renders_castling_and_mate() {
        let b = board("4k3/8/8/8/8/8/8/R3K2R w KQ - 0 1");
        assert_eq!(to_san(&b, mv("e1g1")), "O-O");
        assert_eq!(to_san(&b, mv("e1c1")), "O-O-O");

        let b = board("6k1/5ppp/8/8/8/8/8/R3K3 w - - 0 1");
        assert_eq!(to_san(&b, mv("a1a8")), "Ra8#");
    }

    #[test]
    fn parses_what_it_renders() {
        let b = board("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        for m in rules::legal_moves(&b) {
            let san = to_san(&b, m);
            assert_eq!(parse_san(&b, &san), Some(m), "{}", san);
        }
    }

    #[test]
    fn parses_loose_forms() {
        let start = Board::startpos();
        assert_eq!(parse_san(&start, "Ng1f3"), Some(mv("g1f3")));
        assert_eq!(parse_san(&start, "e2e4"), Some(mv("e2e4")));
        assert_eq!(parse_san(&start, "e4!?"), Some(mv("e2e4")));
        assert_eq!(parse_san(&start, "e5"), None);
        assert_eq!(parse_san(&start, "Qd4"), None);

        let b = board("4k3/8/8/8/8/8/8/R4R1K w - - 0 1");
        assert_eq!(parse_san(&b, "Rd1"), None);
        assert_eq!(parse_san(&b, "Rfd1"), Some(mv("f1d1")));

        let b = board("7k/P7/8/8/8/8/8/K7 w - - 0 1");
        assert_eq!(parse_san(&b, "a8Q"), Some(mv("a7a8q")));
        assert_eq!(parse_san(&b, "a8"), None);
    }
}
