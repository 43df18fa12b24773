//! Move generation and game-termination predicates. Everything here is a pure
//! function over a borrowed [`Board`].

use crate::board::*;

#[rustfmt::skip]
const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (1, 2), (2, 1), (2, -1), (1, -2),
    (-1, -2), (-2, -1), (-2, 1), (-1, 2),
];
#[rustfmt::skip]
const KING_OFFSETS: [(i8, i8); 8] = [
    (0, 1), (1, 1), (1, 0), (1, -1),
    (0, -1), (-1, -1), (-1, 0), (-1, 1),
];
const ORTHOGONALS: [(i8, i8); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];
const DIAGONALS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, -1), (-1, 1)];

fn slider_directions(kind: PieceKind) -> &'static [(i8, i8)] {
    #[rustfmt::skip]
    const QUEEN: [(i8, i8); 8] = [
        (0, 1), (1, 0), (0, -1), (-1, 0),
        (1, 1), (1, -1), (-1, -1), (-1, 1),
    ];
    match kind {
        PieceKind::Bishop => &DIAGONALS,
        PieceKind::Rook => &ORTHOGONALS,
        PieceKind::Queen => &QUEEN,
        _ => &[],
    }
}

fn first_piece_along(
    board: &Board,
    from: Square,
    (df, dr): (i8, i8),
) -> Option<(Square, Piece)> {
    let mut sq = from;
    while let Some(next) = sq.offset(df, dr) {
        if let Some(piece) = board.piece_at(next) {
            return Some((next, piece));
        }
        sq = next;
    }
    None
}

/// True iff any piece of `by` attacks `target`. Pinned attackers still count.
pub fn is_square_attacked(board: &Board, target: Square, by: Color) -> bool {
    let is = |sq: Option<Square>, kind: PieceKind| {
        sq.and_then(|sq| board.piece_at(sq)) == Some(Piece::new(by, kind))
    };

    let pawn_rank = -by.pawn_direction();
    let pawn = PieceKind::Pawn;
    if is(target.offset(-1, pawn_rank), pawn) || is(target.offset(1, pawn_rank), pawn) {
        return true;
    }
    if KNIGHT_OFFSETS.iter().any(|&(df, dr)| is(target.offset(df, dr), PieceKind::Knight)) {
        return true;
    }
    if KING_OFFSETS.iter().any(|&(df, dr)| is(target.offset(df, dr), PieceKind::King)) {
        return true;
    }
    let slides = |dirs: &[(i8, i8)], kind: PieceKind| {
        dirs.iter().any(|&dir| {
            matches!(
                first_piece_along(board, target, dir),
                Some((_, p)) if p.color == by && (p.kind == kind || p.kind == PieceKind::Queen)
            )
        })
    };
    slides(&ORTHOGONALS, PieceKind::Rook) || slides(&DIAGONALS, PieceKind::Bishop)
}

pub fn is_check(board: &Board) -> bool {
    let stm = board.side_to_move();
    match board.king_square(stm) {
        Some(king) => is_square_attacked(board, king, !stm),
        None => false,
    }
}

fn push_pawn_moves(board: &Board, from: Square, color: Color, moves: &mut Vec<Move>) {
    let dir = color.pawn_direction();
    let last_rank = (!color).back_rank();
    let mut push = |to: Square| {
        if to.rank() == last_rank {
            for kind in PieceKind::PROMOTIONS {
                moves.push(Move::new(from, to, Some(kind)));
            }
        } else {
            moves.push(Move::new(from, to, None));
        }
    };

    if let Some(one) = from.offset(0, dir) {
        if board.piece_at(one).is_none() {
            push(one);
            let start_rank = match color {
                Color::White => 1,
                Color::Black => 6,
            };
            if from.rank() == start_rank {
                if let Some(two) = one.offset(0, dir) {
                    if board.piece_at(two).is_none() {
                        push(two);
                    }
                }
            }
        }
    }
    for df in [-1, 1] {
        if let Some(to) = from.offset(df, dir) {
            let enemy = matches!(board.piece_at(to), Some(p) if p.color != color);
            if enemy || Some(to) == board.en_passant() {
                push(to);
            }
        }
    }
}

fn push_castles(board: &Board, king: Square, color: Color, moves: &mut Vec<Move>) {
    let rank = color.back_rank();
    if king != Square::new(4, rank) || is_square_attacked(board, king, !color) {
        return;
    }
    let rights = board.castling_rights();
    let on_rank = |file: u8| Square::new(file, rank);
    let empty = |files: &[u8]| files.iter().all(|&f| board.piece_at(on_rank(f)).is_none());
    let safe = |files: &[u8]| {
        files
            .iter()
            .all(|&f| !is_square_attacked(board, on_rank(f), !color))
    };
    let rook = Piece::new(color, PieceKind::Rook);
    let rook_home = |file: u8| board.piece_at(on_rank(file)) == Some(rook);

    if rights.has(color, CastleSide::King) && rook_home(7) && empty(&[5, 6]) && safe(&[5, 6]) {
        moves.push(Move::new(king, Square::new(6, rank), None));
    }
    if rights.has(color, CastleSide::Queen) && rook_home(0) && empty(&[1, 2, 3]) && safe(&[2, 3]) {
        moves.push(Move::new(king, Square::new(2, rank), None));
    }
}

fn push_steps(board: &Board, from: Square, offsets: &[(i8, i8)], moves: &mut Vec<Move>) {
    let stm = board.side_to_move();
    for &(df, dr) in offsets {
        match from.offset(df, dr) {
            Some(to) if board.piece_at(to).map_or(true, |p| p.color != stm) => {
                moves.push(Move::new(from, to, None));
            }
            _ => {}
        }
    }
}

/// Moves that obey piece movement but may leave the mover's king in check.
pub fn pseudo_legal_moves(board: &Board) -> Vec<Move> {
    let stm = board.side_to_move();
    let mut moves = Vec::with_capacity(64);
    for (from, piece) in board.pieces().filter(|(_, p)| p.color == stm) {
        match piece.kind {
            PieceKind::Pawn => push_pawn_moves(board, from, stm, &mut moves),
            PieceKind::Knight => push_steps(board, from, &KNIGHT_OFFSETS, &mut moves),
            PieceKind::King => {
                push_steps(board, from, &KING_OFFSETS, &mut moves);
                push_castles(board, from, stm, &mut moves);
            }
            PieceKind::Bishop | PieceKind::Rook | PieceKind::Queen => {
                for &(df, dr) in slider_directions(piece.kind) {
                    let mut sq = from;
                    while let Some(to) = sq.offset(df, dr) {
                        match board.piece_at(to) {
                            None => moves.push(Move::new(from, to, None)),
                            Some(p) => {
                                if p.color != stm {
                                    moves.push(Move::new(from, to, None));
                                }
                                break;
                            }
                        }
                        sq = to;
                    }
                }
            }
        }
    }
    moves
}

/// All legal moves for the side to move. Each candidate is applied to a
/// scratch board and kept only if the mover's king is safe afterwards.
pub fn legal_moves(board: &Board) -> Vec<Move> {
    let stm = board.side_to_move();
    let mut scratch = board.clone();
    pseudo_legal_moves(board)
        .into_iter()
        .filter(|&mv| {
            let record = scratch.apply(mv);
            let safe = match scratch.king_square(stm) {
                Some(king) => !is_square_attacked(&scratch, king, !stm),
                None => true,
            };
            scratch.undo(&record);
            safe
        })
        .collect()
}

pub fn legal_moves_from(board: &Board, from: Square) -> Vec<Move> {
    legal_moves(board).into_iter().filter(|mv| mv.from == from).collect()
}

pub fn is_legal(board: &Board, mv: Move) -> bool {
    legal_moves(board).contains(&mv)
}

pub fn has_legal_moves(board: &Board) -> bool {
    !legal_moves(board).is_empty()
}

pub fn is_checkmate(board: &Board) -> bool {
    is_check(board) && !has_legal_moves(board)
}

pub fn is_stalemate(board: &Board) -> bool {
    !is_check(board) && !has_legal_moves(board)
}

/// Neither side can ever deliver mate: bare kings, a single minor piece, or
/// only bishops that all stand on one square colour.
pub fn is_insufficient_material(board: &Board) -> bool {
    let mut knights = 0;
    let mut bishops_on_light = 0;
    let mut bishops_on_dark = 0;
    for (sq, piece) in board.pieces() {
        match piece.kind {
            PieceKind::King => {}
            PieceKind::Pawn | PieceKind::Rook | PieceKind::Queen => return false,
            PieceKind::Knight => knights += 1,
            PieceKind::Bishop if sq.is_light() => bishops_on_light += 1,
            PieceKind::Bishop => bishops_on_dark += 1,
        }
    }
    let bishops = bishops_on_light + bishops_on_dark;
    match (knights, bishops) {
        (0, 0) | (1, 0) => true,
        (0, _) => bishops_on_light == 0 || bishops_on_dark == 0,
        _ => false,
    }
}

pub fn is_seventyfive_move_rule(board: &Board) -> bool {
    board.halfmove_clock() >= 150
}

/// The en-passant target only matters for repetition when a capture onto it
/// is actually possible.
pub fn capturable_en_passant(board: &Board) -> Option<Square> {
    let ep = board.en_passant()?;
    legal_moves(board)
        .into_iter()
        .any(|mv| {
            mv.to == ep
                && mv.from.file() != mv.to.file()
                && board.piece_at(mv.from).map(|p| p.kind) == Some(PieceKind::Pawn)
        })
        .then(|| ep)
}

pub fn perft(board: &Board, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let moves = legal_moves(board);
    if depth == 1 {
        return moves.len() as u64;
    }
    let mut child = board.clone();
    moves
        .into_iter()
        .map(|mv| {
            let record = child.apply(mv);
            let nodes = perft(&child, depth - 1);
            child.undo(&record);
            nodes
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(fen: &str) -> Board {
        fen.parse().expect("test position should parse")
    }

    fn sq(s: &str) -> Square {
        s.parse().expect("test square should parse")
    }

    #[test]
    fn twenty_moves_from_the_start() {
        let start = Board::startpos();
        assert_eq!(legal_moves(&start).len(), 20);
        let mut after_e4 = start.clone();
        after_e4.apply("e2e4".parse().expect("e2e4"));
        assert_eq!(legal_moves(&after_e4).len(), 20);
    }

    #[test]
    fn perft_start_position() {
        let start = Board::startpos();
        assert_eq!(perft(&start, 1), 20);
        assert_eq!(perft(&start, 2), 400);
        assert_eq!(perft(&start, 3), 8902);
    }

    #[test]
    fn perft_kiwipete() {
        let b = board("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        assert_eq!(perft(&b, 1), 48);
        assert_eq!(perft(&b, 2), 2039);
    }

    #[test]
    fn perft_en_passant_pins() {
        let b = board("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1");
        assert_eq!(perft(&b, 1), 14);
        assert_eq!(perft(&b, 2), 191);
        assert_eq!(perft(&b, 3), 2812);
    }

    #[test]
    fn castling_blocked_by_attacked_transit_square() {
        // Black rook on f8 covers f1.
        let b = board("4kr2/8/8/8/8/8/8/R3K2R w KQ - 0 1");
        let castles: Vec<_> = legal_moves_from(&b, Square::E1)
            .into_iter()
            .filter(|mv| mv.to == Square::G1 || mv.to == Square::C1)
            .collect();
        assert_eq!(castles, vec![Move::new(Square::E1, Square::C1, None)]);
    }

    #[test]
    fn no_castling_out_of_check() {
        let b = board("4r1k1/8/8/8/8/8/8/R3K2R w KQ - 0 1");
        assert!(is_check(&b));
        assert!(legal_moves_from(&b, Square::E1)
            .iter()
            .all(|mv| mv.to != Square::G1 && mv.to != Square::C1));
    }

    #[test]
    fn promotions_expand_to_four_kinds() {
        let b = board("7k/P7/8/8/8/8/8/K7 w - - 0 1");
        let promos: Vec<_> = legal_moves_from(&b, sq("a7"));
        assert_eq!(promos.len(), 4);
        assert!(promos.iter().all(|mv| mv.promotion.is_some()));
    }

    #[test]
    fn terminal_predicates() {
        let mate = board("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3");
        assert!(is_checkmate(&mate));
        assert!(!is_stalemate(&mate));

        let stalemate = board("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        assert!(is_stalemate(&stalemate));
        assert!(!is_checkmate(&stalemate));
    }

    #[test]
    fn insufficient_material_cases() {
        assert!(is_insufficient_material(&board("4k3/8/8/8/8/8/8/4K3 w - - 0 1")));
        assert!(is_insufficient_material(&board("4k3/8/8/8/8/8/8/4KN2 w - - 0 1")));
        assert!(!is_insufficient_material(&board("4k3/8/8/8/8/8/8/2B1KB2 w - - 0 1")));
        assert!(is_insufficient_material(&board("4kb2/8/8/8/8/8/8/2B1K3 w - - 0 1")));
        assert!(!is_insufficient_material(&board("4k3/8/8/8/8/8/8/3NKN2 w - - 0 1")));
        assert!(!is_insufficient_material(&board("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1")));
    }

    #[test]
    fn seventyfive_move_rule_threshold() {
        assert!(!is_seventyfive_move_rule(&board("4k3/8/8/8/8/8/8/R3K3 w - - 149 120")));
        assert!(is_seventyfive_move_rule(&board("4k3/8/8/8/8/8/8/R3K3 w - - 150 120")));
    }

    #[test]
    fn en_passant_only_counts_when_capturable() {
        let b = board("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 12");
        assert_eq!(capturable_en_passant(&b), Some(sq("d6")));
        let b = board("4k3/8/8/3p4/8/8/8/4K3 w - d6 0 12");
        assert_eq!(capturable_en_passant(&b), None);
    }
}
