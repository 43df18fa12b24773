use parlor_chess::{Board, Color, Square};

/// Renders the board as text from `perspective`'s side, marking selected
/// targets with `*` and a checked king with `!`.
pub fn render(
    board: &Board,
    perspective: Color,
    targets: &[Square],
    checked: Option<Square>,
) -> String {
    let ranks: Vec<u8> = match perspective {
        Color::White => (0..8).rev().collect(),
        Color::Black => (0..8).collect(),
    };
    let files: Vec<u8> = match perspective {
        Color::White => (0..8).collect(),
        Color::Black => (0..8).rev().collect(),
    };

    let mut out = String::new();
    for &rank in &ranks {
        out.push((b'1' + rank) as char);
        out.push(' ');
        for &file in &files {
            let sq = Square::new(file, rank);
            let glyph = match board.piece_at(sq) {
                Some(piece) => piece.symbol(),
                None if sq.is_light() => '.',
                None => ':',
            };
            let mark = if checked == Some(sq) {
                '!'
            } else if targets.contains(&sq) {
                '*'
            } else {
                ' '
            };
            out.push(glyph);
            out.push(mark);
        }
        out.push('\n');
    }
    out.push_str("  ");
    for &file in &files {
        out.push((b'a' + file) as char);
        out.push(' ');
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_position_from_white() {
        let text = render(&Board::startpos(), Color::White, &[], None);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "8 r n b q k b n r ");
        assert_eq!(lines[7], "1 R N B Q K B N R ");
        assert_eq!(lines[8], "  a b c d e f g h ");
    }

    #[test]
    fn black_perspective_is_flipped() {
        let text = render(&Board::startpos(), Color::Black, &[], None);
        assert!(text.starts_with("1 R N B K Q B N R "));
    }

    #[test]
    fn targets_are_marked() {
        let targets = ["e3".parse().unwrap(), "e4".parse().unwrap()];
        let text = render(&Board::startpos(), Color::White, &targets, None);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(&lines[4][10..12], ".*");
        assert_eq!(&lines[5][10..12], ":*");
    }
}
