//! Game records: a `[Tag "Value"]` header block followed by numbered
//! movetext in SAN.

use crate::board::*;
use crate::fen::STARTING_POSITION;
use crate::game::{GameSession, PromotionPolicy, SessionError};
use crate::san;

const LINE_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameHeaders {
    pub event: String,
    pub site: String,
    pub date: String,
    pub round: String,
    pub white: String,
    pub black: String,
    /// Tags other than the seven-tag roster, `Result`, `SetUp` and `FEN`, in
    /// the order they were read.
    pub extra: Vec<(String, String)>,
}

impl Default for GameHeaders {
    fn default() -> Self {
        Self {
            event: "Casual game".to_owned(),
            site: "Local".to_owned(),
            date: chrono::Local::now().format("%Y.%m.%d").to_string(),
            round: "-".to_owned(),
            white: "White".to_owned(),
            black: "Black".to_owned(),
            extra: Vec::new(),
        }
    }
}

impl GameHeaders {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "Event" => self.event = value,
            "Site" => self.site = value,
            "Date" => self.date = value,
            "Round" => self.round = value,
            "White" => self.white = value,
            "Black" => self.black = value,
            _ => self.extra.push((name.to_owned(), value)),
        }
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn push_tag(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!("[{} \"{}\"]\n", name, escape(value)));
}

impl GameSession {
    pub fn to_game_string(&self) -> String {
        let headers = self.headers();
        let result = self.result().token();
        let mut out = String::new();
        push_tag(&mut out, "Event", &headers.event);
        push_tag(&mut out, "Site", &headers.site);
        push_tag(&mut out, "Date", &headers.date);
        push_tag(&mut out, "Round", &headers.round);
        push_tag(&mut out, "White", &headers.white);
        push_tag(&mut out, "Black", &headers.black);
        push_tag(&mut out, "Result", result);
        let init_fen = self.init_pos().to_position_string();
        if init_fen != STARTING_POSITION {
            push_tag(&mut out, "SetUp", "1");
            push_tag(&mut out, "FEN", &init_fen);
        }
        for (name, value) in &headers.extra {
            push_tag(&mut out, name, value);
        }
        out.push('\n');

        let mut tokens = Vec::with_capacity(self.stack().len() * 3 / 2 + 1);
        let mut number = self.init_pos().fullmove_number();
        let mut color = self.init_pos().side_to_move();
        for (ply, played) in self.stack().iter().enumerate() {
            match color {
                Color::White => tokens.push(format!("{}.", number)),
                Color::Black if ply == 0 => tokens.push(format!("{}...", number)),
                Color::Black => {}
            }
            tokens.push(played.san.clone());
            if color == Color::Black {
                number += 1;
            }
            color = !color;
        }
        tokens.push(result.to_owned());

        let mut line_len = 0;
        for token in tokens {
            if line_len > 0 && line_len + 1 + token.len() > LINE_WIDTH {
                out.push('\n');
                line_len = 0;
            } else if line_len > 0 {
                out.push(' ');
                line_len += 1;
            }
            line_len += token.len();
            out.push_str(&token);
        }
        out.push('\n');
        out
    }

    /// Rebuilds a session from a game record by replaying every move through
    /// [`GameSession::propose_move`].
    pub fn from_game_string(
        text: &str,
        promotion_policy: PromotionPolicy,
    ) -> Result<Self, SessionError> {
        let record = parse_record(text)?;

        let init_pos = match record.fen {
            Some(fen) => Board::from_position_string(&fen)
                .map_err(|e| SessionError::MalformedRecord(format!("FEN tag: {}", e)))?,
            None => Board::startpos(),
        };
        let mut session = GameSession::from_position(init_pos, promotion_policy);
        *session.headers_mut() = record.headers;

        for token in record.moves {
            let mv = san::parse_san(session.board(), &token).ok_or_else(|| {
                SessionError::MalformedRecord(format!(
                    "{:?} is not a legal move in {}",
                    token,
                    session.to_position_string()
                ))
            })?;
            session
                .propose_move(mv.from, mv.to, mv.promotion)
                .map_err(|e| SessionError::MalformedRecord(format!("{:?}: {}", token, e)))?;
        }
        Ok(session)
    }

    /// Replaces this session with the record's game. On error nothing changes.
    pub fn load_game_string(&mut self, text: &str) -> Result<(), SessionError> {
        let loaded = Self::from_game_string(text, self.promotion_policy())?;
        self.replace_with(loaded);
        Ok(())
    }
}

struct ParsedRecord {
    headers: GameHeaders,
    fen: Option<String>,
    moves: Vec<String>,
}

fn parse_record(text: &str) -> Result<ParsedRecord, SessionError> {
    let mut headers = GameHeaders::default();
    let mut fen = None;
    let mut movetext = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && movetext.trim().is_empty() {
            let (name, value) = parse_tag(trimmed)?;
            match name.as_str() {
                "FEN" => fen = Some(value),
                "SetUp" | "Result" => {}
                _ => headers.set(&name, value),
            }
        } else if !trimmed.starts_with('%') {
            movetext.push_str(trimmed);
            movetext.push('\n');
        }
    }
    let moves = movetext_tokens(&movetext)?;
    Ok(ParsedRecord { headers, fen, moves })
}

fn parse_tag(line: &str) -> Result<(String, String), SessionError> {
    let malformed = || SessionError::MalformedRecord(format!("bad tag line {:?}", line));
    let inner = line
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(malformed)?
        .trim();
    let (name, rest) = inner.split_once(char::is_whitespace).ok_or_else(malformed)?;
    let rest = rest.trim();
    let quoted = rest
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .ok_or_else(malformed)?;
    let mut value = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            value.extend(chars.next());
        } else {
            value.push(c);
        }
    }
    Ok((name.to_owned(), value))
}

fn is_result_token(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}

/// SAN tokens of the main line with comments, variations, NAGs, move numbers
/// and the result removed.
fn movetext_tokens(movetext: &str) -> Result<Vec<String>, SessionError> {
    let malformed = |what: &str| SessionError::MalformedRecord(what.to_owned());
    let mut cleaned = String::with_capacity(movetext.len());
    let mut depth = 0usize;
    let mut chars = movetext.chars();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if !chars.by_ref().any(|c| c == '}') {
                    return Err(malformed("unterminated comment"));
                }
                cleaned.push(' ');
            }
            ';' => {
                chars.by_ref().find(|&c| c == '\n');
                cleaned.push(' ');
            }
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| malformed("unbalanced variation"))?;
            }
            _ if depth > 0 => {}
            _ => cleaned.push(c),
        }
    }
    if depth > 0 {
        return Err(malformed("unbalanced variation"));
    }

    let mut moves = Vec::new();
    for token in cleaned.split_whitespace() {
        if token.starts_with('$') || is_result_token(token) {
            continue;
        }
        let token = strip_move_number(token);
        if token.is_empty() {
            continue;
        }
        moves.push(token.to_owned());
    }
    Ok(moves)
}

/// Drops a leading "12." / "12..." so "12...e5" yields "e5". Digits not
/// followed by a dot are part of the move, as in "0-0".
fn strip_move_number(token: &str) -> &str {
    let rest = token.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.is_empty() {
        return rest;
    }
    if rest.len() < token.len() && rest.starts_with('.') {
        rest.trim_start_matches('.')
    } else {
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameResult;

    #[test]
    fn exports_tags_and_movetext() {
        let mut session = GameSession::default();
        for san in ["e4", "e5", "Bc4", "Nc6", "Qh5", "Nf6", "Qxf7#"] {
            let mv = san::parse_san(session.board(), san).expect("scripted move");
            session.propose_move(mv.from, mv.to, mv.promotion).expect("legal");
        }
        session.headers_mut().event = "Let's play chess".to_owned();
        let text = session.to_game_string();
        assert!(text.starts_with("[Event \"Let's play chess\"]\n[Site \"Local\"]\n[Date \""));
        assert!(text.contains("[Result \"1-0\"]\n\n"));
        assert!(text.ends_with("1. e4 e5 2. Bc4 Nc6 3. Qh5 Nf6 4. Qxf7# 1-0\n"));
        assert!(!text.contains("FEN"));
    }

    #[test]
    fn imports_annotated_record() {
        let text = r#"[Event "Annotated"]
[Site "Somewhere \"quoted\""]
[Date "2024.01.02"]
[Result "*"]
[Annotator "Someone"]

1. e4 {best by test} e5 2. Nf3 (2. f4 exf4) 2... Nc6 $1 ; line comment
3. Bb5 a6!? *
"#;
        let session = GameSession::from_game_string(text, PromotionPolicy::Ask).expect("record");
        assert_eq!(session.sans(), vec!["e4", "e5", "Nf3", "Nc6", "Bb5", "a6"]);
        assert_eq!(session.headers().site, "Somewhere \"quoted\"");
        assert_eq!(session.headers().date, "2024.01.02");
        assert_eq!(
            session.headers().extra,
            vec![("Annotator".to_owned(), "Someone".to_owned())]
        );
        assert_eq!(session.result(), GameResult::InProgress);
    }

    #[test]
    fn imports_castling_written_with_zeros() {
        let text = "1. e4 e5 2. Nf3 Nc6 3. Bc4 Bc5 4. 0-0 Nf6 5. d3 0-0 *";
        let session = GameSession::from_game_string(text, PromotionPolicy::Ask).expect("record");
        let sans = session.sans();
        assert_eq!(sans[6], "O-O");
        assert_eq!(sans.last().map(String::as_str), Some("O-O"));

        assert_eq!(strip_move_number("12...e5"), "e5");
        assert_eq!(strip_move_number("0-0-0"), "0-0-0");
        assert_eq!(strip_move_number("7."), "");
    }

    #[test]
    fn setup_position_round_trips() {
        let fen = "4k3/8/8/8/8/8/4P3/4K3 b - - 0 7";
        let init = Board::from_position_string(fen).expect("position");
        let mut session = GameSession::from_position(init, PromotionPolicy::Ask);
        for m in ["e8d8", "e2e4"] {
            let mv: Move = m.parse().expect("move");
            session.propose_move(mv.from, mv.to, None).expect("legal");
        }
        let text = session.to_game_string();
        assert!(text.contains("[SetUp \"1\"]\n[FEN \"4k3/8/8/8/8/8/4P3/4K3 b - - 0 7\"]\n"));
        assert!(text.contains("7... Kd8 8. e4 *"));

        let loaded = GameSession::from_game_string(&text, PromotionPolicy::Ask).expect("reload");
        assert_eq!(loaded.to_position_string(), session.to_position_string());
        assert_eq!(loaded.init_pos(), session.init_pos());
    }

    #[test]
    fn illegal_move_is_malformed_and_load_is_all_or_nothing() {
        let mut session = GameSession::default();
        let mv: Move = "d2d4".parse().expect("move");
        session.propose_move(mv.from, mv.to, None).expect("legal");
        let before = session.to_position_string();

        let bad = "[Event \"x\"]\n\n1. e4 e5 2. Ke3 *\n";
        assert!(matches!(
            session.load_game_string(bad),
            Err(SessionError::MalformedRecord(_))
        ));
        assert_eq!(session.to_position_string(), before);
        assert_eq!(session.stack().len(), 1);

        let unterminated = "1. e4 { never closed";
        assert!(matches!(
            GameSession::from_game_string(unterminated, PromotionPolicy::Ask),
            Err(SessionError::MalformedRecord(_))
        ));
        let bad_tag = "[Event unquoted]\n\n*";
        assert!(matches!(
            GameSession::from_game_string(bad_tag, PromotionPolicy::Ask),
            Err(SessionError::MalformedRecord(_))
        ));
    }

    #[test]
    fn long_games_wrap_lines() {
        let mut session = GameSession::default();
        for _ in 0..4 {
            for m in ["g1f3", "g8f6", "f3g1", "f6g8"] {
                let mv: Move = m.parse().expect("move");
                session.propose_move(mv.from, mv.to, None).expect("legal");
            }
        }
        let text = session.to_game_string();
        let movetext = text.split("\n\n").nth(1).expect("movetext");
        assert!(movetext.lines().count() > 1);
        assert!(movetext.lines().all(|line| line.len() <= LINE_WIDTH));
        assert!(movetext.trim_end().ends_with("1/2-1/2"));
    }
}
