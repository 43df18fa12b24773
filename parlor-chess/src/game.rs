use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::board::*;
use crate::pgn::GameHeaders;
use crate::rules;
use crate::san;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionPolicy {
    /// A pawn reaching the last rank without a chosen piece is rejected with
    /// [`SessionError::AmbiguousPromotion`] so the caller can ask the player.
    #[default]
    Ask,
    /// A missing promotion piece means a queen.
    #[serde(rename = "queen")]
    AutoQueen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    InsufficientMaterial,
    SeventyFiveMoveRule,
    FivefoldRepetition,
    Agreed,
}

impl DrawReason {
    fn describe(self) -> &'static str {
        match self {
            DrawReason::InsufficientMaterial => "Insufficient material!",
            DrawReason::SeventyFiveMoveRule => "75-move rule!",
            DrawReason::FivefoldRepetition => "Fivefold repetition!",
            DrawReason::Agreed => "Draw agreed!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    InProgress,
    Checkmate(Color),
    Stalemate,
    Draw(DrawReason),
}

impl GameResult {
    pub fn is_over(self) -> bool {
        self != GameResult::InProgress
    }

    pub fn winner(self) -> Option<Color> {
        match self {
            GameResult::Checkmate(winner) => Some(winner),
            _ => None,
        }
    }

    /// The game-record result token.
    pub fn token(self) -> &'static str {
        match self {
            GameResult::InProgress => "*",
            GameResult::Checkmate(Color::White) => "1-0",
            GameResult::Checkmate(Color::Black) => "0-1",
            GameResult::Stalemate | GameResult::Draw(_) => "1/2-1/2",
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("illegal move {0}")]
    IllegalMove(Move),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("promotion piece required for {from}{to}")]
    AmbiguousPromotion { from: Square, to: Square },
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    #[error("waiting for the engine's reply")]
    AwaitingEngine,
    #[error("engine reply is for a position that no longer exists")]
    StaleEngineReply,
    #[error("no engine request is outstanding")]
    NoEngineRequest,
    #[error("the game is over")]
    GameOver,
}

/// How a move should sound and look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveFlavor {
    Quiet,
    Capture,
    Castle,
    Promotion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub mv: Move,
    pub san: String,
    pub mover: Color,
    pub flavor: MoveFlavor,
    pub gives_check: bool,
    pub result: GameResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub record: AppliedMove,
    pub san: String,
}

/// Identifies the position an engine request was issued for. A reply is only
/// committed while the session's generation still matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineTicket {
    generation: u64,
}

impl EngineTicket {
    pub fn generation(self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PositionKey {
    placement: [Option<Piece>; Square::NUM],
    side_to_move: Color,
    castling: CastlingRights,
    en_passant: Option<Square>,
}

impl PositionKey {
    fn of(board: &Board) -> Self {
        let mut placement = [None; Square::NUM];
        for (sq, piece) in board.pieces() {
            placement[sq.index()] = Some(piece);
        }
        Self {
            placement,
            side_to_move: board.side_to_move(),
            castling: board.castling_rights(),
            en_passant: rules::capturable_en_passant(board),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameSession {
    init_pos: Board,
    board: Board,
    stack: Vec<PlayedMove>,
    keys: Vec<PositionKey>,
    headers: GameHeaders,
    promotion_policy: PromotionPolicy,
    agreed_draw: bool,
    generation: u64,
    awaiting_engine: Option<EngineTicket>,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new(PromotionPolicy::default())
    }
}

impl GameSession {
    pub fn new(promotion_policy: PromotionPolicy) -> Self {
        Self::from_position(Board::startpos(), promotion_policy)
    }

    pub fn from_position(init_pos: Board, promotion_policy: PromotionPolicy) -> Self {
        Self {
            keys: vec![PositionKey::of(&init_pos)],
            board: init_pos.clone(),
            init_pos,
            stack: Vec::new(),
            headers: GameHeaders::default(),
            promotion_policy,
            agreed_draw: false,
            generation: 0,
            awaiting_engine: None,
        }
    }

    /// Back to the standard starting position with an empty history. Any
    /// outstanding engine request becomes stale.
    pub fn new_game(&mut self) {
        self.reset_to(Board::startpos());
    }

    pub(crate) fn reset_to(&mut self, init_pos: Board) {
        self.keys = vec![PositionKey::of(&init_pos)];
        self.board = init_pos.clone();
        self.init_pos = init_pos;
        self.stack.clear();
        self.agreed_draw = false;
        self.awaiting_engine = None;
        self.generation += 1;
        debug!(generation = self.generation, "session reset");
    }

    /// Swaps in a fully reconstructed session, keeping the generation counter
    /// monotonic so in-flight replies for the old game are discarded.
    pub(crate) fn replace_with(&mut self, other: GameSession) {
        let generation = self.generation + 1;
        let promotion_policy = self.promotion_policy;
        *self = other;
        self.generation = generation;
        self.promotion_policy = promotion_policy;
        self.awaiting_engine = None;
    }

    pub fn init_pos(&self) -> &Board {
        &self.init_pos
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn stack(&self) -> &[PlayedMove] {
        &self.stack
    }

    pub fn moves(&self) -> impl Iterator<Item = Move> + '_ {
        self.stack.iter().map(|played| played.record.mv)
    }

    pub fn last_move(&self) -> Option<Move> {
        self.stack.last().map(|played| played.record.mv)
    }

    pub fn sans(&self) -> Vec<String> {
        self.stack.iter().map(|played| played.san.clone()).collect()
    }

    /// Move-list rows in `N. white black` form. A game starting with Black to
    /// move opens with `N... black`.
    pub fn move_list_rows(&self) -> Vec<String> {
        let mut rows = Vec::new();
        let mut number = self.init_pos.fullmove_number();
        let mut sans = self.stack.iter().map(|played| played.san.as_str());
        if self.init_pos.side_to_move() == Color::Black {
            if let Some(first) = sans.next() {
                rows.push(format!("{}... {}", number, first));
                number += 1;
            }
        }
        loop {
            match (sans.next(), sans.next()) {
                (Some(white), Some(black)) => rows.push(format!("{}. {} {}", number, white, black)),
                (Some(white), None) => rows.push(format!("{}. {}", number, white)),
                _ => break,
            }
            number += 1;
        }
        rows
    }

    pub fn headers(&self) -> &GameHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut GameHeaders {
        &mut self.headers
    }

    pub fn promotion_policy(&self) -> PromotionPolicy {
        self.promotion_policy
    }

    pub fn set_promotion_policy(&mut self, policy: PromotionPolicy) {
        self.promotion_policy = policy;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        if self.result().is_over() {
            return Vec::new();
        }
        rules::legal_moves(&self.board)
    }

    pub fn legal_targets(&self, from: Square) -> Vec<Square> {
        let mut targets: Vec<Square> = self
            .legal_moves()
            .into_iter()
            .filter(|mv| mv.from == from)
            .map(|mv| mv.to)
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }

    /// True when `from -> to` is legal only with a promotion piece.
    pub fn needs_promotion(&self, from: Square, to: Square) -> bool {
        self.legal_moves()
            .iter()
            .any(|mv| mv.from == from && mv.to == to && mv.promotion.is_some())
    }

    pub fn propose_move(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<PieceKind>,
    ) -> Result<MoveOutcome, SessionError> {
        if self.awaiting_engine.is_some() {
            return Err(SessionError::AwaitingEngine);
        }
        self.try_play(from, to, promotion)
    }

    fn try_play(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<PieceKind>,
    ) -> Result<MoveOutcome, SessionError> {
        if self.result().is_over() {
            return Err(SessionError::GameOver);
        }
        let legal = rules::legal_moves(&self.board);
        let has_promotion = legal
            .iter()
            .any(|mv| mv.from == from && mv.to == to && mv.promotion.is_some());
        let promotion = match promotion {
            None if has_promotion => match self.promotion_policy {
                PromotionPolicy::AutoQueen => Some(PieceKind::Queen),
                PromotionPolicy::Ask => return Err(SessionError::AmbiguousPromotion { from, to }),
            },
            promotion => promotion,
        };
        let mv = Move::new(from, to, promotion);
        if !legal.contains(&mv) {
            return Err(SessionError::IllegalMove(mv));
        }
        Ok(self.play(mv))
    }

    fn play(&mut self, mv: Move) -> MoveOutcome {
        let mover = self.board.side_to_move();
        let san = san::to_san(&self.board, mv);
        let record = self.board.apply(mv);
        let flavor = if record.is_castle() {
            MoveFlavor::Castle
        } else if mv.promotion.is_some() {
            MoveFlavor::Promotion
        } else if record.is_capture() {
            MoveFlavor::Capture
        } else {
            MoveFlavor::Quiet
        };
        self.keys.push(PositionKey::of(&self.board));
        self.stack.push(PlayedMove { record, san: san.clone() });
        self.generation += 1;
        let result = self.result();
        debug!(%mv, %san, %result, generation = self.generation, "move committed");
        MoveOutcome {
            mv,
            san,
            mover,
            flavor,
            gives_check: rules::is_check(&self.board),
            result,
        }
    }

    /// Takes back exactly one ply. An outstanding engine request is cancelled.
    pub fn undo_one_ply(&mut self) -> Result<Move, SessionError> {
        let played = self.stack.pop().ok_or(SessionError::NothingToUndo)?;
        self.board.undo(&played.record);
        self.keys.pop();
        self.agreed_draw = false;
        self.awaiting_engine = None;
        self.generation += 1;
        debug!(mv = %played.record.mv, generation = self.generation, "ply undone");
        Ok(played.record.mv)
    }

    pub fn agree_draw(&mut self) -> Result<(), SessionError> {
        if self.result().is_over() {
            return Err(SessionError::GameOver);
        }
        self.agreed_draw = true;
        self.awaiting_engine = None;
        self.generation += 1;
        Ok(())
    }

    /// How often the current position has occurred, counting itself.
    pub fn repetition_count(&self) -> usize {
        match self.keys.last() {
            Some(current) => self.keys.iter().filter(|key| *key == current).count(),
            None => 0,
        }
    }

    pub fn is_fivefold_repetition(&self) -> bool {
        self.repetition_count() >= 5
    }

    pub fn result(&self) -> GameResult {
        let board = &self.board;
        if !rules::has_legal_moves(board) {
            return if rules::is_check(board) {
                GameResult::Checkmate(!board.side_to_move())
            } else {
                GameResult::Stalemate
            };
        }
        if rules::is_insufficient_material(board) {
            GameResult::Draw(DrawReason::InsufficientMaterial)
        } else if rules::is_seventyfive_move_rule(board) {
            GameResult::Draw(DrawReason::SeventyFiveMoveRule)
        } else if self.is_fivefold_repetition() {
            GameResult::Draw(DrawReason::FivefoldRepetition)
        } else if self.agreed_draw {
            GameResult::Draw(DrawReason::Agreed)
        } else {
            GameResult::InProgress
        }
    }

    pub fn is_game_over(&self) -> bool {
        self.result().is_over()
    }

    pub fn to_position_string(&self) -> String {
        self.board.to_position_string()
    }

    /// The side-to-move's king square when it is in check.
    pub fn checked_king(&self) -> Option<Square> {
        if rules::is_check(&self.board) {
            self.board.king_square(self.board.side_to_move())
        } else {
            None
        }
    }

    pub fn status_text(&self) -> String {
        let stm = self.board.side_to_move();
        match self.result() {
            GameResult::Checkmate(winner) => format!("Checkmate! {} wins!", winner),
            GameResult::Stalemate => "Stalemate!".to_owned(),
            GameResult::Draw(reason) => reason.describe().to_owned(),
            GameResult::InProgress if rules::is_check(&self.board) => {
                format!("Check! {}'s Turn", stm)
            }
            GameResult::InProgress => format!("{}'s Turn", stm),
        }
    }

    pub fn game_over_message(&self) -> Option<String> {
        let result = self.result();
        let prefix = match result {
            GameResult::InProgress => return None,
            GameResult::Checkmate(_) => "Checkmate!",
            GameResult::Stalemate => "Stalemate!",
            GameResult::Draw(reason) => reason.describe(),
        };
        Some(format!("{} Result: {}", prefix, result))
    }

    pub fn awaiting_engine(&self) -> bool {
        self.awaiting_engine.is_some()
    }

    /// Marks an engine request as outstanding for the current position.
    /// Further proposals are refused until it is committed or cancelled.
    pub fn begin_engine_request(&mut self) -> Result<EngineTicket, SessionError> {
        if self.awaiting_engine.is_some() {
            return Err(SessionError::AwaitingEngine);
        }
        if self.result().is_over() {
            return Err(SessionError::GameOver);
        }
        let ticket = EngineTicket { generation: self.generation };
        self.awaiting_engine = Some(ticket);
        Ok(ticket)
    }

    pub fn cancel_engine_request(&mut self) {
        self.awaiting_engine = None;
    }

    /// Applies an engine's move through the same validation as a human move.
    pub fn commit_engine_move(
        &mut self,
        ticket: EngineTicket,
        mv: Move,
    ) -> Result<MoveOutcome, SessionError> {
        let current = ticket.generation == self.generation;
        match self.awaiting_engine {
            Some(outstanding) if outstanding == ticket && current => {}
            Some(_) => return Err(SessionError::StaleEngineReply),
            None if !current => return Err(SessionError::StaleEngineReply),
            None => return Err(SessionError::NoEngineRequest),
        }
        self.awaiting_engine = None;
        self.try_play(mv.from, mv.to, mv.promotion)
    }

    /// Ends an engine request whose reply was an error. Stale tickets are ignored.
    pub fn fail_engine_request(&mut self, ticket: EngineTicket) -> bool {
        if self.awaiting_engine == Some(ticket) {
            self.awaiting_engine = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        s.parse().expect("test square should parse")
    }

    fn play(session: &mut GameSession, moves: &[&str]) {
        for m in moves {
            let mv: Move = m.parse().expect("test move should parse");
            session
                .propose_move(mv.from, mv.to, mv.promotion)
                .unwrap_or_else(|e| panic!("{} should be legal: {}", m, e));
        }
    }

    #[test]
    fn scholars_mate() {
        let mut session = GameSession::default();
        play(&mut session, &["e2e4", "e7e5", "f1c4", "b8c6", "d1h5", "g8f6", "h5f7"]);
        assert_eq!(session.result(), GameResult::Checkmate(Color::White));
        assert_eq!(session.sans().last().map(String::as_str), Some("Qxf7#"));
        assert_eq!(session.status_text(), "Checkmate! White wins!");
        assert_eq!(
            session.game_over_message().as_deref(),
            Some("Checkmate! Result: 1-0")
        );
        assert_eq!(
            session.propose_move(sq("a7"), sq("a6"), None),
            Err(SessionError::GameOver)
        );
    }

    #[test]
    fn illegal_moves_leave_state_alone() {
        let mut session = GameSession::default();
        let before = session.to_position_string();
        assert_eq!(
            session.propose_move(sq("e2"), sq("e5"), None),
            Err(SessionError::IllegalMove(Move::new(sq("e2"), sq("e5"), None)))
        );
        assert_eq!(session.to_position_string(), before);
        assert!(session.stack().is_empty());
    }

    #[test]
    fn undo_restores_position_exactly() {
        let mut session = GameSession::default();
        play(&mut session, &["e2e4", "d7d5"]);
        let before = session.to_position_string();
        play(&mut session, &["e4d5"]);
        assert_eq!(session.undo_one_ply(), Ok(Move::new(sq("e4"), sq("d5"), None)));
        assert_eq!(session.to_position_string(), before);
        session.undo_one_ply().expect("second undo");
        session.undo_one_ply().expect("third undo");
        assert_eq!(session.undo_one_ply(), Err(SessionError::NothingToUndo));
        assert_eq!(session.board(), &Board::startpos());
    }

    #[test]
    fn promotion_policy_branches() {
        let pos: Board = "7k/P7/8/8/8/8/8/K7 w - - 0 1".parse().expect("position");

        let mut asking = GameSession::from_position(pos.clone(), PromotionPolicy::Ask);
        assert!(asking.needs_promotion(sq("a7"), sq("a8")));
        assert_eq!(
            asking.propose_move(sq("a7"), sq("a8"), None),
            Err(SessionError::AmbiguousPromotion { from: sq("a7"), to: sq("a8") })
        );
        let outcome = asking
            .propose_move(sq("a7"), sq("a8"), Some(PieceKind::Knight))
            .expect("explicit promotion");
        assert_eq!(outcome.flavor, MoveFlavor::Promotion);
        assert_eq!(outcome.san, "a8=N");

        let mut queening = GameSession::from_position(pos, PromotionPolicy::AutoQueen);
        let outcome = queening
            .propose_move(sq("a7"), sq("a8"), None)
            .expect("default queen");
        assert_eq!(outcome.mv.promotion, Some(PieceKind::Queen));
        assert!(outcome.gives_check);
    }

    #[test]
    fn bare_kings_are_a_draw() {
        let pos: Board = "4k3/8/8/8/8/8/8/4K3 w - - 0 1".parse().expect("position");
        let session = GameSession::from_position(pos, PromotionPolicy::Ask);
        assert_eq!(session.result(), GameResult::Draw(DrawReason::InsufficientMaterial));
        assert!(session.legal_moves().is_empty());
    }

    #[test]
    fn exhausted_clock_is_a_draw() {
        let pos: Board = "4k3/8/8/8/8/8/8/4K2R w - - 4294967295 4294967295"
            .parse()
            .expect("position");
        let session = GameSession::from_position(pos, PromotionPolicy::Ask);
        assert_eq!(session.result(), GameResult::Draw(DrawReason::SeventyFiveMoveRule));
        assert!(!rules::legal_moves(session.board()).is_empty());
    }

    #[test]
    fn fivefold_repetition() {
        let mut session = GameSession::default();
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        for _ in 0..3 {
            play(&mut session, &shuffle);
        }
        assert_eq!(session.repetition_count(), 4);
        assert_eq!(session.result(), GameResult::InProgress);
        play(&mut session, &shuffle);
        assert_eq!(session.repetition_count(), 5);
        assert_eq!(session.result(), GameResult::Draw(DrawReason::FivefoldRepetition));
        session.undo_one_ply().expect("undo");
        assert_eq!(session.result(), GameResult::InProgress);
    }

    #[test]
    fn agreed_draw_reopens_on_undo() {
        let mut session = GameSession::default();
        play(&mut session, &["e2e4"]);
        session.agree_draw().expect("draw");
        assert_eq!(session.result(), GameResult::Draw(DrawReason::Agreed));
        assert_eq!(session.agree_draw(), Err(SessionError::GameOver));
        session.undo_one_ply().expect("undo");
        assert_eq!(session.result(), GameResult::InProgress);
    }

    #[test]
    fn engine_ticket_lifecycle() {
        let mut session = GameSession::default();
        play(&mut session, &["e2e4"]);
        let ticket = session.begin_engine_request().expect("ticket");
        assert_eq!(
            session.propose_move(sq("e7"), sq("e5"), None),
            Err(SessionError::AwaitingEngine)
        );
        assert_eq!(session.begin_engine_request(), Err(SessionError::AwaitingEngine));
        let reply = Move::new(sq("e7"), sq("e5"), None);
        let outcome = session.commit_engine_move(ticket, reply).expect("engine move");
        assert_eq!(outcome.mover, Color::Black);
        assert!(!session.awaiting_engine());
    }

    #[test]
    fn stale_engine_reply_is_rejected() {
        let mut session = GameSession::default();
        play(&mut session, &["e2e4"]);
        let ticket = session.begin_engine_request().expect("ticket");
        session.new_game();
        let reply = Move::new(sq("e7"), sq("e5"), None);
        assert_eq!(
            session.commit_engine_move(ticket, reply),
            Err(SessionError::StaleEngineReply)
        );
        assert_eq!(session.board(), &Board::startpos());

        play(&mut session, &["d2d4"]);
        let ticket = session.begin_engine_request().expect("ticket");
        session.undo_one_ply().expect("undo");
        assert_eq!(
            session.commit_engine_move(ticket, reply),
            Err(SessionError::StaleEngineReply)
        );
        assert_eq!(session.board(), &Board::startpos());
    }

    #[test]
    fn illegal_engine_reply_changes_nothing() {
        let mut session = GameSession::default();
        play(&mut session, &["e2e4"]);
        let before = session.to_position_string();
        let ticket = session.begin_engine_request().expect("ticket");
        let bogus = Move::new(sq("e7"), sq("e4"), None);
        assert_eq!(
            session.commit_engine_move(ticket, bogus),
            Err(SessionError::IllegalMove(bogus))
        );
        assert_eq!(session.to_position_string(), before);
        assert!(!session.awaiting_engine());
    }

    #[test]
    fn move_list_rows_pair_moves() {
        let mut session = GameSession::default();
        play(&mut session, &["e2e4", "e7e5", "g1f3"]);
        assert_eq!(session.move_list_rows(), vec!["1. e4 e5", "2. Nf3"]);

        let pos: Board = "4k3/8/8/8/8/8/4P3/4K3 b - - 0 7".parse().expect("position");
        let mut session = GameSession::from_position(pos, PromotionPolicy::Ask);
        play(&mut session, &["e8d8", "e2e4", "d8c8"]);
        assert_eq!(session.move_list_rows(), vec!["7... Kd8", "8. e4 Kc8"]);
    }
}
