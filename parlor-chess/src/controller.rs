//! Turns pointer gestures and menu commands into session operations, and
//! reports what happened as [`ControllerEvent`]s to every subscriber.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::board::*;
use crate::engine::worker::{EngineJob, EngineReply};
use crate::engine::{EngineError, SearchPosition, DEFAULT_STRENGTH, MAX_STRENGTH, MIN_STRENGTH};
use crate::game::{GameResult, GameSession, MoveOutcome, PromotionPolicy, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    TwoPlayer,
    Engine { engine_side: Color },
}

#[derive(Debug, Error, Clone)]
pub enum ControllerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("no engine attached")]
    NoEngine,
    #[error("{0:?} is not a promotion piece")]
    InvalidPromotion(PieceKind),
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    Selected { from: Square, targets: Vec<Square> },
    SelectionCleared,
    /// Where the renderer should draw the dragged piece.
    PieceFloating { piece: Piece, x: f32, y: f32 },
    PromotionRequested { from: Square, to: Square, color: Color },
    MoveApplied(MoveOutcome),
    EngineThinking,
    /// The position was replaced wholesale (new game, undo, load).
    BoardChanged,
    GameOver { result: GameResult, message: String },
    /// Play continues two-player after the engine failed.
    EngineDisabled,
    Error(ControllerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Gesture {
    Idle,
    Selected { from: Square, piece: Piece, moves: Vec<Move> },
    AwaitingPromotion { from: Square, to: Square },
}

#[derive(Debug)]
pub struct InteractionController {
    session: GameSession,
    gesture: Gesture,
    mode: PlayMode,
    strength: u16,
    engine: Option<mpsc::UnboundedSender<EngineJob>>,
    subscribers: Vec<mpsc::UnboundedSender<ControllerEvent>>,
}

impl InteractionController {
    pub fn new(session: GameSession) -> Self {
        Self {
            session,
            gesture: Gesture::Idle,
            mode: PlayMode::TwoPlayer,
            strength: DEFAULT_STRENGTH,
            engine: None,
            subscribers: Vec::new(),
        }
    }

    /// Attaches the job queue of an engine worker. Replies must be fed back
    /// through [`InteractionController::on_engine_reply`].
    pub fn attach_engine(&mut self, jobs: mpsc::UnboundedSender<EngineJob>) {
        self.engine = Some(jobs);
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ControllerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: ControllerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn fail(&mut self, error: ControllerError) {
        warn!(%error, "surfacing error");
        self.emit(ControllerEvent::Error(error));
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PlayMode) {
        self.mode = mode;
        self.clear_gesture();
        self.schedule_engine();
    }

    pub fn strength(&self) -> u16 {
        self.strength
    }

    pub fn set_strength(&mut self, strength: u16) {
        self.strength = strength.clamp(MIN_STRENGTH, MAX_STRENGTH);
    }

    pub fn board_snapshot(&self) -> Board {
        self.session.board().clone()
    }

    pub fn legal_targets(&self, from: Square) -> Vec<Square> {
        self.session.legal_targets(from)
    }

    pub fn move_history_sans(&self) -> Vec<String> {
        self.session.sans()
    }

    pub fn result(&self) -> GameResult {
        self.session.result()
    }

    /// The selected square and its highlighted targets, if any.
    pub fn selection(&self) -> Option<(Square, Vec<Square>)> {
        match &self.gesture {
            Gesture::Selected { from, moves, .. } => {
                let mut targets: Vec<Square> = moves.iter().map(|mv| mv.to).collect();
                targets.sort_unstable();
                targets.dedup();
                Some((*from, targets))
            }
            _ => None,
        }
    }

    pub fn pending_promotion(&self) -> Option<(Square, Square)> {
        match self.gesture {
            Gesture::AwaitingPromotion { from, to } => Some((from, to)),
            _ => None,
        }
    }

    fn is_human_turn(&self) -> bool {
        match self.mode {
            PlayMode::TwoPlayer => true,
            PlayMode::Engine { engine_side } => self.session.board().side_to_move() != engine_side,
        }
    }

    fn clear_gesture(&mut self) {
        let was_selected = matches!(self.gesture, Gesture::Selected { .. });
        self.gesture = Gesture::Idle;
        if was_selected {
            self.emit(ControllerEvent::SelectionCleared);
        }
    }

    /// Press on a square. Picks up a piece of the side to move; anything else
    /// just clears the selection.
    pub fn click(&mut self, square: Square) {
        self.clear_gesture();
        if self.session.awaiting_engine() || self.session.is_game_over() || !self.is_human_turn() {
            return;
        }
        let board = self.session.board();
        let piece = match board.piece_at(square) {
            Some(piece) if piece.color == board.side_to_move() => piece,
            _ => return,
        };
        let moves: Vec<Move> = self
            .session
            .legal_moves()
            .into_iter()
            .filter(|mv| mv.from == square)
            .collect();
        self.gesture = Gesture::Selected { from: square, piece, moves };
        let targets = self.session.legal_targets(square);
        self.emit(ControllerEvent::Selected { from: square, targets });
    }

    pub fn drag(&mut self, x: f32, y: f32) {
        if let Gesture::Selected { piece, .. } = self.gesture {
            self.emit(ControllerEvent::PieceFloating { piece, x, y });
        }
    }

    /// Release on a square. Plays the move when it is legal, asks for a
    /// promotion piece when one is needed, and otherwise drops the gesture.
    pub fn drop(&mut self, square: Square) {
        let (from, piece, moves) = match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Selected { from, piece, moves } => (from, piece, moves),
            other => {
                self.gesture = other;
                return;
            }
        };
        self.emit(ControllerEvent::SelectionCleared);

        let candidates: Vec<&Move> = moves.iter().filter(|mv| mv.to == square).collect();
        if candidates.is_empty() {
            debug!(%from, to = %square, "gesture discarded");
            return;
        }
        if candidates.iter().any(|mv| mv.promotion.is_some()) {
            if self.session.promotion_policy() == PromotionPolicy::AutoQueen {
                self.commit_human(from, square, Some(PieceKind::Queen));
            } else {
                self.gesture = Gesture::AwaitingPromotion { from, to: square };
                let color = piece.color;
                self.emit(ControllerEvent::PromotionRequested { from, to: square, color });
            }
            return;
        }
        self.commit_human(from, square, None);
    }

    /// Completes a pending promotion.
    pub fn choose_promotion(&mut self, kind: PieceKind) {
        let (from, to) = match self.gesture {
            Gesture::AwaitingPromotion { from, to } => (from, to),
            _ => return,
        };
        if !PieceKind::PROMOTIONS.contains(&kind) {
            self.fail(ControllerError::InvalidPromotion(kind));
            return;
        }
        self.gesture = Gesture::Idle;
        self.commit_human(from, to, Some(kind));
    }

    pub fn cancel_promotion(&mut self) {
        if let Gesture::AwaitingPromotion { .. } = self.gesture {
            self.gesture = Gesture::Idle;
        }
    }

    fn commit_human(&mut self, from: Square, to: Square, promotion: Option<PieceKind>) {
        match self.session.propose_move(from, to, promotion) {
            Ok(outcome) => self.after_commit(outcome),
            Err(SessionError::IllegalMove(mv)) => debug!(%mv, "illegal move discarded"),
            Err(e) => self.fail(e.into()),
        }
    }

    fn after_commit(&mut self, outcome: MoveOutcome) {
        let result = outcome.result;
        self.emit(ControllerEvent::MoveApplied(outcome));
        if result.is_over() {
            self.announce_game_over();
        } else {
            self.schedule_engine();
        }
    }

    fn announce_game_over(&mut self) {
        if let Some(message) = self.session.game_over_message() {
            info!(%message, "game over");
            let result = self.session.result();
            self.emit(ControllerEvent::GameOver { result, message });
        }
    }

    /// Issues exactly one engine job when it is the engine's turn.
    fn schedule_engine(&mut self) {
        let engine_side = match self.mode {
            PlayMode::Engine { engine_side } => engine_side,
            PlayMode::TwoPlayer => return,
        };
        if self.session.board().side_to_move() != engine_side
            || self.session.awaiting_engine()
            || self.session.is_game_over()
        {
            return;
        }
        let jobs = match &self.engine {
            Some(jobs) => jobs.clone(),
            None => {
                self.disable_engine(ControllerError::NoEngine);
                return;
            }
        };
        let ticket = match self.session.begin_engine_request() {
            Ok(ticket) => ticket,
            Err(e) => {
                self.fail(e.into());
                return;
            }
        };
        let job = EngineJob {
            ticket,
            position: SearchPosition::from_session(&self.session),
            strength: self.strength,
        };
        if jobs.send(job).is_err() {
            self.session.fail_engine_request(ticket);
            let stopped = EngineError::Unavailable("engine worker stopped".to_owned());
            self.disable_engine(stopped.into());
            return;
        }
        debug!(generation = ticket.generation(), "engine job issued");
        self.emit(ControllerEvent::EngineThinking);
    }

    fn disable_engine(&mut self, error: ControllerError) {
        self.fail(error);
        self.mode = PlayMode::TwoPlayer;
        self.emit(ControllerEvent::EngineDisabled);
    }

    /// Feeds an engine reply back in. Replies for a position that has since
    /// changed are dropped.
    pub fn on_engine_reply(&mut self, reply: EngineReply) {
        match reply.outcome {
            Ok(mv) => match self.session.commit_engine_move(reply.ticket, mv) {
                Ok(outcome) => self.after_commit(outcome),
                Err(SessionError::StaleEngineReply) => {
                    let generation = reply.ticket.generation();
                    debug!(%mv, generation, "stale engine reply discarded");
                }
                Err(e) => self.disable_engine(e.into()),
            },
            Err(e) => {
                if self.session.fail_engine_request(reply.ticket) {
                    self.disable_engine(e.into());
                } else {
                    debug!(error = %e, "stale engine failure discarded");
                }
            }
        }
    }

    /// Takes back two plies so the same player is to move again, or one when
    /// only one exists.
    pub fn request_undo(&mut self) {
        self.clear_gesture();
        let mut undone = 0;
        for _ in 0..2 {
            match self.session.undo_one_ply() {
                Ok(_) => undone += 1,
                Err(_) => break,
            }
        }
        if undone == 0 {
            self.fail(SessionError::NothingToUndo.into());
            return;
        }
        self.emit(ControllerEvent::BoardChanged);
        self.schedule_engine();
    }

    pub fn request_new_game(&mut self) {
        self.clear_gesture();
        self.session.new_game();
        self.emit(ControllerEvent::BoardChanged);
        self.schedule_engine();
    }

    pub fn request_draw(&mut self) {
        self.clear_gesture();
        match self.session.agree_draw() {
            Ok(()) => self.announce_game_over(),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn request_save(&self) -> String {
        self.session.to_game_string()
    }

    pub fn request_position_string(&self) -> String {
        self.session.to_position_string()
    }

    pub fn request_load(&mut self, text: &str) {
        self.clear_gesture();
        match self.session.load_game_string(text) {
            Ok(()) => {
                self.emit(ControllerEvent::BoardChanged);
                if self.session.is_game_over() {
                    self.announce_game_over();
                } else {
                    self.schedule_engine();
                }
            }
            Err(e) => self.fail(e.into()),
        }
    }
}
