pub mod board;
pub mod fen;
pub mod rules;
pub mod san;
pub mod game;
pub mod pgn;
pub mod engine;
pub mod controller;

pub use board::{Board, Color, Move, Piece, PieceKind, Square};
pub use controller::{ControllerError, ControllerEvent, InteractionController, PlayMode};
pub use game::{GameResult, GameSession, MoveOutcome, PromotionPolicy, SessionError};
