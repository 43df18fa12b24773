use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use vampirc_uci::{UciInfoAttribute, UciMessage};

use crate::board::Move;

mod error;
mod limit;
mod raw_engine;
mod uci_convert;
pub mod worker;

pub use error::EngineError;
pub use limit::*;
pub use uci_convert::SearchPosition;
use raw_engine::RawEngine;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const RESYNC_GRACE: Duration = Duration::from_secs(1);
const QUIT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub options: BTreeMap<String, Option<UciOptionValue>>,
    /// Upper bound on the handshake and on each move request.
    #[serde(default)]
    pub timeout: Option<DurationText>,
    /// Optional per-move time budget sent alongside the depth limit.
    #[serde(default)]
    pub move_time: Option<DurationText>,
}

impl EngineConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            options: BTreeMap::new(),
            timeout: None,
            move_time: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.map_or(DEFAULT_TIMEOUT, |d| d.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UciOptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl UciOptionValue {
    fn to_uci_string(&self) -> String {
        match self {
            UciOptionValue::String(s) => s.clone(),
            UciOptionValue::Integer(i) => format!("{}", i),
            UciOptionValue::Boolean(b) => format!("{}", b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
    Busy,
    Terminated,
}

#[derive(Debug, Clone, Copy)]
pub enum EngineScore {
    Centipawn(i32),
    Mate(i8),
}

#[derive(Debug, Default, Clone)]
pub struct SearchInfo {
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub score: Option<EngineScore>,
    pub pv: Vec<Move>,
}

impl SearchInfo {
    fn from_uci(uci_info: Vec<UciInfoAttribute>) -> Self {
        let mut info = Self::default();
        for uci_info in uci_info {
            match uci_info {
                UciInfoAttribute::Depth(depth) => info.depth = Some(depth as u32),
                UciInfoAttribute::Nodes(nodes) => info.nodes = Some(nodes),
                UciInfoAttribute::Pv(pv) => {
                    info.pv = pv
                        .iter()
                        .map_while(|mv| uci_convert::move_from_uci(mv).ok())
                        .collect();
                }
                UciInfoAttribute::Score { cp, mate, .. } => {
                    if let Some(cp) = cp {
                        info.score = Some(EngineScore::Centipawn(cp));
                    }
                    if let Some(moves) = mate {
                        info.score = Some(EngineScore::Mate(moves));
                    }
                }
                _ => {}
            }
        }
        info
    }
}

#[derive(Debug, Clone)]
pub enum SearchEvent {
    Info(SearchInfo),
    BestMove(Move),
}

/// One conversation with an external UCI engine.
///
/// `Uninitialized -> Ready -> (Busy <-> Ready) -> Terminated`. Dropping a
/// client that was never stopped kills the engine process.
#[derive(Debug)]
pub struct EngineClient {
    config: EngineConfig,
    engine: Option<RawEngine>,
    state: EngineState,
    engine_name: String,
    engine_author: String,
}

impl EngineClient {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            engine: None,
            state: EngineState::Uninitialized,
            engine_name: String::new(),
            engine_author: String::new(),
        }
    }

    /// Creates and starts a client in one step.
    pub async fn launch(config: EngineConfig) -> Result<Self, EngineError> {
        let mut client = Self::new(config);
        client.start().await?;
        Ok(client)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    pub fn engine_author(&self) -> &str {
        &self.engine_author
    }

    /// Launches the engine and performs the `uci`/`isready` handshake.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Uninitialized {
            return Err(EngineError::Unavailable(format!("cannot start from {:?}", self.state)));
        }
        let timeout = self.config.timeout();
        let mut engine = RawEngine::new(Path::new(&self.config.path), &self.config.args)?;
        let handshake = Self::handshake(&mut engine, &self.config);
        let handshake = tokio::time::timeout(timeout, handshake).await;
        match handshake {
            Ok(Ok((name, author))) => {
                info!(name = %name, author = %author, "engine ready");
                self.engine_name = name;
                self.engine_author = author;
                self.engine = Some(engine);
                self.state = EngineState::Ready;
                Ok(())
            }
            Ok(Err(e)) => {
                engine.start_kill();
                self.state = EngineState::Terminated;
                Err(EngineError::Unavailable(format!("handshake failed: {}", e)))
            }
            Err(_) => {
                engine.start_kill();
                self.state = EngineState::Terminated;
                Err(EngineError::Unavailable(format!("no handshake within {:?}", timeout)))
            }
        }
    }

    async fn handshake(
        engine: &mut RawEngine,
        config: &EngineConfig,
    ) -> Result<(String, String), EngineError> {
        let mut engine_name = None;
        let mut engine_author = None;
        engine.send(&UciMessage::Uci).await?;
        loop {
            match engine.recv().await?.ok_or(EngineError::UnexpectedTermination)? {
                UciMessage::UciOk => break,
                UciMessage::Id { name, author } => {
                    engine_name = engine_name.or(name);
                    engine_author = engine_author.or(author);
                }
                UciMessage::Option(_) => {}
                // Startup banners and the like.
                other => debug!(message = %other, "ignoring pre-handshake output"),
            }
        }

        for (name, value) in &config.options {
            let name = name.clone();
            let value = value.as_ref().map(UciOptionValue::to_uci_string);
            engine.send(&UciMessage::SetOption { name, value }).await?;
        }

        engine.send(&UciMessage::IsReady).await?;
        Self::wait_ready(engine).await?;
        Ok((engine_name.unwrap_or_default(), engine_author.unwrap_or_default()))
    }

    async fn wait_ready(engine: &mut RawEngine) -> Result<(), EngineError> {
        loop {
            match engine.recv().await?.ok_or(EngineError::UnexpectedTermination)? {
                UciMessage::ReadyOk => return Ok(()),
                other => trace!(message = %other, "skipping while waiting for readyok"),
            }
        }
    }

    /// Streams the engine's search output for `position` until its best move.
    /// Any line that is neither `info` nor `bestmove` is a protocol error.
    pub fn search<'a>(
        &'a mut self,
        position: &SearchPosition,
        limit: SearchLimit,
    ) -> impl Stream<Item = Result<SearchEvent, EngineError>> + 'a {
        let position_cmd = uci_convert::position_message(position);
        let go_cmd = uci_convert::go_message(&limit);
        async_stream::try_stream! {
            let engine = self.engine.as_mut()
                .ok_or_else(|| EngineError::Unavailable("engine not running".to_owned()))?;
            engine.send(&position_cmd).await?;
            engine.send(&go_cmd).await?;
            loop {
                match engine.recv().await?.ok_or(EngineError::UnexpectedTermination)? {
                    UciMessage::Info(info) => {
                        yield SearchEvent::Info(SearchInfo::from_uci(info));
                    }
                    UciMessage::BestMove { best_move, .. } => {
                        yield SearchEvent::BestMove(uci_convert::move_from_uci(&best_move)?);
                        break;
                    }
                    UciMessage::Unknown(line, _) => Err(EngineError::Protocol(line))?,
                    other => Err(EngineError::Protocol(other.to_string()))?,
                }
            }
        }
    }

    async fn best_move(
        &mut self,
        position: &SearchPosition,
        limit: SearchLimit,
    ) -> Result<Move, EngineError> {
        let events = self.search(position, limit);
        futures_util::pin_mut!(events);
        while let Some(event) = events.next().await {
            match event? {
                SearchEvent::Info(info) => {
                    trace!(
                        depth = ?info.depth,
                        score = ?info.score,
                        nodes = ?info.nodes,
                        "search info"
                    );
                }
                SearchEvent::BestMove(mv) => return Ok(mv),
            }
        }
        Err(EngineError::UnexpectedTermination)
    }

    /// Asks for a best move at the given strength (100-3000, clamped). Waits
    /// at most the configured timeout. The engine is resynchronised after a
    /// failure, or terminated if it will not answer.
    pub async fn request_move(
        &mut self,
        position: &SearchPosition,
        strength: u16,
    ) -> Result<Move, EngineError> {
        match self.state {
            EngineState::Ready => {}
            state => return Err(EngineError::Unavailable(format!("engine is {:?}", state))),
        }
        let limit = SearchLimit::for_strength(strength, self.config.move_time.map(|d| d.0));
        let timeout = self.config.timeout();
        let moves = position.moves.len();
        debug!(strength, depth = limit.depth, moves, "requesting engine move");

        self.state = EngineState::Busy;
        let outcome = match tokio::time::timeout(timeout, self.best_move(position, limit)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EngineError::Timeout(timeout)),
        };
        match &outcome {
            Ok(mv) => {
                debug!(%mv, "engine replied");
                self.state = EngineState::Ready;
            }
            Err(e) => {
                warn!(error = %e, "engine request failed");
                self.resync().await;
            }
        }
        outcome
    }

    /// Stops any search and waits for `readyok`; kills the engine if that
    /// does not arrive promptly.
    async fn resync(&mut self) {
        let engine = match self.engine.as_mut() {
            Some(engine) => engine,
            None => return,
        };
        let attempt = async {
            engine.send(&UciMessage::Stop).await?;
            engine.send(&UciMessage::IsReady).await?;
            Self::wait_ready(engine).await
        };
        let outcome = tokio::time::timeout(RESYNC_GRACE, attempt).await;
        match outcome {
            Ok(Ok(())) => {
                debug!("engine resynchronised");
                self.state = EngineState::Ready;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "engine lost, terminating");
                self.terminate().await;
            }
            Err(_) => {
                warn!("engine unresponsive, terminating");
                self.terminate().await;
            }
        }
    }

    async fn terminate(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.kill().await {
                debug!(error = %e, "engine kill failed");
            }
        }
        self.state = EngineState::Terminated;
    }

    /// Ends the conversation with `quit`, killing the process if it lingers.
    /// Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.send(&UciMessage::Quit).await {
                debug!(error = %e, "could not send quit");
            }
            match tokio::time::timeout(QUIT_GRACE, engine.wait()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "waiting for engine exit failed"),
                Err(_) => debug!("engine ignored quit"),
            }
        }
        if self.state != EngineState::Terminated {
            info!("engine stopped");
        }
        self.terminate().await;
    }
}

impl Drop for EngineClient {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            debug!("engine client dropped while running, killing engine");
            engine.start_kill();
        }
    }
}
