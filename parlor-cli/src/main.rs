use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use parlor_chess::engine::worker::{EngineReply, EngineWorker};
use parlor_chess::engine::EngineClient;
use parlor_chess::fen::FenError;
use parlor_chess::{
    rules, san, Board, Color, ControllerEvent, GameSession, InteractionController, PieceKind,
    PlayMode, SessionError, Square,
};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod text_board;

use config::{ConfigError, ParlorCliConfig, DEFAULT_CONFIG_PATH};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no engine named {0:?} in the config")]
    UnknownEngine(String),
    #[error("invalid position: {0}")]
    Fen(#[from] FenError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("io error")]
    Io(#[from] io::Error),
}

fn clap_parse_color(s: &str) -> Result<Color, String> {
    match s {
        "white" | "w" => Ok(Color::White),
        "black" | "b" => Ok(Color::Black),
        _ => Err(format!("expected white or black, got {:?}", s)),
    }
}

#[derive(Debug, Parser)]
struct ParlorCliArgs {
    /// Config file; defaults to ./parlor-cli-config.json when present.
    #[clap(long)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    subcommand: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Play interactively on the terminal.
    Play {
        /// Engine from the config file to play against.
        #[clap(short, long)]
        engine: Option<String>,
        /// The side the engine plays.
        #[clap(long, default_value = "black", value_parser = clap_parse_color)]
        engine_side: Color,
        /// Engine strength, 100 to 3000.
        #[clap(short, long)]
        strength: Option<u16>,
        /// Resume a saved game record.
        #[clap(long)]
        load: Option<PathBuf>,
    },
    /// Count leaf nodes of the legal move tree.
    Perft {
        #[clap(short, long)]
        depth: u32,
        #[clap(long)]
        fen: Option<String>,
        /// Break the count down by first move.
        #[clap(long)]
        divide: bool,
    },
    /// Replay a saved game record and print its moves and final position.
    Replay { path: PathBuf },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = ParlorCliArgs::parse();
    if let Err(e) = run(args).await {
        error!(error = %e, "exiting");
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: ParlorCliArgs) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => ParlorCliConfig::load(path, true)?,
        None => ParlorCliConfig::load(Path::new(DEFAULT_CONFIG_PATH), false)?,
    };

    match args.subcommand {
        Commands::Play {
            engine,
            engine_side,
            strength,
            load,
        } => play(&config, engine, engine_side, strength, load).await,
        Commands::Perft { depth, fen, divide } => {
            let board: Board = match fen {
                Some(fen) => fen.parse()?,
                None => Board::startpos(),
            };
            if divide {
                let mut child = board.clone();
                for mv in rules::legal_moves(&board) {
                    let record = child.apply(mv);
                    println!("{}: {}", mv, rules::perft(&child, depth.saturating_sub(1)));
                    child.undo(&record);
                }
            }
            println!("{}", rules::perft(&board, depth));
            Ok(())
        }
        Commands::Replay { path } => {
            let text = tokio::fs::read_to_string(&path).await?;
            let session = GameSession::from_game_string(&text, config.promotion)?;
            for row in session.move_list_rows() {
                println!("{}", row);
            }
            let checked = session.checked_king();
            print!("{}", text_board::render(session.board(), Color::White, &[], checked));
            println!("{}", session.to_position_string());
            println!("{}", session.status_text());
            Ok(())
        }
    }
}

async fn next_reply(replies: &mut Option<UnboundedReceiver<EngineReply>>) -> Option<EngineReply> {
    match replies {
        Some(replies) => replies.recv().await,
        None => std::future::pending().await,
    }
}

async fn play(
    config: &ParlorCliConfig,
    engine: Option<String>,
    engine_side: Color,
    strength: Option<u16>,
    load: Option<PathBuf>,
) -> Result<(), CliError> {
    let mut session = GameSession::new(config.promotion);
    if let Some(event) = &config.event {
        session.headers_mut().event = event.clone();
    }
    if let Some(site) = &config.site {
        session.headers_mut().site = site.clone();
    }

    let mut worker = None;
    let mut replies = None;
    if let Some(name) = &engine {
        let engine_config = config
            .engines
            .get(name)
            .ok_or_else(|| CliError::UnknownEngine(name.clone()))?;
        match EngineClient::launch(engine_config.clone()).await {
            Ok(client) => {
                let name = client.engine_name().to_owned();
                let headers = session.headers_mut();
                match engine_side {
                    Color::White => headers.white = name,
                    Color::Black => headers.black = name,
                }
                let (spawned, rx) = EngineWorker::spawn(client);
                worker = Some(spawned);
                replies = Some(rx);
            }
            Err(e) => {
                warn!(error = %e, "engine unavailable, playing two-player");
                println!("engine unavailable ({}), playing two-player", e);
            }
        }
    }

    let mut controller = InteractionController::new(session);
    let mut events = controller.subscribe();
    controller.set_strength(strength.unwrap_or(config.strength));
    if let Some(path) = load {
        let text = tokio::fs::read_to_string(&path).await?;
        controller.request_load(&text);
    }
    if let Some(worker) = &worker {
        controller.attach_engine(worker.jobs());
        controller.set_mode(PlayMode::Engine { engine_side });
    }
    let perspective = match controller.mode() {
        PlayMode::Engine { engine_side } => !engine_side,
        PlayMode::TwoPlayer => Color::White,
    };

    print_board(&controller, perspective, &[]);
    println!("{}", controller.session().status_text());
    print_events(&mut events, &controller, perspective);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };
                if run_command(&mut controller, line.trim(), perspective).await == Flow::Quit {
                    break;
                }
            }
            Some(reply) = next_reply(&mut replies) => controller.on_engine_reply(reply),
        }
        print_events(&mut events, &controller, perspective);
    }

    drop(controller);
    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    info!("session ended");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn parse_square(arg: Option<&str>) -> Option<Square> {
    arg?.parse().ok()
}

async fn run_command(
    controller: &mut InteractionController,
    line: &str,
    perspective: Color,
) -> Flow {
    let mut words = line.split_whitespace();
    let command = match words.next() {
        Some(command) => command,
        None => return Flow::Continue,
    };
    let arg = words.next();
    match command {
        "click" | "drop" => match parse_square(arg) {
            Some(sq) if command == "click" => controller.click(sq),
            Some(sq) => controller.drop(sq),
            None => println!("usage: {} <square>", command),
        },
        "drag" => match (
            arg.and_then(|x| x.parse().ok()),
            words.next().and_then(|y| y.parse().ok()),
        ) {
            (Some(x), Some(y)) => controller.drag(x, y),
            _ => println!("usage: drag <x> <y>"),
        },
        "promote" => match arg.and_then(|p| p.chars().next()).and_then(PieceKind::from_letter) {
            Some(kind) => controller.choose_promotion(kind),
            None => println!("usage: promote q|r|b|n"),
        },
        "move" => {
            let board = controller.board_snapshot();
            match arg.and_then(|token| san::parse_san(&board, token)) {
                Some(mv) => {
                    controller.click(mv.from);
                    controller.drop(mv.to);
                    if controller.pending_promotion().is_some() {
                        controller.choose_promotion(mv.promotion.unwrap_or(PieceKind::Queen));
                    }
                }
                None => println!("not a legal move here"),
            }
        }
        "undo" => controller.request_undo(),
        "new" => controller.request_new_game(),
        "draw" => controller.request_draw(),
        "strength" => match arg.and_then(|s| s.parse().ok()) {
            Some(strength) => {
                controller.set_strength(strength);
                println!("strength {}", controller.strength());
            }
            None => println!("usage: strength <100-3000>"),
        },
        "fen" => println!("{}", controller.request_position_string()),
        "pgn" => print!("{}", controller.request_save()),
        "moves" => {
            for row in controller.session().move_list_rows() {
                println!("{}", row);
            }
        }
        "board" => print_board(controller, perspective, &[]),
        "save" => match arg {
            Some(path) => match tokio::fs::write(path, controller.request_save()).await {
                Ok(()) => println!("saved to {}", path),
                Err(e) => println!("could not save: {}", e),
            },
            None => println!("usage: save <path>"),
        },
        "load" => match arg {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(text) => controller.request_load(&text),
                Err(e) => println!("could not load: {}", e),
            },
            None => println!("usage: load <path>"),
        },
        "quit" | "exit" => return Flow::Quit,
        "help" => println!(
            "click <sq> | drop <sq> | drag <x> <y> | promote <piece> | move <san>\n\
             undo | new | draw | strength <n> | fen | pgn | moves | board\n\
             save <path> | load <path> | quit"
        ),
        other => println!("unknown command {:?}, try help", other),
    }
    Flow::Continue
}

fn print_board(controller: &InteractionController, perspective: Color, targets: &[Square]) {
    let session = controller.session();
    let checked = session.checked_king();
    print!("{}", text_board::render(session.board(), perspective, targets, checked));
}

fn print_events(
    events: &mut UnboundedReceiver<ControllerEvent>,
    controller: &InteractionController,
    perspective: Color,
) {
    while let Ok(event) = events.try_recv() {
        match event {
            ControllerEvent::Selected { from, targets } => {
                print_board(controller, perspective, &targets);
                let targets: Vec<String> = targets.iter().map(Square::to_string).collect();
                println!("{} -> {}", from, targets.join(" "));
            }
            ControllerEvent::SelectionCleared | ControllerEvent::PieceFloating { .. } => {}
            ControllerEvent::PromotionRequested { from, to, color } => {
                println!("{} promotes {}{}: promote q|r|b|n", color, from, to);
            }
            ControllerEvent::MoveApplied(outcome) => {
                print_board(controller, perspective, &[]);
                println!("{} played {}", outcome.mover, outcome.san);
                if !outcome.result.is_over() {
                    println!("{}", controller.session().status_text());
                }
            }
            ControllerEvent::EngineThinking => println!("engine thinking..."),
            ControllerEvent::BoardChanged => {
                print_board(controller, perspective, &[]);
                println!("{}", controller.session().status_text());
            }
            ControllerEvent::GameOver { message, .. } => println!("{}", message),
            ControllerEvent::EngineDisabled => println!("engine disabled, continuing two-player"),
            ControllerEvent::Error(e) => println!("error: {}", e),
        }
    }
}
