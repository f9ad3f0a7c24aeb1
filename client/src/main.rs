use clap::Parser;
use client::game::{ClientGameState, Phase};
use client::input::{self, Intent};
use client::network::Connection;
use log::{error, info, warn};
use shared::Command;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:10000")]
    server: String,

    /// Name shown to the opponent
    #[arg(short = 'u', long, default_value = "")]
    username: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Connecting to: {}", args.server);

    let mut connection = Connection::connect(&args.server, &args.username).await?;
    let mut game = ClientGameState::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Waiting for an opponent. Type `help` for commands.");

    loop {
        tokio::select! {
            message = connection.next_message() => {
                let Some(command) = message else {
                    println!("Server closed the connection.");
                    break;
                };
                game.on_received(&command);
                describe(&command, &game);
                if game.is_over() {
                    game.reset();
                    println!("Back in the lobby.");
                }
            },

            line = lines.next_line() => {
                let Some(line) = line? else {
                    if let Err(e) = connection.left() {
                        warn!("Could not say goodbye to the server: {}", e);
                    }
                    break;
                };
                let intent = match input::parse_line(&line) {
                    Ok(intent) => intent,
                    Err(input::InputError::Empty) => continue,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                if intent == Intent::Help {
                    println!("{}", input::HELP);
                    continue;
                }
                let Some(command) = intent.to_command() else {
                    continue;
                };
                if let Err(e) = connection.send(command.clone()) {
                    error!("Could not send {}: {}", command, e);
                    break;
                }
                game.on_sent(&command);
                if intent == Intent::Quit {
                    break;
                }
                if game.is_over() {
                    println!("You lost. Back in the lobby.");
                    game.reset();
                }
            },
        }
    }

    connection.close().await;
    Ok(())
}

fn describe(command: &Command, game: &ClientGameState) {
    match command {
        Command::Game { opponent } => {
            println!("Matched against {:?}. Place your fleet, then type `ready`.", opponent)
        }
        Command::StrikeTurn => println!("Your turn: fire ROW COL"),
        Command::Defend => println!("Opponent's turn."),
        Command::StrikeAt(target) => {
            println!("Incoming strike at {}: report hit BOAT, miss or lost", target)
        }
        Command::StrikeResult(outcome) => println!("Result of your strike: {:?}", outcome),
        Command::Defeat => println!("Opponent's fleet is sunk. You won!"),
        Command::Left => println!("Opponent left the game."),
        other => info!("Server sent {}", other),
    }
    if *game.phase() == Phase::Won {
        info!("Game won after {} turns", game.turns());
    }
}
