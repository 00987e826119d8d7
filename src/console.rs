//! Terminal front end for the [`ControlSurface`]
//!
//! Reads one command per stdin line and prints assistant events as they
//! arrive. Both sources are awaited together on the interactive thread.

use std::str::FromStr;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::Result;
use crate::assistant::AssistantState;
use crate::control::{ControlListener, ControlSurface, deliver};
use crate::voice::VoiceId;

/// Console usage text
pub const HELP: &str = "\
commands:
  start          start listening
  stop           stop after the current step
  hush           stop the current speech
  voice <name>   change voice
  volume <0-100> change volume
  mic <index>    select input device
  status         show state and settings
  help           show this text
  quit           exit";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Hush,
    Voice(String),
    Volume(u32),
    Mic(usize),
    Status,
    Help,
    Quit,
}

/// Why a console line was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),

    #[error("not a number: {0}")]
    InvalidNumber(String),
}

impl FromStr for ConsoleCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            return Err(ParseCommandError::Empty);
        };
        let arg = parts.next();

        match head.to_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "hush" | "shut" => Ok(Self::Hush),
            "voice" => arg
                .map(|v| Self::Voice(v.to_string()))
                .ok_or(ParseCommandError::MissingArgument("voice")),
            "volume" | "vol" => {
                let arg = arg.ok_or(ParseCommandError::MissingArgument("volume"))?;
                arg.parse()
                    .map(Self::Volume)
                    .map_err(|_| ParseCommandError::InvalidNumber(arg.to_string()))
            }
            "mic" => {
                let arg = arg.ok_or(ParseCommandError::MissingArgument("mic"))?;
                arg.parse()
                    .map(Self::Mic)
                    .map_err(|_| ParseCommandError::InvalidNumber(arg.to_string()))
            }
            "status" => Ok(Self::Status),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(ParseCommandError::Unknown(other.to_string())),
        }
    }
}

impl ConsoleCommand {
    /// Run the command against `surface`; false means the console should exit
    pub fn apply(self, surface: &mut ControlSurface) -> bool {
        match self {
            Self::Start => surface.start(),
            Self::Stop => surface.stop(),
            Self::Hush => {
                if !surface.stop_speaking() {
                    println!("nothing is being spoken");
                }
            }
            Self::Voice(id) => surface.set_voice(&id),
            Self::Volume(percent) => surface.set_volume(percent),
            Self::Mic(index) => surface.set_microphone(index),
            Self::Status => println!("{}", describe(surface)),
            Self::Help => println!("{HELP}"),
            Self::Quit => return false,
        }
        true
    }
}

fn describe(surface: &ControlSurface) -> String {
    let profile = surface.profile();
    let mic = surface
        .microphone_index()
        .map_or_else(|| "none".to_string(), |i| i.to_string());
    format!(
        "state: {} | voice: {} | volume: {} | mic: {mic}",
        surface.state(),
        profile.speaker,
        profile.volume_percent(),
    )
}

/// Prints events to stdout
#[derive(Debug, Default)]
pub struct TerminalListener {
    listening: bool,
}

impl ControlListener for TerminalListener {
    fn on_status(&mut self, text: &str) {
        println!("> {text}");
    }

    fn on_listening(&mut self, active: bool) {
        if active && !self.listening {
            println!("(listening...)");
        }
        self.listening = active;
    }

    fn on_state(&mut self, state: AssistantState) {
        if state == AssistantState::Stopped {
            println!("(assistant stopped, `start` to resume)");
        }
    }
}

/// Drive `surface` from stdin until `quit`, end of input or Ctrl-C
///
/// # Errors
///
/// Returns error if stdin cannot be read
pub async fn run(surface: &mut ControlSurface) -> Result<()> {
    let mut listener = TerminalListener::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("voices: {}", voice_names());
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCommand>() {
                    Ok(command) => {
                        if !command.apply(surface) {
                            break;
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
            Some(event) = surface.next_event() => {
                deliver(&event, &mut listener);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    // Flush whatever the worker said before we leave
    surface.pump(&mut listener);
    Ok(())
}

fn voice_names() -> String {
    VoiceId::ALL
        .iter()
        .map(|v| v.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
