use session::SessionController;
use std::fmt;
use std::ops::ControlFlow;
use std::str::FromStr;

pub const HINT: &str = "Type 'help' for commands.";

pub const HELP: &str = "\
Commands:
  <enter> | snap        capture a frame
  live                  live view
  play                  play back recent frames
  older | newer         step through recent frames
  undo                  delete the last captured frame
  batch                 start a new batch
  onion [0-2]           set or cycle onion skin layers
  ctl <name> <+/-n>     adjust a camera control by n steps
  help                  show this text
  quit                  exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Snapshot,
    LiveView,
    Playback,
    Older,
    Newer,
    Undo,
    NewBatch,
    Onion(Option<usize>),
    Control { name: String, delta: i64 },
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCommandError(String);

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseCommandError {}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(Command::Snapshot);
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "snap" | "s" => Command::Snapshot,
            "live" | "l" => Command::LiveView,
            "play" | "p" => Command::Playback,
            "older" | "<" => Command::Older,
            "newer" | ">" => Command::Newer,
            "undo" | "u" => Command::Undo,
            "batch" | "n" => Command::NewBatch,
            "onion" | "o" => match words.next() {
                None => Command::Onion(None),
                Some(n) => Command::Onion(Some(n.parse().map_err(|_| {
                    ParseCommandError(format!("onion expects a number, got '{}'", n))
                })?)),
            },
            "ctl" => {
                let name = words
                    .next()
                    .ok_or_else(|| ParseCommandError("ctl needs a control name".into()))?;
                let delta = words
                    .next()
                    .ok_or_else(|| ParseCommandError("ctl needs a step count".into()))?;
                let delta = delta.trim_start_matches('+').parse().map_err(|_| {
                    ParseCommandError(format!("'{}' is not a step count", delta))
                })?;
                Command::Control {
                    name: name.to_string(),
                    delta,
                }
            }
            "help" | "h" | "?" | "k" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            other => return Err(ParseCommandError(format!("unknown command '{}'", other))),
        };

        match words.next() {
            None => Ok(command),
            Some(extra) => Err(ParseCommandError(format!("unexpected '{}'", extra))),
        }
    }
}

pub fn apply(controller: &SessionController, command: Command) -> ControlFlow<()> {
    tracing::debug!(?command, "Operator command");
    match command {
        Command::Snapshot => controller.request_snapshot(),
        Command::LiveView => controller.request_live_view(),
        Command::Playback => controller.request_playback(),
        Command::Older => controller.show_older(),
        Command::Newer => controller.show_newer(),
        Command::Undo => controller.undo_last_capture(),
        Command::NewBatch => controller.start_new_batch(),
        Command::Onion(Some(depth)) => controller.set_onion_depth(depth),
        Command::Onion(None) => {
            controller.cycle_onion_depth();
        }
        Command::Control { name, delta } => controller.adjust_device_control(&name, delta),
        Command::Help => println!("{}", HELP),
        Command::Quit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_line_captures() {
        assert_eq!("".parse(), Ok(Command::Snapshot));
        assert_eq!("   ".parse(), Ok(Command::Snapshot));
    }

    #[test]
    fn words_and_shortcuts() {
        assert_eq!("LIVE".parse(), Ok(Command::LiveView));
        assert_eq!("p".parse(), Ok(Command::Playback));
        assert_eq!("<".parse(), Ok(Command::Older));
        assert_eq!("q".parse(), Ok(Command::Quit));
    }

    #[test]
    fn onion_with_and_without_depth() {
        assert_eq!("onion".parse(), Ok(Command::Onion(None)));
        assert_eq!("onion 2".parse(), Ok(Command::Onion(Some(2))));
        assert!("onion two".parse::<Command>().is_err());
    }

    #[test]
    fn control_takes_signed_steps() {
        assert_eq!(
            "ctl focus_absolute +3".parse(),
            Ok(Command::Control {
                name: "focus_absolute".into(),
                delta: 3
            })
        );
        assert_eq!(
            "ctl brightness -2".parse(),
            Ok(Command::Control {
                name: "brightness".into(),
                delta: -2
            })
        );
        assert!("ctl brightness".parse::<Command>().is_err());
    }

    #[test]
    fn rejects_unknown_and_trailing_words() {
        assert!("jump".parse::<Command>().is_err());
        assert!("undo twice".parse::<Command>().is_err());
    }
}
