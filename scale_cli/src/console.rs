//! Operator console: one command per stdin line.

use scale_core::{ScaleManager, ScaleSettings};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCmd {
    Start,
    Stop,
    Tare,
    Zero,
    Auto,
    Clear,
    Status,
    Analytics,
    Target(i32),
    Settings(ScaleSettings),
    /// Development only.
    Weight(i32),
    /// Development only.
    Sensor,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  start | stop              begin or end a fill cycle
  tare | zero               instrument tare / semi-automatic zero
  auto                      toggle automatic (sensor-triggered) mode
  target <grams>            set the target weight
  settings <fast> <slow> <fast_slow_pct> <error_pct> <rest_ms>
  clear                     clear error flags
  status | analytics        print current status / analytics tree
  weight <grams> | sensor   development only: inject weight / toggle sensor
  quit";

fn arg<T: FromStr>(parts: &[&str], i: usize, name: &str) -> Result<T, String> {
    let raw = parts.get(i).ok_or_else(|| format!("missing <{name}>"))?;
    raw.parse()
        .map_err(|_| format!("invalid <{name}>: '{raw}'"))
}

impl FromStr for ConsoleCmd {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(head) = parts.first() else {
            return Err("empty command".into());
        };
        let cmd = match head.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "tare" => Self::Tare,
            "zero" => Self::Zero,
            "auto" => Self::Auto,
            "clear" => Self::Clear,
            "status" => Self::Status,
            "analytics" => Self::Analytics,
            "target" => Self::Target(arg(&parts, 1, "grams")?),
            "settings" => Self::Settings(ScaleSettings {
                fast_feed_speed: arg(&parts, 1, "fast")?,
                slow_feed_speed: arg(&parts, 2, "slow")?,
                fast_slow_percentage: arg(&parts, 3, "fast_slow_pct")?,
                error_percentage: arg(&parts, 4, "error_pct")?,
                resting_time: arg(&parts, 5, "rest_ms")?,
            }),
            "weight" => Self::Weight(arg(&parts, 1, "grams")?),
            "sensor" => Self::Sensor,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}' (try 'help')")),
        };
        Ok(cmd)
    }
}

/// What the console should print after a command.
pub enum Reply {
    Ack(bool),
    Json(serde_json::Value),
    Text(&'static str),
    Quit,
}

pub fn execute(manager: &ScaleManager, cmd: ConsoleCmd) -> eyre::Result<Reply> {
    let reply = match cmd {
        ConsoleCmd::Start => Reply::Ack(manager.start()),
        ConsoleCmd::Stop => Reply::Ack(manager.stop()),
        ConsoleCmd::Tare => Reply::Ack(manager.tare()),
        ConsoleCmd::Zero => Reply::Ack(manager.zero()),
        ConsoleCmd::Auto => Reply::Ack(manager.toggle_automatic_mode()),
        ConsoleCmd::Clear => Reply::Ack(manager.clear_errors()),
        ConsoleCmd::Target(g) => Reply::Ack(manager.set_target_weight(g)),
        ConsoleCmd::Settings(s) => Reply::Ack(manager.update_settings(s)),
        ConsoleCmd::Weight(g) => Reply::Ack(manager.test_set_weight(g)),
        ConsoleCmd::Sensor => Reply::Ack(manager.test_toggle_sensor()),
        ConsoleCmd::Status => Reply::Json(serde_json::to_value(manager.get_status()?)?),
        ConsoleCmd::Analytics => Reply::Json(serde_json::to_value(manager.analytics()?)?),
        ConsoleCmd::Help => Reply::Text(HELP),
        ConsoleCmd::Quit => Reply::Quit,
    };
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("start", ConsoleCmd::Start)]
    #[case("  STOP ", ConsoleCmd::Stop)]
    #[case("target 12345", ConsoleCmd::Target(12_345))]
    #[case("weight -20", ConsoleCmd::Weight(-20))]
    #[case("exit", ConsoleCmd::Quit)]
    fn parses_commands(#[case] line: &str, #[case] expected: ConsoleCmd) {
        assert_eq!(line.parse::<ConsoleCmd>().unwrap(), expected);
    }

    #[test]
    fn settings_take_five_fields() {
        let cmd: ConsoleCmd = "settings 60 15 0.9 0.02 1500".parse().unwrap();
        assert_eq!(
            cmd,
            ConsoleCmd::Settings(ScaleSettings {
                fast_feed_speed: 60,
                slow_feed_speed: 15,
                fast_slow_percentage: 0.9,
                error_percentage: 0.02,
                resting_time: 1500,
            })
        );
        let err = "settings 60 15".parse::<ConsoleCmd>().unwrap_err();
        assert!(err.contains("fast_slow_pct"), "{err}");
    }

    #[rstest]
    #[case("", "empty")]
    #[case("target", "missing <grams>")]
    #[case("target lots", "invalid <grams>")]
    #[case("dance", "unknown command")]
    fn rejects_bad_lines(#[case] line: &str, #[case] needle: &str) {
        let err = line.parse::<ConsoleCmd>().unwrap_err();
        assert!(err.contains(needle), "{err}");
    }
}
