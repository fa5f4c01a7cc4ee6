//! Command-line interface and REPL
//!
//! Lines are read on a dedicated thread (rustyline blocks) and handed to the
//! async side over a channel, where they are parsed and run against the
//! [`Bridge`].

use anyhow::{anyhow, bail, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::debug;

use deckbridge::dispatcher::{FilterSwitch, Mute, OutputSwitch, RecordPause, StudioMode, Switch, Visibility};
use deckbridge::state::Output;
use deckbridge::{Bridge, CommandOutcome, EntityRef, Health};

const PROMPT: &str = "obs> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchAction {
    On,
    Off,
    Toggle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Status,
    Scenes,
    Inputs,
    Cache,
    Program(String),
    Preview(String),
    Select(String),
    Transition,
    Collection(String),
    Output(Output, SwitchAction),
    RecordPause(SwitchAction),
    StudioMode(SwitchAction),
    Mute(String, SwitchAction),
    Visible { scene: String, source: String, action: SwitchAction },
    Filter { source: EntityRef, filter: String, action: SwitchAction },
    VolumeSet(String, f64),
    VolumeAdjust(String, f64),
    SaveReplay,
    Help,
    Quit,
}

fn parse_action(word: Option<&str>) -> Result<SwitchAction> {
    match word {
        Some("on") => Ok(SwitchAction::On),
        Some("off") => Ok(SwitchAction::Off),
        Some("toggle") | None => Ok(SwitchAction::Toggle),
        Some(other) => bail!("expected on|off|toggle, got '{}'", other),
    }
}

fn parse_number(word: Option<&str>) -> Result<f64> {
    let word = word.ok_or_else(|| anyhow!("missing dB value"))?;
    word.parse::<f64>()
        .map_err(|_| anyhow!("'{}' is not a number", word))
}

fn required<'a>(word: Option<&'a str>, what: &str) -> Result<&'a str> {
    word.ok_or_else(|| anyhow!("missing {}", what))
}

/// Split a line on whitespace; double quotes group names containing spaces
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            },
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parse one REPL line. `Ok(None)` for blank lines.
pub fn parse(line: &str) -> Result<Option<ReplCommand>> {
    let tokens = tokenize(line);
    let mut words = tokens.iter().map(String::as_str);
    let Some(head) = words.next() else {
        return Ok(None);
    };

    let command = match head {
        "status" => ReplCommand::Status,
        "scenes" => ReplCommand::Scenes,
        "inputs" => ReplCommand::Inputs,
        "cache" => ReplCommand::Cache,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        "scene" | "program" => ReplCommand::Program(required(words.next(), "scene name")?.to_string()),
        "preview" => ReplCommand::Preview(required(words.next(), "scene name")?.to_string()),
        "select" => ReplCommand::Select(required(words.next(), "scene name")?.to_string()),
        "transition" | "cut" => ReplCommand::Transition,
        "collection" => ReplCommand::Collection(required(words.next(), "collection name")?.to_string()),
        "stream" => ReplCommand::Output(Output::Stream, parse_action(words.next())?),
        "record" => ReplCommand::Output(Output::Record, parse_action(words.next())?),
        "replay" => ReplCommand::Output(Output::ReplayBuffer, parse_action(words.next())?),
        "vcam" => ReplCommand::Output(Output::VirtualCam, parse_action(words.next())?),
        "pause" => ReplCommand::RecordPause(parse_action(words.next())?),
        "studio" => ReplCommand::StudioMode(parse_action(words.next())?),
        "save-replay" => ReplCommand::SaveReplay,
        "mute" => {
            let input = required(words.next(), "input name")?.to_string();
            ReplCommand::Mute(input, parse_action(words.next())?)
        },
        "visible" => {
            let scene = required(words.next(), "scene name")?.to_string();
            let source = required(words.next(), "source name")?.to_string();
            ReplCommand::Visible {
                scene,
                source,
                action: parse_action(words.next())?,
            }
        },
        "filter" => {
            let kind = required(words.next(), "scene|input")?;
            let name = required(words.next(), "source name")?;
            let source = match kind {
                "scene" => EntityRef::scene(name),
                "input" => EntityRef::input(name),
                other => bail!("expected scene|input, got '{}'", other),
            };
            let filter = required(words.next(), "filter name")?.to_string();
            ReplCommand::Filter {
                source,
                filter,
                action: parse_action(words.next())?,
            }
        },
        "volume" => {
            let mode = required(words.next(), "set|adjust")?;
            let input = required(words.next(), "input name")?.to_string();
            let db = parse_number(words.next())?;
            match mode {
                "set" => ReplCommand::VolumeSet(input, db),
                "adjust" => ReplCommand::VolumeAdjust(input, db),
                other => bail!("expected set|adjust, got '{}'", other),
            }
        },
        other => bail!("unknown command '{}' (try 'help')", other),
    };

    if words.next().is_some() {
        bail!("too many arguments for '{}'", head);
    }
    Ok(Some(command))
}

/// Start the line reader thread. The channel closes on Ctrl+C or Ctrl+D.
pub fn spawn_reader() -> Result<mpsc::UnboundedReceiver<String>> {
    let mut rl = DefaultEditor::new()?;
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::Builder::new()
        .name("repl".to_string())
        .spawn(move || loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    if tx.send(line).is_err() {
                        break;
                    }
                },
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    debug!("REPL read error: {}", e);
                    break;
                },
            }
        })?;

    Ok(rx)
}

async fn switch(bridge: &Bridge, target: &dyn Switch, action: SwitchAction) -> CommandOutcome {
    let dispatcher = bridge.dispatcher();
    match action {
        SwitchAction::On => dispatcher.turn_on(target).await,
        SwitchAction::Off => dispatcher.turn_off(target).await,
        SwitchAction::Toggle => dispatcher.toggle(target).await,
    }
}

fn print_outcome(outcome: &CommandOutcome) {
    match outcome {
        CommandOutcome::Sent { .. } => println!("{} {}", "→".green(), outcome),
        CommandOutcome::NoOp => println!("{} {}", "=".dimmed(), outcome),
        CommandOutcome::NotConnected => println!("{} {}", "✗".red(), outcome),
        CommandOutcome::InvalidTarget(_) => println!("{} {}", "✗".yellow(), outcome),
    }
}

fn print_status(bridge: &Bridge) {
    let info = bridge.status();
    let health = match info.health {
        Health::Normal => info.health.to_string().green(),
        Health::Warning => info.health.to_string().yellow(),
        Health::Error => info.health.to_string().red(),
    };
    println!("{} {}", "OBS".bold(), info.endpoint.to_string().cyan());
    println!("  state:   {}", info.state);
    println!("  health:  {}", health);
    println!("  retries: {}", info.retry_count);
    println!("  since:   {}", info.since.format("%H:%M:%S"));
    if let Some(error) = &info.last_error {
        println!("  error:   {}", error.red());
    }

    let cache = bridge.cache();
    if let Some(scene) = cache.program_scene() {
        println!("  program: {}", scene.green());
    }
    if let Some(scene) = cache.preview_scene() {
        println!("  preview: {}", scene.yellow());
    }
    for output in [Output::Stream, Output::Record, Output::ReplayBuffer, Output::VirtualCam] {
        if let Some(status) = cache.output(output) {
            let label = if status.is_on() {
                "on".green()
            } else {
                "off".dimmed()
            };
            println!("  {:<8} {}", format!("{}:", output), label);
        }
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    for (usage, what) in [
        ("status", "connection health and outputs"),
        ("scenes | inputs", "list cached scenes or inputs"),
        ("cache", "dump every cached key"),
        ("scene <name>", "set the program scene"),
        ("preview <name>", "set the preview scene (studio mode)"),
        ("select <name>", "preview in studio mode, program otherwise"),
        ("transition", "studio mode transition"),
        ("collection <name>", "switch scene collection"),
        ("stream|record|replay|vcam [on|off|toggle]", "outputs"),
        ("pause [on|off|toggle]", "recording pause"),
        ("studio [on|off|toggle]", "studio mode"),
        ("mute <input> [on|off|toggle]", "input mute"),
        ("visible <scene> <source> [on|off|toggle]", "scene item visibility"),
        ("filter scene|input <name> <filter> [on|off|toggle]", "source filter"),
        ("volume set|adjust <input> <dB>", "input volume"),
        ("save-replay", "save the replay buffer"),
        ("quit", "disconnect and exit"),
    ] {
        println!("  {:<52} {}", usage.cyan(), what);
    }
    println!("  {}", "Quote names containing spaces: mute \"Desktop Audio\" on".dimmed());
}

/// Run one command. Returns `false` when the REPL should exit.
pub async fn execute(bridge: &Bridge, command: ReplCommand) -> bool {
    let dispatcher = bridge.dispatcher();
    let outcome = match command {
        ReplCommand::Quit => return false,
        ReplCommand::Help => {
            print_help();
            return true;
        },
        ReplCommand::Status => {
            print_status(bridge);
            return true;
        },
        ReplCommand::Scenes => {
            let program = bridge.cache().program_scene();
            for scene in bridge.cache().scenes() {
                if program.as_deref() == Some(scene.as_str()) {
                    println!("  {} {}", "●".red(), scene.bold());
                } else {
                    println!("    {}", scene);
                }
            }
            return true;
        },
        ReplCommand::Inputs => {
            for input in bridge.cache().inputs() {
                println!("    {}", input);
            }
            return true;
        },
        ReplCommand::Cache => {
            let snapshot = bridge.cache().snapshot();
            for (key, value) in &snapshot {
                println!("  {} = {}", key.to_string().cyan(), value);
            }
            println!("{}", format!("{} entries", snapshot.len()).dimmed());
            return true;
        },
        ReplCommand::Program(scene) => dispatcher.set_program_scene(&EntityRef::scene(scene)).await,
        ReplCommand::Preview(scene) => dispatcher.set_preview_scene(&EntityRef::scene(scene)).await,
        ReplCommand::Select(scene) => dispatcher.select_scene(&EntityRef::scene(scene)).await,
        ReplCommand::Transition => dispatcher.trigger_transition().await,
        ReplCommand::Collection(name) => dispatcher.set_scene_collection(&name).await,
        ReplCommand::SaveReplay => dispatcher.save_replay_buffer().await,
        ReplCommand::Output(output, action) => switch(bridge, &OutputSwitch(output), action).await,
        ReplCommand::RecordPause(action) => switch(bridge, &RecordPause, action).await,
        ReplCommand::StudioMode(action) => switch(bridge, &StudioMode, action).await,
        ReplCommand::Mute(input, action) => switch(bridge, &Mute(EntityRef::input(input)), action).await,
        ReplCommand::Visible {
            scene,
            source,
            action,
        } => {
            let target = Visibility(EntityRef::scene_item_named(scene, source));
            switch(bridge, &target, action).await
        },
        ReplCommand::Filter {
            source,
            filter,
            action,
        } => switch(bridge, &FilterSwitch::new(source, filter), action).await,
        ReplCommand::VolumeSet(input, db) => dispatcher.set_volume_db(&EntityRef::input(input), db).await,
        ReplCommand::VolumeAdjust(input, db) => {
            dispatcher
                .adjust_volume_db(&EntityRef::input(input), db)
                .await
        },
    };

    print_outcome(&outcome);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blank_line() {
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_switches() {
        assert_eq!(
            parse("stream on").unwrap(),
            Some(ReplCommand::Output(Output::Stream, SwitchAction::On))
        );
        assert_eq!(
            parse("studio").unwrap(),
            Some(ReplCommand::StudioMode(SwitchAction::Toggle))
        );
        assert_eq!(
            parse("mute \"Desktop Audio\" off").unwrap(),
            Some(ReplCommand::Mute("Desktop Audio".to_string(), SwitchAction::Off))
        );
        assert!(parse("record sideways").is_err());
    }

    #[test]
    fn test_parse_filter_and_visibility() {
        assert_eq!(
            parse("filter scene Main Blur on").unwrap(),
            Some(ReplCommand::Filter {
                source: EntityRef::scene("Main"),
                filter: "Blur".to_string(),
                action: SwitchAction::On,
            })
        );
        assert_eq!(
            parse("visible Main Webcam").unwrap(),
            Some(ReplCommand::Visible {
                scene: "Main".to_string(),
                source: "Webcam".to_string(),
                action: SwitchAction::Toggle,
            })
        );
        assert!(parse("filter group Main Blur").is_err());
    }

    #[test]
    fn test_parse_volume() {
        assert_eq!(
            parse("volume adjust Mic -3.5").unwrap(),
            Some(ReplCommand::VolumeAdjust("Mic".to_string(), -3.5))
        );
        assert!(parse("volume set Mic loud").is_err());
        assert!(parse("volume louder Mic 3").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_and_extra_words() {
        assert!(parse("launch rockets").is_err());
        assert!(parse("status now").is_err());
        assert!(parse("scene").is_err());
    }
}
