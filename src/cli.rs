//! Command-line interface and REPL
//!
//! Drives the simulated roaster and slider surface by hand so the sync
//! behavior can be watched live.

use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;

use roast_sync::{ChannelId, RoasterState, SimulatedRoaster, SliderSurface, SyncHandle};

/// One parsed REPL line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Move a slider as the user would
    Set { channel: ChannelId, value: i32 },
    /// Press a button on the roaster itself
    Press { channel: ChannelId, delta: i32 },
    Unplug,
    Plug,
    Reject { channel: ChannelId, enabled: bool },
    /// Switch the roaster's operating phase
    State(RoasterState),
    Status,
    Snapshot,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<ReplCommand>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = parts.split_first() else {
        return Ok(None);
    };

    let command = match (head.to_lowercase().as_str(), args) {
        ("quit" | "exit" | "q", []) => ReplCommand::Quit,
        ("help" | "?", []) => ReplCommand::Help,
        ("status", []) => ReplCommand::Status,
        ("snapshot" | "snap", []) => ReplCommand::Snapshot,
        ("unplug", []) => ReplCommand::Unplug,
        ("plug", []) => ReplCommand::Plug,
        ("state", [name]) => ReplCommand::State(name.parse().map_err(anyhow::Error::msg)?),
        ("press", [channel, sign]) => ReplCommand::Press {
            channel: parse_channel(channel)?,
            delta: parse_delta(sign)?,
        },
        ("reject", [channel]) => ReplCommand::Reject {
            channel: parse_channel(channel)?,
            enabled: true,
        },
        ("reject", [channel, toggle]) => ReplCommand::Reject {
            channel: parse_channel(channel)?,
            enabled: match *toggle {
                "on" => true,
                "off" => false,
                other => bail!("expected 'on' or 'off', got '{}'", other),
            },
        },
        (name, [value]) => {
            let channel = parse_channel(name)
                .map_err(|_| anyhow!("unknown command '{}' (try 'help')", name))?;
            let value = value
                .parse()
                .with_context(|| format!("invalid value '{}'", value))?;
            ReplCommand::Set { channel, value }
        }
        (name, _) => bail!("unknown command '{}' (try 'help')", name),
    };

    Ok(Some(command))
}

fn parse_channel(name: &str) -> Result<ChannelId> {
    name.parse().map_err(anyhow::Error::msg)
}

/// `+`, `-`, `++`, `+3`, `-2`
fn parse_delta(sign: &str) -> Result<i32> {
    if !sign.is_empty() && sign.chars().all(|c| c == '+') {
        return Ok(sign.len() as i32);
    }
    if !sign.is_empty() && sign.chars().all(|c| c == '-') {
        return Ok(-(sign.len() as i32));
    }
    sign.parse()
        .with_context(|| format!("invalid button press '{}'", sign))
}

/// Wiring the REPL operates on
pub struct Repl {
    pub roaster: Arc<SimulatedRoaster>,
    pub surface: Arc<SliderSurface>,
    pub handle: SyncHandle,
}

impl Repl {
    /// Blocking read-eval loop; returns on `quit`, Ctrl-D or Ctrl-C
    pub fn run(self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        print_help();

        loop {
            match rl.readline("roast> ") {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    match parse_command(&line) {
                        Ok(Some(ReplCommand::Quit)) => break,
                        Ok(Some(command)) => self.execute(command),
                        Ok(None) => {}
                        Err(e) => println!("{} {}", "✗".red(), e),
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    fn execute(&self, command: ReplCommand) {
        match command {
            ReplCommand::Set { channel, value } => {
                self.surface.move_slider(channel, value);
                println!("🎚️  {} slider -> {}", channel, self.surface.value(channel));
            }
            ReplCommand::Press { channel, delta } => {
                let value = self.roaster.press(channel, delta);
                println!("🔘 {} on roaster -> {}", channel, value);
            }
            ReplCommand::Unplug => {
                self.roaster.unplug();
                println!("{}", "🔌 cable pulled".yellow());
            }
            ReplCommand::Plug => {
                self.roaster.plug();
                println!("{}", "🔌 cable plugged in".green());
            }
            ReplCommand::Reject { channel, enabled } => {
                self.roaster.set_rejecting(channel, enabled);
                let state = if enabled { "rejecting" } else { "accepting" };
                println!("{} writes now {}", channel, state);
            }
            ReplCommand::State(state) => {
                self.roaster.set_state(state);
                println!("🔥 roaster switched to {}", state);
            }
            ReplCommand::Status => self.print_status(),
            ReplCommand::Snapshot => match self.handle.snapshot() {
                Some(snapshot) => match serde_json::to_string_pretty(&snapshot) {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("{} {}", "✗".red(), e),
                },
                None => println!("{}", "no active session".dimmed()),
            },
            ReplCommand::Help => print_help(),
            ReplCommand::Quit => {}
        }
    }

    fn print_status(&self) {
        println!("Connection: {}", self.handle.status().to_string().bold());
        if let Some(state) = self.handle.roaster_state() {
            println!("Roaster:    {}", state.to_string().to_uppercase().bold());
        }
        println!(
            "{:<8} {:>6} {:>8} {:>8} {:>8}",
            "channel", "device", "session", "pending", "slider"
        );

        let snapshot = self.handle.snapshot();
        for channel in ChannelId::ALL {
            let entry = snapshot
                .as_ref()
                .and_then(|s| s.iter().find(|c| c.channel == channel));
            let session = entry.map_or("-".to_string(), |c| c.value.to_string());
            let pending = entry
                .and_then(|c| c.pending)
                .map_or("-".to_string(), |p| p.to_string());
            println!(
                "{:<8} {:>6} {:>8} {:>8} {:>8}",
                channel.as_str(),
                self.roaster.device_value(channel),
                session,
                pending,
                self.surface.value(channel)
            );
        }
        if self.handle.queued_commands() > 0 {
            println!("{} command(s) queued", self.handle.queued_commands());
        }
    }
}

fn print_help() {
    println!("\n{}", "Commands:".bold());
    println!("  {}   move a slider (user input)", "heater|fan|drum <value>".cyan());
    println!("  {}    press a roaster button", "press <channel> +|-".cyan());
    println!("  {}            pull / reconnect the cable", "unplug | plug".cyan());
    println!("  {} make the roaster refuse writes", "reject <channel> [on|off]".cyan());
    println!("  {}            switch phase (off, pre-heating, charge, roasting, cooling, shutdown)", "state <name>".cyan());
    println!("  {}      show channel values", "status | snapshot".cyan());
    println!("  {}                     leave\n", "quit".cyan());
}
