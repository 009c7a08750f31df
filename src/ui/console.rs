// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Line-oriented console for managing devices.

use anyhow::Result;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tracing::{debug, info};

use super::{ConfirmPrompt, SharedLines};
use crate::bluetooth::DevicePicker;
use crate::config::AlarmDefaults;
use crate::events::NoticeBoard;
use crate::registry::{ActionOutcome, DeviceRegistry, UserAction};
use crate::schedule::AlarmForm;
use crate::state::DeviceId;

const HELP: &str = "\
Commands:
  add                                   add a device
  remove <id>                           remove a device
  list                                  list devices
  show <id>                             show device details
  connect <id>                          pick and connect a pillbox
  disconnect <id>                       disconnect
  alarm <id> [<HH:MM> <freq> <count>]   program the alarm series
  reset <id>                            reset the alarm program
  rename <id> <name>                    rename a device
  help                                  show this help
  quit                                  exit";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Add,
    Remove(DeviceId),
    List,
    Show(DeviceId),
    Connect(DeviceId),
    Disconnect(DeviceId),
    Alarm(DeviceId, AlarmForm),
    Reset(DeviceId),
    Rename(DeviceId, String),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a device id")]
    BadId(String),
}

impl ConsoleCommand {
    /// Parse a non-empty line. `alarm <id>` alone uses `defaults`.
    pub fn parse(line: &str, defaults: &AlarmDefaults) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(CommandError::Usage("help"));
        };
        let args: Vec<&str> = words.collect();

        let command = match verb {
            "add" => ConsoleCommand::Add,
            "list" | "ls" => ConsoleCommand::List,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            "remove" => ConsoleCommand::Remove(device_id(&args, "remove <id>")?),
            "show" => ConsoleCommand::Show(device_id(&args, "show <id>")?),
            "connect" => ConsoleCommand::Connect(device_id(&args, "connect <id>")?),
            "disconnect" => ConsoleCommand::Disconnect(device_id(&args, "disconnect <id>")?),
            "reset" => ConsoleCommand::Reset(device_id(&args, "reset <id>")?),
            "alarm" => {
                let id = device_id(&args, "alarm <id> <HH:MM> <freq> <count>")?;
                let form = if args.len() == 1 {
                    defaults.form()
                } else {
                    let field = |i: usize| args.get(i).copied().unwrap_or_default();
                    AlarmForm::new(field(1), field(2), field(3))
                };
                ConsoleCommand::Alarm(id, form)
            }
            "rename" => {
                let id = device_id(&args, "rename <id> <name>")?;
                let name = args[1..].join(" ");
                if name.is_empty() {
                    return Err(CommandError::Usage("rename <id> <name>"));
                }
                ConsoleCommand::Rename(id, name)
            }
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn device_id(args: &[&str], usage: &'static str) -> Result<DeviceId, CommandError> {
    let raw = args.first().ok_or(CommandError::Usage(usage))?;
    raw.parse().map_err(|_| CommandError::BadId(raw.to_string()))
}

/// Interactive console bound to a registry.
pub struct Console<P: DevicePicker, R> {
    registry: Arc<DeviceRegistry<P>>,
    input: SharedLines<R>,
    prompt: Arc<dyn ConfirmPrompt>,
    defaults: AlarmDefaults,
    notices: NoticeBoard,
}

impl<P, R> Console<P, R>
where
    P: DevicePicker,
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(
        registry: Arc<DeviceRegistry<P>>,
        input: SharedLines<R>,
        prompt: Arc<dyn ConfirmPrompt>,
        defaults: AlarmDefaults,
        notices: NoticeBoard,
    ) -> Self {
        Self {
            registry,
            input,
            prompt,
            defaults,
            notices,
        }
    }

    /// Read and execute commands until `quit` or end of input.
    pub async fn run(&self) -> Result<()> {
        println!("{}", HELP);

        loop {
            let line = self.input.lock().await.next_line().await?;
            let Some(line) = line else {
                info!("Console input closed");
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match ConsoleCommand::parse(line, &self.defaults) {
                Ok(ConsoleCommand::Quit) => {
                    info!("Quit requested");
                    break;
                }
                Ok(command) => self.execute(command).await,
                Err(e) => println!("{}", e),
            }
        }
        Ok(())
    }

    pub async fn execute(&self, command: ConsoleCommand) {
        let action = match command {
            ConsoleCommand::Quit => return,
            ConsoleCommand::Help => {
                println!("{}", HELP);
                return;
            }
            ConsoleCommand::List => {
                self.list();
                return;
            }
            ConsoleCommand::Show(id) => {
                self.show(id);
                return;
            }
            ConsoleCommand::Connect(id) => {
                // connecting scans for a while; keep the console responsive
                let Some(session) = self.registry.find(id) else {
                    println!("No device {}", id);
                    return;
                };
                tokio::spawn(async move {
                    if let Err(e) = session.connect().await {
                        debug!("Connect of device {} ended: {}", id, e);
                    }
                });
                return;
            }
            ConsoleCommand::Add => UserAction::Add,
            ConsoleCommand::Remove(id) => {
                self.notices.forget(id);
                UserAction::Remove(id)
            }
            ConsoleCommand::Disconnect(id) => UserAction::Disconnect(id),
            ConsoleCommand::Alarm(id, form) => UserAction::SetAlarm(id, form),
            ConsoleCommand::Reset(id) => UserAction::Reset(id),
            ConsoleCommand::Rename(id, name) => UserAction::Rename(id, name),
        };

        // failures were already surfaced as notices
        match self.registry.dispatch(action, self.prompt.as_ref()).await {
            Ok(ActionOutcome::Added(id)) => println!("Added device {}", id),
            Ok(ActionOutcome::UnknownDevice(id)) => println!("No device {}", id),
            Ok(ActionOutcome::Declined) => println!("Cancelled"),
            Ok(_) => {}
            Err(e) => debug!("Action failed: {}", e),
        }
    }

    fn list(&self) {
        let snapshots = self.registry.snapshots();
        if snapshots.is_empty() {
            println!("No devices, use 'add' to create one");
        }
        for snapshot in snapshots {
            println!("{}", snapshot);
        }
    }

    fn show(&self, id: DeviceId) {
        let Some(session) = self.registry.find(id) else {
            println!("No device {}", id);
            return;
        };
        let snapshot = session.snapshot();
        println!("{} ({})", snapshot.display_name, snapshot.id);
        println!("  connection:  {}", snapshot.connection);
        println!("  status:      {}", snapshot.alarm_status);
        println!("  next alarm:  {}", snapshot.next_alarm_text());
        println!("  device time: {}", snapshot.device_time_text());
        println!("  program:     {}", snapshot.config_text());
        if let Some(notice) = self.notices.visible(id) {
            println!("  message:     {}", notice.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<ConsoleCommand, CommandError> {
        ConsoleCommand::parse(line, &AlarmDefaults::default())
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("add"), Ok(ConsoleCommand::Add));
        assert_eq!(parse("list"), Ok(ConsoleCommand::List));
        assert_eq!(parse("connect 3"), Ok(ConsoleCommand::Connect(3)));
        assert_eq!(parse("  remove   12 "), Ok(ConsoleCommand::Remove(12)));
        assert_eq!(parse("quit"), Ok(ConsoleCommand::Quit));
    }

    #[test]
    fn test_alarm_arguments() {
        assert_eq!(
            parse("alarm 1 06:00 120 5"),
            Ok(ConsoleCommand::Alarm(1, AlarmForm::new("06:00", "120", "5")))
        );
        // missing fields stay blank so the form reports them
        assert_eq!(
            parse("alarm 1 06:00"),
            Ok(ConsoleCommand::Alarm(1, AlarmForm::new("06:00", "", "")))
        );
        assert_eq!(
            parse("alarm 2"),
            Ok(ConsoleCommand::Alarm(2, AlarmDefaults::default().form()))
        );
    }

    #[test]
    fn test_rename_keeps_spaces() {
        assert_eq!(
            parse("rename 1 Kitchen shelf"),
            Ok(ConsoleCommand::Rename(1, "Kitchen shelf".to_string()))
        );
        assert_eq!(parse("rename 1"), Err(CommandError::Usage("rename <id> <name>")));
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse("fly"), Err(CommandError::Unknown("fly".to_string())));
        assert_eq!(parse("show"), Err(CommandError::Usage("show <id>")));
        assert_eq!(parse("reset one"), Err(CommandError::BadId("one".to_string())));
    }
}
