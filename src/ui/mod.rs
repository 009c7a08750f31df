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

//! Console UI: command loop and confirmation prompt.

pub mod confirmation_prompt;
pub mod console;

use std::sync::Arc;
use tokio::io::{BufReader, Lines, Stdin};
use tokio::sync::Mutex;

pub use crate::session::ConfirmPrompt;
pub use confirmation_prompt::StdinConfirm;
pub use console::{Console, ConsoleCommand};

/// Line reader shared by the command loop and the confirmation prompt.
pub type SharedLines<R> = Arc<Mutex<Lines<R>>>;

/// Shared line reader over the process stdin.
pub fn stdin_lines() -> SharedLines<BufReader<Stdin>> {
    use tokio::io::AsyncBufReadExt;
    Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}
