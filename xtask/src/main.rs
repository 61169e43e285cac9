// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Developer tasks for the workspace: `cargo x test`, `cargo x lint` and `cargo x doc`.

use std::ffi::OsString;
use std::process::Command;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace development tasks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every test in the workspace, doc tests included
    Test {
        /// Show output of passing tests
        #[arg(long)]
        no_capture: bool,
    },
    /// Check formatting and run clippy with warnings denied
    Lint {
        /// Apply formatting and clippy fixes instead of checking
        #[arg(long)]
        fix: bool,
    },
    /// Build the API documentation
    Doc {
        /// Open the documentation in a browser
        #[arg(long)]
        open: bool,
    },
}

fn cargo() -> OsString {
    std::env::var_os("CARGO")
        .or_else(|| which::which("cargo").ok().map(|path| path.into_os_string()))
        .unwrap_or_else(|| "cargo".into())
}

fn run(args: &[&str]) -> bool {
    let program = cargo();
    eprintln!("$ cargo {}", args.join(" "));
    match Command::new(&program).args(args).status() {
        Ok(status) => status.success(),
        Err(err) => {
            eprintln!("failed to run {}: {err}", program.to_string_lossy());
            false
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let ok = match cli.command {
        Commands::Test { no_capture } => {
            let mut args = vec!["test", "--workspace", "--all-features"];
            if no_capture {
                args.extend(["--", "--nocapture"]);
            }
            run(&args)
        }
        Commands::Lint { fix: false } => {
            run(&["fmt", "--all", "--check"])
                && run(&[
                    "clippy",
                    "--workspace",
                    "--all-targets",
                    "--all-features",
                    "--",
                    "-D",
                    "warnings",
                ])
        }
        Commands::Lint { fix: true } => {
            run(&["fmt", "--all"])
                && run(&[
                    "clippy",
                    "--workspace",
                    "--all-targets",
                    "--all-features",
                    "--fix",
                    "--allow-dirty",
                    "--allow-staged",
                ])
        }
        Commands::Doc { open } => {
            let mut args = vec!["doc", "--workspace", "--no-deps"];
            if open {
                args.push("--open");
            }
            run(&args)
        }
    };
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
