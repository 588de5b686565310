//! Luna command-line runner
//!
//! Runs Luna scripts with the class bridge installed, reporting every
//! failure as a diagnostic on stderr.

mod logger;
mod output;
mod sprite;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use luna_bridge::{ScriptState, TerminalSink};
use luna_engine::describe_stack;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "luna")]
#[command(about = "Run Luna scripts with native class bindings", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Colored diagnostics: auto, always or never
    #[arg(long, global = true, value_parser = ["auto", "always", "never"])]
    color: Option<String>,

    /// Print the call stack after running
    #[arg(long, global = true)]
    dump_stack: bool,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script file
    Run {
        /// Script to run
        file: PathBuf,
    },

    /// Run an inline chunk
    Eval {
        /// Source code
        code: String,
    },

    /// Animate a native Sprite driven by a script
    Demo {
        /// Script defining the Sprite hooks
        #[arg(long)]
        script: Option<PathBuf>,

        /// Number of frames to animate
        #[arg(long, default_value_t = 3)]
        frames: u32,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("luna: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();
    logger::init(cli.verbose)?;

    let color = output::resolve_color_choice(cli.color.as_deref());
    let mut state = ScriptState::new(Rc::new(TerminalSink::new(color)))
        .map_err(|e| anyhow!("unable to start the script runtime: {}", e))?;
    state
        .expose::<sprite::Sprite>()
        .map_err(|e| anyhow!("unable to expose Sprite: {}", e))?;

    let succeeded = match cli.command {
        Commands::Run { file } => state.do_file(&file),
        Commands::Eval { code } => state.do_string(&code, "eval"),
        Commands::Demo { script, frames } => {
            let script = script.unwrap_or_else(default_demo_script);
            match sprite::run_demo(&mut state, &script, frames) {
                Ok(_) => true,
                Err(e) => {
                    log::debug!("demo failed: {}", e);
                    false
                }
            }
        }
    };

    if cli.dump_stack {
        println!("{}", describe_stack(state.runtime()));
    }
    state.close();
    Ok(succeeded)
}

fn default_demo_script() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("scripts").join("sprite.lua")
}
