//! Completions command - shell completion scripts

use crate::cli::args::Cli;
use crate::error::CapsuleResult;
use clap::CommandFactory;
use clap_complete::Shell;

/// Execute the completions command
pub fn execute(shell: Shell) -> CapsuleResult<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}
