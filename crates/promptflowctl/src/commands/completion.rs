//! Shell completion generation
//!
//! - promptflowctl completion bash > /etc/bash_completion.d/promptflowctl
//! - promptflowctl completion zsh  > ~/.zsh/completion/_promptflowctl
//! - promptflowctl completion fish > ~/.config/fish/completions/promptflowctl.fish

use anyhow::Result;
use clap::{CommandFactory, ValueEnum};
use clap_complete::{generate, Shell as ClapShell};
use std::io;

use crate::cli::Cli;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    Powershell,
    Elvish,
}

impl From<Shell> for ClapShell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => ClapShell::Bash,
            Shell::Zsh => ClapShell::Zsh,
            Shell::Fish => ClapShell::Fish,
            Shell::Powershell => ClapShell::PowerShell,
            Shell::Elvish => ClapShell::Elvish,
        }
    }
}

pub fn execute(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(ClapShell::from(shell), &mut cmd, name, &mut io::stdout());

    let hint = match shell {
        Shell::Bash => "source <(promptflowctl completion bash)  # add to ~/.bashrc",
        Shell::Zsh => "promptflowctl completion zsh > ~/.zsh/completion/_promptflowctl  # then run compinit",
        Shell::Fish => "promptflowctl completion fish > ~/.config/fish/completions/promptflowctl.fish",
        Shell::Powershell => "promptflowctl completion powershell | Out-String | Invoke-Expression",
        Shell::Elvish => "promptflowctl completion elvish > ~/.config/elvish/lib/promptflowctl.elv",
    };
    eprintln!();
    eprintln!("# Installation: {}", hint);
    Ok(())
}
