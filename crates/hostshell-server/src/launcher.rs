//! How each connection's shell is launched.

use std::path::PathBuf;

use hostshell_pty::CommandBuilder;

/// Shell used when none is configured or the configured one is blank.
pub const DEFAULT_SHELL: &str = "/bin/bash";

const TERM: &str = "xterm-256color";

/// Everything needed to build the command a session attaches to its PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSpec {
    pub shell: String,
    /// When set, the shell runs inside `chroot <host_root>` as root.
    pub host_root: Option<PathBuf>,
    /// Start the shell as a login shell (`-l`).
    pub login: bool,
}

impl ShellSpec {
    pub fn command(&self) -> CommandBuilder {
        let shell = resolve_shell(&self.shell);

        let mut cmd = match &self.host_root {
            Some(root) => {
                let mut cmd = CommandBuilder::new("chroot");
                cmd.arg(root);
                cmd.arg(&shell);
                cmd.env("HOME", "/root");
                cmd.env("USER", "root");
                cmd
            }
            None => {
                let mut cmd = CommandBuilder::new(&shell);
                if let Some(home) = home_dir() {
                    cmd.cwd(home);
                }
                cmd
            }
        };

        if self.login {
            cmd.arg("-l");
        }
        cmd.env("TERM", TERM);
        cmd
    }
}

fn resolve_shell(shell: &str) -> String {
    let shell = shell.trim();
    if shell.is_empty() {
        DEFAULT_SHELL.to_string()
    } else {
        shell.to_string()
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
