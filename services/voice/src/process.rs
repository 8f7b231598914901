use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// An external program plus fixed leading arguments, resolved once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalCommand {
    /// Parse a whitespace separated command line and make sure the program
    /// exists.
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let name = parts.next().context("Empty command")?;
        let program =
            find_program(&name).with_context(|| format!("Program not found: {}", name))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Base command with stdin closed, stderr discarded and the child killed
    /// when its handle is dropped.
    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

/// Paths are taken as given; bare names are looked up on `PATH`.
pub fn find_program(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn absolute_paths_are_checked_directly() -> Result<()> {
        let dir = tempdir()?;
        let program = dir.path().join("recognizer");
        std::fs::write(&program, "#!/bin/sh\n")?;

        assert_eq!(find_program(program.to_str().unwrap()), Some(program.clone()));
        assert_eq!(find_program(dir.path().join("missing").to_str().unwrap()), None);
        Ok(())
    }

    #[test]
    fn parse_splits_program_and_arguments() -> Result<()> {
        let dir = tempdir()?;
        let program = dir.path().join("say");
        std::fs::write(&program, "#!/bin/sh\n")?;

        let command = ExternalCommand::parse(&format!("{}  -v en  --fast", program.display()))?;

        assert_eq!(command.program(), program.as_path());
        assert_eq!(command.args(), ["-v".to_string(), "en".to_string(), "--fast".to_string()]);
        Ok(())
    }

    #[test]
    fn parse_rejects_empty_and_unknown_commands() {
        assert!(ExternalCommand::parse("   ").is_err());
        assert!(ExternalCommand::parse("definitely-not-an-installed-program-4f2a").is_err());
    }
}
