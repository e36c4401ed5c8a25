//! Pattern synthesis through the external `grex` tool.

use anyhow::{Context, Result, bail};
use sitesep_core::PatternSynthesizer;
use std::process::Command;

const INSTALL_HINT: &str = "https://github.com/pemistahl/grex#how-to-install";

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Create a Command that hides the console window on Windows.
fn hidden_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Runs `grex -- <hostnames...>` and uses its output as the rule pattern.
#[derive(Debug, Clone)]
pub struct GrexSynthesizer {
    program: String,
}

impl Default for GrexSynthesizer {
    fn default() -> Self {
        Self::new("grex")
    }
}

impl GrexSynthesizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Fail early when the tool is not installed.
    pub fn check_available(&self) -> Result<()> {
        let output = hidden_command(&self.program)
            .arg("--version")
            .output()
            .with_context(|| format!("'{}' not found, install it from {}", self.program, INSTALL_HINT))?;

        let version = String::from_utf8_lossy(&output.stdout);
        tracing::debug!("Using {}", version.trim());
        Ok(())
    }
}

impl PatternSynthesizer for GrexSynthesizer {
    fn synthesize(&self, hostnames: &[String]) -> Result<String> {
        let output = hidden_command(&self.program)
            .arg("--")
            .args(hostnames)
            .output()
            .with_context(|| format!("Failed to run '{}', install it from {}", self.program, INSTALL_HINT))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let pattern = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!("{} hostnames -> {}", hostnames.len(), pattern);
        Ok(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesep_core::{CasePolicy, CompileOptions, LocationRecord, SiteSepError, compile};

    #[test]
    fn test_missing_program() {
        let grex = GrexSynthesizer::new("sitesep-no-such-grex");

        assert!(grex.check_available().is_err());
        let err = grex.synthesize(&["web01".to_string()]).unwrap_err();
        assert!(err.to_string().contains(INSTALL_HINT));
    }

    #[test]
    fn test_missing_program_aborts_compile() {
        let grex = GrexSynthesizer::new("sitesep-no-such-grex");
        let records = vec![LocationRecord::new("web01", "NYC")];

        let err = compile(&records, &CompileOptions::synthesized(CasePolicy::Uppercase), Some(&grex))
            .unwrap_err();

        assert!(matches!(err, SiteSepError::PatternSynthesis { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_is_trimmed() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-grex");
        let mut file = std::fs::File::create(&script).unwrap();
        writeln!(file, "#!/bin/sh\nshift\necho \"^(?:$1|$2)$\"").unwrap();
        drop(file);
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let grex = GrexSynthesizer::new(script.to_string_lossy());
        let pattern = grex
            .synthesize(&["WEB01".to_string(), "WEB02".to_string()])
            .unwrap();

        assert_eq!(pattern, "^(?:WEB01|WEB02)$");
    }
}
