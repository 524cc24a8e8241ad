//! Post-apply hook execution

use crate::profile::PostApplyHook;
use crate::util::safe_join;
use std::path::Path;
use std::process::Command;

/// Run a profile's post-apply hook
///
/// Commands run through `sh -c`; scripts are resolved relative to the
/// profiles directory and may not leave it. The hook runs in `working_dir`.
///
/// # Errors
/// Returns a message describing why the hook could not run or how it failed
pub fn run_hook(hook: &PostApplyHook, profiles_root: &Path, working_dir: &Path) -> Result<(), String> {
    let mut cmd = match (&hook.command, &hook.script) {
        (Some(command), None) => {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
        (None, Some(script)) => {
            let path = safe_join(profiles_root, Path::new(script)).map_err(|e| e.to_string())?;
            if !path.is_file() {
                return Err(format!("script not found: {}", path.display()));
            }
            let mut cmd = Command::new("sh");
            cmd.arg(path);
            cmd
        }
        _ => return Err("hook needs exactly one of 'command' or 'script'".to_string()),
    };

    tracing::info!(dir = %working_dir.display(), "running post-apply hook");
    let output = cmd
        .current_dir(working_dir)
        .output()
        .map_err(|e| format!("failed to start: {e}"))?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
    let tail: Vec<&str> = tail.into_iter().rev().collect();
    Err(match output.status.code() {
        Some(code) if tail.is_empty() => format!("exited with status {code}"),
        Some(code) => format!("exited with status {code}: {}", tail.join("\n")),
        None => "terminated by signal".to_string(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::profile::HookCondition;
    use std::fs;
    use tempfile::TempDir;

    fn command(cmd: &str) -> PostApplyHook {
        PostApplyHook {
            command: Some(cmd.into()),
            script: None,
            condition: HookCondition::Always,
        }
    }

    #[test]
    fn test_command_runs_in_working_dir() {
        let temp = TempDir::new().unwrap();
        run_hook(&command("touch marker"), temp.path(), temp.path()).unwrap();
        assert!(temp.path().join("marker").exists());
    }

    #[test]
    fn test_failure_reports_status_and_stderr() {
        let temp = TempDir::new().unwrap();
        let err = run_hook(&command("echo nope >&2; exit 3"), temp.path(), temp.path()).unwrap_err();
        assert!(err.contains("status 3"));
        assert!(err.contains("nope"));
    }

    #[test]
    fn test_script_relative_to_profiles_root() {
        let temp = TempDir::new().unwrap();
        let profiles = temp.path().join("profiles");
        fs::create_dir_all(profiles.join("hooks")).unwrap();
        fs::write(profiles.join("hooks/setup.sh"), "touch from-script\n").unwrap();

        let hook = PostApplyHook {
            command: None,
            script: Some("hooks/setup.sh".into()),
            condition: HookCondition::Always,
        };
        run_hook(&hook, &profiles, temp.path()).unwrap();
        assert!(temp.path().join("from-script").exists());

        let escape = PostApplyHook {
            script: Some("../outside.sh".into()),
            ..hook
        };
        assert!(run_hook(&escape, &profiles, temp.path()).is_err());
    }
}
