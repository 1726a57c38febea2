//! Запуск внешних программ (ffmpeg, ffprobe, yt-dlp)

use std::ffi::OsStr;
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use log::debug;
use tokio::process::Command;

/// Сколько последних строк stderr попадает в сообщение об ошибке
const STDERR_TAIL_LINES: usize = 8;

/// Запускает программу и возвращает ее stdout.
///
/// Процесс завершается при отмене future (таймаут или отмена задачи).
pub async fn run_tool<I, S>(program: &str, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running {:?}", command.as_std());

    let output = command
        .output()
        .await
        .with_context(|| format!("failed to start {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr_tail(&stderr)
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail() {
        let stderr = (1..=20).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 13"));
        assert!(tail.ends_with("line 20"));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let err = run_tool("definitely-not-a-real-tool-7f3a", ["--version"]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("failed to start"));
    }
}
