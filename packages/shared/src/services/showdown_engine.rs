use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::services::battle_bridge::{BattleEngine, BattleProcess};
use crate::services::errors::battle_errors::BattleError;
use crate::services::showdown_protocol::ChunkAssembler;

const CHANNEL_CAPACITY: usize = 64;

/// Runs the simulator as a child process speaking the line protocol on
/// stdin/stdout, e.g. `node pokemon-showdown simulate-battle`.
#[derive(Debug, Clone)]
pub struct ShowdownProcessEngine {
    program: String,
    args: Vec<String>,
}

impl ShowdownProcessEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        ShowdownProcessEngine {
            program: program.into(),
            args,
        }
    }

    pub fn from_command_line(command: &str) -> Result<Self, BattleError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| BattleError::Spawn("empty battle engine command".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl BattleEngine for ShowdownProcessEngine {
    async fn spawn(&self) -> Result<BattleProcess, BattleError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BattleError::Spawn(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BattleError::Spawn("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BattleError::Spawn("child stdout unavailable".to_string()))?;

        let (input_tx, mut input_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (output_tx, output_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(line) = input_rx.recv().await {
                let mut bytes = line.into_bytes();
                bytes.push(b'\n');
                if let Err(e) = stdin.write_all(&bytes).await {
                    warn!(error = %e, "Battle engine stdin closed");
                    break;
                }
            }
            let _ = stdin.shutdown().await;
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut assembler = ChunkAssembler::default();
            let drained = loop {
                let line = tokio::select! {
                    line = lines.next_line() => line,
                    _ = output_tx.closed() => break false,
                };
                match line {
                    Ok(Some(line)) => {
                        if let Some(chunk) = assembler.push(&line) {
                            if output_tx.send(chunk).await.is_err() {
                                break false;
                            }
                        }
                    }
                    Ok(None) => break true,
                    Err(e) => {
                        warn!(error = %e, "Battle engine stdout failed");
                        break false;
                    }
                }
            };

            if !drained {
                debug!("Battle output dropped, stopping engine");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Battle engine kill failed");
                }
                return;
            }
            if let Some(chunk) = assembler.finish() {
                let _ = output_tx.send(chunk).await;
            }
            match child.wait().await {
                Ok(status) => debug!(%status, "Battle engine exited"),
                Err(e) => warn!(error = %e, "Battle engine wait failed"),
            }
        });

        Ok(BattleProcess {
            input: input_tx,
            output: output_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_is_split_into_program_and_args() {
        let engine =
            ShowdownProcessEngine::from_command_line("node pokemon-showdown simulate-battle")
                .unwrap();
        assert_eq!(engine.program, "node");
        assert_eq!(engine.args, vec!["pokemon-showdown", "simulate-battle"]);
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(matches!(
            ShowdownProcessEngine::from_command_line("   "),
            Err(BattleError::Spawn(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropping_the_output_stops_a_silent_engine() {
        let engine = ShowdownProcessEngine::new(
            "sh",
            vec!["-c".to_string(), "echo $$; echo; exec sleep 47".to_string()],
        );
        let mut process = engine.spawn().await.unwrap();
        let pid: u32 = process.output.recv().await.unwrap().trim().parse().unwrap();
        let proc_dir = format!("/proc/{}", pid);
        assert!(std::path::Path::new(&proc_dir).exists());

        drop(process);

        let mut gone = false;
        for _ in 0..100 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            if !std::path::Path::new(&proc_dir).exists() {
                gone = true;
                break;
            }
        }
        assert!(gone, "engine process {} still running", pid);
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let engine = ShowdownProcessEngine::new("definitely-not-a-battle-engine-binary", vec![]);
        assert!(matches!(engine.spawn().await, Err(BattleError::Spawn(_))));
    }
}
