//! UCI engine client over a child process.

use super::{AgentMove, MoveAgent, SearchOptions};
use crate::error::AgentError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace};

struct UciIo {
    // Held so the process is killed when the engine is dropped.
    _child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    // A `go` whose `bestmove` has not been read yet.
    searching: bool,
}

/// A UCI chess engine running as a child process.
pub struct UciEngine {
    name: String,
    pick_rank: Option<usize>,
    io: Mutex<UciIo>,
}

impl std::fmt::Debug for UciEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UciEngine")
            .field("name", &self.name)
            .field("pick_rank", &self.pick_rank)
            .finish()
    }
}

impl UciEngine {
    /// Starts the engine at `path` and completes the `uci` handshake.
    ///
    /// With `pick_rank = Some(n)` the n-th ranked line (1-based) is offered as
    /// the pick move.
    #[instrument(skip(name, path), fields(engine = %name.as_ref(), path = %path.as_ref().display()))]
    pub async fn spawn(
        name: impl AsRef<str>,
        path: impl AsRef<Path>,
        pick_rank: Option<usize>,
    ) -> Result<Self, AgentError> {
        let name = name.as_ref().to_string();
        let mut child = Command::new(path.as_ref())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::new(&name, format!("Failed to spawn engine: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::new(&name, "engine stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::new(&name, "engine stdout unavailable"))?;

        let engine = Self {
            name,
            pick_rank,
            io: Mutex::new(UciIo {
                _child: child,
                stdin,
                lines: BufReader::new(stdout).lines(),
                searching: false,
            }),
        };

        {
            let mut io = engine.io.lock().await;
            engine.send(&mut io, "uci").await?;
            engine.read_until(&mut io, |line| line == "uciok").await?;
        }
        info!(engine = %engine.name, "UCI engine ready");
        Ok(engine)
    }

    async fn send(&self, io: &mut UciIo, command: &str) -> Result<(), AgentError> {
        trace!(engine = %self.name, command, "uci >");
        io.stdin
            .write_all(format!("{}\n", command).as_bytes())
            .await
            .map_err(|e| AgentError::new(&self.name, format!("write failed: {}", e)))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| AgentError::new(&self.name, format!("flush failed: {}", e)))
    }

    /// Reads lines up to and including the first one matching `done`.
    async fn read_until(
        &self,
        io: &mut UciIo,
        done: impl Fn(&str) -> bool,
    ) -> Result<Vec<String>, AgentError> {
        let mut seen = Vec::new();
        loop {
            let line = io
                .lines
                .next_line()
                .await
                .map_err(|e| AgentError::new(&self.name, format!("read failed: {}", e)))?
                .ok_or_else(|| AgentError::new(&self.name, "engine closed its output"))?;
            trace!(engine = %self.name, line = %line, "uci <");
            let finished = done(line.trim());
            seen.push(line);
            if finished {
                return Ok(seen);
            }
        }
    }

    /// Stops a search abandoned by a cancelled `go` and discards its
    /// `bestmove`, so the next answer belongs to the next request.
    async fn settle(&self, io: &mut UciIo) -> Result<(), AgentError> {
        if !io.searching {
            return Ok(());
        }
        debug!(engine = %self.name, "stopping abandoned search");
        self.send(io, "stop").await?;
        self.read_until(io, |line| line.starts_with("bestmove")).await?;
        io.searching = false;
        Ok(())
    }

    async fn is_ready(&self, io: &mut UciIo) -> Result<(), AgentError> {
        self.send(io, "isready").await?;
        self.read_until(io, |line| line == "readyok").await?;
        Ok(())
    }
}

#[async_trait]
impl MoveAgent for UciEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn position(&self, fen: &str) -> Result<(), AgentError> {
        let mut io = self.io.lock().await;
        self.settle(&mut io).await?;
        self.send(&mut io, &format!("position fen {}", fen)).await
    }

    #[instrument(skip(self, fen), fields(engine = %self.name))]
    async fn go(&self, options: &SearchOptions, fen: &str) -> Result<AgentMove, AgentError> {
        let mut io = self.io.lock().await;
        self.settle(&mut io).await?;
        if options.multi_pv > 1 {
            self.send(&mut io, &format!("setoption name MultiPV value {}", options.multi_pv))
                .await?;
        }
        self.send(&mut io, &format!("go depth {}", options.depth)).await?;
        io.searching = true;
        let output = self
            .read_until(&mut io, |line| line.starts_with("bestmove"))
            .await?;
        io.searching = false;

        let bestmove = output
            .last()
            .and_then(|line| parse_bestmove(line))
            .ok_or_else(|| AgentError::new(&self.name, format!("no move for {}", fen)))?;

        // Later info lines come from deeper iterations.
        let mut lines = BTreeMap::new();
        for line in &output {
            if let Some((rank, first)) = parse_info_pv(line) {
                lines.insert(rank, first);
            }
        }
        let ranked: Vec<String> = lines.into_values().collect();
        let pickmove = self
            .pick_rank
            .and_then(|rank| rank.checked_sub(1))
            .and_then(|index| ranked.get(index).cloned());

        debug!(%bestmove, ?pickmove, lines = ranked.len(), "engine answered");
        Ok(AgentMove {
            bestmove,
            pickmove,
            ranked,
        })
    }

    async fn new_game(&self, options: &HashMap<String, String>) -> Result<(), AgentError> {
        let mut io = self.io.lock().await;
        self.settle(&mut io).await?;
        self.send(&mut io, "ucinewgame").await?;
        for (name, value) in options {
            self.send(&mut io, &format!("setoption name {} value {}", name, value))
                .await?;
        }
        self.is_ready(&mut io).await
    }
}

/// Move from a `bestmove` line; `None` when the engine has no move.
pub fn parse_bestmove(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "bestmove" {
        return None;
    }
    match tokens.next()? {
        "(none)" | "0000" => None,
        mv => Some(mv.to_string()),
    }
}

/// Line rank and first move of an `info ... pv` line.
///
/// Lines without `multipv` are rank 1.
pub fn parse_info_pv(line: &str) -> Option<(usize, String)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first() != Some(&"info") {
        return None;
    }
    let rank = tokens
        .iter()
        .position(|&t| t == "multipv")
        .and_then(|i| tokens.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let first = tokens
        .iter()
        .position(|&t| t == "pv")
        .and_then(|i| tokens.get(i + 1))?;
    Some((rank, first.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::START_FEN;
    use std::time::Duration;

    /// Engine that searches until stopped on its first `go` and answers the
    /// second one with `d2d4`.
    #[cfg(unix)]
    const SLOW_FIRST_SEARCH: &str = r#"#!/bin/sh
searches=0
while read -r line; do
    case "$line" in
        uci) echo "id name slow"; echo "uciok" ;;
        isready) echo "readyok" ;;
        stop) echo "bestmove e2e4" ;;
        go*)
            searches=$((searches + 1))
            if [ "$searches" -gt 1 ]; then
                echo "info depth 1 multipv 1 pv d2d4"
                echo "bestmove d2d4"
            fi
            ;;
    esac
done
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancelled_search_does_not_answer_next_request() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("slow-engine.sh");
        std::fs::write(&path, SLOW_FIRST_SEARCH).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = UciEngine::spawn("slow", &path, None).await.unwrap();
        let options = SearchOptions {
            depth: 1,
            multi_pv: 1,
        };
        engine.position(START_FEN).await.unwrap();
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), engine.go(&options, START_FEN)).await;
        assert!(abandoned.is_err());

        engine.position(START_FEN).await.unwrap();
        let answer = engine.go(&options, START_FEN).await.unwrap();
        assert_eq!(answer.bestmove, "d2d4");
        assert_eq!(answer.ranked, ["d2d4"]);
    }

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(parse_bestmove("bestmove e2e4 ponder e7e5"), Some("e2e4".to_string()));
        assert_eq!(parse_bestmove("bestmove a7a8q"), Some("a7a8q".to_string()));
        assert_eq!(parse_bestmove("bestmove (none)"), None);
        assert_eq!(parse_bestmove("info depth 1"), None);
    }

    #[test]
    fn test_parse_info_pv() {
        let line = "info depth 1 seldepth 1 multipv 3 score cp 20 nodes 20 pv g1f3 g8f6";
        assert_eq!(parse_info_pv(line), Some((3, "g1f3".to_string())));
        assert_eq!(
            parse_info_pv("info depth 5 score cp 30 pv d2d4"),
            Some((1, "d2d4".to_string()))
        );
        assert_eq!(parse_info_pv("info string NNUE enabled"), None);
        assert_eq!(parse_info_pv("bestmove e2e4"), None);
    }
}
