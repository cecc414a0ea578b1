//! Translation collaborator process.
//!
//! When `collaborator.command` is set, the server launches it next to the
//! HTTP listener with `WS_URL` pointing at the bridge, and mirrors its
//! stdout/stderr into the log. The process is killed when the server exits.
//! It is not restarted if it dies.

use anyhow::Context;
use std::process::Stdio;
use tandem_common::config::CollaboratorConfig;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Launch the configured collaborator, if any.
///
/// The returned task resolves to the process exit code once it stops.
pub fn launch(
    config: &CollaboratorConfig,
    bridge_url: &str,
) -> anyhow::Result<Option<JoinHandle<Option<i32>>>> {
    let Some(program) = &config.command else {
        return Ok(None);
    };

    let mut child = Command::new(program)
        .args(&config.args)
        .env("WS_URL", bridge_url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to launch collaborator `{program}`"))?;

    tracing::info!(
        program = %program,
        pid = child.id(),
        ws_url = %bridge_url,
        "Translation collaborator launched"
    );

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(mirror(stdout, false));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(mirror(stderr, true));
    }

    Ok(Some(tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                tracing::info!(code = ?status.code(), "Translation collaborator exited");
                status.code()
            }
            Err(e) => {
                tracing::error!(error = %e, "Lost track of translation collaborator");
                None
            }
        }
    })))
}

async fn mirror<R: AsyncRead + Unpin>(stream: R, is_stderr: bool) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            tracing::warn!(target: "tandem_server::collaborator::stderr", "{line}");
        } else {
            tracing::info!(target: "tandem_server::collaborator::stdout", "{line}");
        }
    }
}
