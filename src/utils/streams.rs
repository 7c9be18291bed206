// src/utils/streams.rs
use std::process::ExitStatus;
use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;


/// Everything a finished child wrote, plus how it exited.
#[derive(Debug)]
pub struct ChildOutput {
    pub status: ExitStatus,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}


/// Reads stdout and stderr concurrently, so neither pipe can fill up and stall
/// the child, then waits for it to exit.
///
/// # Arguments
///
/// * `child` - Spawned child with stdout and stderr piped.
///
/// # Returns
/// ChildOutput with exit status and captured lines.
pub async fn wait_with_output_lines(mut child: Child) -> Result<ChildOutput> {
    let stdout = child.stdout.take().ok_or_else(|| anyhow!("Child stdout was not piped"))?;
    let stderr = child.stderr.take().ok_or_else(|| anyhow!("Child stderr was not piped"))?;

    let (stdout, stderr) = tokio::try_join!(read_lines(stdout), read_lines(stderr))?;
    let status = child.wait().await?;

    Ok(ChildOutput { status, stdout, stderr })
}


async fn read_lines<R>(reader: R) -> Result<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut lines = LinesStream::new(BufReader::new(reader).lines());
    let mut out = Vec::new();
    while let Some(line) = lines.next().await {
        out.push(line?);
    }
    Ok(out)
}
