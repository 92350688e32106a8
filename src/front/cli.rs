use std::path::{Path, PathBuf};

use anyhow::Context;
use log::debug;
use tokio::net::UnixStream;

use super::ops::render_reply;
use crate::core::{Msg, Request};

async fn run_client(socket: &Path, request: Request) -> anyhow::Result<Msg> {
    // Connect to the daemon
    let mut stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("Failed to connect to daemon at {}", socket.display()))?;
    debug!("[Client]: Connected to daemon");

    Msg::Req(request).send_to(&mut stream).await?;
    let reply = Msg::recv_from(&mut stream)
        .await
        .context("Failed to recv msg from daemon")?;
    debug!("[Client] msg: {:?}", reply);

    Ok(reply)
}

/// Send one request and print the outcome. Returns whether it succeeded.
pub fn client(socket: PathBuf, request: Request) -> bool {
    let reply = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")
        .and_then(|rt| rt.block_on(run_client(&socket, request)));

    match reply.map(render_reply) {
        Ok(Ok(output)) => {
            if !output.is_empty() {
                println!("{output}");
            }
            true
        }
        Ok(Err(e)) => {
            eprintln!("Error: {e}");
            false
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            false
        }
    }
}
