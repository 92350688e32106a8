use std::{path::PathBuf, process::exit, sync::Arc};

use anyhow::Context;
use log::{debug, error, info};
use tokio::{
    net::{UnixListener, UnixStream},
    task,
};

mod cmd;
mod config;
mod error;
mod msg;
pub mod network;

use network::HostNicDriver;

pub use cmd::*;
pub use config::*;
pub use error::*;
pub use msg::*;

async fn run_daemon(args: DaemonArgs, socket: PathBuf) -> anyhow::Result<()> {
    let config = DriverConfig::from(&args);
    let driver = HostNicDriver::open(&config).with_context(|| {
        format!(
            "Failed to initialize driver in {}",
            config.config_dir.display()
        )
    })?;

    // Delete the old socket file
    if socket.exists() {
        std::fs::remove_file(&socket)?;
    }
    if let Some(parent_dir) = socket.parent() {
        std::fs::create_dir_all(parent_dir)?;
    }

    let listener = UnixListener::bind(&socket)?;

    info!(
        "[Daemon]: Daemon is running and listening on {}",
        socket.display()
    );

    serve(listener, Arc::new(driver)).await;

    info!("[Daemon]: Daemon is exiting");
    Ok(())
}

/// Accept loop. Every connection carries one request and its reply.
pub async fn serve(listener: UnixListener, driver: Arc<HostNicDriver>) {
    while let Ok((stream, _addr)) = listener.accept().await {
        debug!("[Daemon]: Accepted client connection");

        let driver = driver.clone();
        task::spawn(async move {
            if let Err(e) = handler(stream, driver).await {
                error!("[Daemon]: Failed to serve client: {e}");
            }
        });
    }
}

async fn handler(mut stream: UnixStream, driver: Arc<HostNicDriver>) -> tokio::io::Result<()> {
    let msg = Msg::recv_from(&mut stream).await?;
    debug!("Received msg: {:?}", msg);

    let reply = match msg.get_req() {
        Some(request) => match dispatch(&driver, request).await {
            Ok(resp) => Msg::Ok(resp),
            Err(e) => {
                error!("Request failed: {e}");
                Msg::Err(ErrorReply::from(&e))
            }
        },
        None => Msg::Err(ErrorReply::new(
            ErrorKind::InvalidInput,
            "Expected a request",
        )),
    };

    debug!("[Daemon]: Task done, daemon disconnected");
    reply.send_to(&mut stream).await
}

pub async fn dispatch(driver: &HostNicDriver, request: Request) -> Result<Response> {
    let resp = match request {
        Request::Capabilities => Response::Capabilities(driver.capabilities().await),
        Request::CreateNetwork(req) => {
            driver.create_network(req).await?;
            Response::Done
        }
        Request::DeleteNetwork(req) => {
            driver.delete_network(req).await?;
            Response::Done
        }
        Request::ListNetworks => Response::Networks(driver.list_networks().await),
        Request::CreateEndpoint(req) => Response::Endpoint(driver.create_endpoint(req).await?),
        Request::Join(req) => Response::Joined(driver.join(req).await?),
        Request::Leave(req) => {
            driver.leave(req).await?;
            Response::Done
        }
        Request::DeleteEndpoint(req) => {
            driver.delete_endpoint(req).await?;
            Response::Done
        }
        Request::EndpointInfo(req) => Response::Info(driver.endpoint_info(req).await?),
    };

    Ok(resp)
}

pub fn daemon(args: DaemonArgs, socket: PathBuf) {
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")
        .and_then(|rt| rt.block_on(run_daemon(args, socket)));

    if let Err(e) = result {
        error!("Fatal: {e:#}");
        exit(1);
    }
}
