use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{
    error::{DriverError, ErrorKind},
    network::*,
};

/// Frames larger than this are refused on receive.
pub const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

#[derive(Serialize, Deserialize, Debug)]
pub enum Msg {
    /// Client Request
    Req(Request),

    /// Server Response
    Ok(Response),
    Err(ErrorReply),
}

/// One driver operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Capabilities,
    CreateNetwork(CreateNetworkRequest),
    DeleteNetwork(DeleteNetworkRequest),
    ListNetworks,
    CreateEndpoint(CreateEndpointRequest),
    Join(JoinRequest),
    Leave(LeaveRequest),
    DeleteEndpoint(DeleteEndpointRequest),
    EndpointInfo(InfoRequest),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Capabilities(Capabilities),
    Networks(Vec<NetworkSummary>),
    Endpoint(CreateEndpointResponse),
    Joined(JoinResponse),
    Info(InfoResponse),
    Done,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorReply {
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        ErrorReply {
            kind,
            message: message.to_string(),
        }
    }
}

impl From<&DriverError> for ErrorReply {
    fn from(e: &DriverError) -> Self {
        ErrorReply::new(e.kind(), &e.to_string())
    }
}

impl fmt::Display for ErrorReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Msg {
    pub async fn send_to(
        self,
        stream: &mut (impl AsyncWriteExt + std::marker::Unpin),
    ) -> tokio::io::Result<()> {
        let msg = bincode::serialize(&self)
            .map_err(|e| tokio::io::Error::new(tokio::io::ErrorKind::InvalidData, e))?;
        let len = (msg.len() as u64).to_le_bytes().to_vec();

        stream.write_all(&len).await?;
        stream.write_all(&msg).await
    }

    pub async fn recv_from(
        stream: &mut (impl AsyncReadExt + std::marker::Unpin),
    ) -> tokio::io::Result<Self> {
        let mut len_buf = [0; 8];
        stream.read_exact(&mut len_buf).await?;

        let buf_len = u64::from_le_bytes(len_buf);
        if buf_len > MAX_FRAME_LEN {
            return Err(tokio::io::Error::new(
                tokio::io::ErrorKind::InvalidData,
                format!("frame of {buf_len} bytes exceeds limit"),
            ));
        }

        let mut buf = vec![0u8; buf_len as usize];
        stream.read_exact(&mut buf).await?;

        bincode::deserialize(&buf)
            .map_err(|e| tokio::io::Error::new(tokio::io::ErrorKind::InvalidData, e))
    }

    pub fn get_req(self) -> Option<Request> {
        match self {
            Msg::Req(request) => Some(request),
            _ => None,
        }
    }
}
