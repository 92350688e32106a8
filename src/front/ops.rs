use std::io::Write;

use tabwriter::TabWriter;

use crate::core::{
    network::{CreateEndpointResponse, InfoResponse, JoinResponse, NetworkSummary},
    ErrorKind, ErrorReply, Msg, Response,
};

/// Text shown to the user for a daemon reply.
pub fn render_reply(msg: Msg) -> Result<String, ErrorReply> {
    match msg {
        Msg::Ok(resp) => Ok(render_response(resp)),
        Msg::Err(e) => Err(e),
        Msg::Req(_) => Err(ErrorReply::new(
            ErrorKind::InvalidInput,
            "Unexpected response from daemon",
        )),
    }
}

fn render_response(resp: Response) -> String {
    match resp {
        Response::Capabilities(caps) => format!("Scope: {:?}", caps.scope),
        Response::Networks(networks) => render_networks(&networks),
        Response::Endpoint(created) => render_created(&created),
        Response::Joined(joined) => render_joined(&joined),
        Response::Info(info) => render_info(&info),
        Response::Done => String::new(),
    }
}

fn render_networks(networks: &[NetworkSummary]) -> String {
    let mut tw = TabWriter::new(vec![]);
    let _ = tw.write_all(b"ID\tGATEWAY\tPOOL\tADDRESS SPACE\tENDPOINTS\n");

    for nw in networks {
        let _ = writeln!(
            tw,
            "{}\t{}\t{}\t{}\t{}",
            nw.id, nw.gateway, nw.pool, nw.address_space, nw.endpoints
        );
    }

    flush(tw)
}

fn render_created(created: &CreateEndpointResponse) -> String {
    let mut lines = Vec::new();
    if let Some(address) = &created.interface.address {
        lines.push(format!("Address: {address}"));
    }
    if let Some(mac) = &created.interface.mac_address {
        lines.push(format!("MacAddress: {mac}"));
    }
    lines.join("\n")
}

fn render_joined(joined: &JoinResponse) -> String {
    format!(
        "SrcName: {}\nDstPrefix: {}\nGateway: {}",
        joined.interface_name.src_name, joined.interface_name.dst_prefix, joined.gateway
    )
}

fn render_info(info: &InfoResponse) -> String {
    let mut tw = TabWriter::new(vec![]);
    for (key, value) in &info.value {
        let _ = writeln!(tw, "{key}\t{value}");
    }

    flush(tw)
}

fn flush(mut tw: TabWriter<Vec<u8>>) -> String {
    let _ = tw.flush();
    tw.into_inner()
        .map(|bytes| String::from_utf8_lossy(&bytes).trim_end().to_string())
        .unwrap_or_default()
}
