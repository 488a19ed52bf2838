use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collaborator::Collaborator;
use crate::errors::{DatastoreError, Result};
use crate::registration::EntityKind;
use crate::snapshot::{next_arg, parse_arg, OptionArgs, Snapshot};

/// Default OpenFlow controller port.
pub const DEFAULT_DST_PORT: u16 = 6633;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelProtocol {
    #[default]
    Unknown,
    Tcp,
    Tls,
}

impl fmt::Display for ChannelProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelProtocol::Unknown => "unknown",
            ChannelProtocol::Tcp => "tcp",
            ChannelProtocol::Tls => "tls",
        })
    }
}

impl FromStr for ChannelProtocol {
    type Err = DatastoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unknown" => Ok(ChannelProtocol::Unknown),
            "tcp" => Ok(ChannelProtocol::Tcp),
            "tls" => Ok(ChannelProtocol::Tls),
            other => Err(DatastoreError::InvalidArgs(format!("protocol = {}", other))),
        }
    }
}

/// Attributes of a controller channel (the transport to one controller).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAttrs {
    pub dst_addr: IpAddr,
    pub dst_port: u16,
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub protocol: ChannelProtocol,
}

impl Default for ChannelAttrs {
    fn default() -> Self {
        Self {
            dst_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            dst_port: DEFAULT_DST_PORT,
            local_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_port: 0,
            protocol: ChannelProtocol::Unknown,
        }
    }
}

impl Snapshot for ChannelAttrs {
    fn with_namespace(&self, _namespace: &str) -> Result<Self> {
        Ok(self.clone())
    }

    fn to_options(&self) -> Vec<(&'static str, Vec<String>)> {
        vec![
            ("-dst-addr", vec![self.dst_addr.to_string()]),
            ("-dst-port", vec![self.dst_port.to_string()]),
            ("-local-addr", vec![self.local_addr.to_string()]),
            ("-local-port", vec![self.local_port.to_string()]),
            ("-protocol", vec![self.protocol.to_string()]),
        ]
    }

    fn set_option(&mut self, option: &str, args: OptionArgs<'_>) -> Result<()> {
        match option {
            "-dst-addr" => self.dst_addr = parse_arg(option, args)?,
            "-dst-port" => self.dst_port = parse_arg(option, args)?,
            "-local-addr" => self.local_addr = parse_arg(option, args)?,
            "-local-port" => self.local_port = parse_arg(option, args)?,
            "-protocol" => self.protocol = next_arg(option, args)?.parse()?,
            other => {
                return Err(DatastoreError::InvalidArgs(format!("opt = {}", other)));
            }
        }
        Ok(())
    }
}

pub struct ChannelKind {
    collaborator: Arc<dyn Collaborator<ChannelAttrs>>,
}

impl ChannelKind {
    pub fn new(collaborator: Arc<dyn Collaborator<ChannelAttrs>>) -> Self {
        Self { collaborator }
    }
}

impl EntityKind for ChannelKind {
    type Attrs = ChannelAttrs;

    const TYPE_NAME: &'static str = "channel";

    fn collaborator(&self) -> &dyn Collaborator<ChannelAttrs> {
        self.collaborator.as_ref()
    }
}
