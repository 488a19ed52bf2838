use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collaborator::Collaborator;
use crate::errors::{DatastoreError, Result};
use crate::registration::EntityKind;
use crate::snapshot::{next_arg, parse_arg, OptionArgs, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterfaceType {
    #[default]
    Unknown,
    EthernetDpdkPhy,
    EthernetDpdkVdev,
    EthernetRawsock,
    Gre,
    Nvgre,
    Vxlan,
    VhostUser,
}

impl InterfaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceType::Unknown => "unknown",
            InterfaceType::EthernetDpdkPhy => "ethernet-dpdk-phy",
            InterfaceType::EthernetDpdkVdev => "ethernet-dpdk-vdev",
            InterfaceType::EthernetRawsock => "ethernet-rawsock",
            InterfaceType::Gre => "gre",
            InterfaceType::Nvgre => "nvgre",
            InterfaceType::Vxlan => "vxlan",
            InterfaceType::VhostUser => "vhost-user",
        }
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceType {
    type Err = DatastoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unknown" => Ok(InterfaceType::Unknown),
            "ethernet-dpdk-phy" => Ok(InterfaceType::EthernetDpdkPhy),
            "ethernet-dpdk-vdev" => Ok(InterfaceType::EthernetDpdkVdev),
            "ethernet-rawsock" => Ok(InterfaceType::EthernetRawsock),
            "gre" => Ok(InterfaceType::Gre),
            "nvgre" => Ok(InterfaceType::Nvgre),
            "vxlan" => Ok(InterfaceType::Vxlan),
            "vhost-user" => Ok(InterfaceType::VhostUser),
            other => Err(DatastoreError::InvalidArgs(format!("type = {}", other))),
        }
    }
}

/// Attributes of a physical or virtual interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceAttrs {
    pub interface_type: InterfaceType,
    pub port_number: u32,
    pub device: String,
    pub dst_addr: IpAddr,
    pub dst_port: u16,
    pub src_addr: IpAddr,
    pub src_port: u16,
    pub mtu: u16,
    pub ip_addr: Option<IpAddr>,
}

impl Default for InterfaceAttrs {
    fn default() -> Self {
        Self {
            interface_type: InterfaceType::Unknown,
            port_number: 0,
            device: String::new(),
            dst_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            dst_port: 0,
            src_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            src_port: 0,
            mtu: 1500,
            ip_addr: None,
        }
    }
}

impl Snapshot for InterfaceAttrs {
    fn with_namespace(&self, _namespace: &str) -> Result<Self> {
        Ok(self.clone())
    }

    fn to_options(&self) -> Vec<(&'static str, Vec<String>)> {
        let mut options = vec![
            ("-type", vec![self.interface_type.to_string()]),
            ("-port-number", vec![self.port_number.to_string()]),
            ("-device", vec![self.device.clone()]),
            ("-dst-addr", vec![self.dst_addr.to_string()]),
            ("-dst-port", vec![self.dst_port.to_string()]),
            ("-src-addr", vec![self.src_addr.to_string()]),
            ("-src-port", vec![self.src_port.to_string()]),
            ("-mtu", vec![self.mtu.to_string()]),
        ];
        if let Some(ip_addr) = self.ip_addr {
            options.push(("-ip-addr", vec![ip_addr.to_string()]));
        }
        options
    }

    fn set_option(&mut self, option: &str, args: OptionArgs<'_>) -> Result<()> {
        match option {
            "-type" => self.interface_type = next_arg(option, args)?.parse()?,
            "-port-number" => self.port_number = parse_arg(option, args)?,
            "-device" => self.device = next_arg(option, args)?,
            "-dst-addr" => self.dst_addr = parse_arg(option, args)?,
            "-dst-port" => self.dst_port = parse_arg(option, args)?,
            "-src-addr" => self.src_addr = parse_arg(option, args)?,
            "-src-port" => self.src_port = parse_arg(option, args)?,
            "-mtu" => self.mtu = parse_arg(option, args)?,
            "-ip-addr" => self.ip_addr = Some(parse_arg(option, args)?),
            other => {
                return Err(DatastoreError::InvalidArgs(format!("opt = {}", other)));
            }
        }
        Ok(())
    }
}

/// Interfaces reference nothing; ports claim them.
pub struct InterfaceKind {
    collaborator: Arc<dyn Collaborator<InterfaceAttrs>>,
}

impl InterfaceKind {
    pub fn new(collaborator: Arc<dyn Collaborator<InterfaceAttrs>>) -> Self {
        Self { collaborator }
    }
}

impl EntityKind for InterfaceKind {
    type Attrs = InterfaceAttrs;

    const TYPE_NAME: &'static str = "interface";

    fn collaborator(&self) -> &dyn Collaborator<InterfaceAttrs> {
        self.collaborator.as_ref()
    }
}
