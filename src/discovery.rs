/*! Radio discovery.

Enumerates HPSDR radios reachable from any up, non-loopback IPv4
interface, plus an optional fixed target address. Protocol 1 radios
answer a 63-byte `EF FE 02` probe, Protocol 2 radios a 60-byte
`00 00 00 00 02` probe, both on UDP port 1024. Some P1 radios also
accept TCP; for those a 1032-byte probe is sent over a connection
attempted with a 3-second timeout.

Replies are collected for two seconds per pass and deduplicated by MAC
address.
*/
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream, UdpSocket};
use std::time::Duration;

use log::{debug, info, warn};

use crate::Result;

/// UDP/TCP port radios listen on for probes.
pub const DISCOVERY_PORT: u16 = 1024;

/// How long one receive pass waits for stragglers.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(2);

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Wire protocol spoken by a discovered radio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// HPSDR protocol 1 ("old"), 48 kHz base rate.
    P1,
    /// HPSDR protocol 2 ("new"), 192 kHz DUC.
    P2,
    /// SoapySDR device.
    Soapy,
}

/// Hardware kind codes. Protocol 2 boards are `1000 + board id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceKind(pub u16);

#[allow(missing_docs)]
impl DeviceKind {
    pub const METIS: DeviceKind = DeviceKind(0);
    pub const HERMES: DeviceKind = DeviceKind(1);
    pub const GRIFFIN: DeviceKind = DeviceKind(2);
    pub const ANGELIA: DeviceKind = DeviceKind(4);
    pub const ORION: DeviceKind = DeviceKind(5);
    pub const HERMES_LITE: DeviceKind = DeviceKind(6);
    pub const ORION2: DeviceKind = DeviceKind(10);
    pub const STEMLAB: DeviceKind = DeviceKind(100);
    pub const STEMLAB_Z20: DeviceKind = DeviceKind(101);
    pub const HERMES_LITE2: DeviceKind = DeviceKind(1006);
    pub const NEW_ATLAS: DeviceKind = DeviceKind(1000);
    pub const NEW_HERMES: DeviceKind = DeviceKind(1001);
    pub const NEW_HERMES2: DeviceKind = DeviceKind(1002);
    pub const NEW_ANGELIA: DeviceKind = DeviceKind(1003);
    pub const NEW_ORION: DeviceKind = DeviceKind(1004);
    pub const NEW_ORION2: DeviceKind = DeviceKind(1005);
    pub const NEW_HERMES_LITE: DeviceKind = DeviceKind(1006);
    pub const NEW_HERMES_LITE2: DeviceKind = DeviceKind(1007);
    pub const NEW_SATURN: DeviceKind = DeviceKind(1012);
}

/// One discovered radio. Immutable once selected.
#[derive(Clone, Debug)]
pub struct Discovered {
    /// Wire protocol.
    pub protocol: Protocol,
    /// Hardware kind.
    pub device: DeviceKind,
    /// Human-readable board name.
    pub name: String,
    /// Firmware version. HermesLite carries `10·major + minor`.
    pub software_version: u16,
    /// 2 = idle, 3 = already sending to someone.
    pub status: u8,
    /// MAC address, the dedup key.
    pub mac: [u8; 6],
    /// Network endpoint to talk to.
    pub address: SocketAddr,
    /// Interface the reply came in on.
    pub interface_name: String,
    /// Our address on that interface.
    pub interface_addr: Ipv4Addr,
    /// Netmask on that interface.
    pub interface_netmask: Ipv4Addr,
    /// Talk TCP instead of UDP.
    pub use_tcp: bool,
    /// Reached via a routed (directed) probe, not broadcast.
    pub use_routing: bool,
    /// Receivers the board can run.
    pub supported_receivers: u8,
    /// Lower edge of the tuning range, Hz.
    pub frequency_min: f64,
    /// Upper edge of the tuning range, Hz.
    pub frequency_max: f64,
}

impl Discovered {
    /// Whether this radio can actually be started from here: both
    /// sides link-local, or reached by a routed probe, or on our
    /// subnet.
    #[must_use]
    pub fn startable(&self) -> bool {
        let radio_ip = match self.address {
            SocketAddr::V4(a) => *a.ip(),
            SocketAddr::V6(_) => return false,
        };
        let ll = |ip: Ipv4Addr| ip.octets()[0] == 169 && ip.octets()[1] == 254;
        if ll(radio_ip) || ll(self.interface_addr) {
            return true;
        }
        if self.use_routing {
            return true;
        }
        let m = u32::from(self.interface_netmask);
        (u32::from(radio_ip) & m) == (u32::from(self.interface_addr) & m)
    }
}

/// What to probe and how.
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    /// Fixed radio address to probe first; broadcast is skipped if it
    /// answers.
    pub target: Option<Ipv4Addr>,
    /// Also try TCP towards the fixed target.
    pub enable_tcp: bool,
    /// Send protocol 1 probes.
    pub protocol1: bool,
    /// Send protocol 2 probes.
    pub protocol2: bool,
    /// Probe port, 1024 for real radios. Tests point this at an
    /// emulator.
    pub port: u16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            target: None,
            enable_tcp: false,
            protocol1: true,
            protocol2: true,
            port: DISCOVERY_PORT,
        }
    }
}

/// Protocol 1 probe payload: 63 bytes.
#[must_use]
pub fn p1_probe() -> [u8; 63] {
    let mut b = [0u8; 63];
    b[0] = 0xEF;
    b[1] = 0xFE;
    b[2] = 0x02;
    b
}

/// Protocol 2 probe payload: 60 bytes.
#[must_use]
pub fn p2_probe() -> [u8; 60] {
    let mut b = [0u8; 60];
    b[4] = 0x02;
    b
}

/// Protocol 1 probe payload for TCP: padded to a full 1032-byte frame.
#[must_use]
pub fn p1_tcp_probe() -> [u8; 1032] {
    let mut b = [0u8; 1032];
    b[0] = 0xEF;
    b[1] = 0xFE;
    b[2] = 0x02;
    b
}

/// The interface a probe goes out on (and a reply arrives on).
#[derive(Clone, Debug)]
pub struct Interface {
    /// Interface name, or "UDP"/"TCP" for directed probes.
    pub name: String,
    /// Our IPv4 address.
    pub addr: Ipv4Addr,
    /// Its netmask.
    pub netmask: Ipv4Addr,
}

fn directed_iface() -> Interface {
    Interface {
        name: "UDP".to_string(),
        addr: Ipv4Addr::UNSPECIFIED,
        netmask: Ipv4Addr::UNSPECIFIED,
    }
}

/// Parse one discovery reply datagram. Returns None for noise.
#[must_use]
pub fn parse_reply(buf: &[u8], from: SocketAddr, iface: &Interface) -> Option<Discovered> {
    if buf.len() >= 24 && buf[0] == 0xEF && buf[1] == 0xFE {
        parse_p1_reply(buf, from, iface)
    } else if buf.len() >= 24 && (buf[4] == 0x02 || buf[4] == 0x03) {
        parse_p2_reply(buf, from, iface)
    } else {
        None
    }
}

fn parse_p1_reply(buf: &[u8], from: SocketAddr, iface: &Interface) -> Option<Discovered> {
    let status = buf[2];
    if status != 2 && status != 3 {
        return None;
    }
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&buf[3..9]);
    let mut device = DeviceKind(u16::from(buf[10]));
    let mut software_version = u16::from(buf[9]);
    let (name, frequency_max) = match device {
        DeviceKind::METIS => ("Metis", 61_440_000.0),
        DeviceKind::HERMES => ("Hermes", 61_440_000.0),
        DeviceKind::GRIFFIN => ("Griffin", 61_440_000.0),
        DeviceKind::ANGELIA => ("Angelia", 61_440_000.0),
        DeviceKind::ORION => ("Orion", 61_440_000.0),
        DeviceKind::ORION2 => ("Orion2", 61_440_000.0),
        DeviceKind::STEMLAB => ("STEMlab", 61_440_000.0),
        DeviceKind::STEMLAB_Z20 => ("STEMlab-Zync7020", 61_440_000.0),
        DeviceKind::HERMES_LITE => {
            // HermesLite V2 keeps the V1 id but reports a gateware
            // version of 40 or above; the minor version rides in
            // byte 21, so 73.2 arrives as 732.
            software_version = 10 * u16::from(buf[9]) + u16::from(buf[21]);
            if software_version < 400 {
                ("HermesLite V1", 38_400_000.0)
            } else {
                device = DeviceKind::HERMES_LITE2;
                ("HermesLite V2", 38_400_000.0)
            }
        }
        _ => ("Unknown", 61_440_000.0),
    };
    debug!(
        "discovery: P1 device={} version={software_version} status={status} at {from} on {}",
        device.0, iface.name
    );
    Some(Discovered {
        protocol: Protocol::P1,
        device,
        name: name.to_string(),
        software_version,
        status,
        mac,
        address: from,
        interface_name: iface.name.clone(),
        interface_addr: iface.addr,
        interface_netmask: iface.netmask,
        use_tcp: false,
        use_routing: false,
        supported_receivers: 2,
        frequency_min: 0.0,
        frequency_max,
    })
}

fn parse_p2_reply(buf: &[u8], from: SocketAddr, iface: &Interface) -> Option<Discovered> {
    let status = buf[4];
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&buf[5..11]);
    // Board ids are small; the protocol-2 device space is 1000+id.
    let mut device = DeviceKind(1000 + u16::from(buf[11]));
    let software_version = u16::from(buf[13]);
    let beta = buf[23];
    let (name, frequency_max) = match device {
        DeviceKind::NEW_ATLAS => ("Atlas", 61_440_000.0),
        DeviceKind::NEW_HERMES => ("Hermes", 61_440_000.0),
        DeviceKind::NEW_HERMES2 => ("Hermes2", 61_440_000.0),
        DeviceKind::NEW_ANGELIA => ("Angelia", 61_440_000.0),
        DeviceKind::NEW_ORION => ("Orion", 61_440_000.0),
        DeviceKind::NEW_ORION2 => ("Orion2", 61_440_000.0),
        DeviceKind::NEW_SATURN => ("Saturn/G2", 61_440_000.0),
        DeviceKind::NEW_HERMES_LITE => {
            if software_version < 40 {
                ("HermesLite V1", 30_720_000.0)
            } else {
                device = DeviceKind::NEW_HERMES_LITE2;
                ("HermesLite V2", 30_720_000.0)
            }
        }
        _ => ("Unknown", 30_720_000.0),
    };
    if beta != 0 {
        info!("discovery: P2 {name} runs beta firmware {software_version}.{beta}");
    }
    Some(Discovered {
        protocol: Protocol::P2,
        device,
        name: name.to_string(),
        software_version,
        status,
        mac,
        address: from,
        interface_name: iface.name.clone(),
        interface_addr: iface.addr,
        interface_netmask: iface.netmask,
        use_tcp: false,
        use_routing: false,
        supported_receivers: 2,
        frequency_min: 0.0,
        frequency_max,
    })
}

fn push_dedup(list: &mut Vec<Discovered>, d: Discovered) {
    if list.iter().any(|e| e.mac == d.mac) {
        debug!("discovery: duplicate reply from {:02x?}", d.mac);
        return;
    }
    info!(
        "discovery: found {} version={} at {} ({:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}) on {} range {:.3}..{:.3} MHz",
        d.name,
        d.software_version,
        d.address,
        d.mac[0],
        d.mac[1],
        d.mac[2],
        d.mac[3],
        d.mac[4],
        d.mac[5],
        d.interface_name,
        d.frequency_min * 1e-6,
        d.frequency_max * 1e-6
    );
    list.push(d);
}

/// Run one receive pass on the socket, collecting replies until the
/// timeout lapses. For a directed probe one valid answer ends the
/// pass early.
fn receive_pass(socket: &UdpSocket, iface: &Interface, directed: bool, list: &mut Vec<Discovered>) {
    if let Err(e) = socket.set_read_timeout(Some(RECEIVE_TIMEOUT)) {
        warn!("discovery: set_read_timeout: {e}");
        return;
    }
    let before = list.len();
    let mut buf = [0u8; 2048];
    loop {
        if directed && list.len() > before {
            return;
        }
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                debug!("discovery: received {n} bytes from {from}");
                if let Some(d) = parse_reply(&buf[..n], from, iface) {
                    push_dedup(list, d);
                }
            }
            Err(_) => return,
        }
    }
}

fn send_probes(socket: &UdpSocket, to: SocketAddr, cfg: &DiscoveryConfig) {
    if cfg.protocol1 {
        if let Err(e) = socket.send_to(&p1_probe(), to) {
            warn!("discovery: P1 probe to {to}: {e}");
        }
    }
    if cfg.protocol2 {
        if let Err(e) = socket.send_to(&p2_probe(), to) {
            warn!("discovery: P2 probe to {to}: {e}");
        }
    }
}

fn discover_directed(cfg: &DiscoveryConfig, target: Ipv4Addr, list: &mut Vec<Discovered>) {
    let to = SocketAddr::V4(SocketAddrV4::new(target, cfg.port));
    info!("discovery: probing fixed address {to}");
    let socket = match UdpSocket::bind(("0.0.0.0", 0)) {
        Ok(s) => s,
        Err(e) => {
            warn!("discovery: bind failed: {e}");
            return;
        }
    };
    let before = list.len();
    send_probes(&socket, to, cfg);
    receive_pass(&socket, &directed_iface(), true, list);
    if list.len() == before + 1 {
        // The directed answer wins; mark it routed so the
        // startability check passes without a shared subnet.
        let d = &mut list[before];
        d.address = to;
        d.use_routing = true;
    }
}

fn discover_tcp(cfg: &DiscoveryConfig, target: Ipv4Addr, list: &mut Vec<Discovered>) {
    use std::io::{Read, Write};
    let to = SocketAddr::V4(SocketAddrV4::new(target, cfg.port));
    info!("discovery: probing {to} over TCP");
    let mut stream = match TcpStream::connect_timeout(&to, TCP_CONNECT_TIMEOUT) {
        Ok(s) => s,
        Err(e) => {
            info!("discovery: TCP connect to {to} failed: {e}");
            return;
        }
    };
    if let Err(e) = stream.write_all(&p1_tcp_probe()) {
        warn!("discovery: TCP probe write: {e}");
        return;
    }
    let _ = stream.set_read_timeout(Some(RECEIVE_TIMEOUT));
    let mut buf = [0u8; 2048];
    let iface = Interface {
        name: "TCP".to_string(),
        addr: Ipv4Addr::UNSPECIFIED,
        netmask: Ipv4Addr::UNSPECIFIED,
    };
    if let Ok(n) = stream.read(&mut buf)
        && n >= 24
        && let Some(mut d) = parse_reply(&buf[..n], to, &iface)
    {
        d.use_tcp = true;
        d.use_routing = true;
        push_dedup(list, d);
    }
}

#[cfg(target_os = "linux")]
fn eligible_interfaces() -> Vec<Interface> {
    use nix::ifaddrs::getifaddrs;
    use nix::net::if_::InterfaceFlags;
    let mut out = Vec::new();
    let addrs = match getifaddrs() {
        Ok(a) => a,
        Err(e) => {
            warn!("discovery: getifaddrs: {e}");
            return out;
        }
    };
    for ifa in addrs {
        // Virtual bridges are very unlikely to offer a radio; loopback
        // stays in because RadioBerry-style drivers answer there.
        let flags = ifa.flags;
        if !flags.contains(InterfaceFlags::IFF_UP) || !flags.contains(InterfaceFlags::IFF_RUNNING) {
            continue;
        }
        if ["veth", "dock", "hass"]
            .iter()
            .any(|p| ifa.interface_name.starts_with(p))
        {
            continue;
        }
        let (Some(addr), Some(mask)) = (&ifa.address, &ifa.netmask) else {
            continue;
        };
        let (Some(sin), Some(sin_mask)) = (addr.as_sockaddr_in(), mask.as_sockaddr_in()) else {
            continue;
        };
        out.push(Interface {
            name: ifa.interface_name.clone(),
            addr: sin.ip(),
            netmask: sin_mask.ip(),
        });
    }
    out
}

#[cfg(not(target_os = "linux"))]
fn eligible_interfaces() -> Vec<Interface> {
    Vec::new()
}

fn discover_broadcast(cfg: &DiscoveryConfig, list: &mut Vec<Discovered>) {
    for iface in eligible_interfaces() {
        info!("discovery: probing on {} ({})", iface.name, iface.addr);
        let socket = match UdpSocket::bind((iface.addr, 0)) {
            Ok(s) => s,
            Err(e) => {
                warn!("discovery: bind to {} failed: {e}", iface.addr);
                continue;
            }
        };
        if let Err(e) = socket.set_broadcast(true) {
            warn!("discovery: cannot enable broadcast on {}: {e}", iface.name);
            continue;
        }
        let to = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, cfg.port));
        send_probes(&socket, to, cfg);
        receive_pass(&socket, &iface, false, list);
    }
}

/// Enumerate radios reachable right now.
pub fn discover(cfg: &DiscoveryConfig) -> Result<Vec<Discovered>> {
    let mut list = Vec::new();
    if let Some(target) = cfg.target {
        discover_directed(cfg, target, &mut list);
        if cfg.enable_tcp {
            discover_tcp(cfg, target, &mut list);
        }
        // A directed hit means that is the radio we want.
        if !list.is_empty() {
            return Ok(list);
        }
    }
    discover_broadcast(cfg, &mut list);
    info!("discovery: found {} device(s)", list.len());
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_iface() -> Interface {
        Interface {
            name: "lo".to_string(),
            addr: Ipv4Addr::new(127, 0, 0, 1),
            netmask: Ipv4Addr::new(255, 0, 0, 0),
        }
    }

    fn p1_reply(device: u8, version: u8, minor: u8) -> Vec<u8> {
        let mut b = vec![0u8; 60];
        b[0] = 0xEF;
        b[1] = 0xFE;
        b[2] = 0x02;
        b[3..9].copy_from_slice(&[0x00, 0x1C, 0xC0, 0xA2, 0x13, 0x01]);
        b[9] = version;
        b[10] = device;
        b[21] = minor;
        b
    }

    #[test]
    fn hermes_lite_v2_by_version_threshold() {
        let from: SocketAddr = "127.0.0.1:1024".parse().unwrap();
        let d = parse_reply(&p1_reply(0x06, 40, 0), from, &test_iface()).unwrap();
        assert_eq!(d.name, "HermesLite V2");
        assert_eq!(d.protocol, Protocol::P1);
        assert_eq!(d.device, DeviceKind::HERMES_LITE2);
        assert_eq!(d.software_version, 400);
        assert_eq!(d.frequency_min, 0.0);
        assert_eq!(d.frequency_max, 38_400_000.0);
    }

    #[test]
    fn hermes_lite_v1_below_threshold() {
        let from: SocketAddr = "127.0.0.1:1024".parse().unwrap();
        let d = parse_reply(&p1_reply(0x06, 31, 0), from, &test_iface()).unwrap();
        assert_eq!(d.name, "HermesLite V1");
        assert_eq!(d.device, DeviceKind::HERMES_LITE);
        assert_eq!(d.software_version, 310);
    }

    #[test]
    fn p2_board_id_space() {
        let from: SocketAddr = "192.168.1.22:1024".parse().unwrap();
        let mut b = vec![0u8; 60];
        b[4] = 0x02;
        b[5..11].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        b[11] = 12; // Saturn
        b[13] = 21;
        b[23] = 18;
        let d = parse_reply(&b, from, &test_iface()).unwrap();
        assert_eq!(d.protocol, Protocol::P2);
        assert_eq!(d.device, DeviceKind::NEW_SATURN);
        assert_eq!(d.name, "Saturn/G2");
        assert_eq!(d.software_version, 21);
    }

    #[test]
    fn noise_is_ignored() {
        let from: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert!(parse_reply(&[0u8; 60], from, &test_iface()).is_none());
        assert!(parse_reply(&[0xEF, 0xFE, 0x07], from, &test_iface()).is_none());
    }

    #[test]
    fn startable_rules() {
        let from: SocketAddr = "192.168.1.22:1024".parse().unwrap();
        let mut d = parse_reply(&p1_reply(0x01, 33, 0), from, &test_iface()).unwrap();
        // 127.0.0.1/8 does not cover 192.168.1.22.
        assert!(!d.startable());
        d.use_routing = true;
        assert!(d.startable());
        d.use_routing = false;
        d.interface_addr = Ipv4Addr::new(192, 168, 1, 2);
        d.interface_netmask = Ipv4Addr::new(255, 255, 255, 0);
        assert!(d.startable());
        // Link-local always wins.
        d.interface_addr = Ipv4Addr::new(169, 254, 17, 5);
        d.interface_netmask = Ipv4Addr::new(255, 255, 0, 0);
        assert!(d.startable());
    }

    #[test]
    fn loopback_emulator_roundtrip() {
        // A canned HermesLite V2 answering the P1 probe on loopback.
        let emulator = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = emulator.local_addr().unwrap().port();
        let handle = std::thread::Builder::new()
            .name("radio emulator".to_string())
            .spawn(move || {
                let mut buf = [0u8; 128];
                loop {
                    let (n, from) = emulator.recv_from(&mut buf).unwrap();
                    if n == 63 && buf[0] == 0xEF && buf[1] == 0xFE && buf[2] == 0x02 {
                        emulator.send_to(&p1_reply(0x06, 40, 0), from).unwrap();
                        return;
                    }
                }
            })
            .unwrap();
        let cfg = DiscoveryConfig {
            target: Some(Ipv4Addr::new(127, 0, 0, 1)),
            enable_tcp: false,
            protocol1: true,
            protocol2: false,
            port,
        };
        let found = discover(&cfg).unwrap();
        handle.join().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "HermesLite V2");
        assert_eq!(found[0].protocol, Protocol::P1);
        assert_eq!(found[0].frequency_max, 38_400_000.0);
        assert!(found[0].use_routing);
        assert!(found[0].startable());
    }
}
/* vim: textwidth=80
 */
