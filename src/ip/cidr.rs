//! IPv4 CIDR 网段

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct Cidr {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Cidr {
    /// 主机位会被清零，`10.1.2.3/8` 等价于 `10.0.0.0/8`。
    ///
    /// # Panics
    /// 前缀长度大于 32 时 panic。
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Cidr {
        assert!(prefix_len <= 32, "prefix length {prefix_len} > 32");
        let network = Ipv4Addr::from_bits(address.to_bits() & Self::mask(prefix_len));
        Cidr {
            network,
            prefix_len,
        }
    }

    /// 解析 `x.y.z.w/n`；不带 `/n` 视为 `/32`。
    pub fn parse(s: &str) -> Result<Cidr, ConfigError> {
        let invalid = || ConfigError::InvalidCidr(s.to_string());
        let (addr, len) = match s.split_once('/') {
            Some((a, l)) => (a, l.parse::<u8>().map_err(|_| invalid())?),
            None => (s, 32),
        };
        if len > 32 {
            return Err(invalid());
        }
        let addr = Ipv4Addr::from_str(addr.trim()).map_err(|_| invalid())?;
        Ok(Cidr::new(addr, len))
    }

    pub const fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(Self::mask(self.prefix_len))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        addr.to_bits() & Self::mask(self.prefix_len) == self.network.to_bits()
    }

    fn mask(prefix_len: u8) -> u32 {
        // 右移 32 位不合法，/0 单独处理
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_len))
        }
    }
}

impl FromStr for Cidr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cidr::parse(s)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}
