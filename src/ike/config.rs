//! Responder configuration
//!
//! A plain struct with a validating builder. Loading from file or
//! environment belongs to the embedding application; only the values the
//! IKE core itself consumes live here.

use std::net::{Ipv4Addr, SocketAddrV4};

use rsa::RsaPrivateKey;

use super::dpd::DpdConfig;
use super::{Error, Result};

/// Everything the IKE responder needs to run
#[derive(Clone)]
pub struct N3iwfConfig {
    /// Responder identity, sent as ID_FQDN
    pub fqdn: String,

    /// Responder X.509 leaf certificate, DER
    pub certificate: Vec<u8>,

    /// Operator CA certificate (DER) for CERTREQ matching, when provisioned
    pub ca_certificate: Option<Vec<u8>>,

    /// RSA key matching `certificate`
    pub private_key: RsaPrivateKey,

    /// Address and port the IKE UDP socket binds to
    pub ike_bind_addr: SocketAddrV4,

    /// Inner IPsec gateway address (N3IWF side of the tunnels)
    pub ipsec_gateway: Ipv4Addr,

    /// Inner IPsec subnet UE addresses come from
    pub ipsec_subnet: Ipv4Addr,

    /// Prefix length of `ipsec_subnet`
    pub ipsec_prefix: u8,

    /// Inner TCP port for NAS signalling (NAS_TCP_PORT notify)
    pub nas_tcp_port: u16,

    /// XFRM interface base name
    pub xfrm_iface_name: String,

    /// Parent device XFRM interfaces hang off
    pub xfrm_parent_iface: String,

    /// Default XFRM interface id; user-plane interfaces count up from here
    pub xfrm_iface_id: u32,

    /// Dead peer detection tuning
    pub dpd: DpdConfig,
}

impl N3iwfConfig {
    /// Start building a configuration
    pub fn builder() -> N3iwfConfigBuilder {
        N3iwfConfigBuilder::default()
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.fqdn.is_empty() {
            return Err(Error::InvalidConfig("fqdn cannot be empty".into()));
        }
        if self.certificate.is_empty() {
            return Err(Error::InvalidConfig("responder certificate is required".into()));
        }
        if self.ipsec_prefix == 0 || self.ipsec_prefix >= 31 {
            return Err(Error::InvalidConfig(format!(
                "unusable IPsec prefix length /{}",
                self.ipsec_prefix
            )));
        }
        let mask = u32::MAX << (32 - self.ipsec_prefix);
        if u32::from(self.ipsec_gateway) & mask != u32::from(self.ipsec_subnet) & mask {
            return Err(Error::InvalidConfig(
                "IPsec gateway lies outside the IPsec subnet".into(),
            ));
        }
        if self.nas_tcp_port == 0 {
            return Err(Error::InvalidConfig("NAS TCP port cannot be zero".into()));
        }
        if self.xfrm_iface_name.is_empty() || self.xfrm_parent_iface.is_empty() {
            return Err(Error::InvalidConfig("XFRM interface names are required".into()));
        }
        Ok(())
    }
}

/// Builder for [`N3iwfConfig`]
#[derive(Default)]
pub struct N3iwfConfigBuilder {
    fqdn: Option<String>,
    certificate: Option<Vec<u8>>,
    ca_certificate: Option<Vec<u8>>,
    private_key: Option<RsaPrivateKey>,
    ike_bind_addr: Option<SocketAddrV4>,
    ipsec_gateway: Option<Ipv4Addr>,
    ipsec_subnet: Option<(Ipv4Addr, u8)>,
    nas_tcp_port: Option<u16>,
    xfrm_iface_name: Option<String>,
    xfrm_parent_iface: Option<String>,
    xfrm_iface_id: Option<u32>,
    dpd: Option<DpdConfig>,
}

impl N3iwfConfigBuilder {
    /// Responder FQDN identity
    pub fn with_fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.fqdn = Some(fqdn.into());
        self
    }

    /// Responder certificate (DER)
    pub fn with_certificate(mut self, der: Vec<u8>) -> Self {
        self.certificate = Some(der);
        self
    }

    /// Operator CA certificate (DER)
    pub fn with_ca_certificate(mut self, der: Vec<u8>) -> Self {
        self.ca_certificate = Some(der);
        self
    }

    /// Responder RSA private key
    pub fn with_private_key(mut self, key: RsaPrivateKey) -> Self {
        self.private_key = Some(key);
        self
    }

    /// IKE UDP bind address
    pub fn with_ike_bind_addr(mut self, addr: SocketAddrV4) -> Self {
        self.ike_bind_addr = Some(addr);
        self
    }

    /// Inner gateway address
    pub fn with_ipsec_gateway(mut self, addr: Ipv4Addr) -> Self {
        self.ipsec_gateway = Some(addr);
        self
    }

    /// Inner subnet and prefix
    pub fn with_ipsec_subnet(mut self, subnet: Ipv4Addr, prefix: u8) -> Self {
        self.ipsec_subnet = Some((subnet, prefix));
        self
    }

    /// Inner NAS TCP port
    pub fn with_nas_tcp_port(mut self, port: u16) -> Self {
        self.nas_tcp_port = Some(port);
        self
    }

    /// XFRM interface naming and id base
    pub fn with_xfrm_iface(
        mut self,
        name: impl Into<String>,
        parent: impl Into<String>,
        id: u32,
    ) -> Self {
        self.xfrm_iface_name = Some(name.into());
        self.xfrm_parent_iface = Some(parent.into());
        self.xfrm_iface_id = Some(id);
        self
    }

    /// DPD tuning
    pub fn with_dpd(mut self, dpd: DpdConfig) -> Self {
        self.dpd = Some(dpd);
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<N3iwfConfig> {
        let (ipsec_subnet, ipsec_prefix) = self
            .ipsec_subnet
            .ok_or_else(|| Error::InvalidConfig("IPsec subnet is required".into()))?;
        let config = N3iwfConfig {
            fqdn: self
                .fqdn
                .ok_or_else(|| Error::InvalidConfig("fqdn is required".into()))?,
            certificate: self
                .certificate
                .ok_or_else(|| Error::InvalidConfig("certificate is required".into()))?,
            ca_certificate: self.ca_certificate,
            private_key: self
                .private_key
                .ok_or_else(|| Error::InvalidConfig("private key is required".into()))?,
            ike_bind_addr: self.ike_bind_addr.unwrap_or_else(|| {
                SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, super::constants::IKE_PORT)
            }),
            ipsec_gateway: self
                .ipsec_gateway
                .ok_or_else(|| Error::InvalidConfig("IPsec gateway is required".into()))?,
            ipsec_subnet,
            ipsec_prefix,
            nas_tcp_port: self.nas_tcp_port.unwrap_or(20000),
            xfrm_iface_name: self.xfrm_iface_name.unwrap_or_else(|| "ipsec".into()),
            xfrm_parent_iface: self.xfrm_parent_iface.unwrap_or_else(|| "eth0".into()),
            xfrm_iface_id: self.xfrm_iface_id.unwrap_or(7),
            dpd: self.dpd.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("generate RSA key")
    }

    fn valid_builder() -> N3iwfConfigBuilder {
        N3iwfConfig::builder()
            .with_fqdn("n3iwf.operator.example")
            .with_certificate(vec![0x30, 0x82])
            .with_private_key(test_key())
            .with_ipsec_gateway(Ipv4Addr::new(10, 0, 0, 1))
            .with_ipsec_subnet(Ipv4Addr::new(10, 0, 0, 0), 24)
    }

    #[test]
    fn test_builder_defaults() {
        let config = valid_builder().build().unwrap();
        assert_eq!(config.ike_bind_addr.port(), 500);
        assert_eq!(config.xfrm_iface_name, "ipsec");
        assert_eq!(config.xfrm_iface_id, 7);
        assert!(config.dpd.enabled);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let result = N3iwfConfig::builder()
            .with_fqdn("n3iwf.operator.example")
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_gateway_outside_subnet_rejected() {
        let result = valid_builder()
            .with_ipsec_gateway(Ipv4Addr::new(192, 168, 5, 1))
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_fqdn_rejected() {
        let result = valid_builder().with_fqdn("").build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
