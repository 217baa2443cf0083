//! Ephemeral TLS identity for the plugin process.
//!
//! Each process start mints a fresh key pair and a self-signed certificate
//! scoped to that one process: the host receives the exact certificate
//! bytes through the handshake line and pins them as its trust anchor
//! (trust-on-first-use). Nothing here touches disk.
//!
//! The certificate carries both client-auth and server-auth extended key
//! usages and CA:true so the same bytes can serve as the plugin's leaf
//! certificate in either TLS role *and* as the host's trusted root for the
//! connection. Hosts expect exactly this dual role.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::Rng;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
};
use time::{Duration, OffsetDateTime};

/// Clock-skew tolerance: the certificate backdates its validity so a host
/// with a slightly behind clock still accepts it.
const NOT_BEFORE_SKEW: Duration = Duration::seconds(30);

/// Validity ahead of generation time. Deliberately short - the certificate
/// is single-use and never reused across restarts. The literal value is
/// part of the established plugin protocol.
const VALIDITY: Duration = Duration::days(3);

/// DNS name the certificate binds to; plugins only ever listen on loopback.
const LOOPBACK_DNS: &str = "localhost";

/// Fresh key pair and self-signed certificate for one process lifetime.
///
/// Holds both PEM (for TLS credential assembly) and DER (for the handshake
/// line) renderings, plus the validity bounds used at generation time.
pub struct ServerIdentity {
    cert_pem: String,
    cert_der: Vec<u8>,
    key_pem: String,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl ServerIdentity {
    /// Certificate in PEM encoding.
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Certificate in DER encoding (the bytes the host pins).
    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    /// Private key in PKCS#8 PEM encoding. Never persist this.
    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    /// Start of the validity window (generation time minus skew margin).
    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    /// End of the validity window.
    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }
}

/// Generate the process's TLS identity.
///
/// ECDSA P-256 with SHA-256 self-signature. Subject and issuer are the
/// same fixed name (CN=localhost), the serial number is random per call,
/// and the validity window straddles "now" by [`NOT_BEFORE_SKEW`].
pub fn generate_identity() -> crate::Result<ServerIdentity> {
    let key = KeyPair::generate()?;
    let params = identity_params()?;
    let not_before = params.not_before;
    let not_after = params.not_after;

    let cert = params.self_signed(&key)?;

    Ok(ServerIdentity {
        cert_pem: cert.pem(),
        cert_der: cert.der().to_vec(),
        key_pem: key.serialize_pem(),
        not_before,
        not_after,
    })
}

/// Encode certificate DER bytes for the handshake line.
///
/// Standard base64, padding retained, ASCII output. Decoding reproduces
/// the DER bytes exactly.
pub fn encode_certificate(der: &[u8]) -> String {
    BASE64.encode(der)
}

fn identity_params() -> Result<CertificateParams, rcgen::Error> {
    let now = OffsetDateTime::now_utc();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, "US");
    dn.push(DnType::StateOrProvinceName, "California");
    dn.push(DnType::LocalityName, "San Francisco");
    dn.push(DnType::OrganizationName, "rpcplugin");
    dn.push(DnType::CommonName, LOOPBACK_DNS);

    // Subject alternative name: DNS "localhost"
    let mut params = CertificateParams::new(vec![LOOPBACK_DNS.to_string()])?;
    params.distinguished_name = dn;
    params.serial_number = Some(random_serial());
    params.not_before = now - NOT_BEFORE_SKEW;
    params.not_after = now + VALIDITY;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::KeyCertSign,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::ServerAuth,
    ];
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

    Ok(params)
}

fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes[..]);
    // Keep the DER integer positive
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rcgen::SanType;

    #[test]
    fn validity_window_straddles_now() {
        let identity = generate_identity().unwrap();
        let now = OffsetDateTime::now_utc();
        assert!(identity.not_before() <= now);
        assert!(now <= identity.not_after());
    }

    #[test]
    fn validity_window_is_three_days_plus_skew() {
        let identity = generate_identity().unwrap();
        assert_eq!(
            identity.not_after() - identity.not_before(),
            VALIDITY + NOT_BEFORE_SKEW
        );
    }

    #[test]
    fn params_enable_dual_role_trust() {
        let params = identity_params().unwrap();
        assert!(matches!(
            params.is_ca,
            IsCa::Ca(BasicConstraints::Unconstrained)
        ));
        assert!(params
            .extended_key_usages
            .contains(&ExtendedKeyUsagePurpose::ClientAuth));
        assert!(params
            .extended_key_usages
            .contains(&ExtendedKeyUsagePurpose::ServerAuth));
        assert!(params.key_usages.contains(&KeyUsagePurpose::DigitalSignature));
        assert!(params.key_usages.contains(&KeyUsagePurpose::KeyEncipherment));
        assert!(params.key_usages.contains(&KeyUsagePurpose::KeyCertSign));
    }

    #[test]
    fn san_is_localhost() {
        let params = identity_params().unwrap();
        assert_eq!(
            params.subject_alt_names,
            vec![SanType::DnsName(LOOPBACK_DNS.try_into().unwrap())]
        );
    }

    #[test]
    fn serial_is_fresh_per_generation() {
        let a = identity_params().unwrap();
        let b = identity_params().unwrap();
        assert_ne!(a.serial_number, b.serial_number);
    }

    #[test]
    fn identities_are_unique() {
        let a = generate_identity().unwrap();
        let b = generate_identity().unwrap();
        assert_ne!(a.cert_der(), b.cert_der());
        assert_ne!(a.key_pem(), b.key_pem());
    }

    #[test]
    fn encoding_round_trips() {
        let identity = generate_identity().unwrap();
        let encoded = encode_certificate(identity.cert_der());
        assert!(encoded.is_ascii());
        let decoded = BASE64.decode(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, identity.cert_der());
    }

    #[test]
    fn pem_and_der_describe_the_same_certificate() {
        let identity = generate_identity().unwrap();
        let pem_body: String = identity
            .cert_pem()
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect();
        let from_pem = BASE64.decode(pem_body.as_bytes()).unwrap();
        assert_eq!(from_pem, identity.cert_der());
    }
}
