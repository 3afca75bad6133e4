use joblib::types::Owner;
use tonic::{Request, Status};
use x509_parser::{certificate::X509Certificate, traits::FromDer};

/// A tonic interceptor service function.
///
/// Derives the caller's identity from the serial number of the client certificate and adds it to
/// the request extensions. The TLS layer has already verified the chain against the client CA.
pub fn extract_owner(mut req: Request<()>) -> Result<Request<()>, Status> {
    // extract the client certs
    let client_certs = req
        .peer_certs()
        .ok_or_else(|| Status::unauthenticated("Request missing client cert"))?;
    let leaf = client_certs
        .first()
        .ok_or_else(|| Status::unauthenticated("Request missing client cert"))?;

    // rustls hands over the DER encoding of the cert
    let owner = owner_from_der(leaf.get_ref())?;
    req.extensions_mut().insert(UserExtension { owner });
    Ok(req)
}

/// Parse a DER certificate and return its serial number as an owner identity.
pub fn owner_from_der(der: &[u8]) -> Result<Owner, Status> {
    let (rem, cert) =
        X509Certificate::from_der(der).map_err(|_| Status::unauthenticated("Bad client cert"))?;
    if !rem.is_empty() {
        return Err(Status::unauthenticated("Bad client cert: trailing data"));
    }
    Ok(Owner::from_bytes_be(cert.tbs_certificate.raw_serial()))
}

#[derive(Clone, Debug)]
pub struct UserExtension {
    pub owner: Owner,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_peer_certs_is_rejected() {
        let status = extract_owner(Request::new(())).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn garbage_der_is_rejected() {
        let status = owner_from_der(&[0x30, 0x03, 0x01, 0x02]).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }
}
