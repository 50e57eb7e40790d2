//! Réponses HTTPU reçues en retour d'un M-SEARCH

use std::net::SocketAddr;

use tracing::trace;
use url::Url;

use crate::errors::{Result, SsdpError};

/// Réponse SSDP (ligne de statut + en-têtes) reçue d'un device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpResponse {
    version: String,
    status_code: u16,
    reason: String,
    /// En-têtes dans l'ordre de réception, noms d'origine conservés
    headers: Vec<(String, String)>,
    from: SocketAddr,
}

impl SsdpResponse {
    /// Construit une réponse à partir de ses composants
    pub fn new(status_code: u16, reason: &str, from: SocketAddr) -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status_code,
            reason: reason.to_string(),
            headers: Vec::new(),
            from,
        }
    }

    /// Ajoute un en-tête (builder)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Parse un datagramme HTTPU
    ///
    /// Le parsing s'arrête à la première ligne vide ; un éventuel corps est ignoré.
    pub fn parse(data: &[u8], from: SocketAddr) -> Result<Self> {
        let text = String::from_utf8_lossy(data);
        let mut lines = text.lines();

        let status_line = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| SsdpError::malformed_response("empty datagram"))?;

        // Les espaces multiples entre les champs sont tolérés
        let (version, rest) = status_line
            .split_once(char::is_whitespace)
            .unwrap_or((status_line, ""));
        let rest = rest.trim_start();
        let (code, reason) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if !version.to_ascii_uppercase().starts_with("HTTP/") {
            return Err(SsdpError::MalformedResponse(format!(
                "not a response: {}",
                status_line
            )));
        }
        let status_code = code.parse::<u16>().map_err(|_| {
            SsdpError::MalformedResponse(format!("bad status line: {}", status_line))
        })?;
        let reason = reason.trim().to_string();

        Ok(Self {
            version: version.to_string(),
            status_code,
            reason,
            headers: parse_headers(lines),
            from,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// `"200 OK"`, `"404 Not Found"`...
    pub fn status(&self) -> String {
        if self.reason.is_empty() {
            self.status_code.to_string()
        } else {
            format!("{} {}", self.status_code, self.reason)
        }
    }

    /// Adresse de l'émetteur du datagramme
    pub fn sender(&self) -> SocketAddr {
        self.from
    }

    /// Première valeur de l'en-tête `name` (insensible à la casse)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// En-tête `ST`, vide s'il est absent
    pub fn st(&self) -> &str {
        self.header("ST").unwrap_or_default()
    }

    /// En-tête `USN`, `None` s'il est absent ou vide
    pub fn usn(&self) -> Option<&str> {
        self.header("USN").filter(|usn| !usn.is_empty())
    }

    /// Valeur brute de l'en-tête `LOCATION`, `None` s'il est absent ou vide
    pub fn raw_location(&self) -> Option<&str> {
        self.header("LOCATION")
            .map(str::trim)
            .filter(|loc| !loc.is_empty())
    }

    /// URL de description du device, issue de l'en-tête `LOCATION`
    ///
    /// Une référence relative (`/description.xml`) est résolue par rapport à
    /// `http://<émetteur>/`. Seule une référence impossible à analyser est refusée.
    pub fn location(&self) -> Result<Url> {
        let raw = self.raw_location().ok_or(SsdpError::NoLocation)?;
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = Url::parse(&format!("http://{}/", self.from))
                    .map_err(|e| SsdpError::invalid_location(raw, e))?;
                base.join(raw)
                    .map_err(|e| SsdpError::invalid_location(raw, e))
            }
            Err(e) => Err(SsdpError::invalid_location(raw, e)),
        }
    }
}

fn parse_headers<'a, I>(lines: I) -> Vec<(String, String)>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim();

        if line.is_empty() {
            break;
        }

        // Split on first ':' only (values may contain ':')
        match line.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
            _ => trace!("Skipping malformed header: '{}'", line),
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from() -> SocketAddr {
        "192.168.1.20:1900".parse().unwrap()
    }

    const RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
        CACHE-CONTROL: max-age=1800\r\n\
        EXT:\r\n\
        Location: http://192.168.1.20:49152/description.xml\r\n\
        SERVER: Linux/5.10 UPnP/1.0 Test/1.0\r\n\
        st: upnp:rootdevice\r\n\
        USN: uuid:abc::upnp:rootdevice\r\n\
        \r\n";

    #[test]
    fn test_parse_search_response() {
        let resp = SsdpResponse::parse(RESPONSE.as_bytes(), from()).unwrap();
        assert_eq!(resp.status_code(), 200);
        assert_eq!(resp.status(), "200 OK");
        assert_eq!(resp.st(), "upnp:rootdevice");
        assert_eq!(resp.usn(), Some("uuid:abc::upnp:rootdevice"));
        assert_eq!(resp.header("ext"), Some(""));
        assert_eq!(resp.sender(), from());
        assert_eq!(
            resp.location().unwrap().as_str(),
            "http://192.168.1.20:49152/description.xml"
        );
    }

    #[test]
    fn test_header_names_keep_original_casing() {
        let resp = SsdpResponse::parse(RESPONSE.as_bytes(), from()).unwrap();
        let names: Vec<&str> = resp.headers().map(|(n, _)| n).collect();
        assert!(names.contains(&"Location"));
        assert!(names.contains(&"st"));
    }

    #[test]
    fn test_first_header_occurrence_wins() {
        let data = b"HTTP/1.1 200 OK\r\nST: first\r\nST: second\r\n\r\n";
        let resp = SsdpResponse::parse(data, from()).unwrap();
        assert_eq!(resp.st(), "first");
    }

    #[test]
    fn test_value_with_colons() {
        let data = b"HTTP/1.1 200 OK\r\nUSN: uuid:1234::urn:schemas-upnp-org:device:Basic:1\r\n\r\n";
        let resp = SsdpResponse::parse(data, from()).unwrap();
        assert_eq!(
            resp.usn(),
            Some("uuid:1234::urn:schemas-upnp-org:device:Basic:1")
        );
    }

    #[test]
    fn test_reject_requests_and_garbage() {
        assert!(SsdpResponse::parse(b"", from()).is_err());
        assert!(SsdpResponse::parse(b"M-SEARCH * HTTP/1.1\r\n\r\n", from()).is_err());
        assert!(SsdpResponse::parse(b"HTTP/1.1 abc OK\r\n\r\n", from()).is_err());
        assert!(SsdpResponse::parse(b"HTTP/1.1\r\n\r\n", from()).is_err());
    }

    #[test]
    fn test_status_line_with_extra_spaces() {
        let resp = SsdpResponse::parse(b"HTTP/1.1  200  OK\r\nST: a\r\n\r\n", from()).unwrap();
        assert_eq!(resp.version(), "HTTP/1.1");
        assert_eq!(resp.status_code(), 200);
        assert_eq!(resp.reason(), "OK");

        let resp = SsdpResponse::parse(b"HTTP/1.1 404\r\n\r\n", from()).unwrap();
        assert_eq!(resp.status(), "404");
    }

    #[test]
    fn test_relative_location_is_resolved_against_sender() {
        let resp = SsdpResponse::new(200, "OK", from()).with_header("LOCATION", "/description.xml");
        assert_eq!(
            resp.location().unwrap().as_str(),
            "http://192.168.1.20:1900/description.xml"
        );
        assert_eq!(resp.raw_location(), Some("/description.xml"));

        let resp = SsdpResponse::new(200, "OK", from()).with_header("LOCATION", "no-scheme");
        assert_eq!(
            resp.location().unwrap().as_str(),
            "http://192.168.1.20:1900/no-scheme"
        );
    }

    #[test]
    fn test_missing_and_invalid_location() {
        let resp = SsdpResponse::new(200, "OK", from());
        assert!(matches!(resp.location(), Err(SsdpError::NoLocation)));

        let resp = SsdpResponse::new(200, "OK", from()).with_header("LOCATION", "  ");
        assert!(matches!(resp.location(), Err(SsdpError::NoLocation)));

        let resp = SsdpResponse::new(200, "OK", from()).with_header("LOCATION", "http://[::1");
        assert!(matches!(
            resp.location(),
            Err(SsdpError::InvalidLocation(_, _))
        ));
    }

    #[test]
    fn test_empty_usn_is_none() {
        let resp = SsdpResponse::new(200, "OK", from()).with_header("USN", "");
        assert_eq!(resp.usn(), None);
    }
}
