//! Construction des requêtes M-SEARCH
//!
//! Les en-têtes SSDP sont sensibles à la casse chez certains devices : ils sont
//! stockés et émis tels quels (`HOST`, `MAN`, `MX`, `ST`), jamais normalisés.

use std::time::Duration;

use crate::errors::{Result, SsdpError};
use crate::{METHOD_SEARCH, RESPONSE_GRACE, SSDP_DISCOVER, ssdp_multicast_host};

/// Requête M-SEARCH immuable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    method: &'static str,
    host: String,
    search_target: String,
    max_wait_seconds: u32,
    /// En-têtes dans l'ordre d'émission
    headers: Vec<(&'static str, String)>,
}

impl SearchRequest {
    /// Construit un M-SEARCH pour `search_target`
    ///
    /// # Errors
    ///
    /// [`SsdpError::InvalidArgument`] si `search_target` est vide ou si
    /// `max_wait_seconds` vaut 0
    pub fn new(search_target: &str, max_wait_seconds: u32) -> Result<Self> {
        if search_target.trim().is_empty() {
            return Err(SsdpError::invalid_argument("searchTarget must not be empty"));
        }
        if max_wait_seconds < 1 {
            return Err(SsdpError::invalid_argument("maxWaitSeconds must be >= 1"));
        }

        let host = ssdp_multicast_host();
        let headers = vec![
            ("HOST", host.clone()),
            ("MAN", SSDP_DISCOVER.to_string()),
            ("MX", max_wait_seconds.to_string()),
            ("ST", search_target.to_string()),
        ];

        Ok(Self {
            method: METHOD_SEARCH,
            host,
            search_target: search_target.to_string(),
            max_wait_seconds,
            headers,
        })
    }

    pub fn method(&self) -> &str {
        self.method
    }

    /// Adresse `ip:port` du groupe multicast visé
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn search_target(&self) -> &str {
        &self.search_target
    }

    pub fn max_wait_seconds(&self) -> u32 {
        self.max_wait_seconds
    }

    /// Valeur d'un en-tête (nom exact, sensible à la casse)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (*n, v.as_str()))
    }

    /// Temps d'écoute total : MX + [`RESPONSE_GRACE`]
    pub fn total_wait(&self) -> Duration {
        effective_wait(self.max_wait_seconds)
    }

    /// Forme filaire de la requête (CRLF, ligne vide finale)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut msg = format!("{} * HTTP/1.1\r\n", self.method);
        for (name, value) in &self.headers {
            msg.push_str(name);
            msg.push_str(": ");
            msg.push_str(value);
            msg.push_str("\r\n");
        }
        msg.push_str("\r\n");
        msg.into_bytes()
    }
}

/// MX secondes plus la marge de [`RESPONSE_GRACE`]
pub fn effective_wait(max_wait_seconds: u32) -> Duration {
    Duration::from_secs(u64::from(max_wait_seconds)) + RESPONSE_GRACE
}
