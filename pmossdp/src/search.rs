//! Recherche SSDP : collecte, validation et déduplication des réponses
//!
//! [`ssdp_raw_search`] envoie un M-SEARCH via un [`HttpuTransport`] puis renvoie
//! un [`SearchStream`] qui ne contient que des réponses uniques et valides :
//! statut 200, `ST` identique à la cible demandée et `LOCATION` exploitable.
//! Une tâche tokio par appel draine le flux du transport ; elle s'arrête quand
//! ce flux se ferme (échéance) ou quand la recherche est annulée.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::config::SsdpConfig;
use crate::diagnostics::{DiagnosticSink, SearchDiagnostic, TracingSink};
use crate::errors::Result;
use crate::httpu::{HttpuTransport, ResponseStream};
use crate::request::SearchRequest;
use crate::response::SsdpResponse;

/// Paramètres d'une recherche
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub search_target: String,
    /// Doit valoir au moins 1 ; 2 est une valeur raisonnable
    pub max_wait_seconds: u32,
    /// Nombre d'émissions du M-SEARCH ; 3 est une valeur raisonnable
    pub num_sends: usize,
}

impl SearchOptions {
    pub fn new(search_target: &str, max_wait_seconds: u32, num_sends: usize) -> Self {
        Self {
            search_target: search_target.to_string(),
            max_wait_seconds,
            num_sends,
        }
    }

    /// Paramètres issus de la section `search` de la configuration
    pub fn from_config(config: &SsdpConfig) -> Self {
        Self::new(
            &config.search.target,
            config.search.mx,
            config.search.num_sends,
        )
    }
}

/// Réponse acceptée par la recherche
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    response: SsdpResponse,
    location: Url,
    identity: String,
}

impl Advertisement {
    pub fn status_code(&self) -> u16 {
        self.response.status_code()
    }

    pub fn st(&self) -> &str {
        self.response.st()
    }

    pub fn usn(&self) -> Option<&str> {
        self.response.usn()
    }

    /// URL de description du device
    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Clé de déduplication : l'USN, ou la location s'il est absent
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn sender(&self) -> SocketAddr {
        self.response.sender()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.header(name)
    }

    pub fn response(&self) -> &SsdpResponse {
        &self.response
    }

    pub fn into_response(self) -> SsdpResponse {
        self.response
    }
}

/// Filtre d'une recherche : validation puis déduplication
///
/// Il appartient à une seule tâche : l'ensemble des identités déjà vues n'est
/// jamais partagé.
pub struct SearchFilter {
    search_target: String,
    seen: HashSet<String>,
    sink: Arc<dyn DiagnosticSink>,
}

impl SearchFilter {
    pub fn new(search_target: &str, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            search_target: search_target.to_string(),
            seen: HashSet::new(),
            sink,
        }
    }

    /// Retourne l'annonce si la réponse est valide et pas encore vue
    pub fn accept(&mut self, response: SsdpResponse) -> Option<Advertisement> {
        let from = response.sender();

        if response.status_code() != 200 {
            self.sink.report(&SearchDiagnostic::UnexpectedStatus {
                status: response.status(),
                from,
            });
            return None;
        }

        if response.st() != self.search_target {
            self.sink.report(&SearchDiagnostic::UnexpectedSearchTarget {
                st: response.st().to_string(),
                from,
            });
            return None;
        }

        let location = match response.location() {
            Ok(location) => location,
            Err(e) => {
                self.sink.report(&SearchDiagnostic::NoUsableLocation {
                    error: e.to_string(),
                    from,
                });
                return None;
            }
        };

        // Sans USN, l'identité est la location telle que reçue (pas l'URL normalisée)
        let identity = match (response.usn(), response.raw_location()) {
            (Some(usn), _) => usn.to_string(),
            (None, raw) => {
                let raw = raw.unwrap_or(location.as_str()).to_string();
                self.sink.report(&SearchDiagnostic::MissingUsn {
                    location: raw.clone(),
                    from,
                });
                raw
            }
        };

        if !self.seen.insert(identity.clone()) {
            trace!("Duplicate SSDP response for {}", identity);
            return None;
        }

        Some(Advertisement {
            response,
            location,
            identity,
        })
    }

    /// Nombre d'identités distinctes acceptées
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

/// Flux des annonces d'une recherche
///
/// Le flux se termine quand le transport a atteint son échéance. Le relâcher
/// (ou appeler [`SearchStream::cancel`]) arrête la tâche de collecte et le
/// transport sans attendre l'échéance.
pub struct SearchStream {
    rx: mpsc::Receiver<Advertisement>,
    cancel: CancellationToken,
}

impl SearchStream {
    /// Prochaine annonce, `None` une fois la recherche terminée
    pub async fn next_advertisement(&mut self) -> Option<Advertisement> {
        self.rx.recv().await
    }

    /// Interrompt la recherche ; les annonces déjà transmises restent lisibles
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for SearchStream {
    type Item = Advertisement;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for SearchStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Recherche SSDP brute
///
/// Renvoie les réponses uniques ayant la cible `search_target`, un USN (ou à
/// défaut une location) et une location valide. Les réponses écartées sont
/// signalées via `tracing`.
///
/// # Errors
///
/// - [`SsdpError::InvalidArgument`](crate::SsdpError::InvalidArgument) si
///   `max_wait_seconds` vaut 0 (aucun envoi n'est fait)
/// - [`SsdpError::Transport`](crate::SsdpError::Transport) si le transport ne
///   peut pas démarrer
pub async fn ssdp_raw_search<T>(
    transport: &T,
    search_target: &str,
    max_wait_seconds: u32,
    num_sends: usize,
) -> Result<SearchStream>
where
    T: HttpuTransport + ?Sized,
{
    ssdp_search(
        transport,
        &SearchOptions::new(search_target, max_wait_seconds, num_sends),
        Arc::new(TracingSink),
        CancellationToken::new(),
    )
    .await
}

/// Recherche SSDP avec sink de diagnostics et jeton d'annulation explicites
///
/// `cancel` est partagé avec le transport : l'annuler arrête à la fois la
/// collecte et la réception.
pub async fn ssdp_search<T>(
    transport: &T,
    options: &SearchOptions,
    sink: Arc<dyn DiagnosticSink>,
    cancel: CancellationToken,
) -> Result<SearchStream>
where
    T: HttpuTransport + ?Sized,
{
    let request = SearchRequest::new(&options.search_target, options.max_wait_seconds)?;

    let raw = transport
        .send(
            &request,
            request.total_wait(),
            options.num_sends,
            cancel.clone(),
        )
        .await?;

    // Capacité minimale : la tâche attend que l'appelant consomme
    let (tx, rx) = mpsc::channel(1);
    let filter = SearchFilter::new(request.search_target(), sink);
    tokio::spawn(collect(raw, filter, tx, cancel.clone()));

    Ok(SearchStream { rx, cancel })
}

async fn collect(
    mut raw: ResponseStream,
    mut filter: SearchFilter,
    tx: mpsc::Sender<Advertisement>,
    cancel: CancellationToken,
) {
    loop {
        let response = tokio::select! {
            _ = cancel.cancelled() => break,
            next = raw.recv() => match next {
                Some(response) => response,
                None => break,
            },
        };

        let Some(advertisement) = filter.accept(response) else {
            continue;
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(advertisement) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    debug!(
        "🔍 SSDP search for {} finished ({} unique response(s))",
        filter.search_target,
        filter.seen_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;

    const BASIC: &str = "urn:schemas-upnp-org:device:Basic:1";

    fn reply(status: u16, st: &str, usn: Option<&str>, location: Option<&str>) -> SsdpResponse {
        let mut resp = SsdpResponse::new(status, "OK", "192.168.1.50:1900".parse().unwrap())
            .with_header("ST", st);
        if let Some(usn) = usn {
            resp = resp.with_header("USN", usn);
        }
        if let Some(location) = location {
            resp = resp.with_header("LOCATION", location);
        }
        resp
    }

    fn filter() -> (SearchFilter, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (SearchFilter::new(BASIC, sink.clone()), sink)
    }

    #[test]
    fn test_accepts_valid_reply() {
        let (mut filter, sink) = filter();
        let adv = filter
            .accept(reply(200, BASIC, Some("uuid:abc"), Some("http://h/desc.xml")))
            .unwrap();
        assert_eq!(adv.identity(), "uuid:abc");
        assert_eq!(adv.location().as_str(), "http://h/desc.xml");
        assert_eq!(adv.status_code(), 200);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_rejects_in_order() {
        let (mut filter, sink) = filter();
        // Statut vérifié avant le ST
        assert!(filter.accept(reply(404, "other", None, None)).is_none());
        assert!(filter.accept(reply(200, "other", None, None)).is_none());
        assert!(filter.accept(reply(200, BASIC, Some("uuid:x"), None)).is_none());
        assert!(filter.accept(reply(200, BASIC, Some("uuid:x"), Some("http://[::1"))).is_none());

        let entries = sink.entries();
        assert_eq!(entries.len(), 4);
        assert!(matches!(entries[0], SearchDiagnostic::UnexpectedStatus { .. }));
        assert!(matches!(entries[1], SearchDiagnostic::UnexpectedSearchTarget { .. }));
        assert!(matches!(entries[2], SearchDiagnostic::NoUsableLocation { .. }));
        assert!(matches!(entries[3], SearchDiagnostic::NoUsableLocation { .. }));
        assert_eq!(filter.seen_count(), 0);
    }

    #[test]
    fn test_st_match_is_exact() {
        let (mut filter, _sink) = filter();
        let st = BASIC.to_uppercase();
        assert!(filter.accept(reply(200, &st, Some("uuid:a"), Some("http://h/"))).is_none());
    }

    #[test]
    fn test_usn_fallback_to_location() {
        let (mut filter, sink) = filter();
        let adv = filter
            .accept(reply(200, BASIC, None, Some("http://h/desc.xml")))
            .unwrap();
        assert_eq!(adv.identity(), "http://h/desc.xml");
        assert_eq!(sink.len(), 1);
        assert!(!sink.entries()[0].is_discard());

        // Même location sans USN : doublon silencieux (seul le fallback est signalé)
        assert!(filter.accept(reply(200, BASIC, Some(""), Some("http://h/desc.xml"))).is_none());
        assert_eq!(sink.len(), 2);
        assert!(sink.entries().iter().all(|d| !d.is_discard()));
    }

    #[test]
    fn test_usn_fallback_keeps_location_spelling() {
        let (mut filter, _sink) = filter();
        for location in [
            "http://192.168.1.5:80/desc.xml",
            "http://192.168.1.5/desc.xml",
            "http://DEV.local/x",
            "http://dev.local/x",
        ] {
            let adv = filter.accept(reply(200, BASIC, None, Some(location))).unwrap();
            assert_eq!(adv.identity(), location);
        }
        assert_eq!(filter.seen_count(), 4);
    }

    #[test]
    fn test_relative_location_is_delivered() {
        let (mut filter, sink) = filter();
        let adv = filter
            .accept(reply(200, BASIC, Some("uuid:rel"), Some("/description.xml")))
            .unwrap();
        assert_eq!(adv.location().as_str(), "http://192.168.1.50:1900/description.xml");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_duplicates_are_silent() {
        let (mut filter, sink) = filter();
        let first = reply(200, BASIC, Some("uuid:abc"), Some("http://a/"));
        let second = reply(200, BASIC, Some("uuid:abc"), Some("http://b/"));
        assert!(filter.accept(first).is_some());
        assert!(filter.accept(second).is_none());
        assert!(sink.is_empty());
        assert_eq!(filter.seen_count(), 1);
    }
}
