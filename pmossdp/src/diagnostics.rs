//! Diagnostics des réponses rejetées pendant une recherche
//!
//! Le filtre de recherche ne logge pas directement : il signale chaque anomalie
//! à un [`DiagnosticSink`]. [`TracingSink`] est utilisé par défaut ; les tests
//! utilisent [`MemorySink`] pour vérifier les raisons de rejet.

use std::fmt;
use std::net::SocketAddr;

use parking_lot::Mutex;
use tracing::warn;

/// Anomalie non fatale rencontrée sur une réponse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchDiagnostic {
    /// Code de statut différent de 200 (réponse rejetée)
    UnexpectedStatus { status: String, from: SocketAddr },
    /// `ST` différent de la cible demandée (réponse rejetée)
    UnexpectedSearchTarget { st: String, from: SocketAddr },
    /// `LOCATION` absent ou invalide (réponse rejetée)
    NoUsableLocation { error: String, from: SocketAddr },
    /// `USN` absent ou vide : la location sert d'identité (réponse conservée)
    MissingUsn { location: String, from: SocketAddr },
}

impl SearchDiagnostic {
    /// `true` si la réponse concernée a été écartée
    pub fn is_discard(&self) -> bool {
        !matches!(self, SearchDiagnostic::MissingUsn { .. })
    }

    pub fn sender(&self) -> SocketAddr {
        match self {
            SearchDiagnostic::UnexpectedStatus { from, .. }
            | SearchDiagnostic::UnexpectedSearchTarget { from, .. }
            | SearchDiagnostic::NoUsableLocation { from, .. }
            | SearchDiagnostic::MissingUsn { from, .. } => *from,
        }
    }
}

impl fmt::Display for SearchDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchDiagnostic::UnexpectedStatus { status, .. } => {
                write!(f, "got response status code {:?} in search response", status)
            }
            SearchDiagnostic::UnexpectedSearchTarget { st, .. } => {
                write!(f, "got unexpected search target result {:?}", st)
            }
            SearchDiagnostic::NoUsableLocation { error, .. } => {
                write!(f, "no usable location in search response (discarding): {}", error)
            }
            SearchDiagnostic::MissingUsn { location, .. } => {
                write!(
                    f,
                    "empty/missing USN in search response (using location instead): {}",
                    location
                )
            }
        }
    }
}

/// Destination des diagnostics d'une recherche
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &SearchDiagnostic);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&SearchDiagnostic) + Send + Sync,
{
    fn report(&self, diagnostic: &SearchDiagnostic) {
        self(diagnostic)
    }
}

/// Sink par défaut : un `warn!` par diagnostic
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &SearchDiagnostic) {
        warn!(from = %diagnostic.sender(), "⚠️ ssdp: {}", diagnostic);
    }
}

/// Sink qui conserve les diagnostics en mémoire
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<SearchDiagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copie des diagnostics reçus, dans l'ordre
    pub fn entries(&self) -> Vec<SearchDiagnostic> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: &SearchDiagnostic) {
        self.entries.lock().push(diagnostic.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn addr() -> SocketAddr {
        "10.0.0.2:1900".parse().unwrap()
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.report(&SearchDiagnostic::UnexpectedStatus {
            status: "404 Not Found".to_string(),
            from: addr(),
        });
        sink.report(&SearchDiagnostic::MissingUsn {
            location: "http://10.0.0.2/desc.xml".to_string(),
            from: addr(),
        });

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_discard());
        assert!(!entries[1].is_discard());
    }

    #[test]
    fn test_closure_sink() {
        let count = AtomicUsize::new(0);
        let sink = |_: &SearchDiagnostic| {
            count.fetch_add(1, Ordering::SeqCst);
        };
        sink.report(&SearchDiagnostic::UnexpectedSearchTarget {
            st: "ssdp:all".to_string(),
            from: addr(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_display_mentions_reason() {
        let d = SearchDiagnostic::UnexpectedStatus {
            status: "404 Not Found".to_string(),
            from: addr(),
        };
        assert!(d.to_string().contains("404 Not Found"));
    }
}
