//! # pmossdp - Recherche SSDP (M-SEARCH) pour les control points PMOMusic
//!
//! Ce crate implémente la partie « recherche » du protocole SSDP (Simple Service
//! Discovery Protocol) : construction d'une requête M-SEARCH, émission répétée
//! en multicast via un transport HTTPU, puis filtrage et déduplication des
//! réponses reçues avant l'échéance.
//!
//! ## Architecture
//!
//! - [`SearchRequest`] : requête M-SEARCH immuable (en-têtes sensibles à la casse)
//! - [`HttpuTransport`] : contrat du transport (envoi ×N, collecte jusqu'à l'échéance)
//! - [`HttpuClient`] : transport UDP concret (tokio + socket2)
//! - [`ssdp_raw_search`] / [`ssdp_search`] : collecte, validation et déduplication
//! - [`DiagnosticSink`] : réception des réponses rejetées (par défaut via `tracing`)
//! - [`SsdpConfig`] : configuration YAML avec surcharges par variables d'environnement
//!
//! ## Exemple
//!
//! ```no_run
//! use futures::StreamExt;
//! use pmossdp::{HttpuClient, ssdp_raw_search};
//!
//! # async fn run() -> Result<(), pmossdp::SsdpError> {
//! let client = HttpuClient::new()?;
//! let mut results = ssdp_raw_search(&client, "upnp:rootdevice", 2, 3).await?;
//! while let Some(adv) = results.next().await {
//!     println!("{} -> {}", adv.identity(), adv.location());
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod httpu;
pub mod request;
pub mod response;
pub mod search;

pub use config::SsdpConfig;
pub use diagnostics::{DiagnosticSink, MemorySink, SearchDiagnostic, TracingSink};
pub use errors::SsdpError;
pub use httpu::{HttpuClient, HttpuTransport, ResponseStream};
pub use request::SearchRequest;
pub use response::SsdpResponse;
pub use search::{
    Advertisement, SearchFilter, SearchOptions, SearchStream, ssdp_raw_search, ssdp_search,
};

/// Adresse multicast SSDP (IPv4)
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;

/// Valeur de l'en-tête MAN d'un M-SEARCH (guillemets compris)
pub const SSDP_DISCOVER: &str = "\"ssdp:discover\"";

pub const METHOD_SEARCH: &str = "M-SEARCH";
pub const METHOD_NOTIFY: &str = "NOTIFY";

pub const NTS_ALIVE: &str = "ssdp:alive";
pub const NTS_BYEBYE: &str = "ssdp:byebye";
pub const NTS_UPDATE: &str = "ssdp:update";

/// Cible de recherche : tous les devices et services
pub const ST_ALL: &str = "ssdp:all";

/// Cible de recherche : devices racines uniquement
pub const ST_ROOT_DEVICE: &str = "upnp:rootdevice";

/// Délai supplémentaire accordé aux réponses au-delà de MX
pub const RESPONSE_GRACE: Duration = Duration::from_millis(100);

/// `HOST` d'une requête M-SEARCH multicast
pub fn ssdp_multicast_host() -> String {
    format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT)
}
