//! Domain types and the per-region cloud provider contract.
//!
//! A [`Compute`] value is one live handle onto a single region. The resource
//! directory holds one handle per configured region and the retention and
//! resize engines only ever talk to the provider through this trait, which
//! keeps both testable against scripted in-memory doubles.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Tag map attached to a server. Lookup of an absent key is a defined
/// `None`, never a panic.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Tag key used to resolve a server's human-readable name.
    pub const NAME_KEY: &'static str = "Name";

    /// Builds a tag map from key/value pairs.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the `Name` tag value, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get(Self::NAME_KEY)
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.0 {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// Power state reported by the provider for a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ServerState {
    /// The instance is up.
    Running,
    /// The instance is halted.
    Stopped,
    /// Any transient or unknown state (pending, stopping, terminated, ...).
    Other(String),
}

impl ServerState {
    /// Parses a provider state label into the coarse state enum.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns the label used for display and comparison.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Other(label) => label.as_str(),
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compute instance as observed from the provider. Never cached: each
/// query fetches a fresh view.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Server {
    /// Provider identifier for the instance.
    pub id: String,
    /// Tags attached to the instance; `Name` is the lookup key.
    pub tags: Tags,
    /// Current power state.
    pub state: ServerState,
    /// Resource class (flavor / machine type) identifier.
    pub flavor: String,
    /// Availability zone, for example `eu-west-1a`.
    pub availability_zone: String,
    /// Public IPv4 address, when one is associated.
    pub public_ip: Option<String>,
    /// Public DNS name, when one is assigned.
    pub dns_name: Option<String>,
}

impl Server {
    /// Returns the server's `Name` tag, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.tags.name()
    }
}

/// A point-in-time block-storage snapshot. Immutable once observed;
/// deletion by identifier is the only mutation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Snapshot {
    /// Provider identifier for the snapshot.
    pub id: String,
    /// Free-text description; associates the snapshot with a server when it
    /// contains the server's name tag.
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Size of the backing volume in GiB.
    pub volume_size_gib: i64,
}

impl Snapshot {
    /// Whether this snapshot's description mentions `server_name`.
    #[must_use]
    pub fn matches_server(&self, server_name: &str) -> bool {
        self.description
            .as_deref()
            .is_some_and(|description| description.contains(server_name))
    }
}

/// Errors raised by provider calls.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// The provider rejected or failed an API call.
    #[error("provider error: {message}")]
    Api {
        /// Message returned by the provider SDK.
        message: String,
    },
}

impl ProviderError {
    /// Wraps a provider SDK failure.
    #[must_use]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// One live handle onto a single region.
///
/// Status checks must be idempotent: [`Compute::poll_server`] is called
/// repeatedly from wait loops and must not have side effects.
pub trait Compute {
    /// Name of the region this handle is bound to.
    fn region(&self) -> &str;

    /// Lists every server in the region.
    fn list_servers(&self) -> ProviderFuture<'_, Vec<Server>>;

    /// Lists every snapshot in the region, ascending by creation time.
    fn list_snapshots(&self) -> ProviderFuture<'_, Vec<Snapshot>>;

    /// Deletes a snapshot by identifier.
    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ProviderFuture<'a, ()>;

    /// Issues a stop for the given server.
    fn stop_server<'a>(&'a self, server_id: &'a str) -> ProviderFuture<'a, ()>;

    /// Issues a start for the given server.
    fn start_server<'a>(&'a self, server_id: &'a str) -> ProviderFuture<'a, ()>;

    /// Changes the server's flavor. Only valid while the server is stopped.
    fn modify_flavor<'a>(&'a self, server_id: &'a str, flavor: &'a str)
    -> ProviderFuture<'a, ()>;

    /// Re-associates a public address with the server.
    fn associate_address<'a>(
        &'a self,
        server_id: &'a str,
        address: &'a str,
    ) -> ProviderFuture<'a, ()>;

    /// Fetches a fresh view of one server, or `None` when it no longer
    /// exists.
    fn poll_server<'a>(&'a self, server_id: &'a str) -> ProviderFuture<'a, Option<Server>>;

    /// Lists the region names known to the provider.
    fn list_region_names(&self) -> ProviderFuture<'_, Vec<String>>;
}
