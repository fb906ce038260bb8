//! Multi-region resource directory.
//!
//! Holds one [`Compute`] handle per configured region and answers the
//! cross-region questions the engines need: enumerate servers, find a
//! server by name tag, and resolve a server's owning region from its
//! availability zone.
//!
//! Handles are kept sorted lexicographically by region name. That makes
//! sweep traversal reproducible and resolves duplicate name tags across
//! regions deterministically: [`ResourceDirectory::find_server_by_name`]
//! returns the match from the lexicographically first region.

use thiserror::Error;

use crate::provider::{Compute, ProviderError, Server};

/// Errors raised by directory lookups.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DirectoryError {
    /// The availability zone maps to a region the directory has no handle
    /// for.
    #[error("no region handle for zone {availability_zone} (region {region})")]
    UnknownRegion {
        /// Availability zone reported by the server.
        availability_zone: String,
        /// Region name derived from the zone.
        region: String,
    },
}

/// Derives the owning region from an availability zone by stripping the
/// trailing zone letter (`eu-west-1a` → `eu-west-1`).
#[must_use]
pub fn region_from_zone(zone: &str) -> &str {
    zone.strip_suffix(|ch: char| ch.is_ascii_alphabetic())
        .unwrap_or(zone)
}

/// One connected handle per region, sorted by region name.
#[derive(Clone, Debug)]
pub struct ResourceDirectory<C> {
    handles: Vec<C>,
}

impl<C: Compute> ResourceDirectory<C> {
    /// Builds a directory from connected handles, ordering them by region
    /// name.
    #[must_use]
    pub fn new(mut handles: Vec<C>) -> Self {
        handles.sort_by(|lhs, rhs| lhs.region().cmp(rhs.region()));
        Self { handles }
    }

    /// Number of held region handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the directory holds no handles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Iterates handles in region order.
    pub fn handles(&self) -> impl Iterator<Item = &C> {
        self.handles.iter()
    }

    /// Returns the handle for `region`, if held.
    #[must_use]
    pub fn get(&self, region: &str) -> Option<&C> {
        self.handles.iter().find(|handle| handle.region() == region)
    }

    /// Returns an arbitrary held handle, used for queries that are not
    /// region-specific (such as enumerating provider regions).
    #[must_use]
    pub fn any_handle(&self) -> Option<&C> {
        self.handles.first()
    }

    /// Finds the server whose `Name` tag equals `name`, scanning regions in
    /// lexicographic order and returning the first match.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when a region's server listing fails.
    pub async fn find_server_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Server>, ProviderError> {
        for handle in &self.handles {
            let found = handle
                .list_servers()
                .await?
                .into_iter()
                .find(|server| server.name() == Some(name));
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Resolves the handle owning `server` from its availability zone.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownRegion`] when the derived region is
    /// not held.
    pub fn region_of(&self, server: &Server) -> Result<&C, DirectoryError> {
        let region = region_from_zone(&server.availability_zone);
        self.get(region)
            .ok_or_else(|| DirectoryError::UnknownRegion {
                availability_zone: server.availability_zone.clone(),
                region: region.to_owned(),
            })
    }
}
